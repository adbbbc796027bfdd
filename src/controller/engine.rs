//! Dependent reconciliation engine
//!
//! Walks a component's dependents in registry order and converges each one:
//! fetch, then create if missing, update if drifted, or delete if the kind no
//! longer applies. A failing dependent is recorded and the walk continues, so
//! one broken kind never hides the state of the others.

use tracing::{debug, info, warn};

use super::client::ComponentKubeClient;
use crate::dependent::{set_owner, ComponentOwner, DependentKind, DependentResource, Manifest};
use crate::Error;

/// Message of a dependent that was created this pass
pub const CREATED: &str = "created";
/// Message of a dependent that was updated this pass
pub const UPDATED: &str = "updated";
/// Message of a dependent that already matched
pub const UNCHANGED: &str = "unchanged";
/// Message of a dependent that doesn't apply to this component
pub const NOT_APPLICABLE: &str = "not applicable";
/// Message of a dependent removed because it no longer applies
pub const DELETED: &str = "deleted";

/// Outcome of reconciling one dependent during one pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependentResourceStatus {
    /// Dependent kind
    pub kind: DependentKind,
    /// Whether the dependent converged
    pub success: bool,
    /// What happened, or the error text on failure
    pub message: String,
    /// Whether a failure is transient and worth retrying without a spec change
    pub retryable: bool,
}

impl DependentResourceStatus {
    fn ok(kind: DependentKind, message: &str) -> Self {
        Self {
            kind,
            success: true,
            message: message.to_string(),
            retryable: false,
        }
    }

    fn failed(kind: DependentKind, error: &Error) -> Self {
        Self {
            kind,
            success: false,
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    /// True for successful dependents that exist in the cluster
    pub fn is_present(&self) -> bool {
        self.success && self.message != NOT_APPLICABLE && self.message != DELETED
    }
}

/// Reconcile every dependent of `owner`, in order, isolating failures
pub async fn reconcile_dependents(
    owner: &ComponentOwner<'_>,
    client: &dyn ComponentKubeClient,
) -> Vec<DependentResourceStatus> {
    let mut statuses = Vec::new();
    for dependent in owner.dependents() {
        let kind = dependent.kind();
        let status = match apply_dependent(owner, dependent, client).await {
            Ok(message) => DependentResourceStatus::ok(kind, message),
            Err(e) => {
                warn!(
                    component = %owner.name(),
                    %kind,
                    error = %e,
                    retryable = e.is_retryable(),
                    "dependent reconcile failed"
                );
                DependentResourceStatus::failed(kind, &e)
            }
        };
        statuses.push(status);
    }
    statuses
}

async fn apply_dependent(
    owner: &ComponentOwner<'_>,
    dependent: DependentResource<'_>,
    client: &dyn ComponentKubeClient,
) -> Result<&'static str, Error> {
    let kind = dependent.kind();
    let name = dependent.name();
    let placeholder = dependent.placeholder();

    let existing = client
        .get_dependent(&placeholder, &name, owner.namespace())
        .await?;
    let outcome = match (existing, dependent.build()?) {
        (None, None) => NOT_APPLICABLE,
        (None, Some(mut desired)) => {
            create_owned(owner, &mut desired, client).await?;
            info!(component = %owner.name(), %kind, %name, "created dependent");
            CREATED
        }
        (Some(existing), None) => {
            if !owner.owns(&existing) {
                debug!(component = %owner.name(), %kind, %name, "not ours, leaving in place");
                NOT_APPLICABLE
            } else {
                client.delete_dependent(&existing).await?;
                info!(component = %owner.name(), %kind, %name, "deleted dependent");
                DELETED
            }
        }
        (Some(mut existing), Some(mut desired)) => {
            if !dependent.update_toward(&mut existing, &desired)? {
                debug!(component = %owner.name(), %kind, %name, "dependent up to date");
                UNCHANGED
            } else if dependent.recreate_on_change() {
                client.delete_dependent(&existing).await?;
                create_owned(owner, &mut desired, client).await?;
                info!(component = %owner.name(), %kind, %name, "recreated dependent");
                UPDATED
            } else {
                client.update_dependent(&existing).await?;
                info!(component = %owner.name(), %kind, %name, "updated dependent");
                UPDATED
            }
        }
    };

    for retired in dependent.retired_names() {
        let Some(stale) = client
            .get_dependent(&placeholder, &retired, owner.namespace())
            .await?
        else {
            continue;
        };
        if owner.owns(&stale) {
            client.delete_dependent(&stale).await?;
            info!(
                component = %owner.name(),
                %kind,
                name = %retired,
                "deleted retired dependent"
            );
        }
    }

    Ok(outcome)
}

async fn create_owned(
    owner: &ComponentOwner<'_>,
    desired: &mut Manifest,
    client: &dyn ComponentKubeClient,
) -> Result<(), Error> {
    if let Some(owner_ref) = owner.owner_reference() {
        set_owner(desired, owner_ref);
    }
    client.create_dependent(desired).await
}

/// Delete what owner references can't garbage collect.
///
/// Builds push to an ImageStream named after the component that nothing owns.
pub async fn cleanup_unowned(
    name: &str,
    namespace: &str,
    client: &dyn ComponentKubeClient,
) -> Result<(), Error> {
    client.delete_image_stream(name, namespace).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::controller::client::MockComponentKubeClient;
    use crate::dependent::test_support::*;
    use crate::dependent::TargetPlatform;

    fn api_error(code: u16) -> Error {
        Error::from(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    fn status_of(
        statuses: &[DependentResourceStatus],
        kind: DependentKind,
    ) -> &DependentResourceStatus {
        statuses
            .iter()
            .find(|s| s.kind == kind)
            .expect("every kind reports a status")
    }

    /// Story: a brand new dev component gets its claim, deployment, service and
    /// build bot created, each owned by the component
    #[tokio::test]
    async fn story_fresh_component_creates_applicable_dependents() {
        let c = component("fruit", dev_spec());
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform::default();
        let owner = ComponentOwner::new(&c, &spec, &platform);

        let created = Arc::new(Mutex::new(Vec::<Manifest>::new()));
        let sink = created.clone();
        let mut mock = MockComponentKubeClient::new();
        mock.expect_get_dependent().returning(|_, _, _| Ok(None));
        mock.expect_create_dependent().returning(move |m| {
            sink.lock().unwrap().push(m.clone());
            Ok(())
        });
        mock.expect_update_dependent().never();

        let statuses = reconcile_dependents(&owner, &mock).await;

        assert_eq!(statuses.len(), 9);
        assert!(statuses.iter().all(|s| s.success));
        for kind in [
            DependentKind::PersistentVolumeClaim,
            DependentKind::Deployment,
            DependentKind::Service,
            DependentKind::ServiceAccount,
        ] {
            assert_eq!(status_of(&statuses, kind).message, CREATED);
        }
        for kind in [
            DependentKind::Route,
            DependentKind::Ingress,
            DependentKind::TaskRun,
            DependentKind::Role,
            DependentKind::RoleBinding,
        ] {
            assert_eq!(status_of(&statuses, kind).message, NOT_APPLICABLE);
        }

        let created = created.lock().unwrap();
        let kinds: Vec<_> = created.iter().map(Manifest::kind).collect();
        assert_eq!(
            kinds,
            vec![
                DependentKind::PersistentVolumeClaim,
                DependentKind::Deployment,
                DependentKind::Service,
                DependentKind::ServiceAccount,
            ]
        );
        for m in created.iter() {
            let refs = m.metadata().owner_references.as_ref().unwrap();
            assert_eq!(refs.len(), 1);
            assert_eq!(refs[0].uid, "uid-fruit");
        }
    }

    /// Story: when everything already matches, the pass performs no writes
    #[tokio::test]
    async fn story_converged_component_writes_nothing() {
        let c = component("fruit", dev_spec());
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform::default();
        let owner = ComponentOwner::new(&c, &spec, &platform);

        let existing: HashMap<DependentKind, Manifest> = owner
            .dependents()
            .filter_map(|d| d.build().unwrap().map(|m| (d.kind(), m)))
            .collect();

        let mut mock = MockComponentKubeClient::new();
        mock.expect_get_dependent()
            .returning(move |p, _, _| Ok(existing.get(&p.kind()).cloned()));
        mock.expect_create_dependent().never();
        mock.expect_update_dependent().never();

        let statuses = reconcile_dependents(&owner, &mock).await;
        assert_eq!(status_of(&statuses, DependentKind::Deployment).message, UNCHANGED);
        assert_eq!(statuses.iter().filter(|s| s.is_present()).count(), 4);
    }

    #[tokio::test]
    async fn drifted_dependent_is_updated() {
        let c = component("fruit", dev_spec());
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform::default();
        let owner = ComponentOwner::new(&c, &spec, &platform);

        let mut stale_spec = spec.clone();
        stale_spec.port = 9090;
        let stale_owner = ComponentOwner::new(&c, &stale_spec, &platform);
        let stale_service = DependentResource::new(DependentKind::Service, &stale_owner)
            .build()
            .unwrap()
            .unwrap();

        let mut mock = MockComponentKubeClient::new();
        mock.expect_get_dependent().returning(move |p, _, _| {
            Ok((p.kind() == DependentKind::Service).then(|| stale_service.clone()))
        });
        mock.expect_create_dependent().returning(|_| Ok(()));
        mock.expect_update_dependent().times(1).returning(|m| {
            assert_eq!(m.kind(), DependentKind::Service);
            Ok(())
        });

        let statuses = reconcile_dependents(&owner, &mock).await;
        assert_eq!(status_of(&statuses, DependentKind::Service).message, UPDATED);
    }

    /// Story: a flaky Service read doesn't stop the Deployment from being created
    #[tokio::test]
    async fn story_one_failure_does_not_stop_the_pass() {
        let c = component("fruit", dev_spec());
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform::default();
        let owner = ComponentOwner::new(&c, &spec, &platform);

        let mut mock = MockComponentKubeClient::new();
        mock.expect_get_dependent().returning(|p, _, _| {
            if p.kind() == DependentKind::Service {
                Err(api_error(503))
            } else {
                Ok(None)
            }
        });
        mock.expect_create_dependent().returning(|m| {
            if m.kind() == DependentKind::ServiceAccount {
                Err(api_error(403))
            } else {
                Ok(())
            }
        });

        let statuses = reconcile_dependents(&owner, &mock).await;

        let service = status_of(&statuses, DependentKind::Service);
        assert!(!service.success);
        assert!(service.retryable);
        let account = status_of(&statuses, DependentKind::ServiceAccount);
        assert!(!account.success);
        assert!(!account.retryable);
        assert_eq!(status_of(&statuses, DependentKind::Deployment).message, CREATED);
        assert_eq!(statuses.iter().filter(|s| !s.success).count(), 2);
    }

    #[tokio::test]
    async fn build_errors_are_recorded_per_dependent() {
        let mut raw = dev_spec();
        raw.runtime = "cobol".to_string();
        let c = component("fruit", raw);
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform::default();
        let owner = ComponentOwner::new(&c, &spec, &platform);

        let mut mock = MockComponentKubeClient::new();
        mock.expect_get_dependent().returning(|_, _, _| Ok(None));
        mock.expect_create_dependent().returning(|_| Ok(()));

        let statuses = reconcile_dependents(&owner, &mock).await;
        let deployment = status_of(&statuses, DependentKind::Deployment);
        assert!(!deployment.success);
        assert!(!deployment.retryable);
        assert!(deployment.message.contains("cobol"));
        assert!(status_of(&statuses, DependentKind::Service).success);
    }

    /// Built and owned by `c` under `spec`, as an earlier pass would have left it
    fn owned(c: &crate::crd::Component, kind: DependentKind) -> Manifest {
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform::default();
        let owner = ComponentOwner::new(c, &spec, &platform);
        let mut m = DependentResource::new(kind, &owner)
            .build()
            .unwrap()
            .expect("kind applies to this spec");
        set_owner(&mut m, owner.owner_reference().unwrap());
        m
    }

    /// Story: turning exposure off removes the Ingress instead of leaving it serving
    #[tokio::test]
    async fn story_unexposed_component_loses_its_ingress() {
        let platform = TargetPlatform::default();
        let mut exposed = dev_spec();
        exposed.expose_service = true;
        let c = component("fruit", exposed);
        let ingress = owned(&c, DependentKind::Ingress);

        let c = component("fruit", dev_spec());
        let spec = resolved(&c.spec, "fruit");
        let owner = ComponentOwner::new(&c, &spec, &platform);

        let mut mock = MockComponentKubeClient::new();
        mock.expect_get_dependent().returning(move |p, _, _| {
            Ok((p.kind() == DependentKind::Ingress).then(|| ingress.clone()))
        });
        mock.expect_create_dependent().returning(|_| Ok(()));
        mock.expect_delete_dependent().times(1).returning(|m| {
            assert_eq!((m.kind(), m.name()), (DependentKind::Ingress, "fruit"));
            Ok(())
        });

        let statuses = reconcile_dependents(&owner, &mock).await;
        let status = status_of(&statuses, DependentKind::Ingress);
        assert!(status.success);
        assert_eq!(status.message, DELETED);
        assert!(!status.is_present());
    }

    #[tokio::test]
    async fn objects_owned_by_someone_else_are_left_alone() {
        let platform = TargetPlatform::default();
        let mut exposed = dev_spec();
        exposed.expose_service = true;
        let other = component("fruit", exposed);
        let mut ingress = owned(&other, DependentKind::Ingress);
        ingress.metadata_mut().owner_references = None;

        let c = component("fruit", dev_spec());
        let spec = resolved(&c.spec, "fruit");
        let owner = ComponentOwner::new(&c, &spec, &platform);

        let mut mock = MockComponentKubeClient::new();
        mock.expect_get_dependent().returning(move |p, _, _| {
            Ok((p.kind() == DependentKind::Ingress).then(|| ingress.clone()))
        });
        mock.expect_create_dependent().returning(|_| Ok(()));
        mock.expect_delete_dependent().never();

        let statuses = reconcile_dependents(&owner, &mock).await;
        assert_eq!(
            status_of(&statuses, DependentKind::Ingress).message,
            NOT_APPLICABLE
        );
    }

    /// Story: switching from dev to build retires the dev pod and its workspace claim
    #[tokio::test]
    async fn story_switch_to_build_retires_dev_objects() {
        let platform = TargetPlatform::default();
        let dev = component("fruit", dev_spec());
        let claim = owned(&dev, DependentKind::PersistentVolumeClaim);
        let dev_deployment = owned(&dev, DependentKind::Deployment);

        let c = component("fruit", build_spec());
        let spec = resolved(&c.spec, "fruit");
        let owner = ComponentOwner::new(&c, &spec, &platform);

        let deleted = Arc::new(Mutex::new(Vec::<(DependentKind, String)>::new()));
        let sink = deleted.clone();
        let mut mock = MockComponentKubeClient::new();
        mock.expect_get_dependent()
            .returning(move |p, name, _| match (p.kind(), name) {
                (DependentKind::PersistentVolumeClaim, "fruit-data") => Ok(Some(claim.clone())),
                (DependentKind::Deployment, "fruit") => Ok(Some(dev_deployment.clone())),
                _ => Ok(None),
            });
        mock.expect_create_dependent().returning(|_| Ok(()));
        mock.expect_delete_dependent().returning(move |m| {
            sink.lock().unwrap().push((m.kind(), m.name().to_string()));
            Ok(())
        });

        let statuses = reconcile_dependents(&owner, &mock).await;

        assert!(statuses.iter().all(|s| s.success));
        assert_eq!(
            status_of(&statuses, DependentKind::PersistentVolumeClaim).message,
            DELETED
        );
        assert_eq!(status_of(&statuses, DependentKind::Deployment).message, CREATED);
        assert_eq!(
            *deleted.lock().unwrap(),
            vec![
                (DependentKind::PersistentVolumeClaim, "fruit-data".to_string()),
                (DependentKind::Deployment, "fruit".to_string()),
            ]
        );
    }

    /// Story: a new git revision replaces the build run with a fresh one
    #[tokio::test]
    async fn story_changed_source_recreates_task_run() {
        let platform = TargetPlatform::default();
        let old = component("fruit", build_spec());
        let old_run = owned(&old, DependentKind::TaskRun);

        let mut raw = build_spec();
        if let Some(source) = raw.build_config.as_mut() {
            source.ref_ = "v2".to_string();
        }
        let c = component("fruit", raw);
        let spec = resolved(&c.spec, "fruit");
        let owner = ComponentOwner::new(&c, &spec, &platform);

        let writes = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let (on_delete, on_create) = (writes.clone(), writes.clone());
        let mut mock = MockComponentKubeClient::new();
        mock.expect_get_dependent().returning(move |p, _, _| {
            Ok((p.kind() == DependentKind::TaskRun).then(|| old_run.clone()))
        });
        mock.expect_delete_dependent().returning(move |m| {
            assert_eq!(m.kind(), DependentKind::TaskRun);
            on_delete.lock().unwrap().push("delete");
            Ok(())
        });
        mock.expect_create_dependent().returning(move |m| {
            if m.kind() == DependentKind::TaskRun {
                let refs = m.metadata().owner_references.as_ref().unwrap();
                assert_eq!(refs[0].uid, "uid-fruit");
                on_create.lock().unwrap().push("create");
            }
            Ok(())
        });
        mock.expect_update_dependent().never();

        let statuses = reconcile_dependents(&owner, &mock).await;
        assert_eq!(status_of(&statuses, DependentKind::TaskRun).message, UPDATED);
        assert_eq!(*writes.lock().unwrap(), vec!["delete", "create"]);
    }

    #[tokio::test]
    async fn cleanup_deletes_image_stream() {
        let mut mock = MockComponentKubeClient::new();
        mock.expect_delete_image_stream()
            .times(1)
            .returning(|name, ns| {
                assert_eq!((name, ns), ("fruit", "demo"));
                Ok(())
            });
        cleanup_unowned("fruit", "demo", &mock).await.unwrap();
    }
}
