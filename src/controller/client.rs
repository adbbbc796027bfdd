//! Cluster API access for the component controller
//!
//! [`ComponentKubeClient`] is the only way the controller talks to the API
//! server, so tests can swap in a mock. Reads map NotFound to `Ok(None)` and
//! deletes map it to `Ok(())`.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::core::GroupVersionKind;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{Component, ComponentStatus, Link, LinkStatus};
use crate::defaults::SpecDefaults;
use crate::dependent::{route_resource, task_run_resource, Manifest, APP_LABEL};
use crate::Error;

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "component-operator";

/// API resource for OpenShift ImageStreams produced by builds
pub fn image_stream_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "image.openshift.io",
        "v1",
        "ImageStream",
    ))
}

/// Kubernetes operations needed by the component controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComponentKubeClient: Send + Sync {
    /// Fetch the dependent of `placeholder`'s kind named `name`
    async fn get_dependent(
        &self,
        placeholder: &Manifest,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Manifest>, Error>;

    /// Create a dependent in the namespace recorded in its metadata
    async fn create_dependent(&self, manifest: &Manifest) -> Result<(), Error>;

    /// Replace a dependent previously returned by `get_dependent`
    async fn update_dependent(&self, manifest: &Manifest) -> Result<(), Error>;

    /// Delete a dependent that no longer applies; already gone counts as deleted
    async fn delete_dependent(&self, manifest: &Manifest) -> Result<(), Error>;

    /// Delete the ImageStream a build pushed to
    async fn delete_image_stream(&self, name: &str, namespace: &str) -> Result<(), Error>;

    /// Persist the defaults filled into a Component's spec
    async fn patch_component_spec(
        &self,
        name: &str,
        namespace: &str,
        defaults: &SpecDefaults,
    ) -> Result<(), Error>;

    /// Replace a Component's status
    async fn patch_component_status(
        &self,
        name: &str,
        namespace: &str,
        status: &ComponentStatus,
    ) -> Result<(), Error>;

    /// Add a finalizer to a Component if it isn't there yet
    async fn add_finalizer(&self, name: &str, namespace: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer from a Component
    async fn remove_finalizer(
        &self,
        name: &str,
        namespace: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Name of the pod currently running the component, if any
    ///
    /// Running pods win over pending ones; terminating pods are ignored.
    async fn get_running_pod_name(
        &self,
        component: &str,
        namespace: &str,
    ) -> Result<Option<String>, Error>;

    /// Fetch a Link
    async fn get_link(&self, name: &str, namespace: &str) -> Result<Option<Link>, Error>;

    /// Replace a Link's status
    async fn patch_link_status(
        &self,
        name: &str,
        namespace: &str,
        status: &LinkStatus,
    ) -> Result<(), Error>;
}

/// [`ComponentKubeClient`] backed by a kube [`Client`]
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn typed<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn dynamic(&self, namespace: &str, resource: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }

    async fn write(&self, manifest: &Manifest, op: WriteOp) -> Result<(), Error> {
        let name = manifest.name();
        let ns = manifest.metadata().namespace.as_deref().ok_or_else(|| {
            Error::internal(
                "client",
                format!("{} '{}' has no namespace", manifest.kind(), name),
            )
        })?;
        match manifest {
            Manifest::PersistentVolumeClaim(o) => write_object(self.typed(ns), name, o, op).await,
            Manifest::Deployment(o) => write_object(self.typed(ns), name, o, op).await,
            Manifest::Service(o) => write_object(self.typed(ns), name, o, op).await,
            Manifest::ServiceAccount(o) => write_object(self.typed(ns), name, o, op).await,
            Manifest::Route(o) => {
                write_object(self.dynamic(ns, &route_resource()), name, o, op).await
            }
            Manifest::Ingress(o) => write_object(self.typed(ns), name, o, op).await,
            Manifest::TaskRun(o) => {
                write_object(self.dynamic(ns, &task_run_resource()), name, o, op).await
            }
            Manifest::Role(o) => write_object(self.typed(ns), name, o, op).await,
            Manifest::RoleBinding(o) => write_object(self.typed(ns), name, o, op).await,
        }
    }

    async fn patch_component(
        &self,
        name: &str,
        namespace: &str,
        patch: serde_json::Value,
    ) -> Result<(), Error> {
        let api: Api<Component> = self.typed(namespace);
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum WriteOp {
    Create,
    Replace,
    Delete,
}

async fn write_object<K>(api: Api<K>, name: &str, obj: &K, op: WriteOp) -> Result<(), Error>
where
    K: Clone + DeserializeOwned + Serialize + Debug,
{
    let params = PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    };
    match op {
        WriteOp::Create => {
            api.create(&params, obj).await?;
        }
        WriteOp::Replace => {
            api.replace(name, &params, obj).await?;
        }
        WriteOp::Delete => delete_object(&api, name).await?,
    }
    Ok(())
}

/// Background delete; NotFound is success
async fn delete_object<K>(api: &Api<K>, name: &str) -> Result<(), Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => Ok(()),
        Err(e) if is_not_found(&e) => {
            debug!(%name, "object already gone");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(ae) if ae.code == 404)
}

/// Pick the pod to report: running before anything else, then by name for stability
fn select_running_pod(pods: &[Pod]) -> Option<String> {
    let is_running =
        |p: &Pod| p.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running");
    pods.iter()
        .filter(|p| p.metadata.deletion_timestamp.is_none())
        .filter_map(|p| Some((!is_running(p), p.metadata.name.clone()?)))
        .min()
        .map(|(_, name)| name)
}

#[async_trait]
impl ComponentKubeClient for KubeClientImpl {
    async fn get_dependent(
        &self,
        placeholder: &Manifest,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Manifest>, Error> {
        let ns = namespace;
        let found = match placeholder {
            Manifest::PersistentVolumeClaim(_) => self
                .typed::<PersistentVolumeClaim>(ns)
                .get_opt(name)
                .await?
                .map(Manifest::PersistentVolumeClaim),
            Manifest::Deployment(_) => self
                .typed::<Deployment>(ns)
                .get_opt(name)
                .await?
                .map(Manifest::Deployment),
            Manifest::Service(_) => self
                .typed::<Service>(ns)
                .get_opt(name)
                .await?
                .map(Manifest::Service),
            Manifest::ServiceAccount(_) => self
                .typed::<ServiceAccount>(ns)
                .get_opt(name)
                .await?
                .map(Manifest::ServiceAccount),
            Manifest::Route(_) => self
                .dynamic(ns, &route_resource())
                .get_opt(name)
                .await?
                .map(Manifest::Route),
            Manifest::Ingress(_) => self
                .typed::<Ingress>(ns)
                .get_opt(name)
                .await?
                .map(Manifest::Ingress),
            Manifest::TaskRun(_) => self
                .dynamic(ns, &task_run_resource())
                .get_opt(name)
                .await?
                .map(Manifest::TaskRun),
            Manifest::Role(_) => self
                .typed::<Role>(ns)
                .get_opt(name)
                .await?
                .map(Manifest::Role),
            Manifest::RoleBinding(_) => self
                .typed::<RoleBinding>(ns)
                .get_opt(name)
                .await?
                .map(Manifest::RoleBinding),
        };
        Ok(found)
    }

    async fn create_dependent(&self, manifest: &Manifest) -> Result<(), Error> {
        self.write(manifest, WriteOp::Create).await
    }

    async fn update_dependent(&self, manifest: &Manifest) -> Result<(), Error> {
        self.write(manifest, WriteOp::Replace).await
    }

    async fn delete_dependent(&self, manifest: &Manifest) -> Result<(), Error> {
        self.write(manifest, WriteOp::Delete).await
    }

    async fn delete_image_stream(&self, name: &str, namespace: &str) -> Result<(), Error> {
        delete_object(&self.dynamic(namespace, &image_stream_resource()), name).await
    }

    async fn patch_component_spec(
        &self,
        name: &str,
        namespace: &str,
        defaults: &SpecDefaults,
    ) -> Result<(), Error> {
        self.patch_component(name, namespace, serde_json::json!({ "spec": defaults }))
            .await
    }

    async fn patch_component_status(
        &self,
        name: &str,
        namespace: &str,
        status: &ComponentStatus,
    ) -> Result<(), Error> {
        let api: Api<Component> = self.typed(namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn add_finalizer(
        &self,
        name: &str,
        namespace: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api: Api<Component> = self.typed(namespace);
        let component = api.get(name).await?;
        let mut finalizers = component.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());
        self.patch_component(
            name,
            namespace,
            serde_json::json!({ "metadata": { "finalizers": finalizers } }),
        )
        .await
    }

    async fn remove_finalizer(
        &self,
        name: &str,
        namespace: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api: Api<Component> = self.typed(namespace);
        let Some(component) = api.get_opt(name).await? else {
            return Ok(());
        };
        let finalizers: Vec<String> = component
            .metadata
            .finalizers
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != finalizer)
            .collect();
        self.patch_component(
            name,
            namespace,
            serde_json::json!({ "metadata": { "finalizers": finalizers } }),
        )
        .await
    }

    async fn get_running_pod_name(
        &self,
        component: &str,
        namespace: &str,
    ) -> Result<Option<String>, Error> {
        let api: Api<Pod> = self.typed(namespace);
        let params = ListParams::default().labels(&format!("{APP_LABEL}={component}"));
        let pods = api.list(&params).await?;
        Ok(select_running_pod(&pods.items))
    }

    async fn get_link(&self, name: &str, namespace: &str) -> Result<Option<Link>, Error> {
        let api: Api<Link> = self.typed(namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_link_status(
        &self,
        name: &str,
        namespace: &str,
        status: &LinkStatus,
    ) -> Result<(), Error> {
        let api: Api<Link> = self.typed(namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}
