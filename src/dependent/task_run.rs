//! Tekton TaskRun building the component image from its git source
//!
//! Only build-mode components get one. A run can't be edited once Tekton has
//! started it, so a changed source (url, revision, paths, image) makes the
//! engine delete the run and create a new one.

use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use serde_json::json;

use super::{deployment, route, service_account, ComponentOwner};
use crate::crd::DeploymentMode;
use crate::Error;

/// Tekton task performing the source-to-image build and push
pub const BUILD_TASK: &str = "s2i-buildah-push";

/// API resource for `tekton.dev/v1beta1` TaskRuns
pub fn task_run_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("tekton.dev", "v1beta1", "TaskRun"))
}

pub(super) fn name(owner: &ComponentOwner<'_>) -> String {
    format!("{}-build", owner.name())
}

pub(super) fn build(owner: &ComponentOwner<'_>) -> Result<Option<DynamicObject>, Error> {
    let spec = owner.spec();
    if spec.mode() != DeploymentMode::Build {
        return Ok(None);
    }
    let source = spec
        .build_config
        .as_ref()
        .ok_or_else(|| Error::build("TaskRun", "build mode requires a buildConfig"))?;

    let params = [
        ("gitUrl", source.url.clone()),
        ("gitRevision", source.ref_.clone()),
        ("contextPath", source.context_path.clone().unwrap_or_default()),
        (
            "moduleDirName",
            source.module_dir_name.clone().unwrap_or_default(),
        ),
        ("imageName", deployment::built_image(owner)),
    ]
    .into_iter()
    .map(|(name, value)| json!({ "name": name, "value": value }))
    .collect::<Vec<_>>();

    let mut run = DynamicObject::new(&name(owner), &task_run_resource()).data(json!({
        "spec": {
            "serviceAccountName": service_account::name(owner),
            "taskRef": { "name": BUILD_TASK },
            "params": params,
        }
    }));
    run.metadata = owner.object_meta(name(owner));
    Ok(Some(run))
}

// taskRef.kind is defaulted by Tekton, so only the name is tracked
const MANAGED_PATHS: [&str; 3] = [
    "/spec/params",
    "/spec/serviceAccountName",
    "/spec/taskRef/name",
];

/// Reconciles what the run builds; status and Tekton-filled fields are kept.
pub(super) fn update(existing: &mut DynamicObject, desired: &DynamicObject) -> bool {
    route::sync_paths(&mut existing.data, &desired.data, &MANAGED_PATHS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependent::test_support::*;
    use crate::dependent::TargetPlatform;

    fn param<'a>(run: &'a DynamicObject, name: &str) -> Option<&'a str> {
        run.data
            .pointer("/spec/params")?
            .as_array()?
            .iter()
            .find(|p| p["name"] == name)?["value"]
            .as_str()
    }

    /// Story: a build component gets a TaskRun pushing to the registry the Deployment pulls from
    #[test]
    fn story_build_run_targets_deployed_image() {
        let c = component("fruit", build_spec());
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform::default();
        let owner = ComponentOwner::new(&c, &spec, &platform);
        let run = build(&owner).unwrap().unwrap();

        assert_eq!(run.metadata.name.as_deref(), Some("fruit-build"));
        assert_eq!(
            run.data.pointer("/spec/serviceAccountName"),
            Some(&json!("fruit-build-bot"))
        );
        assert_eq!(
            run.data.pointer("/spec/taskRef/name"),
            Some(&json!(BUILD_TASK))
        );
        assert_eq!(
            param(&run, "gitUrl"),
            Some("https://github.com/halkyonio/operator")
        );
        assert_eq!(param(&run, "gitRevision"), Some("master"));
        assert_eq!(param(&run, "moduleDirName"), Some("fruit-backend-sb"));
        assert_eq!(
            param(&run, "imageName"),
            Some(deployment::built_image(&owner).as_str())
        );
    }

    /// Story: pointing the build at another revision is drift, Tekton's own fields are not
    #[test]
    fn story_new_revision_is_drift() {
        let c = component("fruit", build_spec());
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform::default();
        let owner = ComponentOwner::new(&c, &spec, &platform);
        let mut existing = build(&owner).unwrap().unwrap();
        existing.data["status"] = json!({ "podName": "fruit-build-pod" });
        existing.data["spec"]["timeout"] = json!("1h0m0s");
        existing.data["spec"]["taskRef"]["kind"] = json!("Task");
        assert!(!update(&mut existing, &build(&owner).unwrap().unwrap()));

        let mut raw = build_spec();
        if let Some(source) = raw.build_config.as_mut() {
            source.ref_ = "v2".to_string();
        }
        let c = component("fruit", raw);
        let spec = resolved(&c.spec, "fruit");
        let owner = ComponentOwner::new(&c, &spec, &platform);
        let desired = build(&owner).unwrap().unwrap();

        assert!(update(&mut existing, &desired));
        assert_eq!(param(&existing, "gitRevision"), Some("v2"));
        assert_eq!(existing.data["spec"]["timeout"], json!("1h0m0s"));
        assert!(!update(&mut existing, &desired));
    }

    #[test]
    fn dev_components_are_not_built() {
        let c = component("fruit", dev_spec());
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform::default();
        let owner = ComponentOwner::new(&c, &spec, &platform);
        assert!(build(&owner).unwrap().is_none());
    }
}
