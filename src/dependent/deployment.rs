//! Deployment running the component
//!
//! Dev mode runs the runtime image under supervisord (installed by an init
//! container into a shared volume) so code pushed into the workspace volume
//! can be assembled and restarted in place. Build mode runs the image produced
//! by the component's TaskRun.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, PersistentVolumeClaimVolumeSource,
    PodSpec, PodTemplateSpec, ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::{pvc, ComponentOwner, DependentKind};
use crate::crd::DeploymentMode;
use crate::Error;

/// Image providing the supervisord binary and config
pub const SUPERVISOR_IMAGE: &str = "quay.io/halkyonio/supervisord:0.1";

const SHARED_VOLUME: &str = "shared-data";
const SUPERVISOR_DIR: &str = "/var/lib/supervisord";
const WORKSPACE_MOUNTS: [&str; 3] = ["/deployments", "/usr/src", "/tmp/artefacts"];

/// Runtime image for a runtime name
fn runtime_image(runtime: &str) -> Option<&'static str> {
    match runtime {
        "spring-boot" | "vert.x" | "thorntail" | "quarkus" | "openjdk8" => {
            Some("quay.io/halkyonio/hal-maven-jdk:latest")
        }
        "nodejs" => Some("nodeshift/centos7-s2i-nodejs:latest"),
        _ => None,
    }
}

fn is_jvm(runtime: &str) -> bool {
    runtime != "nodejs"
}

pub(super) fn name(owner: &ComponentOwner<'_>) -> String {
    match owner.spec().mode() {
        DeploymentMode::Dev => owner.name().to_string(),
        DeploymentMode::Build => format!("{}-build", owner.name()),
    }
}

/// Name the Deployment had in the other deployment mode
pub(super) fn retired_name(owner: &ComponentOwner<'_>) -> String {
    match owner.spec().mode() {
        DeploymentMode::Dev => format!("{}-build", owner.name()),
        DeploymentMode::Build => owner.name().to_string(),
    }
}

/// Image reference a build-mode component is pushed to and deployed from
pub(super) fn built_image(owner: &ComponentOwner<'_>) -> String {
    format!(
        "{}/{}/{}:latest",
        owner.platform().image_registry,
        owner.namespace(),
        owner.name()
    )
}

pub(super) fn build(owner: &ComponentOwner<'_>) -> Result<Option<Deployment>, Error> {
    let spec = owner.spec();
    let labels = owner.labels();

    let (containers, init_containers, volumes) = match spec.mode() {
        DeploymentMode::Dev => {
            let image = runtime_image(&spec.runtime).ok_or_else(|| {
                Error::build(
                    DependentKind::Deployment.to_string(),
                    format!("unsupported runtime '{}'", spec.runtime),
                )
            })?;
            let claim = pvc::name(owner);

            let mut runtime = runtime_container(owner, image);
            runtime.command = Some(vec![format!("{SUPERVISOR_DIR}/bin/supervisord")]);
            runtime.args = Some(vec![
                "-c".to_string(),
                format!("{SUPERVISOR_DIR}/conf/supervisor.conf"),
            ]);
            let mounts = runtime.volume_mounts.get_or_insert_with(Vec::new);
            mounts.push(VolumeMount {
                name: SHARED_VOLUME.to_string(),
                mount_path: SUPERVISOR_DIR.to_string(),
                ..Default::default()
            });
            mounts.extend(WORKSPACE_MOUNTS.iter().map(|path| VolumeMount {
                name: claim.clone(),
                mount_path: path.to_string(),
                ..Default::default()
            }));

            let supervisor = Container {
                name: format!("{}-supervisord", owner.name()),
                image: Some(SUPERVISOR_IMAGE.to_string()),
                volume_mounts: Some(vec![VolumeMount {
                    name: SHARED_VOLUME.to_string(),
                    mount_path: SUPERVISOR_DIR.to_string(),
                    ..Default::default()
                }]),
                termination_message_path: Some("/dev/termination-log".to_string()),
                termination_message_policy: Some("File".to_string()),
                ..Default::default()
            };

            let volumes = vec![
                Volume {
                    name: SHARED_VOLUME.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
                Volume {
                    name: claim.clone(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: claim,
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ];
            (vec![runtime], Some(vec![supervisor]), Some(volumes))
        }
        DeploymentMode::Build => {
            let image = built_image(owner);
            (vec![runtime_container(owner, &image)], None, None)
        }
    };

    Ok(Some(Deployment {
        metadata: owner.object_meta(name(owner)),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(owner.selector_labels()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    init_containers,
                    volumes,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }))
}

/// Container running the component code, with the fields this operator reconciles
fn runtime_container(owner: &ComponentOwner<'_>, image: &str) -> Container {
    let spec = owner.spec();
    Container {
        name: owner.name().to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        env: Some(pod_env(owner)),
        ports: Some(vec![ContainerPort {
            container_port: spec.port,
            name: Some("http".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: resource_limits(spec.cpu.as_deref(), spec.memory.as_deref()),
        ..Default::default()
    }
}

/// User env first, then runtime defaults the user didn't override
fn pod_env(owner: &ComponentOwner<'_>) -> Vec<EnvVar> {
    let spec = owner.spec();
    let mut env: Vec<EnvVar> = spec
        .envs
        .iter()
        .map(|e| EnvVar {
            name: e.name.clone(),
            value: Some(e.value.clone()),
            ..Default::default()
        })
        .collect();

    let mut defaults = vec![("COMPONENT_NAME", owner.name().to_string())];
    if spec.mode() == DeploymentMode::Dev && is_jvm(&spec.runtime) {
        defaults.push(("JAVA_APP_DIR", "/deployments".to_string()));
        defaults.push(("JAVA_DEBUG", "false".to_string()));
    }
    for (name, value) in defaults {
        if !env.iter().any(|e| e.name == name) {
            env.push(EnvVar {
                name: name.to_string(),
                value: Some(value),
                ..Default::default()
            });
        }
    }
    env
}

fn resource_limits(cpu: Option<&str>, memory: Option<&str>) -> Option<ResourceRequirements> {
    let limits: BTreeMap<String, Quantity> = [("cpu", cpu), ("memory", memory)]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), Quantity(v.to_string()))))
        .collect();
    if limits.is_empty() {
        return None;
    }
    Some(ResourceRequirements {
        limits: Some(limits),
        ..Default::default()
    })
}

fn find_container<'d>(deployment: &'d Deployment, name: &str) -> Option<&'d Container> {
    deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .iter()
        .find(|c| c.name == name)
}

fn env_of(c: &Container) -> &[EnvVar] {
    c.env.as_deref().unwrap_or_default()
}

fn ports_of(c: &Container) -> Vec<(i32, Option<&str>)> {
    c.ports
        .iter()
        .flatten()
        .map(|p| (p.container_port, p.name.as_deref()))
        .collect()
}

fn limits_of(c: &Container) -> Option<&BTreeMap<String, Quantity>> {
    c.resources
        .as_ref()
        .and_then(|r| r.limits.as_ref())
        .filter(|l| !l.is_empty())
}

fn mounts_of(c: &Container) -> Vec<(&str, &str)> {
    c.volume_mounts
        .iter()
        .flatten()
        .map(|m| (m.name.as_str(), m.mount_path.as_str()))
        .collect()
}

/// `(volume, claim)` pairs of the pod's claim-backed volumes
fn claims_of(pod: &PodSpec) -> Vec<(&str, &str)> {
    pod.volumes
        .iter()
        .flatten()
        .filter_map(|v| {
            let claim = v.persistent_volume_claim.as_ref()?;
            Some((v.name.as_str(), claim.claim_name.as_str()))
        })
        .collect()
}

/// Swap the claim-backed volumes for the desired ones, keeping every other volume
fn replace_claims(have: &mut PodSpec, want: &PodSpec) {
    let mut volumes: Vec<Volume> = have
        .volumes
        .take()
        .unwrap_or_default()
        .into_iter()
        .filter(|v| v.persistent_volume_claim.is_none())
        .collect();
    volumes.extend(
        want.volumes
            .iter()
            .flatten()
            .filter(|v| v.persistent_volume_claim.is_some())
            .cloned(),
    );
    have.volumes = (!volumes.is_empty()).then_some(volumes);
}

/// Reconciles the claim volumes of the pod, and the image, env, ports,
/// mounts and limits of the runtime container.
///
/// A Deployment missing the runtime container gets the desired pod spec wholesale.
pub(super) fn update(existing: &mut Deployment, desired: &Deployment) -> bool {
    let Some(desired_spec) = desired.spec.as_ref() else {
        return false;
    };
    let Some(want_pod) = desired_spec.template.spec.as_ref() else {
        return false;
    };
    let Some(want) = want_pod.containers.first() else {
        return false;
    };

    if find_container(existing, &want.name).is_none() {
        let spec = existing.spec.get_or_insert_with(|| desired_spec.clone());
        spec.template.spec = desired_spec.template.spec.clone();
        return true;
    }

    // checked above; the spec and pod spec exist
    let Some(have_pod) = existing
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
    else {
        return false;
    };

    let mut changed = false;
    if claims_of(have_pod) != claims_of(want_pod) {
        replace_claims(have_pod, want_pod);
        changed = true;
    }

    let Some(have) = have_pod.containers.iter_mut().find(|c| c.name == want.name) else {
        return changed;
    };
    if have.image != want.image {
        have.image = want.image.clone();
        changed = true;
    }
    if env_of(have) != env_of(want) {
        have.env = want.env.clone();
        changed = true;
    }
    if ports_of(have) != ports_of(want) {
        have.ports = want.ports.clone();
        changed = true;
    }
    if mounts_of(have) != mounts_of(want) {
        have.volume_mounts = want.volume_mounts.clone();
        changed = true;
    }
    if limits_of(have) != limits_of(want) {
        have.resources = want.resources.clone();
        changed = true;
    }
    changed
}
