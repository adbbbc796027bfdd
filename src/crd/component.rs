//! Component Custom Resource Definition
//!
//! A Component declares a runtime (spring-boot, nodejs, ...) together with the
//! port, storage and exposure it needs. The operator turns it into a
//! Deployment, Service, PVC and friends, and reports progress in the status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{BuildConfig, DeploymentMode, Env, Feature, Storage};
use crate::Error;

/// Specification for a Component
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "halkyon.io",
    version = "v1beta1",
    kind = "Component",
    plural = "components",
    shortname = "cp",
    status = "ComponentStatus",
    namespaced,
    printcolumn = r#"{"name":"Runtime","type":"string","jsonPath":".spec.runtime"}"#,
    printcolumn = r#"{"name":"Mode","type":"string","jsonPath":".spec.deploymentMode"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Pod","type":"string","jsonPath":".status.podName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Install strategy; defaulted to `dev` on first reconcile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_mode: Option<DeploymentMode>,

    /// Runtime used to run the code (spring-boot, vert.x, thorntail, quarkus, nodejs)
    #[serde(default)]
    pub runtime: String,

    /// Runtime version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// HTTP/TCP port the runtime listens on inside the pod
    #[serde(default)]
    pub port: i32,

    /// Expose the service outside the cluster (Route on OpenShift, Ingress elsewhere)
    #[serde(default)]
    pub expose_service: bool,

    /// Volume mounted into the pod
    #[serde(default)]
    pub storage: Storage,

    /// CPU limit for the runtime container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory limit for the runtime container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    /// Extra environment variables for the runtime
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<Env>,

    /// Capabilities to install alongside the component
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,

    /// Source to build from in `build` mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_config: Option<BuildConfig>,
}

impl ComponentSpec {
    /// Deployment mode, falling back to the default when unset
    pub fn mode(&self) -> DeploymentMode {
        self.deployment_mode.unwrap_or_default()
    }

    /// Validate a spec whose defaults have already been resolved
    pub fn validate(&self, component: &str) -> Result<(), Error> {
        match self.mode() {
            DeploymentMode::Dev => {
                if self.port == 0 {
                    return Err(Error::validation(component, "must provide a port"));
                }
            }
            DeploymentMode::Build => {
                if self.build_config.is_none() {
                    return Err(Error::validation(
                        component,
                        "must provide a buildConfig in build mode",
                    ));
                }
            }
        }

        if !(0..=65535).contains(&self.port) {
            return Err(Error::validation(
                component,
                format!("port {} is out of range", self.port),
            ));
        }

        Ok(())
    }
}

/// Component lifecycle phase
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ComponentPhase {
    /// Waiting for dependents to settle (dev mode entry phase)
    #[default]
    Pending,
    /// Waiting for an image build (build mode entry phase)
    Building,
    /// Waiting for the pod to restart after a link was applied
    Linking,
    /// All dependents reconciled
    Ready,
    /// Validation or dependent failure; see the message
    Failed,
}

impl ComponentPhase {
    /// Entry phase for a component in the given deployment mode
    pub fn initial(mode: DeploymentMode) -> Self {
        if mode.requires_build() {
            Self::Building
        } else {
            Self::Pending
        }
    }
}

impl std::fmt::Display for ComponentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Building => write!(f, "Building"),
            Self::Linking => write!(f, "Linking"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress of a link targeting this component
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum LinkState {
    /// Link applied, waiting for the pod to roll
    #[default]
    Started,
    /// Pod rolled and the peer Link was notified
    Linked,
    /// The peer Link could not be found
    Errored,
}

/// A link targeting this component, as tracked in its status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkRef {
    /// Name of the peer Link resource
    pub name: String,

    /// Link progress
    #[serde(default)]
    pub status: LinkState,

    /// Pod running when the link started; a different pod means the rollout happened
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original_pod_name: String,
}

/// Status for a Component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Current phase
    #[serde(default)]
    pub phase: ComponentPhase,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Name of the pod currently running the component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,

    /// Links targeting this component
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkRef>,
}

impl ComponentStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: ComponentPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message (builder style)
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the pod name (builder style)
    pub fn pod_name(mut self, pod_name: impl Into<String>) -> Self {
        self.pod_name = Some(pod_name.into());
        self
    }

    /// Add a tracked link (builder style)
    pub fn link(mut self, link: LinkRef) -> Self {
        self.links.push(link);
        self
    }
}
