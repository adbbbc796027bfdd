//! Supporting types for the Component CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How a component gets from source code to a running pod
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Inner loop: a supervisord-driven pod that assembles and runs pushed code
    #[default]
    Dev,
    /// Outer loop: build an image with Tekton, then deploy it
    Build,
}

impl DeploymentMode {
    /// Returns true if the mode needs an out-of-band build before a runnable image exists
    pub fn requires_build(&self) -> bool {
        matches!(self, Self::Build)
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dev => write!(f, "dev"),
            Self::Build => write!(f, "build"),
        }
    }
}

/// Volume requested for the component's pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    /// Name of the persistent volume claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Requested capacity (e.g. "1Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,

    /// Access mode (ReadWriteOnce, ReadWriteMany, ReadOnlyMany)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Environment variable injected into the runtime container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Env {
    /// Variable name
    pub name: String,
    /// Variable value
    #[serde(default)]
    pub value: String,
}

impl Env {
    /// Convenience constructor
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Capability the component wants installed alongside it (metrics, tracing, ...)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Feature {
    /// Feature name (e.g. "prometheus")
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Source location for build mode
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Git repository URL
    pub url: String,

    /// Git reference (branch, tag or commit)
    #[serde(rename = "ref", default = "default_git_ref")]
    pub ref_: String,

    /// Directory of the project within the repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_path: Option<String>,

    /// Maven module directory, for multi-module projects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_dir_name: Option<String>,
}

fn default_git_ref() -> String {
    "master".to_string()
}
