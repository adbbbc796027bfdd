//! Link Custom Resource Definition
//!
//! A Link injects configuration from one component into another. The link
//! controller itself lives elsewhere; this operator only reads Links and
//! reports back on them once the target component has rolled out.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Env;

/// What a link injects into the target component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum LinkKind {
    /// Plain environment variables
    #[default]
    Env,
    /// Environment from a Secret
    Secret,
}

/// Specification for a Link
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "halkyon.io",
    version = "v1beta1",
    kind = "Link",
    plural = "links",
    status = "LinkStatus",
    namespaced,
    printcolumn = r#"{"name":"Component","type":"string","jsonPath":".spec.componentName"}"#,
    printcolumn = r#"{"name":"Message","type":"string","jsonPath":".status.message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LinkSpec {
    /// Component the link targets
    pub component_name: String,

    /// Kind of payload injected
    #[serde(default)]
    pub kind: LinkKind,

    /// Name of the referenced Secret when `kind` is `Secret`
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub ref_: Option<String>,

    /// Variables injected when `kind` is `Env`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<Env>,
}

/// Status for a Link
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    /// Human-readable progress message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LinkStatus {
    /// Status carrying only a message
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}
