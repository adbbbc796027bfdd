//! Operator configuration
//!
//! Every setting is a CLI flag that can also be supplied through the
//! environment, which is how the operator Deployment configures it.

use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::dependent::TargetPlatform;

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Runtime configuration of the component controller
#[derive(Args, Clone, Debug)]
pub struct OperatorConfig {
    /// Target an OpenShift cluster (Routes instead of Ingresses, ImageStream cleanup)
    #[arg(long, env = "TARGET_OPENSHIFT")]
    pub openshift: bool,

    /// Registry build-mode images are pushed to and pulled from
    #[arg(long, env = "IMAGE_REGISTRY", default_value = crate::DEFAULT_IMAGE_REGISTRY)]
    pub image_registry: String,

    /// Seconds to wait before re-running a pass that asked to be requeued
    #[arg(long, env = "REQUEUE_SECS", default_value_t = crate::DEFAULT_REQUEUE_SECS)]
    pub requeue_secs: u64,

    /// Only watch Components in this namespace
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            openshift: false,
            image_registry: crate::DEFAULT_IMAGE_REGISTRY.to_string(),
            requeue_secs: crate::DEFAULT_REQUEUE_SECS,
            watch_namespace: None,
            log_format: LogFormat::Text,
        }
    }
}

impl OperatorConfig {
    /// Delay used when a pass asks to be requeued
    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }

    /// Platform dependents are built for
    pub fn platform(&self) -> TargetPlatform {
        TargetPlatform {
            openshift: self.openshift,
            image_registry: self.image_registry.clone(),
        }
    }

    /// Watched namespace, treating an empty value as "all namespaces"
    pub fn namespace(&self) -> Option<&str> {
        self.watch_namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}
