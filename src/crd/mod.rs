//! Custom Resource Definitions for the component operator
//!
//! This module contains all CRD definitions read or written by the operator.

mod component;
mod link;
mod types;

pub use component::{
    Component, ComponentPhase, ComponentSpec, ComponentStatus, LinkRef, LinkState,
};
pub use link::{Link, LinkKind, LinkSpec, LinkStatus};
pub use types::{BuildConfig, DeploymentMode, Env, Feature, Storage};
