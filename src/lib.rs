//! Component operator - turns Component resources into running workloads
//!
//! A `Component` declares an application (runtime, version, port, storage,
//! env, optional git build). The operator materializes it as a set of
//! dependent Kubernetes objects owned by the Component, keeps them converged,
//! and tracks Links that inject configuration into the running pod.
//!
//! # Modules
//!
//! - [`crd`] - Component and Link custom resources
//! - [`defaults`] - Lazy defaulting of Component specs
//! - [`dependent`] - Desired state of each dependent object kind
//! - [`controller`] - Reconciliation loop and phase state machine
//! - [`events`] - Kubernetes Event recording
//! - [`config`] - Operator configuration from flags and environment
//! - [`retry`] - Backoff for startup calls to the API server
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod defaults;
pub mod dependent;
pub mod error;
pub mod events;
pub mod retry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Registry that build-mode images are pushed to and pulled from
pub const DEFAULT_IMAGE_REGISTRY: &str = "image-registry.openshift-image-registry.svc:5000";

/// Seconds between passes while a component is settling
pub const DEFAULT_REQUEUE_SECS: u64 = 5;
