//! Controller for Component resources
//!
//! Each pass observes a Component, converges its dependents, advances its
//! links, and records a single status transition.

mod client;
mod component;
mod engine;
mod link;
mod status;

pub use client::{image_stream_resource, ComponentKubeClient, KubeClientImpl, FIELD_MANAGER};
pub use component::{error_policy, reconcile, Context, CONTROLLER_NAME, FINALIZER};
pub use engine::{cleanup_unowned, reconcile_dependents, DependentResourceStatus};
pub use link::{sync_links, LinkSync};
pub use status::{transition, PassOutcome, Transition, INITIALIZING};
