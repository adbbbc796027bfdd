//! Kubernetes Event recording for the component controller.
//!
//! Events are fire-and-forget: a failed publish is logged as a warning and
//! never turns into a reconcile error.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events about a resource
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `resource_ref`.
    ///
    /// * `reason` - machine-readable reason, one of [`reasons`]
    /// * `action` - what the controller was doing, one of [`actions`]
    /// * `note` - optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event; used in tests
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    /// Spec rejected by validation
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    /// At least one dependent could not be reconciled
    pub const DEPENDENT_FAILED: &str = "DependentFailed";
    /// Every dependent is in place
    pub const COMPONENT_READY: &str = "ComponentReady";
    /// A link was applied and the pod restarted
    pub const LINK_COMPLETED: &str = "LinkCompleted";
    /// Best-effort cleanup on deletion failed
    pub const CLEANUP_FAILED: &str = "CleanupFailed";
}

/// Event actions, shown in the ACTION column of `kubectl get events`
pub mod actions {
    /// Standard reconcile pass
    pub const RECONCILE: &str = "Reconcile";
    /// Link synchronization
    pub const LINK: &str = "Link";
    /// Deletion and finalizer handling
    pub const DELETE: &str = "Delete";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::CLEANUP_FAILED,
                actions::DELETE,
                Some("image stream busy".to_string()),
            )
            .await;
    }
}
