//! Component controller
//!
//! One pass: resolve and persist defaults, validate, converge dependents,
//! advance links, then let the state machine decide the phase. The status is
//! written at most once, at the end, and only when it changed.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::client::{ComponentKubeClient, KubeClientImpl};
use super::engine::{self, DependentResourceStatus};
use super::link::{self, LinkSync};
use super::status::{self, PassOutcome, Transition};
use crate::config::OperatorConfig;
use crate::crd::{Component, ComponentPhase};
use crate::defaults;
use crate::dependent::ComponentOwner;
use crate::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use crate::Error;

/// Finalizer guarding ImageStream cleanup on OpenShift
pub const FINALIZER: &str = "halkyon.io/image-stream";

/// Name reported on Events
pub const CONTROLLER_NAME: &str = "component-operator";

/// Delay before retrying a pass that failed with a transient error
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Shared state for every reconcile
pub struct Context {
    /// Kubernetes client (trait object for testability)
    pub kube: Arc<dyn ComponentKubeClient>,
    /// Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Operator configuration
    pub config: OperatorConfig,
}

impl Context {
    /// Create a context talking to the cluster through `client`
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            kube: Arc::new(KubeClientImpl::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            config,
        }
    }

    /// Context around a mock client with events dropped
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn ComponentKubeClient>, config: OperatorConfig) -> Self {
        Self {
            kube,
            events: Arc::new(crate::events::NoopEventPublisher),
            config,
        }
    }
}

fn has_finalizer(component: &Component) -> bool {
    component.finalizers().iter().any(|f| f == FINALIZER)
}

/// Reconcile a Component
#[instrument(skip(component, ctx), fields(component = %component.name_any()))]
pub async fn reconcile(component: Arc<Component>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = component.name_any();
    let namespace = component.namespace().ok_or_else(|| {
        Error::internal("reconcile", format!("component '{name}' has no namespace"))
    })?;

    if component.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&component, &name, &namespace, &ctx).await;
    }

    if ctx.config.openshift && !has_finalizer(&component) {
        debug!("adding finalizer");
        ctx.kube.add_finalizer(&name, &namespace, FINALIZER).await?;
    }

    let resolved = defaults::resolve(&name, &component.spec);
    if resolved.applied {
        info!("persisting defaulted spec");
        ctx.kube
            .patch_component_spec(&name, &namespace, &resolved.defaults)
            .await?;
    }
    let spec = resolved.spec;

    let persisted = component.status.as_ref();
    let mut working = persisted.cloned().unwrap_or_default();

    let validation = spec.validate(&name).err();
    let mut dependents: Vec<DependentResourceStatus> = Vec::new();
    let mut links = LinkSync::default();

    if let Some(e) = &validation {
        warn!(error = %e, "component validation failed");
    } else {
        let platform = ctx.config.platform();
        let owner = ComponentOwner::new(&component, &spec, &platform);
        dependents = engine::reconcile_dependents(&owner, ctx.kube.as_ref()).await;

        let pod_name = match ctx.kube.get_running_pod_name(&name, &namespace).await {
            Ok(pod) => pod,
            Err(e) => {
                warn!(error = %e, "couldn't look up component pod");
                None
            }
        };
        links = link::sync_links(
            &name,
            &namespace,
            &mut working,
            pod_name.as_deref(),
            ctx.kube.as_ref(),
        )
        .await;
        if let Some(pod) = pod_name {
            working.pod_name = Some(pod);
        }
    }

    let outcome = PassOutcome {
        mode: spec.mode(),
        validation: validation.as_ref(),
        dependents: &dependents,
        links: &links,
        defaults_applied: resolved.applied,
    };
    let transition = status::transition(persisted, working, &outcome);

    if transition.commit {
        info!(
            phase = %transition.status.phase,
            message = transition.status.message.as_deref().unwrap_or_default(),
            "updating component status"
        );
        ctx.kube
            .patch_component_status(&name, &namespace, &transition.status)
            .await?;
        publish_transition(&component, &transition, validation.is_some(), &ctx).await;
    }
    for completed in &links.completed {
        publish(
            &component,
            &ctx,
            EventType::Normal,
            reasons::LINK_COMPLETED,
            actions::LINK,
            format!("link '{completed}' applied"),
        )
        .await;
    }

    Ok(if transition.requeue {
        Action::requeue(ctx.config.requeue_after())
    } else {
        Action::await_change()
    })
}

async fn publish_transition(
    component: &Component,
    transition: &Transition,
    invalid: bool,
    ctx: &Context,
) {
    let note = transition.status.message.clone().unwrap_or_default();
    let (type_, reason) = match transition.status.phase {
        ComponentPhase::Failed if invalid => (EventType::Warning, reasons::VALIDATION_FAILED),
        ComponentPhase::Failed => (EventType::Warning, reasons::DEPENDENT_FAILED),
        ComponentPhase::Ready => (EventType::Normal, reasons::COMPONENT_READY),
        _ => return,
    };
    publish(component, ctx, type_, reason, actions::RECONCILE, note).await;
}

async fn publish(
    component: &Component,
    ctx: &Context,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&component.object_ref(&()), type_, reason, action, Some(note))
        .await;
}

/// Clean up what garbage collection can't, then release the finalizer.
///
/// Cleanup failures are reported but never keep the finalizer in place.
async fn handle_deletion(
    component: &Component,
    name: &str,
    namespace: &str,
    ctx: &Context,
) -> Result<Action, Error> {
    if !has_finalizer(component) {
        debug!("component deleted, nothing to clean up");
        return Ok(Action::await_change());
    }

    info!("cleaning up deleted component");
    if let Err(e) = engine::cleanup_unowned(name, namespace, ctx.kube.as_ref()).await {
        warn!(error = %e, "image stream cleanup failed, releasing finalizer anyway");
        publish(
            component,
            ctx,
            EventType::Warning,
            reasons::CLEANUP_FAILED,
            actions::DELETE,
            format!("couldn't delete image stream '{name}': {e}"),
        )
        .await;
    }

    ctx.kube.remove_finalizer(name, namespace, FINALIZER).await?;
    Ok(Action::await_change())
}

/// Decide what to do after a failed pass
pub fn error_policy(component: Arc<Component>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_retryable() {
        warn!(
            component = %component.name_any(),
            error = %error,
            "reconcile failed, retrying"
        );
        Action::requeue(ERROR_REQUEUE)
    } else {
        error!(
            component = %component.name_any(),
            error = %error,
            "reconcile failed, waiting for a spec change"
        );
        Action::await_change()
    }
}
