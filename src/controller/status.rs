//! Component phase state machine
//!
//! [`transition`] is the only place a Component's phase is decided. It takes
//! everything a pass observed and returns the status to persist, whether to
//! requeue, and whether the status needs writing at all.

use super::engine::DependentResourceStatus;
use super::link::LinkSync;
use crate::crd::{ComponentPhase, ComponentStatus, DeploymentMode};
use crate::Error;

/// Message reported while freshly applied defaults settle
pub const INITIALIZING: &str = "Initializing";

/// Everything one reconcile pass observed
pub struct PassOutcome<'a> {
    /// Resolved deployment mode
    pub mode: DeploymentMode,
    /// Spec validation failure, if any
    pub validation: Option<&'a Error>,
    /// Per-dependent results, empty when validation failed
    pub dependents: &'a [DependentResourceStatus],
    /// Link synchronization result
    pub links: &'a LinkSync,
    /// Whether defaults were applied to the spec during this pass
    pub defaults_applied: bool,
}

/// Result of the state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Status to persist
    pub status: ComponentStatus,
    /// Whether the component should be reconciled again soon
    pub requeue: bool,
    /// Whether `status` differs from what is persisted
    pub commit: bool,
}

/// Compute the next status from `working` (the persisted status with this
/// pass's link and pod updates applied).
///
/// The first matching rule wins:
/// 1. validation or dependent failure: `Failed`, requeue only if every
///    failure is transient
/// 2. a link is waiting or errored: `Linking`, requeue
/// 3. defaults were just applied: entry phase, requeue
/// 4. otherwise `Ready`, no requeue
pub fn transition(
    persisted: Option<&ComponentStatus>,
    mut working: ComponentStatus,
    outcome: &PassOutcome<'_>,
) -> Transition {
    let failures: Vec<&DependentResourceStatus> =
        outcome.dependents.iter().filter(|d| !d.success).collect();

    let (phase, message, requeue) = if let Some(e) = outcome.validation {
        (ComponentPhase::Failed, e.to_string(), false)
    } else if !failures.is_empty() {
        let message = failures
            .iter()
            .map(|f| format!("{}: {}", f.kind, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        let requeue = failures.iter().all(|f| f.retryable);
        (ComponentPhase::Failed, message, requeue)
    } else if outcome.links.is_linking() {
        (ComponentPhase::Linking, outcome.links.message(), true)
    } else if outcome.defaults_applied {
        (
            ComponentPhase::initial(outcome.mode),
            INITIALIZING.to_string(),
            true,
        )
    } else {
        (ComponentPhase::Ready, ready_message(outcome.dependents), false)
    };

    working.phase = phase;
    working.message = Some(message);
    let commit = persisted != Some(&working);

    Transition {
        status: working,
        requeue,
        commit,
    }
}

/// Summary of the dependents backing a ready component; stable across passes
fn ready_message(dependents: &[DependentResourceStatus]) -> String {
    let present: Vec<String> = dependents
        .iter()
        .filter(|d| d.is_present())
        .map(|d| d.kind.to_string())
        .collect();
    if present.is_empty() {
        return "Ready".to_string();
    }
    format!("Ready: {}", present.join(", "))
}
