//! Ordered list of dependent kinds reconciled for a Component
//!
//! Order is part of the contract: the volume claim comes before the
//! Deployment that mounts it, the Service before the Route/Ingress pointing at
//! it, and the build service account before the TaskRun and RBAC that use it.

use super::DependentKind;

const COMPONENT_DEPENDENTS: [DependentKind; 9] = [
    DependentKind::PersistentVolumeClaim,
    DependentKind::Deployment,
    DependentKind::Service,
    DependentKind::ServiceAccount,
    DependentKind::Route,
    DependentKind::Ingress,
    DependentKind::TaskRun,
    DependentKind::Role,
    DependentKind::RoleBinding,
];

/// Dependent kinds of a Component, in reconcile order
pub fn dependent_kinds() -> &'static [DependentKind] {
    &COMPONENT_DEPENDENTS
}

/// Kinds the controller should watch in addition to Components
pub fn watched_kinds() -> impl Iterator<Item = DependentKind> {
    dependent_kinds()
        .iter()
        .copied()
        .filter(DependentKind::should_watch)
}
