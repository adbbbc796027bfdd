//! Dependent resources owned by a Component
//!
//! Each [`DependentKind`] is one kind of object a Component needs (a volume
//! claim, a Deployment, a Service, ...). The set is closed: dispatch is a
//! `match` over the enum, and every kind lives in its own module exposing the
//! same three functions:
//!
//! - `name(owner)` - deterministic object name derived from the owner
//! - `build(owner)` - desired object, or `None` when the kind doesn't apply
//! - `update(existing, desired)` - mutate `existing` toward `desired`, report a change
//!
//! [`DependentResource`] binds a kind to its [`ComponentOwner`] and is what the
//! reconciliation engine drives.

mod deployment;
mod ingress;
mod pvc;
mod rbac;
pub mod registry;
mod route;
mod service;
mod service_account;
mod task_run;

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};

use crate::crd::{Component, ComponentSpec};
use crate::Error;

pub use route::route_resource;
pub use task_run::task_run_resource;

/// Label carrying the component name; used as the pod selector
pub const APP_LABEL: &str = "app";
/// Recommended name label
pub const NAME_LABEL: &str = "app.kubernetes.io/name";
/// Recommended managed-by label
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Runtime label
pub const RUNTIME_LABEL: &str = "halkyon.io/runtime";
/// Value of [`MANAGED_BY_LABEL`] on everything this operator creates
pub const MANAGED_BY: &str = "component-operator";

/// The cluster flavor dependents are built for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetPlatform {
    /// OpenShift clusters get Routes and ImageStream cleanup instead of Ingresses
    pub openshift: bool,
    /// Registry build-mode images are pushed to and pulled from
    pub image_registry: String,
}

impl Default for TargetPlatform {
    fn default() -> Self {
        Self {
            openshift: false,
            image_registry: crate::DEFAULT_IMAGE_REGISTRY.to_string(),
        }
    }
}

/// Every kind of object a Component can own
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependentKind {
    /// Volume claim mounted by dev-mode pods
    PersistentVolumeClaim,
    /// The workload running the component
    Deployment,
    /// In-cluster network exposure
    Service,
    /// Identity used by build pods
    ServiceAccount,
    /// OpenShift external exposure
    Route,
    /// External exposure on plain Kubernetes
    Ingress,
    /// Tekton build of the component image
    TaskRun,
    /// Permissions needed by the build
    Role,
    /// Grants [`DependentKind::Role`] to the build service account
    RoleBinding,
}

impl DependentKind {
    /// Whether the controller watches objects of this kind for out-of-band changes
    pub fn should_watch(&self) -> bool {
        matches!(
            self,
            Self::Deployment | Self::PersistentVolumeClaim | Self::TaskRun
        )
    }
}

impl std::fmt::Display for DependentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PersistentVolumeClaim => "PersistentVolumeClaim",
            Self::Deployment => "Deployment",
            Self::Service => "Service",
            Self::ServiceAccount => "ServiceAccount",
            Self::Route => "Route",
            Self::Ingress => "Ingress",
            Self::TaskRun => "TaskRun",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
        };
        f.write_str(s)
    }
}

/// In-memory representation of a dependent object, tagged by kind
#[derive(Clone, Debug)]
pub enum Manifest {
    /// A volume claim
    PersistentVolumeClaim(PersistentVolumeClaim),
    /// A deployment
    Deployment(Deployment),
    /// A service
    Service(Service),
    /// A service account
    ServiceAccount(ServiceAccount),
    /// An OpenShift route (no typed bindings)
    Route(DynamicObject),
    /// An ingress
    Ingress(Ingress),
    /// A Tekton task run (no typed bindings)
    TaskRun(DynamicObject),
    /// A role
    Role(Role),
    /// A role binding
    RoleBinding(RoleBinding),
}

impl Manifest {
    /// Zero-value object of the given kind, used only as a typed fetch target
    pub fn empty(kind: DependentKind) -> Self {
        match kind {
            DependentKind::PersistentVolumeClaim => Self::PersistentVolumeClaim(Default::default()),
            DependentKind::Deployment => Self::Deployment(Default::default()),
            DependentKind::Service => Self::Service(Default::default()),
            DependentKind::ServiceAccount => Self::ServiceAccount(Default::default()),
            DependentKind::Route => Self::Route(DynamicObject::new("", &route_resource())),
            DependentKind::Ingress => Self::Ingress(Default::default()),
            DependentKind::TaskRun => Self::TaskRun(DynamicObject::new("", &task_run_resource())),
            DependentKind::Role => Self::Role(Default::default()),
            DependentKind::RoleBinding => Self::RoleBinding(Default::default()),
        }
    }

    /// Kind of the wrapped object
    pub fn kind(&self) -> DependentKind {
        match self {
            Self::PersistentVolumeClaim(_) => DependentKind::PersistentVolumeClaim,
            Self::Deployment(_) => DependentKind::Deployment,
            Self::Service(_) => DependentKind::Service,
            Self::ServiceAccount(_) => DependentKind::ServiceAccount,
            Self::Route(_) => DependentKind::Route,
            Self::Ingress(_) => DependentKind::Ingress,
            Self::TaskRun(_) => DependentKind::TaskRun,
            Self::Role(_) => DependentKind::Role,
            Self::RoleBinding(_) => DependentKind::RoleBinding,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::PersistentVolumeClaim(o) => &o.metadata,
            Self::Deployment(o) => &o.metadata,
            Self::Service(o) => &o.metadata,
            Self::ServiceAccount(o) => &o.metadata,
            Self::Route(o) => &o.metadata,
            Self::Ingress(o) => &o.metadata,
            Self::TaskRun(o) => &o.metadata,
            Self::Role(o) => &o.metadata,
            Self::RoleBinding(o) => &o.metadata,
        }
    }

    /// Mutable object metadata
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::PersistentVolumeClaim(o) => &mut o.metadata,
            Self::Deployment(o) => &mut o.metadata,
            Self::Service(o) => &mut o.metadata,
            Self::ServiceAccount(o) => &mut o.metadata,
            Self::Route(o) => &mut o.metadata,
            Self::Ingress(o) => &mut o.metadata,
            Self::TaskRun(o) => &mut o.metadata,
            Self::Role(o) => &mut o.metadata,
            Self::RoleBinding(o) => &mut o.metadata,
        }
    }

    /// Object name, empty for placeholders
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }
}

/// Tag a dependent with its owner so garbage collection and `owns` watches work.
///
/// An existing reference to the same owner is replaced rather than duplicated.
pub fn set_owner(manifest: &mut Manifest, owner: OwnerReference) {
    let refs = manifest
        .metadata_mut()
        .owner_references
        .get_or_insert_with(Vec::new);
    refs.retain(|r| r.uid != owner.uid);
    refs.push(owner);
}

/// Behavior wrapper around a Component and its resolved spec
///
/// The dependent list is computed once per instance; build a new owner for
/// each reconcile pass.
pub struct ComponentOwner<'a> {
    component: &'a Component,
    spec: &'a ComponentSpec,
    platform: &'a TargetPlatform,
    name: String,
    namespace: String,
    dependents: Vec<DependentKind>,
}

impl<'a> ComponentOwner<'a> {
    /// Wrap a component. `spec` must be the resolved spec (see [`crate::defaults`]).
    pub fn new(
        component: &'a Component,
        spec: &'a ComponentSpec,
        platform: &'a TargetPlatform,
    ) -> Self {
        Self {
            component,
            spec,
            platform,
            name: component.name_any(),
            namespace: component.namespace().unwrap_or_default(),
            dependents: registry::dependent_kinds().to_vec(),
        }
    }

    /// Component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Component namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolved spec
    pub fn spec(&self) -> &ComponentSpec {
        self.spec
    }

    /// Platform dependents are built for
    pub fn platform(&self) -> &TargetPlatform {
        self.platform
    }

    /// Controller owner reference pointing at the component, if it has a uid
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        self.component.controller_owner_ref(&())
    }

    /// Whether `manifest` carries an owner reference to this component
    pub fn owns(&self, manifest: &Manifest) -> bool {
        let Some(uid) = self.component.metadata.uid.as_deref() else {
            return false;
        };
        manifest
            .metadata()
            .owner_references
            .iter()
            .flatten()
            .any(|r| r.uid == uid)
    }

    /// Labels put on every dependent and pod
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(NAME_LABEL.to_string(), self.name.clone());
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
        if !self.spec.runtime.is_empty() {
            labels.insert(RUNTIME_LABEL.to_string(), self.spec.runtime.clone());
        }
        labels
    }

    /// Labels used to select the component's pods
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(APP_LABEL.to_string(), self.name.clone())])
    }

    /// Metadata for a dependent with the given name
    pub(crate) fn object_meta(&self, name: impl Into<String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }

    /// Dependents to reconcile, in registry order
    pub fn dependents(&self) -> impl Iterator<Item = DependentResource<'_>> {
        self.dependents.iter().map(move |&kind| DependentResource {
            kind,
            owner: self,
        })
    }
}

/// One dependent kind bound to its owner
#[derive(Clone, Copy)]
pub struct DependentResource<'a> {
    kind: DependentKind,
    owner: &'a ComponentOwner<'a>,
}

impl<'a> DependentResource<'a> {
    /// Bind a kind to an owner
    pub fn new(kind: DependentKind, owner: &'a ComponentOwner<'a>) -> Self {
        Self { kind, owner }
    }

    /// Dependent kind
    pub fn kind(&self) -> DependentKind {
        self.kind
    }

    /// Deterministic object name
    pub fn name(&self) -> String {
        let owner = self.owner;
        match self.kind {
            DependentKind::PersistentVolumeClaim => pvc::name(owner),
            DependentKind::Deployment => deployment::name(owner),
            DependentKind::Service => service::name(owner),
            DependentKind::ServiceAccount => service_account::name(owner),
            DependentKind::Route => route::name(owner),
            DependentKind::Ingress => ingress::name(owner),
            DependentKind::TaskRun => task_run::name(owner),
            DependentKind::Role => rbac::role_name(owner),
            DependentKind::RoleBinding => rbac::role_binding_name(owner),
        }
    }

    /// Empty typed object to fetch into; never fails
    pub fn placeholder(&self) -> Manifest {
        Manifest::empty(self.kind)
    }

    /// Desired object computed from the owner's spec, `None` if the kind doesn't apply
    pub fn build(&self) -> Result<Option<Manifest>, Error> {
        let owner = self.owner;
        Ok(match self.kind {
            DependentKind::PersistentVolumeClaim => {
                pvc::build(owner)?.map(Manifest::PersistentVolumeClaim)
            }
            DependentKind::Deployment => deployment::build(owner)?.map(Manifest::Deployment),
            DependentKind::Service => service::build(owner)?.map(Manifest::Service),
            DependentKind::ServiceAccount => {
                service_account::build(owner)?.map(Manifest::ServiceAccount)
            }
            DependentKind::Route => route::build(owner)?.map(Manifest::Route),
            DependentKind::Ingress => ingress::build(owner)?.map(Manifest::Ingress),
            DependentKind::TaskRun => task_run::build(owner)?.map(Manifest::TaskRun),
            DependentKind::Role => rbac::build_role(owner)?.map(Manifest::Role),
            DependentKind::RoleBinding => {
                rbac::build_role_binding(owner)?.map(Manifest::RoleBinding)
            }
        })
    }

    /// Mutate `existing` toward the desired state; returns true if anything changed.
    ///
    /// Only fields this operator manages are compared, so server-side defaults
    /// never register as drift. A kind that no longer applies is left alone
    /// here; removing it is up to the caller.
    pub fn update(&self, existing: &mut Manifest) -> Result<bool, Error> {
        let Some(desired) = self.build()? else {
            return Ok(false);
        };
        self.update_toward(existing, &desired)
    }

    /// Like [`DependentResource::update`] with the desired object already built
    pub fn update_toward(
        &self,
        existing: &mut Manifest,
        desired: &Manifest,
    ) -> Result<bool, Error> {
        let changed = match (existing, desired) {
            (Manifest::PersistentVolumeClaim(have), Manifest::PersistentVolumeClaim(want)) => {
                pvc::update(have, want)
            }
            (Manifest::Deployment(have), Manifest::Deployment(want)) => {
                deployment::update(have, want)
            }
            (Manifest::Service(have), Manifest::Service(want)) => service::update(have, want),
            (Manifest::ServiceAccount(have), Manifest::ServiceAccount(want)) => {
                service_account::update(have, want)
            }
            (Manifest::Route(have), Manifest::Route(want)) => route::update(have, want),
            (Manifest::Ingress(have), Manifest::Ingress(want)) => ingress::update(have, want),
            (Manifest::TaskRun(have), Manifest::TaskRun(want)) => task_run::update(have, want),
            (Manifest::Role(have), Manifest::Role(want)) => rbac::update_role(have, want),
            (Manifest::RoleBinding(have), Manifest::RoleBinding(want)) => {
                rbac::update_role_binding(have, want)
            }
            (have, _) => {
                return Err(Error::build(
                    self.kind.to_string(),
                    format!("cannot update a {} as a {}", have.kind(), self.kind),
                ))
            }
        };
        Ok(changed)
    }

    /// Names this kind had under a previous shape of the spec.
    ///
    /// Objects found under these names belong to the component but are no
    /// longer wanted, e.g. the dev Deployment after switching to build mode.
    pub fn retired_names(&self) -> Vec<String> {
        match self.kind {
            DependentKind::Deployment => vec![deployment::retired_name(self.owner)],
            _ => Vec::new(),
        }
    }

    /// Whether a changed object must be deleted and created again instead of replaced
    pub fn recreate_on_change(&self) -> bool {
        self.kind == DependentKind::TaskRun
    }

    /// Whether the controller watches this dependent's kind
    pub fn should_watch(&self) -> bool {
        self.kind.should_watch()
    }
}
