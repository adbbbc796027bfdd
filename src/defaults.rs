//! Lazy defaulting of Component specs
//!
//! Some spec fields are left empty by users and filled in by the operator on
//! the first reconcile. Resolution is a pure function: it returns the resolved
//! spec along with the fields it filled in, so the caller can persist just those
//! once and later passes see a stable spec.

use serde::Serialize;

use crate::crd::{ComponentSpec, DeploymentMode, Storage};

/// Storage capacity requested when the spec doesn't say
pub const DEFAULT_STORAGE_CAPACITY: &str = "1Gi";

/// Access mode used when the spec doesn't say (or names an unknown mode)
pub const DEFAULT_STORAGE_MODE: &str = "ReadWriteOnce";

/// Port assumed for built images that don't declare one
pub const DEFAULT_BUILD_PORT: i32 = 8080;

const KNOWN_STORAGE_MODES: [&str; 3] = ["ReadWriteOnce", "ReadWriteMany", "ReadOnlyMany"];

/// Only the spec fields a resolution filled in.
///
/// Serializes to a merge patch of `spec` that leaves every field the user
/// set untouched, even if it changed since the spec was read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecDefaults {
    /// Defaulted deployment mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_mode: Option<DeploymentMode>,
    /// Defaulted port of a build-mode component
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    /// Defaulted storage fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<Storage>,
}

/// Result of resolving defaults on a spec
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    /// Spec with every lazily-defaulted field filled in
    pub spec: ComponentSpec,
    /// What was filled in
    pub defaults: SpecDefaults,
    /// True if at least one default was applied
    pub applied: bool,
}

/// Name of the volume claim used when the spec doesn't name one
pub fn default_storage_name(component: &str) -> String {
    format!("{component}-data")
}

/// Fill in unset spec fields. Resolving an already-resolved spec is a no-op.
pub fn resolve(component: &str, spec: &ComponentSpec) -> Resolved {
    let mut resolved = spec.clone();
    let mut defaults = SpecDefaults::default();

    if resolved.deployment_mode.is_none() {
        let mode = DeploymentMode::default();
        resolved.deployment_mode = Some(mode);
        defaults.deployment_mode = Some(mode);
    }

    if resolved.mode().requires_build() && resolved.port == 0 {
        resolved.port = DEFAULT_BUILD_PORT;
        defaults.port = Some(DEFAULT_BUILD_PORT);
    }

    let mut storage = Storage::default();
    if resolved.storage.name.as_deref().map_or(true, str::is_empty) {
        storage.name = Some(default_storage_name(component));
    }
    if resolved.storage.capacity.as_deref().map_or(true, str::is_empty) {
        storage.capacity = Some(DEFAULT_STORAGE_CAPACITY.to_string());
    }
    let mode_known = resolved
        .storage
        .mode
        .as_deref()
        .is_some_and(|m| KNOWN_STORAGE_MODES.contains(&m));
    if !mode_known {
        storage.mode = Some(DEFAULT_STORAGE_MODE.to_string());
    }
    if storage != Storage::default() {
        let target = &mut resolved.storage;
        target.name = storage.name.clone().or(target.name.take());
        target.capacity = storage.capacity.clone().or(target.capacity.take());
        target.mode = storage.mode.clone().or(target.mode.take());
        defaults.storage = Some(storage);
    }

    let applied = defaults != SpecDefaults::default();
    Resolved {
        spec: resolved,
        defaults,
        applied,
    }
}
