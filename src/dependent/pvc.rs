//! Volume claim backing the dev-mode pod's workspace

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::ComponentOwner;
use crate::defaults::{default_storage_name, DEFAULT_STORAGE_CAPACITY, DEFAULT_STORAGE_MODE};
use crate::Error;

const STORAGE: &str = "storage";

pub(super) fn name(owner: &ComponentOwner<'_>) -> String {
    owner
        .spec()
        .storage
        .name
        .clone()
        .unwrap_or_else(|| default_storage_name(owner.name()))
}

pub(super) fn build(owner: &ComponentOwner<'_>) -> Result<Option<PersistentVolumeClaim>, Error> {
    let spec = owner.spec();
    // built images carry their code; only the dev loop needs a workspace volume
    if spec.mode().requires_build() {
        return Ok(None);
    }

    let capacity = spec
        .storage
        .capacity
        .as_deref()
        .unwrap_or(DEFAULT_STORAGE_CAPACITY);
    let mode = spec.storage.mode.as_deref().unwrap_or(DEFAULT_STORAGE_MODE);

    Ok(Some(PersistentVolumeClaim {
        metadata: owner.object_meta(name(owner)),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![mode.to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    STORAGE.to_string(),
                    Quantity(capacity.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }))
}

fn requested_storage(pvc: &PersistentVolumeClaim) -> Option<&Quantity> {
    pvc.spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get(STORAGE)
}

/// Only the requested capacity is reconciled; access modes are immutable once bound.
pub(super) fn update(
    existing: &mut PersistentVolumeClaim,
    desired: &PersistentVolumeClaim,
) -> bool {
    let Some(want) = requested_storage(desired).cloned() else {
        return false;
    };
    if requested_storage(existing) == Some(&want) {
        return false;
    }

    existing
        .spec
        .get_or_insert_with(Default::default)
        .resources
        .get_or_insert_with(Default::default)
        .requests
        .get_or_insert_with(BTreeMap::new)
        .insert(STORAGE.to_string(), want);
    true
}
