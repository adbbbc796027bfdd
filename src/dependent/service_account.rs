//! Identity the build pipeline runs as

use k8s_openapi::api::core::v1::ServiceAccount;

use super::ComponentOwner;
use crate::Error;

pub(super) fn name(owner: &ComponentOwner<'_>) -> String {
    format!("{}-build-bot", owner.name())
}

pub(super) fn build(owner: &ComponentOwner<'_>) -> Result<Option<ServiceAccount>, Error> {
    Ok(Some(ServiceAccount {
        metadata: owner.object_meta(name(owner)),
        ..Default::default()
    }))
}

/// Service accounts carry no managed fields; token secrets are filled in by the cluster.
pub(super) fn update(_existing: &mut ServiceAccount, _desired: &ServiceAccount) -> bool {
    false
}
