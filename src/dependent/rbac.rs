//! Role and RoleBinding letting the build service account push images
//!
//! Buildah needs the privileged SCC on OpenShift and access to the namespace's
//! ImageStreams. Both objects are named after the component so each one has a
//! single owner and is garbage collected with it.

use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};

use super::{service_account, ComponentOwner};
use crate::Error;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

pub(super) fn role_name(owner: &ComponentOwner<'_>) -> String {
    format!("{}-image-scc-privileged", owner.name())
}

pub(super) fn role_binding_name(owner: &ComponentOwner<'_>) -> String {
    role_name(owner)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn build_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            api_groups: Some(strings(&["image.openshift.io"])),
            resources: Some(strings(&["imagestreams", "imagestreams/layers"])),
            verbs: strings(&["*"]),
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(strings(&["security.openshift.io"])),
            resources: Some(strings(&["securitycontextconstraints"])),
            resource_names: Some(strings(&["privileged"])),
            verbs: strings(&["use"]),
            ..Default::default()
        },
    ]
}

pub(super) fn build_role(owner: &ComponentOwner<'_>) -> Result<Option<Role>, Error> {
    if !owner.spec().mode().requires_build() {
        return Ok(None);
    }
    Ok(Some(Role {
        metadata: owner.object_meta(role_name(owner)),
        rules: Some(build_rules()),
    }))
}

fn build_subject(owner: &ComponentOwner<'_>) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: service_account::name(owner),
        namespace: Some(owner.namespace().to_string()),
        ..Default::default()
    }
}

pub(super) fn build_role_binding(owner: &ComponentOwner<'_>) -> Result<Option<RoleBinding>, Error> {
    if !owner.spec().mode().requires_build() {
        return Ok(None);
    }
    Ok(Some(RoleBinding {
        metadata: owner.object_meta(role_binding_name(owner)),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: role_name(owner),
        },
        subjects: Some(vec![build_subject(owner)]),
    }))
}

pub(super) fn update_role(existing: &mut Role, desired: &Role) -> bool {
    if existing.rules == desired.rules {
        return false;
    }
    existing.rules = desired.rules.clone();
    true
}

/// Adds missing subjects; subjects bound by someone else are kept.
pub(super) fn update_role_binding(existing: &mut RoleBinding, desired: &RoleBinding) -> bool {
    let subjects = existing.subjects.get_or_insert_with(Vec::new);
    let mut changed = false;
    for want in desired.subjects.iter().flatten() {
        let present = subjects
            .iter()
            .any(|s| s.kind == want.kind && s.name == want.name && s.namespace == want.namespace);
        if !present {
            subjects.push(want.clone());
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependent::test_support::*;
    use crate::dependent::TargetPlatform;

    fn with_owner<T>(
        spec: crate::crd::ComponentSpec,
        f: impl FnOnce(&ComponentOwner<'_>) -> T,
    ) -> T {
        let c = component("fruit", spec);
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform {
            openshift: true,
            ..Default::default()
        };
        let owner = ComponentOwner::new(&c, &spec, &platform);
        f(&owner)
    }

    #[test]
    fn dev_components_need_no_rbac() {
        with_owner(dev_spec(), |owner| {
            assert!(build_role(owner).unwrap().is_none());
            assert!(build_role_binding(owner).unwrap().is_none());
        });
    }

    /// Story: the binding grants the component's Role to its build bot
    #[test]
    fn story_binding_grants_role_to_build_bot() {
        let binding = with_owner(build_spec(), |owner| build_role_binding(owner).unwrap().unwrap());
        assert_eq!(binding.role_ref.name, "fruit-image-scc-privileged");
        assert_eq!(binding.role_ref.kind, "Role");
        let subjects = binding.subjects.unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].name, "fruit-build-bot");
        assert_eq!(subjects[0].namespace.as_deref(), Some("demo"));
    }

    #[test]
    fn role_allows_privileged_scc() {
        let role = with_owner(build_spec(), |owner| build_role(owner).unwrap().unwrap());
        let rules = role.rules.unwrap();
        assert!(rules.iter().any(|r| {
            r.resource_names.as_deref() == Some(&["privileged".to_string()][..])
                && r.verbs == vec!["use".to_string()]
        }));
    }

    #[test]
    fn edited_rules_are_restored() {
        let desired = with_owner(build_spec(), |owner| build_role(owner).unwrap().unwrap());
        let mut existing = desired.clone();
        existing.rules = Some(vec![]);
        assert!(update_role(&mut existing, &desired));
        assert_eq!(existing.rules, desired.rules);
        assert!(!update_role(&mut existing, &desired));
    }

    /// Story: extra subjects added by an admin survive, a missing build bot is re-added
    #[test]
    fn story_binding_keeps_foreign_subjects() {
        let desired =
            with_owner(build_spec(), |owner| build_role_binding(owner).unwrap().unwrap());
        let mut existing = desired.clone();
        existing.subjects = Some(vec![Subject {
            kind: "User".to_string(),
            name: "admin".to_string(),
            ..Default::default()
        }]);

        assert!(update_role_binding(&mut existing, &desired));
        let names: Vec<_> = existing
            .subjects
            .as_ref()
            .unwrap()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["admin", "fruit-build-bot"]);
        assert!(!update_role_binding(&mut existing, &desired));
    }
}
