//! Ingress exposing the component on plain Kubernetes

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};

use super::{service, ComponentOwner};
use crate::Error;

pub(super) fn name(owner: &ComponentOwner<'_>) -> String {
    owner.name().to_string()
}

pub(super) fn build(owner: &ComponentOwner<'_>) -> Result<Option<Ingress>, Error> {
    if owner.platform().openshift || !owner.spec().expose_service {
        return Ok(None);
    }
    Ok(Some(Ingress {
        metadata: owner.object_meta(name(owner)),
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: service::name(owner),
                                port: Some(ServiceBackendPort {
                                    number: Some(owner.spec().port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }))
}

/// Reconciles the rules; class and TLS set by other controllers are left alone.
pub(super) fn update(existing: &mut Ingress, desired: &Ingress) -> bool {
    let want = desired.spec.as_ref().and_then(|s| s.rules.clone());
    let have = existing.spec.get_or_insert_with(Default::default);
    if have.rules == want {
        return false;
    }
    have.rules = want;
    true
}
