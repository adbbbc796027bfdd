//! Service exposing the component's port inside the cluster

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::ComponentOwner;
use crate::Error;

/// Name of the single port every component service exposes
pub const HTTP_PORT_NAME: &str = "http";

pub(super) fn name(owner: &ComponentOwner<'_>) -> String {
    owner.name().to_string()
}

pub(super) fn build(owner: &ComponentOwner<'_>) -> Result<Option<Service>, Error> {
    let port = owner.spec().port;
    Ok(Some(Service {
        metadata: owner.object_meta(name(owner)),
        spec: Some(ServiceSpec {
            selector: Some(owner.selector_labels()),
            ports: Some(vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }))
}

fn port_triples(svc: &Service) -> Vec<(Option<&str>, i32, Option<&IntOrString>)> {
    svc.spec
        .iter()
        .flat_map(|s| s.ports.iter().flatten())
        .map(|p| (p.name.as_deref(), p.port, p.target_port.as_ref()))
        .collect()
}

/// Reconciles selector and ports; cluster IPs and other allocated fields are untouched.
pub(super) fn update(existing: &mut Service, desired: &Service) -> bool {
    let Some(want) = desired.spec.as_ref() else {
        return false;
    };
    let ports_differ = port_triples(existing) != port_triples(desired);
    let have = existing.spec.get_or_insert_with(Default::default);

    let mut changed = false;
    if have.selector != want.selector {
        have.selector = want.selector.clone();
        changed = true;
    }
    if ports_differ {
        have.ports = want.ports.clone();
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependent::test_support::*;
    use crate::dependent::TargetPlatform;

    fn build_for(port: i32) -> Service {
        let mut raw = dev_spec();
        raw.port = port;
        let c = component("fruit", raw);
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform::default();
        let owner = ComponentOwner::new(&c, &spec, &platform);
        build(&owner).unwrap().unwrap()
    }

    #[test]
    fn service_targets_component_pods() {
        let svc = build_for(8080);
        assert_eq!(svc.metadata.name.as_deref(), Some("fruit"));
        let spec = svc.spec.as_ref().unwrap();
        assert_eq!(
            spec.selector.as_ref().unwrap().get("app").map(String::as_str),
            Some("fruit")
        );
        assert_eq!(
            port_triples(&svc),
            vec![(Some("http"), 8080, Some(&IntOrString::Int(8080)))]
        );
    }

    /// Story: a port change is applied, the allocated cluster IP is kept
    #[test]
    fn story_port_change_keeps_cluster_ip() {
        let mut existing = build_for(8080);
        existing.spec.as_mut().unwrap().cluster_ip = Some("10.0.0.12".to_string());
        let desired = build_for(9090);

        assert!(update(&mut existing, &desired));
        let spec = existing.spec.as_ref().unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.12"));
        assert_eq!(spec.ports.as_ref().unwrap()[0].port, 9090);
        assert!(!update(&mut existing, &desired));
    }
}
