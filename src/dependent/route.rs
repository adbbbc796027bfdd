//! OpenShift Route exposing the component's Service
//!
//! Routes have no typed bindings in k8s-openapi, so they are handled as
//! [`DynamicObject`]s with a fixed [`ApiResource`].

use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use serde_json::{json, Value};

use super::{service, ComponentOwner};
use crate::Error;

/// API resource for `route.openshift.io/v1` Routes
pub fn route_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("route.openshift.io", "v1", "Route"))
}

pub(super) fn name(owner: &ComponentOwner<'_>) -> String {
    owner.name().to_string()
}

pub(super) fn build(owner: &ComponentOwner<'_>) -> Result<Option<DynamicObject>, Error> {
    if !(owner.platform().openshift && owner.spec().expose_service) {
        return Ok(None);
    }
    let mut route = DynamicObject::new(&name(owner), &route_resource()).data(json!({
        "spec": {
            "to": { "kind": "Service", "name": service::name(owner) },
            "port": { "targetPort": owner.spec().port },
        }
    }));
    route.metadata = owner.object_meta(name(owner));
    Ok(Some(route))
}

const MANAGED_PATHS: [&str; 2] = ["/spec/to", "/spec/port"];

/// Reconciles the backend and target port; the host assigned by the router is kept.
pub(super) fn update(existing: &mut DynamicObject, desired: &DynamicObject) -> bool {
    sync_paths(&mut existing.data, &desired.data, &MANAGED_PATHS)
}

/// Copy each of `paths` from `desired` into `existing` where they differ
pub(super) fn sync_paths(existing: &mut Value, desired: &Value, paths: &[&str]) -> bool {
    let mut changed = false;
    for path in paths {
        let want = desired.pointer(path).cloned().unwrap_or(Value::Null);
        if existing.pointer(path) == Some(&want) {
            continue;
        }
        set_path(existing, path, want);
        changed = true;
    }
    changed
}

/// Set a `/a/b` path in a JSON object, creating intermediate objects
pub(super) fn set_path(root: &mut Value, path: &str, value: Value) {
    let mut cursor = root;
    let mut segments = path.trim_start_matches('/').split('/').peekable();
    while let Some(segment) = segments.next() {
        if !cursor.is_object() {
            *cursor = json!({});
        }
        let Value::Object(map) = cursor else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        cursor = map
            .entry(segment.to_string())
            .or_insert_with(|| json!({}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependent::test_support::*;
    use crate::dependent::TargetPlatform;

    fn build_for(openshift: bool, expose: bool, port: i32) -> Option<DynamicObject> {
        let mut raw = dev_spec();
        raw.expose_service = expose;
        raw.port = port;
        let c = component("fruit", raw);
        let spec = resolved(&c.spec, "fruit");
        let platform = TargetPlatform {
            openshift,
            ..Default::default()
        };
        let owner = ComponentOwner::new(&c, &spec, &platform);
        build(&owner).unwrap()
    }

    #[test]
    fn route_only_for_exposed_components_on_openshift() {
        assert!(build_for(true, true, 8080).is_some());
        assert!(build_for(true, false, 8080).is_none());
        assert!(build_for(false, true, 8080).is_none());
    }

    #[test]
    fn route_points_at_service() {
        let route = build_for(true, true, 8080).unwrap();
        assert_eq!(route.types.as_ref().unwrap().kind, "Route");
        assert_eq!(route.metadata.namespace.as_deref(), Some("demo"));
        assert_eq!(route.data.pointer("/spec/to/name"), Some(&json!("fruit")));
        assert_eq!(
            route.data.pointer("/spec/port/targetPort"),
            Some(&json!(8080))
        );
    }

    /// Story: the router-assigned host survives a port change
    #[test]
    fn story_port_change_keeps_host() {
        let mut existing = build_for(true, true, 8080).unwrap();
        set_path(&mut existing.data, "/spec/host", json!("fruit-demo.apps.example.com"));
        let desired = build_for(true, true, 9090).unwrap();

        assert!(update(&mut existing, &desired));
        assert_eq!(
            existing.data.pointer("/spec/port/targetPort"),
            Some(&json!(9090))
        );
        assert_eq!(
            existing.data.pointer("/spec/host"),
            Some(&json!("fruit-demo.apps.example.com"))
        );
        assert!(!update(&mut existing, &desired));
    }

    #[test]
    fn set_path_creates_parents() {
        let mut v = Value::Null;
        set_path(&mut v, "/spec/params/url", json!("x"));
        assert_eq!(v, json!({"spec": {"params": {"url": "x"}}}));
    }
}
