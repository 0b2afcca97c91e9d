//! hubsync view: keeps the channel ManagedClusterView present and in spec on each
//! managed cluster namespace, and answers whether the viewed deployment is ready.

#![forbid(unsafe_code)]

use std::time::Instant;

use hubsync_core::{wire, Gvr, SyncError};
use hubsync_kubehub::{api_resource, cancellable, RemoteClient};
use kube::core::DynamicObject;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod diff;
mod ready;

pub use diff::{canonical_bytes, spec_differs, spec_drift, SpecDrift};
pub use ready::is_ready;

/// Object the view mirrors back from the managed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewScope {
    pub name: String,
    pub namespace: String,
    pub resource: String,
}

/// Desired `spec` of the channel view. Built from constants only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub scope: ViewScope,
}

impl ViewSpec {
    pub fn channel() -> Self {
        Self {
            scope: ViewScope {
                name: wire::CHANNEL_VIEW_NAME.to_string(),
                namespace: wire::CHANNEL_SCOPE_NAMESPACE.to_string(),
                resource: wire::CHANNEL_SCOPE_RESOURCE.to_string(),
            },
        }
    }

    /// Wire form of the spec, as produced by the `Serialize` derive.
    pub fn to_json(&self) -> Result<Json, SyncError> {
        serde_json::to_value(self).map_err(|e| SyncError::decode("spec", e))
    }
}

/// Full desired view object for a managed cluster namespace.
pub fn desired_view(cluster: &str) -> Result<DynamicObject, SyncError> {
    let spec = ViewSpec::channel().to_json()?;
    Ok(DynamicObject::new(wire::CHANNEL_VIEW_NAME, &api_resource(&Gvr::managed_cluster_view()))
        .within(cluster)
        .data(serde_json::json!({ "spec": spec })))
}

/// Create the channel view in `cluster` if missing, or bring its spec back in line.
///
/// Drift is repaired on the fetched object so its `resourceVersion` travels with
/// the update; a concurrent writer makes the update fail with a conflict instead
/// of being overwritten. Errors are returned as-is for the caller to requeue.
pub async fn ensure_view<C>(client: &C, cancel: &CancellationToken, cluster: &str) -> Result<DynamicObject, SyncError>
where
    C: RemoteClient + ?Sized,
{
    let t0 = Instant::now();
    counter!("view_reconcile_total", 1u64);
    let gvr = Gvr::managed_cluster_view();
    let desired = desired_view(cluster)?;
    let desired_spec = ViewSpec::channel().to_json()?;

    let existing = match cancellable(cancel, client.get(&gvr, cluster, wire::CHANNEL_VIEW_NAME)).await {
        Ok(obj) => obj,
        Err(e) if e.is_not_found() => {
            info!(ns = %cluster, name = wire::CHANNEL_VIEW_NAME, "creating channel managedclusterview");
            let created = cancellable(cancel, client.create(&gvr, cluster, &desired)).await?;
            counter!("view_created_total", 1u64);
            histogram!("reconcile_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
            return Ok(created);
        }
        Err(e) => return Err(e),
    };

    if !spec_differs(existing.data.get("spec"), &desired_spec)? {
        debug!(ns = %cluster, rv = ?existing.metadata.resource_version, "channel managedclusterview up to date");
        histogram!("reconcile_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        return Ok(existing);
    }

    let drift = spec_drift(&desired_spec, existing.data.get("spec").unwrap_or(&Json::Null));
    info!(
        ns = %cluster,
        rv = ?existing.metadata.resource_version,
        added = drift.added,
        changed = drift.changed,
        removed = drift.removed,
        "updating drifted channel managedclusterview"
    );
    let mut next = existing;
    next.data
        .as_object_mut()
        .ok_or_else(|| SyncError::decode("managedclusterview", "object body is not a map"))?
        .insert("spec".into(), desired_spec);
    let updated = cancellable(cancel, client.update(&gvr, cluster, &next)).await?;
    counter!("view_updated_total", 1u64);
    histogram!("reconcile_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
    Ok(updated)
}

/// Fetch the channel view, mapping not-found to `None`.
pub async fn fetch_view<C>(client: &C, cancel: &CancellationToken, cluster: &str) -> Result<Option<DynamicObject>, SyncError>
where
    C: RemoteClient + ?Sized,
{
    match cancellable(cancel, client.get(&Gvr::managed_cluster_view(), cluster, wire::CHANNEL_VIEW_NAME)).await {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Fetch the channel view and evaluate readiness of the deployment it mirrors.
pub async fn channel_ready<C>(client: &C, cancel: &CancellationToken, cluster: &str) -> Result<bool, SyncError>
where
    C: RemoteClient + ?Sized,
{
    let view = fetch_view(client, cancel, cluster).await?;
    is_ready(view.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_view_wire_shape() {
        let v = serde_json::to_value(desired_view("cluster1").unwrap()).unwrap();
        assert_eq!(v["apiVersion"], "view.open-cluster-management.io/v1beta1");
        assert_eq!(v["kind"], "ManagedClusterView");
        assert_eq!(v["metadata"]["name"], "multicluster-operators-channel");
        assert_eq!(v["metadata"]["namespace"], "cluster1");
        assert_eq!(v["spec"]["scope"]["name"], "multicluster-operators-channel");
        assert_eq!(v["spec"]["scope"]["namespace"], "open-cluster-management");
        assert_eq!(v["spec"]["scope"]["resource"], "deployments");
    }

    #[test]
    fn desired_spec_is_deterministic() {
        let spec = ViewSpec::channel().to_json().unwrap();
        let a = canonical_bytes(&spec).unwrap();
        let b = canonical_bytes(&desired_view("other").unwrap().data["spec"]).unwrap();
        assert_eq!(a, b);
        assert!(!spec_differs(Some(&spec), &ViewSpec::channel().to_json().unwrap()).unwrap());
    }

    #[test]
    fn typed_spec_matches_json() {
        let decoded: ViewSpec = serde_json::from_value(ViewSpec::channel().to_json().unwrap()).unwrap();
        assert_eq!(decoded, ViewSpec::channel());
    }

    #[test]
    fn json_follows_struct_fields() {
        let mut spec = ViewSpec::channel();
        spec.scope.resource = "statefulsets".into();
        spec.scope.namespace = "elsewhere".into();
        let v = spec.to_json().unwrap();
        assert_eq!(v, serde_json::json!({
            "scope": { "name": "multicluster-operators-channel", "namespace": "elsewhere", "resource": "statefulsets" }
        }));
    }
}
