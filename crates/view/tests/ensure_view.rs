#![forbid(unsafe_code)]

use hubsync_core::{wire, Gvr, RemoteError, SyncError};
use hubsync_kubehub::{api_resource, CallCounts, MemoryRemote, RemoteClient};
use hubsync_view::{channel_ready, desired_view, ensure_view, ViewSpec};
use kube::core::DynamicObject;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const CLUSTER: &str = "cluster1";

fn gvr() -> Gvr { Gvr::managed_cluster_view() }

fn drifted_view() -> DynamicObject {
    DynamicObject::new(wire::CHANNEL_VIEW_NAME, &api_resource(&gvr()))
        .within(CLUSTER)
        .data(json!({
            "spec": { "scope": { "name": "something-else", "namespace": "open-cluster-management", "resource": "deployments" } }
        }))
}

#[tokio::test]
async fn not_found_creates_exactly_once() {
    let remote = MemoryRemote::new();
    let cancel = CancellationToken::new();

    let view = ensure_view(&remote, &cancel, CLUSTER).await.expect("ensure");
    assert_eq!(remote.calls(), CallCounts { get: 1, create: 1, update: 0 });
    assert_eq!(view.data["spec"], ViewSpec::channel().to_json().unwrap());
    assert_eq!(view.metadata.namespace.as_deref(), Some(CLUSTER));
    assert!(view.metadata.resource_version.is_some());
}

#[tokio::test]
async fn second_call_is_a_no_op() {
    let remote = MemoryRemote::new();
    let cancel = CancellationToken::new();

    ensure_view(&remote, &cancel, CLUSTER).await.unwrap();
    let before = remote.calls();
    let again = ensure_view(&remote, &cancel, CLUSTER).await.unwrap();
    let after = remote.calls();

    assert_eq!(after.update, before.update);
    assert_eq!(after.create, before.create);
    assert_eq!(after.get, before.get + 1);
    assert_eq!(again.data["spec"], ViewSpec::channel().to_json().unwrap());
}

#[tokio::test]
async fn key_order_in_live_spec_is_not_drift() {
    let remote = MemoryRemote::new();
    let reordered: serde_json::Value = serde_json::from_str(
        r#"{"scope":{"resource":"deployments","namespace":"open-cluster-management","name":"multicluster-operators-channel"}}"#,
    )
    .unwrap();
    let obj = DynamicObject::new(wire::CHANNEL_VIEW_NAME, &api_resource(&gvr())).data(json!({ "spec": reordered }));
    remote.insert(&gvr(), CLUSTER, obj);

    ensure_view(&remote, &CancellationToken::new(), CLUSTER).await.unwrap();
    assert_eq!(remote.calls().update, 0);
}

#[tokio::test]
async fn drift_is_repaired_on_the_fetched_object() {
    let remote = MemoryRemote::new();
    let mut obj = drifted_view();
    obj.metadata.labels = Some([("owner".to_string(), "hub".to_string())].into_iter().collect());
    remote.insert(&gvr(), CLUSTER, obj);
    let live_rv = remote.object(&gvr(), CLUSTER, wire::CHANNEL_VIEW_NAME).unwrap().metadata.resource_version;

    let updated = ensure_view(&remote, &CancellationToken::new(), CLUSTER).await.expect("update");

    assert_eq!(remote.calls(), CallCounts { get: 1, create: 0, update: 1 });
    assert_eq!(updated.data["spec"], ViewSpec::channel().to_json().unwrap());
    // labels set by someone else survive, and the write moved the resourceVersion on
    assert_eq!(updated.metadata.labels.as_ref().and_then(|l| l.get("owner")).map(String::as_str), Some("hub"));
    assert_ne!(updated.metadata.resource_version, live_rv);
}

#[tokio::test]
async fn missing_spec_is_drift() {
    let remote = MemoryRemote::new();
    let obj = DynamicObject::new(wire::CHANNEL_VIEW_NAME, &api_resource(&gvr())).data(json!({}));
    remote.insert(&gvr(), CLUSTER, obj);

    let updated = ensure_view(&remote, &CancellationToken::new(), CLUSTER).await.unwrap();
    assert_eq!(remote.calls().update, 1);
    assert_eq!(updated.data["spec"], ViewSpec::channel().to_json().unwrap());
}

/// Wraps a `MemoryRemote` and lets another writer sneak in between get and update.
struct RacingRemote {
    inner: MemoryRemote,
}

#[async_trait::async_trait]
impl RemoteClient for RacingRemote {
    async fn get(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<DynamicObject, RemoteError> {
        let obj = self.inner.get(gvr, namespace, name).await?;
        self.inner.set_status(gvr, namespace, name, json!({ "conditions": [] }));
        Ok(obj)
    }

    async fn create(&self, gvr: &Gvr, namespace: &str, obj: &DynamicObject) -> Result<DynamicObject, RemoteError> {
        self.inner.create(gvr, namespace, obj).await
    }

    async fn update(&self, gvr: &Gvr, namespace: &str, obj: &DynamicObject) -> Result<DynamicObject, RemoteError> {
        self.inner.update(gvr, namespace, obj).await
    }
}

#[tokio::test]
async fn concurrent_write_surfaces_conflict() {
    let remote = RacingRemote { inner: MemoryRemote::new() };
    remote.inner.insert(&gvr(), CLUSTER, drifted_view());

    let err = ensure_view(&remote, &CancellationToken::new(), CLUSTER).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteError::Conflict(_))), "err={}", err);
    assert!(err.is_retryable());
    // nothing was overwritten
    let live = remote.inner.object(&gvr(), CLUSTER, wire::CHANNEL_VIEW_NAME).unwrap();
    assert_eq!(live.data["spec"]["scope"]["name"], "something-else");
}

#[tokio::test]
async fn transport_errors_propagate_without_create() {
    let remote = MemoryRemote::new();
    remote.set_unavailable(true);

    let err = ensure_view(&remote, &CancellationToken::new(), CLUSTER).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteError::Transport(_))), "err={}", err);
    assert_eq!(remote.calls(), CallCounts { get: 1, create: 0, update: 0 });
}

#[tokio::test]
async fn cancelled_before_any_call() {
    let remote = MemoryRemote::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ensure_view(&remote, &cancel, CLUSTER).await.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(remote.calls(), CallCounts::default());
}

#[tokio::test]
async fn readiness_follows_view_status() {
    let remote = MemoryRemote::new();
    let cancel = CancellationToken::new();

    assert!(!channel_ready(&remote, &cancel, CLUSTER).await.unwrap());

    ensure_view(&remote, &cancel, CLUSTER).await.unwrap();
    assert!(!channel_ready(&remote, &cancel, CLUSTER).await.unwrap());

    let status = |ready: i32| json!({ "result": { "kind": "Deployment", "status": { "readyReplicas": ready, "replicas": 3 } } });
    remote.set_status(&gvr(), CLUSTER, wire::CHANNEL_VIEW_NAME, status(2));
    assert!(!channel_ready(&remote, &cancel, CLUSTER).await.unwrap());
    remote.set_status(&gvr(), CLUSTER, wire::CHANNEL_VIEW_NAME, status(3));
    assert!(channel_ready(&remote, &cancel, CLUSTER).await.unwrap());

    // status changes alone never trigger a spec update
    ensure_view(&remote, &cancel, CLUSTER).await.unwrap();
    assert_eq!(remote.calls().update, 0);
}

#[test]
fn desired_view_targets_given_namespace() {
    assert_eq!(desired_view("cluster9").unwrap().metadata.namespace.as_deref(), Some("cluster9"));
}
