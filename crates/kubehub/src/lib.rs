//! hubsync kubehub: remote object client abstraction over kube-rs.

#![forbid(unsafe_code)]

use std::future::Future;

use anyhow::{Context, Result};
use kube::{
    api::{Api, PostParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use hubsync_core::{Gvr, RemoteError, SyncError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

mod memory;

pub use memory::{CallCounts, MemoryRemote};

/// Minimal get/create/update surface both controllers reconcile through.
///
/// An empty `namespace` addresses the cluster-scoped path.
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    async fn get(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<DynamicObject, RemoteError>;
    async fn create(&self, gvr: &Gvr, namespace: &str, obj: &DynamicObject) -> Result<DynamicObject, RemoteError>;
    /// Replace the object. The server rejects the write with `Conflict` when
    /// `metadata.resourceVersion` is stale.
    async fn update(&self, gvr: &Gvr, namespace: &str, obj: &DynamicObject) -> Result<DynamicObject, RemoteError>;
}

/// Build the kube `ApiResource` for a fixed identity (no discovery round-trip).
pub fn api_resource(gvr: &Gvr) -> ApiResource {
    let gvk = GroupVersionKind::gvk(&gvr.group, &gvr.version, &gvr.kind);
    ApiResource::from_gvk_with_plural(&gvk, &gvr.resource)
}

/// Await a remote call unless `cancel` fires first. The call is dropped on cancellation.
///
/// Not-found is an expected answer (it drives the create path) and is not counted
/// as a remote error.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        res = fut => res.map_err(|e| {
            if counts_as_remote_error(&e) {
                metrics::counter!("remote_errors_total", 1u64);
            }
            SyncError::from(e)
        }),
    }
}

fn counts_as_remote_error(e: &RemoteError) -> bool {
    !e.is_not_found()
}

/// Create a kube client from the ambient kubeconfig / in-cluster environment.
pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client from default config")
}

/// `RemoteClient` backed by the kube-rs dynamic API.
#[derive(Clone)]
pub struct KubeRemote {
    client: Client,
}

impl KubeRemote {
    pub fn new(client: Client) -> Self { Self { client } }

    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(get_kube_client().await?))
    }

    fn api(&self, gvr: &Gvr, namespace: &str) -> Api<DynamicObject> {
        let ar = api_resource(gvr);
        if namespace.is_empty() {
            Api::all_with(self.client.clone(), &ar)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        }
    }
}

fn map_kube_err(e: kube::Error, gvr: &Gvr, namespace: &str, name: &str) -> RemoteError {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => RemoteError::not_found(gvr.resource.clone(), namespace, name),
        kube::Error::Api(ae) if ae.code == 409 => RemoteError::Conflict(ae.message),
        other => RemoteError::Transport(Box::new(other)),
    }
}

fn object_name(obj: &DynamicObject) -> Result<&str, RemoteError> {
    obj.metadata.name.as_deref().ok_or_else(|| RemoteError::Invalid("object missing metadata.name".into()))
}

#[async_trait::async_trait]
impl RemoteClient for KubeRemote {
    async fn get(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<DynamicObject, RemoteError> {
        debug!(gvr = %gvr, ns = %namespace, name = %name, "remote get");
        self.api(gvr, namespace).get(name).await.map_err(|e| map_kube_err(e, gvr, namespace, name))
    }

    async fn create(&self, gvr: &Gvr, namespace: &str, obj: &DynamicObject) -> Result<DynamicObject, RemoteError> {
        let name = object_name(obj)?;
        debug!(gvr = %gvr, ns = %namespace, name = %name, "remote create");
        self.api(gvr, namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_err(e, gvr, namespace, name))
    }

    async fn update(&self, gvr: &Gvr, namespace: &str, obj: &DynamicObject) -> Result<DynamicObject, RemoteError> {
        let name = object_name(obj)?;
        debug!(gvr = %gvr, ns = %namespace, name = %name, rv = ?obj.metadata.resource_version, "remote update");
        self.api(gvr, namespace)
            .replace(name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_err(e, gvr, namespace, name))
    }
}
