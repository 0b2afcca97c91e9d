//! In-memory `RemoteClient` standing in for the API server in tests.
//!
//! Emulates the parts of the API server reconciliation relies on: not-found
//! errors, `resourceVersion` bumps and stale-write conflicts, and a status
//! subresource that plain writes cannot touch.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use hubsync_core::{Gvr, RemoteError};
use kube::core::DynamicObject;

use crate::RemoteClient;

type ObjKey = (String, String, String);

/// Number of calls observed per verb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub create: usize,
    pub update: usize,
}

#[derive(Default)]
pub struct MemoryRemote {
    objects: Mutex<BTreeMap<ObjKey, DynamicObject>>,
    gets: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    next_rv: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self { Self::default() }

    fn key(gvr: &Gvr, namespace: &str, name: &str) -> ObjKey {
        (gvr.key(), namespace.to_string(), name.to_string())
    }

    fn bump_rv(&self) -> String {
        (self.next_rv.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<ObjKey, DynamicObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), RemoteError> {
        if self.unavailable.load(Ordering::SeqCst) {
            let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
            return Err(RemoteError::Transport(Box::new(io)));
        }
        Ok(())
    }

    /// Seed an object as if another actor had written it. Assigns a fresh resourceVersion.
    pub fn insert(&self, gvr: &Gvr, namespace: &str, mut obj: DynamicObject) {
        let name = obj.metadata.name.clone().unwrap_or_default();
        obj.metadata.namespace = if namespace.is_empty() { None } else { Some(namespace.to_string()) };
        obj.metadata.resource_version = Some(self.bump_rv());
        self.objects().insert(Self::key(gvr, namespace, &name), obj);
    }

    /// Overwrite `status` the way the owning controller would. Returns false if the object is absent.
    pub fn set_status(&self, gvr: &Gvr, namespace: &str, name: &str, status: serde_json::Value) -> bool {
        let rv = self.bump_rv();
        let mut objects = self.objects();
        match objects.get_mut(&Self::key(gvr, namespace, name)) {
            Some(obj) => {
                if let Some(data) = obj.data.as_object_mut() {
                    data.insert("status".into(), status);
                }
                obj.metadata.resource_version = Some(rv);
                true
            }
            None => false,
        }
    }

    pub fn object(&self, gvr: &Gvr, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.objects().get(&Self::key(gvr, namespace, name)).cloned()
    }

    /// Make every subsequent call fail with a transport error.
    pub fn set_unavailable(&self, on: bool) {
        self.unavailable.store(on, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            get: self.gets.load(Ordering::SeqCst),
            create: self.creates.load(Ordering::SeqCst),
            update: self.updates.load(Ordering::SeqCst),
        }
    }
}

fn without_status(mut obj: DynamicObject) -> DynamicObject {
    if let Some(data) = obj.data.as_object_mut() {
        data.remove("status");
    }
    obj
}

#[async_trait::async_trait]
impl RemoteClient for MemoryRemote {
    async fn get(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<DynamicObject, RemoteError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.objects()
            .get(&Self::key(gvr, namespace, name))
            .cloned()
            .ok_or_else(|| RemoteError::not_found(gvr.resource.clone(), namespace, name))
    }

    async fn create(&self, gvr: &Gvr, namespace: &str, obj: &DynamicObject) -> Result<DynamicObject, RemoteError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let name = obj.metadata.name.clone().ok_or_else(|| RemoteError::Invalid("object missing metadata.name".into()))?;
        let key = Self::key(gvr, namespace, &name);
        let rv = self.bump_rv();
        let mut objects = self.objects();
        if objects.contains_key(&key) {
            return Err(RemoteError::Conflict(format!("{} {}/{} already exists", gvr.resource, namespace, name)));
        }
        let mut stored = without_status(obj.clone());
        stored.metadata.resource_version = Some(rv);
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, gvr: &Gvr, namespace: &str, obj: &DynamicObject) -> Result<DynamicObject, RemoteError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let name = obj.metadata.name.clone().ok_or_else(|| RemoteError::Invalid("object missing metadata.name".into()))?;
        let rv = self.bump_rv();
        let mut objects = self.objects();
        let current = objects
            .get(&Self::key(gvr, namespace, &name))
            .ok_or_else(|| RemoteError::not_found(gvr.resource.clone(), namespace, &name))?;
        if let Some(sent) = obj.metadata.resource_version.as_deref() {
            if current.metadata.resource_version.as_deref() != Some(sent) {
                return Err(RemoteError::Conflict(format!(
                    "{} {}/{} has been modified (rv {} -> {:?})",
                    gvr.resource, namespace, name, sent, current.metadata.resource_version
                )));
            }
        }
        let status = current.data.get("status").cloned();
        let mut stored = without_status(obj.clone());
        if let (Some(status), Some(data)) = (status, stored.data.as_object_mut()) {
            data.insert("status".into(), status);
        }
        stored.metadata.resource_version = Some(rv);
        objects.insert(Self::key(gvr, namespace, &name), stored.clone());
        Ok(stored)
    }
}
