//! Canonical comparison of nested spec documents.

use hubsync_core::SyncError;
use serde::Serialize;
use serde_json::{Map, Value as Json};

/// Rebuild `v` with object keys in sorted order at every level.
fn canonicalize(v: &Json) -> Json {
    match v {
        Json::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            Json::Object(out)
        }
        Json::Array(items) => Json::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Byte form that is identical for structurally equal documents, regardless of key order.
pub fn canonical_bytes(v: &Json) -> Result<Vec<u8>, SyncError> {
    serde_json::to_vec(&canonicalize(v)).map_err(|e| SyncError::decode("spec", e))
}

/// True when the live spec (absent counts as `null`) differs from the desired one.
pub fn spec_differs(existing: Option<&Json>, desired: &Json) -> Result<bool, SyncError> {
    let existing = canonical_bytes(existing.unwrap_or(&Json::Null))?;
    let desired = canonical_bytes(desired)?;
    Ok(existing != desired)
}

/// Field-level drift between a desired and a live spec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpecDrift {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

impl SpecDrift {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.changed == 0 && self.removed == 0
    }

    fn walk(&mut self, desired: &Json, live: &Json) {
        match (desired, live) {
            (Json::Object(want), Json::Object(have)) => {
                for (k, w) in want {
                    match have.get(k) {
                        Some(h) if h == w => {}
                        Some(h) => self.walk(w, h),
                        None => self.added += 1,
                    }
                }
                self.removed += have.keys().filter(|k| !want.contains_key(*k)).count();
            }
            (Json::Array(want), Json::Array(have)) => {
                self.changed += want.iter().zip(have).filter(|(w, h)| w != h).count();
                self.added += want.len().saturating_sub(have.len());
                self.removed += have.len().saturating_sub(want.len());
            }
            (w, h) if w != h => self.changed += 1,
            _ => {}
        }
    }
}

/// Count what an update will add, change and remove relative to `live`.
pub fn spec_drift(desired: &Json, live: &Json) -> SpecDrift {
    let mut drift = SpecDrift::default();
    drift.walk(desired, live);
    drift
}
