//! hubsync core types: wire identities, extracted facts, keys and errors.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

mod error;

pub use error::{RemoteError, SyncError};

/// Group/version/resource triple, plus the kind the API server expects on written objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Gvr {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name used in URL paths.
    pub resource: String,
}

impl Gvr {
    pub fn new(group: &str, version: &str, kind: &str, resource: &str) -> Self {
        Self { group: group.to_string(), version: version.to_string(), kind: kind.to_string(), resource: resource.to_string() }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }

    /// `group/version/resource` key, used for logging and in-memory indexing.
    pub fn key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.resource)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.resource)
        }
    }

    /// `managedclusterviews.view.open-cluster-management.io/v1beta1`
    pub fn managed_cluster_view() -> Self {
        Self::new(wire::VIEW_GROUP, wire::VIEW_VERSION, wire::VIEW_KIND, wire::VIEW_RESOURCE)
    }

    /// `packagemanifests.packages.operators.coreos.com/v1`
    pub fn package_manifest() -> Self {
        Self::new(wire::MANIFEST_GROUP, wire::MANIFEST_VERSION, wire::MANIFEST_KIND, wire::MANIFEST_RESOURCE)
    }
}

impl std::fmt::Display for Gvr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Resource identities shared with the hub. These must match the installed CRDs exactly.
pub mod wire {
    pub const VIEW_GROUP: &str = "view.open-cluster-management.io";
    pub const VIEW_VERSION: &str = "v1beta1";
    pub const VIEW_KIND: &str = "ManagedClusterView";
    pub const VIEW_RESOURCE: &str = "managedclusterviews";

    /// Name of the view object and of the deployment it looks at.
    pub const CHANNEL_VIEW_NAME: &str = "multicluster-operators-channel";
    /// Namespace on the managed cluster where the channel deployment runs.
    pub const CHANNEL_SCOPE_NAMESPACE: &str = "open-cluster-management";
    pub const CHANNEL_SCOPE_RESOURCE: &str = "deployments";

    pub const MANIFEST_GROUP: &str = "packages.operators.coreos.com";
    pub const MANIFEST_VERSION: &str = "v1";
    pub const MANIFEST_KIND: &str = "PackageManifest";
    pub const MANIFEST_RESOURCE: &str = "packagemanifests";

    pub const DEFAULT_CATALOG_SOURCE: &str = "redhat-operators";
    pub const DEFAULT_WATCHED_PACKAGE: &str = "advanced-cluster-management";
}

/// Facts extracted from a PackageManifest status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFacts {
    pub default_channel: String,
    /// Empty when the default channel has no entry in `status.channels`.
    #[serde(rename = "currentCSV")]
    pub current_csv: String,
}

/// Outcome of a successful manifest sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Published(ManifestFacts),
    /// Catalog source did not match; nothing was written.
    Filtered { catalog_source: String },
}

/// Split a `namespace/name` queue key. A bare `name` yields an empty namespace.
pub fn split_key(key: &str) -> Result<(&str, &str), SyncError> {
    let (namespace, name) = match key.split_once('/') {
        None => ("", key),
        Some((ns, rest)) if !rest.contains('/') => (ns, rest),
        Some(_) => return Err(SyncError::malformed_key(key, "unexpected key format, expect namespace/name")),
    };
    if name.is_empty() {
        return Err(SyncError::malformed_key(key, "empty name"));
    }
    Ok((namespace, name))
}
