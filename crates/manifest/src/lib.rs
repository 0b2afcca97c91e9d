//! hubsync manifest: republishes the default channel and current CSV of the
//! watched PackageManifest into the shared status store.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use hubsync_core::{split_key, wire, Gvr, SyncError, SyncOutcome};
use hubsync_kubehub::{cancellable, RemoteClient};
use hubsync_store::{StatusPublisher, StatusReader};
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod extract;

pub use extract::{extract_facts, Extraction};

/// Extractor settings, overridable through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Only manifests served by this catalog are republished.
    pub accepted_catalog_source: String,
    /// Name of the PackageManifest the dispatcher enqueues.
    pub watched_package: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            accepted_catalog_source: wire::DEFAULT_CATALOG_SOURCE.to_string(),
            watched_package: wire::DEFAULT_WATCHED_PACKAGE.to_string(),
        }
    }
}

impl ExtractorConfig {
    /// Reads `HUBSYNC_CATALOG_SOURCE` and `HUBSYNC_WATCHED_PACKAGE`; empty values fall back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        Self {
            accepted_catalog_source: var("HUBSYNC_CATALOG_SOURCE").unwrap_or(d.accepted_catalog_source),
            watched_package: var("HUBSYNC_WATCHED_PACKAGE").unwrap_or(d.watched_package),
        }
    }
}

/// Enqueue filter: the key splits cleanly and names the watched package.
pub fn should_enqueue(key: &str, watched_package: &str) -> bool {
    matches!(split_key(key), Ok((_, name)) if name == watched_package)
}

/// Reconciles PackageManifest keys into the status store. Owns the store's only writer.
pub struct ManifestStatusExtractor {
    client: Arc<dyn RemoteClient>,
    publisher: StatusPublisher,
    config: ExtractorConfig,
}

impl ManifestStatusExtractor {
    pub fn new(client: Arc<dyn RemoteClient>, publisher: StatusPublisher, config: ExtractorConfig) -> Self {
        Self { client, publisher, config }
    }

    pub fn reader(&self) -> StatusReader { self.publisher.reader() }

    /// Reconcile one `namespace/name` key.
    ///
    /// Fetch errors (including not-found) and decode errors are returned; a manifest
    /// from another catalog is a successful no-op. On success the store is
    /// overwritten even when the facts did not change.
    pub async fn sync(&self, cancel: &CancellationToken, key: &str) -> Result<SyncOutcome, SyncError> {
        let t0 = Instant::now();
        counter!("manifest_sync_total", 1u64);
        let (namespace, name) = split_key(key)?;
        debug!(ns = %namespace, name = %name, "reconciling packagemanifest");

        let obj = cancellable(cancel, self.client.get(&Gvr::package_manifest(), namespace, name)).await?;
        let outcome = match extract_facts(&obj, &self.config.accepted_catalog_source)? {
            Extraction::OtherCatalog(catalog_source) => {
                debug!(ns = %namespace, name = %name, catalog_source = %catalog_source, "packagemanifest from another catalog; skipping");
                counter!("manifest_filtered_total", 1u64);
                SyncOutcome::Filtered { catalog_source }
            }
            Extraction::Facts(facts) => {
                let epoch = self.publisher.set(facts.clone());
                info!(
                    default_channel = %facts.default_channel,
                    current_csv = %facts.current_csv,
                    epoch,
                    "packagemanifest status published"
                );
                counter!("manifest_published_total", 1u64);
                SyncOutcome::Published(facts)
            }
        };
        histogram!("reconcile_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        Ok(outcome)
    }
}
