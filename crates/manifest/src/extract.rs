//! Typed decoding of `PackageManifest.status`.

use hubsync_core::{ManifestFacts, SyncError};
use kube::core::DynamicObject;
use serde::Deserialize;
use serde_json::Value as Json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogHeader {
    catalog_source: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatus {
    default_channel: String,
    channels: Vec<ChannelEntry>,
}

#[derive(Debug, Deserialize)]
struct ChannelEntry {
    name: String,
    #[serde(rename = "currentCSV")]
    current_csv: Option<String>,
}

/// What a PackageManifest says once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Facts(ManifestFacts),
    /// Served by a catalog other than the accepted one.
    OtherCatalog(String),
}

/// Decode `status` and pick the current CSV of the default channel.
///
/// The catalog source is checked before anything else is decoded, so manifests
/// from other catalogs are skipped regardless of the rest of their status.
pub fn extract_facts(obj: &DynamicObject, accepted_catalog_source: &str) -> Result<Extraction, SyncError> {
    let status = match obj.data.get("status") {
        Some(s @ Json::Object(_)) => s,
        Some(Json::Null) | None => return Err(SyncError::decode("status", "missing")),
        Some(_) => return Err(SyncError::decode("status", "expected object")),
    };

    let header = CatalogHeader::deserialize(status).map_err(|e| SyncError::decode("status", e))?;
    if header.catalog_source != accepted_catalog_source {
        return Ok(Extraction::OtherCatalog(header.catalog_source));
    }

    let channels = ChannelStatus::deserialize(status).map_err(|e| SyncError::decode("status", e))?;
    let mut current_csv = String::new();
    // last entry with a matching name wins
    for ch in channels.channels.iter().filter(|c| c.name == channels.default_channel) {
        current_csv = ch
            .current_csv
            .clone()
            .ok_or_else(|| SyncError::decode("status.channels[].currentCSV", format!("missing for channel {}", ch.name)))?;
    }
    Ok(Extraction::Facts(ManifestFacts { default_channel: channels.default_channel, current_csv }))
}
