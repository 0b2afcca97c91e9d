use hubsync_core::SyncError;
use k8s_openapi::api::apps::v1::DeploymentStatus;
use kube::core::DynamicObject;
use serde::Deserialize;
use serde_json::Value as Json;

/// The part of a Deployment the view mirrors back that readiness needs.
#[derive(Debug, Default, Deserialize)]
struct DeploymentResult {
    #[serde(default)]
    status: Option<DeploymentStatus>,
}

fn shape(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Whether the deployment mirrored in `status.result` has all replicas ready.
///
/// A view that is absent or not yet populated is not ready, which is not an error.
/// Missing replica counters count as zero.
pub fn is_ready(view: Option<&DynamicObject>) -> Result<bool, SyncError> {
    let Some(view) = view else { return Ok(false) };
    let status = match view.data.get("status") {
        None | Some(Json::Null) => return Ok(false),
        Some(Json::Object(m)) => m,
        Some(other) => return Err(SyncError::decode("status", format!("expected object, got {}", shape(other)))),
    };
    let result = match status.get("result") {
        None | Some(Json::Null) => return Ok(false),
        Some(r) => r,
    };
    let deploy: DeploymentResult = serde_json::from_value(result.clone()).map_err(|e| SyncError::decode("status.result", e))?;
    let st = deploy.status.unwrap_or_default();
    Ok(st.ready_replicas.unwrap_or(0) == st.replicas.unwrap_or(0))
}
