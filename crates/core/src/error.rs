use thiserror::Error;

/// Errors reported by a remote object client.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("not_found: {resource} {namespace}/{name}")]
    NotFound { resource: String, namespace: String, name: String },
    /// The write carried a stale resourceVersion.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("transport: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl RemoteError {
    pub fn not_found(resource: impl Into<String>, namespace: &str, name: &str) -> Self {
        Self::NotFound { resource: resource.into(), namespace: namespace.to_string(), name: name.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors surfaced by a single reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("malformed key {key:?}: {reason}")]
    MalformedKey { key: String, reason: String },
    /// A nested payload did not have the expected shape.
    #[error("decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn malformed_key(key: &str, reason: &str) -> Self {
        Self::MalformedKey { key: key.to_string(), reason: reason.to_string() }
    }

    pub fn decode(path: &str, reason: impl std::fmt::Display) -> Self {
        Self::Decode { path: path.to_string(), reason: reason.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_not_found())
    }

    /// Whether requeueing the same key can succeed without the input changing.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MalformedKey { .. } | Self::Decode { .. })
    }
}
