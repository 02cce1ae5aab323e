use thiserror::Error;

use crate::PlaceId;

/// Failure talking to the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),
}

/// Fatal at start-up: the process cannot serve or index with this configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid store url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("store unreachable: {0}")]
    Unreachable(#[source] StoreError),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("mapping must declare {field} as geo_point")]
    MissingGeoField { field: String },
}

/// Which step of the delete/create/map sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStep {
    Exists,
    Delete,
    Create,
    Mapping,
}

impl std::fmt::Display for ResetStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResetStep::Exists => "existence check",
            ResetStep::Delete => "delete",
            ResetStep::Create => "create",
            ResetStep::Mapping => "put mapping",
        };
        f.write_str(s)
    }
}

/// The index is left in an indeterminate state; the run must be redone from scratch.
#[derive(Debug, Error)]
#[error("index {index}: {step} failed: {source}")]
pub struct ResetError {
    pub index: String,
    pub step: ResetStep,
    #[source]
    pub source: StoreError,
}

/// Outcome of a single document in a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {reason}")]
pub struct WriteError {
    pub kind: String,
    pub reason: String,
}

impl WriteError {
    pub fn new(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { kind: kind.into(), reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reset(#[from] ResetError),

    #[error("cannot encode place {id}: {source}")]
    Serialize {
        id: PlaceId,
        #[source]
        source: serde_json::Error,
    },

    #[error("indexing cancelled before documents were loaded")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum QueryError {
    /// `last_page` is known only when the store was consulted.
    #[error("invalid 'page' value: '{page}'")]
    InvalidPage { page: i64, last_page: Option<u64> },

    #[error("invalid page size: {0}")]
    InvalidPageSize(u64),

    #[error("invalid '{param}' value: '{value}'")]
    InvalidCoordinate { param: &'static str, value: String },

    #[error("search failed: {0}")]
    Store(#[from] StoreError),
}

impl QueryError {
    /// Whether the caller sent bad parameters, as opposed to the store failing.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, QueryError::Store(_))
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("cannot sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}
