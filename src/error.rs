//! Error types
//!
//! Setup failures are typed and fatal; recording failures never surface as
//! errors to the host (they are logged and reported as `false`).

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by setup paths.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Hard configuration failures. Any of these aborts setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid adapter: {0:?}")]
    UnknownAdapter(String),
    #[error("redis adapter needs a [redis] section or a prebuilt connection")]
    MissingRedisConnection,
    #[error("invalid app name {0:?}: must be a valid metric name prefix")]
    InvalidApp(String),
    #[error("invalid buckets: {0}")]
    InvalidBuckets(String),
    #[error("invalid log method {0:?}")]
    InvalidLogMethod(String),
}

/// Failures raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("exposition is not valid utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("metric {0} is not registered")]
    UnknownMetric(String),
    #[error("metric {name} expects {expected} label values, got {got}")]
    LabelArity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("metric {name} is already registered as a {existing}")]
    ShapeMismatch { name: String, existing: &'static str },
    #[error("metric {name} is already registered differently: {reason}")]
    Incompatible { name: String, reason: String },
    #[error("metric {name} has invalid buckets: {reason}")]
    InvalidBuckets { name: String, reason: String },
    #[error("metric {name} cannot be incremented by {delta}")]
    InvalidIncrement { name: String, delta: f64 },
}

/// A URI with no extractable path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("no path in uri {0:?}")]
    MissingPath(String),
}
