//! Metric storage backends
//!
//! The registry writes through the [`Storage`] capability; the exposition
//! renderer reads back through [`Storage::collect`], which yields prometheus
//! metric families whatever the backend. Backends decide where
//! samples live and how long: one monitor, one process, or an external
//! store shared by many processes.

mod memory;
mod redis_store;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::RedisConfig;
use crate::error::{ConfigError, StorageError};
use crate::metrics::Shape;

pub use self::memory::{shared, MemoryStorage};
pub use self::redis_store::RedisStorage;
pub use prometheus::proto::MetricFamily;

/// Static description of a metric family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDesc {
    /// Full family name, including the app prefix
    pub name: String,
    pub help: String,
    pub shape: Shape,
    /// Ordered label names
    pub labels: Vec<String>,
    /// Upper bounds for histograms, strictly increasing
    #[serde(default)]
    pub buckets: Vec<f64>,
}

impl MetricDesc {
    /// Check the description before anything is registered for it.
    ///
    /// Histograms need at least one finite, strictly increasing bound.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.shape != Shape::Histogram {
            return Ok(());
        }
        if self.buckets.is_empty() {
            return Err(StorageError::InvalidBuckets {
                name: self.name.clone(),
                reason: "histogram needs at least one bound".to_string(),
            });
        }
        check_buckets(&self.buckets).map_err(|reason| StorageError::InvalidBuckets {
            name: self.name.clone(),
            reason,
        })
    }

    /// Fail unless `other` describes the same family as `self`.
    pub fn check_compatible(&self, other: &MetricDesc) -> Result<(), StorageError> {
        if self.shape != other.shape {
            return Err(StorageError::ShapeMismatch {
                name: self.name.clone(),
                existing: self.shape.as_str(),
            });
        }
        let reason = if self.labels != other.labels {
            format!("labels {:?} differ from registered {:?}", other.labels, self.labels)
        } else if self.buckets != other.buckets {
            format!("buckets {:?} differ from registered {:?}", other.buckets, self.buckets)
        } else {
            return Ok(());
        };
        Err(StorageError::Incompatible {
            name: self.name.clone(),
            reason,
        })
    }
}

/// Bounds must be finite and strictly increasing
pub fn check_buckets(buckets: &[f64]) -> Result<(), String> {
    if let Some(bad) = buckets.iter().find(|b| !b.is_finite()) {
        return Err(format!("non-finite bound {bad}"));
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        return Err("bounds must be strictly increasing".to_string());
    }
    Ok(())
}

/// Reject writes with the wrong shape or label count.
pub(crate) fn check_write(desc: &MetricDesc, labels: &[String], shape: Shape) -> Result<(), StorageError> {
    if desc.shape != shape {
        return Err(StorageError::ShapeMismatch {
            name: desc.name.clone(),
            existing: desc.shape.as_str(),
        });
    }
    if desc.labels.len() != labels.len() {
        return Err(StorageError::LabelArity {
            name: desc.name.clone(),
            expected: desc.labels.len(),
            got: labels.len(),
        });
    }
    Ok(())
}

/// Counters only move forward
pub(crate) fn check_increment(name: &str, delta: f64) -> Result<(), StorageError> {
    if delta.is_finite() && delta >= 0.0 {
        Ok(())
    } else {
        Err(StorageError::InvalidIncrement {
            name: name.to_string(),
            delta,
        })
    }
}

/// Counter/histogram/gauge storage capability.
///
/// Implementations must be usable from several threads; whether writes from
/// several processes aggregate depends on the backend.
pub trait Storage: Send + Sync {
    /// Declare a family. Registering the same description again is a no-op;
    /// a different shape, label list or bucket list is an error.
    fn register(&self, desc: &MetricDesc) -> Result<(), StorageError>;

    fn add_counter(&self, name: &str, labels: &[String], delta: f64) -> Result<(), StorageError>;

    fn observe_histogram(&self, name: &str, labels: &[String], value: f64)
        -> Result<(), StorageError>;

    fn set_gauge(&self, name: &str, labels: &[String], value: f64) -> Result<(), StorageError>;

    /// Families with at least one series, sorted by name; series sorted by
    /// label values.
    fn collect(&self) -> Result<Vec<MetricFamily>, StorageError>;

    /// Drop every accumulated sample.
    fn wipe(&self) -> Result<(), StorageError>;
}

/// Index of the bucket `value` falls into; `buckets.len()` means `+Inf`.
pub fn bucket_index(buckets: &[f64], value: f64) -> usize {
    buckets
        .iter()
        .position(|bound| value <= *bound)
        .unwrap_or(buckets.len())
}

/// Known storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    /// Private to one monitor
    Memory,
    /// External redis store, shared across processes
    Redis,
    /// Process-wide shared store
    Apc,
    /// Alias of `Apc`
    Apcu,
}

impl Adapter {
    pub fn as_str(self) -> &'static str {
        match self {
            Adapter::Memory => "memory",
            Adapter::Redis => "redis",
            Adapter::Apc => "apc",
            Adapter::Apcu => "apcu",
        }
    }

    /// Whether the backend needs connection parameters
    pub fn needs_connection(self) -> bool {
        matches!(self, Adapter::Redis)
    }

    /// Open the backend from configuration.
    ///
    /// The redis backend needs `redis` parameters here; callers holding an
    /// existing connection use [`RedisStorage::from_connection`] instead.
    pub fn open(self, redis: Option<&RedisConfig>) -> Result<Arc<dyn Storage>, crate::Error> {
        let storage: Arc<dyn Storage> = match self {
            Adapter::Memory => Arc::new(MemoryStorage::new()),
            Adapter::Apc | Adapter::Apcu => shared(),
            Adapter::Redis => {
                let config = redis.ok_or(ConfigError::MissingRedisConnection)?;
                Arc::new(RedisStorage::connect(config)?)
            }
        };
        Ok(storage)
    }
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Adapter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Adapter::Memory),
            "redis" => Ok(Adapter::Redis),
            "apc" => Ok(Adapter::Apc),
            "apcu" => Ok(Adapter::Apcu),
            other => Err(ConfigError::UnknownAdapter(other.to_string())),
        }
    }
}
