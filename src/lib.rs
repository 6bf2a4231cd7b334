//! reqmetrics - per-request metrics for web services
//!
//! Records response counts, transferred bytes, latency, connection gauges
//! and exceptions for each request, scoped by configurable route rules,
//! into a pluggable storage backend, and renders everything in the text
//! exposition format.

pub mod config;
pub mod error;
pub mod fault;
pub mod lifecycle;
pub mod metrics;
pub mod router;
pub mod storage;
pub mod util;

pub use config::{Config, ConfigReport, ResolvedConfig};
pub use error::{Error, Result};
pub use fault::{ExceptionSink, FaultLayer, FaultObserver, Severity};
pub use lifecycle::{Controller, Monitor, MonitorBuilder, RequestContext, RequestScope};
pub use metrics::{MetricKind, CONTENT_TYPE};
pub use storage::{Adapter, Storage};

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
