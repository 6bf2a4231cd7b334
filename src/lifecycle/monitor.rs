//! Initialized metrics state and per-request scopes
//!
//! A [`Monitor`] is immutable once built and can be shared between threads.
//! Long-lived servers keep one monitor and open a [`RequestScope`] per
//! request; one-shot processes go through the controller instead.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::context::RequestContext;
use super::finalizer;
use crate::config::{Config, ConfigReport, ResolvedConfig};
use crate::error::{Result, StorageError};
use crate::fault::ExceptionSink;
use crate::metrics::{self, Counter, Gauge, Histogram, Instrument, MetricKind, Registry, Shape};
use crate::storage::{Adapter, MetricDesc, RedisStorage, Storage};

/// Builds a [`Monitor`]
pub struct MonitorBuilder {
    config: Config,
    storage: Option<Arc<dyn Storage>>,
    redis_conn: Option<redis::Connection>,
    clock: Arc<dyn Clock>,
}

impl MonitorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            storage: None,
            redis_conn: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a caller-provided storage capability instead of the adapter
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use an existing redis connection for the redis adapter
    pub fn redis_connection(mut self, conn: redis::Connection) -> Self {
        self.redis_conn = Some(conn);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate configuration, open storage and register instruments.
    ///
    /// Fails without leaving anything registered in a private backend.
    pub fn build(self) -> Result<Monitor> {
        let has_connection = self.storage.is_some() || self.redis_conn.is_some();
        let (config, report) = self.config.validate(has_connection)?;

        let storage: Arc<dyn Storage> = match (self.storage, self.redis_conn) {
            (Some(storage), _) => storage,
            (None, Some(conn)) if config.adapter == Adapter::Redis => {
                let prefix = config
                    .redis
                    .as_ref()
                    .map(|r| r.prefix.clone())
                    .unwrap_or_else(|| crate::config::RedisConfig::default().prefix);
                Arc::new(RedisStorage::from_connection(conn, prefix))
            }
            _ => config.adapter.open(config.redis.as_ref())?,
        };

        let registry = Registry::initialize(&config, storage)?;
        info!(
            app = %config.app,
            adapter = %config.adapter,
            metrics = registry.len(),
            rejected = report.rejected.len(),
            "Metrics registry initialized"
        );

        Ok(Monitor {
            config,
            report,
            registry,
            clock: self.clock,
        })
    }
}

/// Registry plus resolved configuration
pub struct Monitor {
    config: ResolvedConfig,
    report: ConfigReport,
    registry: Registry,
    clock: Arc<dyn Clock>,
}

impl Monitor {
    pub fn builder(config: Config) -> MonitorBuilder {
        MonitorBuilder::new(config)
    }

    /// Build with the configured adapter and the system clock
    pub fn new(config: Config) -> Result<Self> {
        MonitorBuilder::new(config).build()
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Entries dropped while validating the configuration
    pub fn report(&self) -> &ConfigReport {
        &self.report
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        self.registry.storage()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Instrument registered for a built-in kind, if enabled
    pub fn registered(&self, kind: MetricKind) -> Option<&Instrument> {
        self.registry.get(kind).map(|m| &m.instrument)
    }

    /// Open a request window starting now
    pub fn begin_request(self: &Arc<Self>) -> RequestScope {
        RequestScope {
            monitor: Arc::clone(self),
            begin: self.clock.now(),
            finalized: false,
        }
    }

    fn record(&self, kind: MetricKind, value: f64, labels: Vec<String>) -> bool {
        let Some(instrument) = self.registered(kind) else {
            debug!(%kind, "Metric not registered, dropping sample");
            return false;
        };
        match instrument.record(value, &labels) {
            Ok(()) => true,
            Err(e) => {
                warn!(%kind, error = %e, "Failed to record sample");
                false
            }
        }
    }

    fn http_labels(&self, api: &str, module: &str, method: &str) -> Vec<String> {
        vec![
            self.config.app.clone(),
            api.to_string(),
            module.to_string(),
            method.to_string(),
        ]
    }

    /// Observe a latency in milliseconds
    pub fn record_latency(&self, millis: f64, module: &str, api: &str, method: &str) -> bool {
        let labels = self.http_labels(api, module, method);
        self.record(MetricKind::Latency, millis, labels)
    }

    pub fn record_response_count(&self, times: u64, module: &str, api: &str, method: &str, code: u16) -> bool {
        let mut labels = self.http_labels(api, module, method);
        labels.push(code.to_string());
        self.record(MetricKind::ResponseCount, times as f64, labels)
    }

    pub fn record_sent_bytes(&self, bytes: u64, module: &str, api: &str, method: &str, code: u16) -> bool {
        let mut labels = self.http_labels(api, module, method);
        labels.push(code.to_string());
        self.record(MetricKind::SentBytes, bytes as f64, labels)
    }

    pub fn record_received_bytes(&self, bytes: u64, module: &str, api: &str, method: &str, code: u16) -> bool {
        let mut labels = self.http_labels(api, module, method);
        labels.push(code.to_string());
        self.record(MetricKind::ReceivedBytes, bytes as f64, labels)
    }

    pub fn record_exception(&self, count: u64, exception: &str, module: &str) -> bool {
        let labels = vec![self.config.app.clone(), exception.to_string(), module.to_string()];
        self.record(MetricKind::Exception, count as f64, labels)
    }

    /// Set the connection gauge for `state`
    pub fn record_gauge(&self, value: f64, state: &str) -> bool {
        let labels = vec![self.config.app.clone(), state.to_string()];
        self.record(MetricKind::Connections, value, labels)
    }

    fn custom(&self, shape: Shape, name: &str, help: &str, labels: &[&str], buckets: &[f64]) -> std::result::Result<Instrument, StorageError> {
        let desc = MetricDesc {
            name: format!("{}_{}", self.config.app, name),
            help: format!("[{}] {}", self.config.idc, help),
            shape,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            buckets: buckets.to_vec(),
        };
        Instrument::register(self.storage(), &desc)
    }

    /// Register an application counter next to the built-in families.
    /// The name is prefixed with the app name.
    pub fn custom_counter(&self, name: &str, help: &str, labels: &[&str]) -> std::result::Result<Counter, StorageError> {
        match self.custom(Shape::Counter, name, help, labels, &[])? {
            Instrument::Counter(counter) => Ok(counter),
            other => Err(shape_mismatch(&other)),
        }
    }

    pub fn custom_histogram(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
        buckets: &[f64],
    ) -> std::result::Result<Histogram, StorageError> {
        match self.custom(Shape::Histogram, name, help, labels, buckets)? {
            Instrument::Histogram(histogram) => Ok(histogram),
            other => Err(shape_mismatch(&other)),
        }
    }

    pub fn custom_gauge(&self, name: &str, help: &str, labels: &[&str]) -> std::result::Result<Gauge, StorageError> {
        match self.custom(Shape::Gauge, name, help, labels, &[])? {
            Instrument::Gauge(gauge) => Ok(gauge),
            other => Err(shape_mismatch(&other)),
        }
    }

    /// Render everything the backend holds
    pub fn render(&self) -> std::result::Result<String, StorageError> {
        metrics::render(&self.storage().collect()?)
    }

    /// Clear the backend's accumulated samples
    pub fn flush(&self) -> bool {
        match self.storage().wipe() {
            Ok(()) => {
                info!(adapter = %self.config.adapter, "Metrics storage flushed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to flush metrics storage");
                false
            }
        }
    }
}

fn shape_mismatch(instrument: &Instrument) -> StorageError {
    StorageError::ShapeMismatch {
        name: instrument.name().to_string(),
        existing: instrument.shape().as_str(),
    }
}

impl ExceptionSink for Monitor {
    fn record_exception(&self, count: u64, exception: &str, module: &str) -> bool {
        Monitor::record_exception(self, count, exception, module)
    }
}

/// One request's measurement window
pub struct RequestScope {
    monitor: Arc<Monitor>,
    begin: f64,
    finalized: bool,
}

impl RequestScope {
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn begin(&self) -> f64 {
        self.begin
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Close the window and write the request's samples.
    ///
    /// Only the first call writes; later calls return `false`.
    pub fn finalize(&mut self, ctx: &RequestContext) -> bool {
        if self.finalized {
            debug!("Request scope already finalized");
            return false;
        }
        self.finalized = true;
        let end = self.monitor.clock.now();
        finalizer::run(&self.monitor, ctx, self.begin, end)
    }
}
