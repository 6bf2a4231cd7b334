//! Instrument handles and the per-kind registry

use std::collections::BTreeMap;
use std::sync::Arc;

use super::kind::{MetricKind, Shape};
use crate::config::ResolvedConfig;
use crate::error::StorageError;
use crate::storage::{MetricDesc, Storage};

/// Handle to a counter family
#[derive(Clone)]
pub struct Counter {
    name: String,
    storage: Arc<dyn Storage>,
}

impl Counter {
    pub fn inc_by(&self, delta: f64, labels: &[String]) -> Result<(), StorageError> {
        self.storage.add_counter(&self.name, labels, delta)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Handle to a histogram family
#[derive(Clone)]
pub struct Histogram {
    name: String,
    storage: Arc<dyn Storage>,
}

impl Histogram {
    pub fn observe(&self, value: f64, labels: &[String]) -> Result<(), StorageError> {
        self.storage.observe_histogram(&self.name, labels, value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Handle to a gauge family
#[derive(Clone)]
pub struct Gauge {
    name: String,
    storage: Arc<dyn Storage>,
}

impl Gauge {
    pub fn set(&self, value: f64, labels: &[String]) -> Result<(), StorageError> {
        self.storage.set_gauge(&self.name, labels, value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A live instrument of any shape
#[derive(Clone)]
pub enum Instrument {
    Counter(Counter),
    Histogram(Histogram),
    Gauge(Gauge),
}

impl Instrument {
    /// Register `desc` with the backend and return the matching handle.
    pub fn register(storage: &Arc<dyn Storage>, desc: &MetricDesc) -> Result<Self, StorageError> {
        storage.register(desc)?;
        let name = desc.name.clone();
        let storage = Arc::clone(storage);
        Ok(match desc.shape {
            Shape::Counter => Instrument::Counter(Counter { name, storage }),
            Shape::Histogram => Instrument::Histogram(Histogram { name, storage }),
            Shape::Gauge => Instrument::Gauge(Gauge { name, storage }),
        })
    }

    pub fn shape(&self) -> Shape {
        match self {
            Instrument::Counter(_) => Shape::Counter,
            Instrument::Histogram(_) => Shape::Histogram,
            Instrument::Gauge(_) => Shape::Gauge,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Instrument::Counter(c) => c.name(),
            Instrument::Histogram(h) => h.name(),
            Instrument::Gauge(g) => g.name(),
        }
    }

    /// Apply a value with the shape's own operation: add for counters,
    /// observe for histograms, set for gauges.
    pub fn record(&self, value: f64, labels: &[String]) -> Result<(), StorageError> {
        match self {
            Instrument::Counter(c) => c.inc_by(value, labels),
            Instrument::Histogram(h) => h.observe(value, labels),
            Instrument::Gauge(g) => g.set(value, labels),
        }
    }
}

/// A built-in kind and its instrument
#[derive(Clone)]
pub struct RegisteredMetric {
    pub kind: MetricKind,
    pub instrument: Instrument,
}

/// Instruments for every enabled kind
pub struct Registry {
    metrics: BTreeMap<MetricKind, RegisteredMetric>,
    storage: Arc<dyn Storage>,
}

impl Registry {
    /// Create one instrument per enabled kind.
    ///
    /// Latency without buckets is skipped. Nothing is kept if any
    /// registration fails.
    pub fn initialize(config: &ResolvedConfig, storage: Arc<dyn Storage>) -> Result<Self, StorageError> {
        let mut metrics = BTreeMap::new();

        for kind in config.switches.enabled() {
            if kind == MetricKind::Latency && config.buckets.is_empty() {
                tracing::debug!("Latency enabled without buckets, not registering");
                continue;
            }
            let desc = describe(config, kind);
            let instrument = Instrument::register(&storage, &desc)?;
            metrics.insert(kind, RegisteredMetric { kind, instrument });
        }

        Ok(Self { metrics, storage })
    }

    pub fn get(&self, kind: MetricKind) -> Option<&RegisteredMetric> {
        self.metrics.get(&kind)
    }

    /// Registered metrics in kind order
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredMetric> {
        self.metrics.values()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

/// Family description for a built-in kind
pub fn describe(config: &ResolvedConfig, kind: MetricKind) -> MetricDesc {
    MetricDesc {
        name: format!("{}_{}", config.app, kind.metric_name()),
        help: format!("[{}] {}", config.idc, kind.help()),
        shape: kind.shape(),
        labels: kind.labels().iter().map(|l| l.to_string()).collect(),
        buckets: if kind.shape() == Shape::Histogram {
            config.buckets.clone()
        } else {
            Vec::new()
        },
    }
}
