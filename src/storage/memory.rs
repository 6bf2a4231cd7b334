//! In-process storage
//!
//! Families live in a `prometheus::Registry` as labelled vectors.
//! `MemoryStorage::new()` is private to whoever holds it; [`shared`] hands
//! out the single process-wide instance backing the `apc`/`apcu` adapters.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

use super::{check_increment, check_write, MetricDesc, MetricFamily, Storage};
use crate::error::StorageError;
use crate::metrics::Shape;

static SHARED: Lazy<Arc<MemoryStorage>> = Lazy::new(|| Arc::new(MemoryStorage::new()));

/// The process-wide shared store
pub fn shared() -> Arc<MemoryStorage> {
    SHARED.clone()
}

#[derive(Clone)]
enum Family {
    Counter(CounterVec),
    Histogram(HistogramVec),
    Gauge(GaugeVec),
}

impl Family {
    fn build(desc: &MetricDesc) -> Result<Self, prometheus::Error> {
        let labels: Vec<&str> = desc.labels.iter().map(String::as_str).collect();
        Ok(match desc.shape {
            Shape::Counter => Family::Counter(CounterVec::new(Opts::new(&desc.name, &desc.help), &labels)?),
            Shape::Gauge => Family::Gauge(GaugeVec::new(Opts::new(&desc.name, &desc.help), &labels)?),
            Shape::Histogram => {
                let opts = HistogramOpts::new(&desc.name, &desc.help).buckets(desc.buckets.clone());
                Family::Histogram(HistogramVec::new(opts, &labels)?)
            }
        })
    }

    fn collector(&self) -> Box<dyn Collector> {
        match self {
            Family::Counter(vec) => Box::new(vec.clone()),
            Family::Histogram(vec) => Box::new(vec.clone()),
            Family::Gauge(vec) => Box::new(vec.clone()),
        }
    }

    fn shape(&self) -> Shape {
        match self {
            Family::Counter(_) => Shape::Counter,
            Family::Histogram(_) => Shape::Histogram,
            Family::Gauge(_) => Shape::Gauge,
        }
    }

    fn reset(&self) {
        match self {
            Family::Counter(vec) => vec.reset(),
            Family::Histogram(vec) => vec.reset(),
            Family::Gauge(vec) => vec.reset(),
        }
    }
}

struct Registered {
    desc: MetricDesc,
    family: Family,
}

/// Registry-backed sample store
pub struct MemoryStorage {
    registry: Registry,
    families: DashMap<String, Registered>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            families: DashMap::new(),
        }
    }

    /// Vector for `name`, after checking the write against its description
    fn family(&self, name: &str, labels: &[String], shape: Shape) -> Result<Family, StorageError> {
        let registered = self
            .families
            .get(name)
            .ok_or_else(|| StorageError::UnknownMetric(name.to_string()))?;
        check_write(&registered.desc, labels, shape)?;
        Ok(registered.family.clone())
    }
}

fn label_values(labels: &[String]) -> Vec<&str> {
    labels.iter().map(String::as_str).collect()
}

fn mismatch(name: &str, family: &Family) -> StorageError {
    StorageError::ShapeMismatch {
        name: name.to_string(),
        existing: family.shape().as_str(),
    }
}

impl Storage for MemoryStorage {
    fn register(&self, desc: &MetricDesc) -> Result<(), StorageError> {
        desc.validate()?;
        match self.families.entry(desc.name.clone()) {
            Entry::Occupied(existing) => existing.get().desc.check_compatible(desc),
            Entry::Vacant(slot) => {
                let family = Family::build(desc)?;
                self.registry.register(family.collector())?;
                slot.insert(Registered {
                    desc: desc.clone(),
                    family,
                });
                Ok(())
            }
        }
    }

    fn add_counter(&self, name: &str, labels: &[String], delta: f64) -> Result<(), StorageError> {
        check_increment(name, delta)?;
        match self.family(name, labels, Shape::Counter)? {
            Family::Counter(vec) => {
                vec.get_metric_with_label_values(&label_values(labels))?.inc_by(delta);
                Ok(())
            }
            other => Err(mismatch(name, &other)),
        }
    }

    fn observe_histogram(&self, name: &str, labels: &[String], value: f64) -> Result<(), StorageError> {
        match self.family(name, labels, Shape::Histogram)? {
            Family::Histogram(vec) => {
                vec.get_metric_with_label_values(&label_values(labels))?.observe(value);
                Ok(())
            }
            other => Err(mismatch(name, &other)),
        }
    }

    fn set_gauge(&self, name: &str, labels: &[String], value: f64) -> Result<(), StorageError> {
        match self.family(name, labels, Shape::Gauge)? {
            Family::Gauge(vec) => {
                vec.get_metric_with_label_values(&label_values(labels))?.set(value);
                Ok(())
            }
            other => Err(mismatch(name, &other)),
        }
    }

    fn collect(&self) -> Result<Vec<MetricFamily>, StorageError> {
        Ok(self.registry.gather())
    }

    fn wipe(&self) -> Result<(), StorageError> {
        for registered in self.families.iter() {
            registered.family.reset();
        }
        Ok(())
    }
}
