//! Redis storage
//!
//! Layout under `prefix`:
//! - `{prefix}:metrics`        set of family names
//! - `{prefix}:meta:{name}`    JSON-encoded [`MetricDesc`]
//! - `{prefix}:series:{name}`  hash of `[labels, part]` -> value
//!
//! `part` is `value` for counters and gauges, and `sum`, `count` or
//! `b{index}` for histograms. Every write refreshes the index and metadata,
//! so a store wiped by another process is rebuilt on the next sample.

use dashmap::DashMap;
use parking_lot::Mutex;
use prometheus::proto::{self, LabelPair, Metric, MetricType};
use redis::{Commands, Pipeline};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use super::{bucket_index, check_increment, check_write, MetricDesc, MetricFamily, Storage};
use crate::config::RedisConfig;
use crate::error::StorageError;
use crate::metrics::Shape;

const VALUE_PART: &str = "value";
const SUM_PART: &str = "sum";
const COUNT_PART: &str = "count";

/// Storage in an external redis server
pub struct RedisStorage {
    conn: Mutex<redis::Connection>,
    prefix: String,
    descs: DashMap<String, MetricDesc>,
}

impl RedisStorage {
    /// Connect using configured parameters
    pub fn connect(config: &RedisConfig) -> Result<Self, StorageError> {
        let client = redis::Client::open(config.connection_url())?;
        let conn = client.get_connection_with_timeout(Duration::from_millis(config.timeout_ms))?;
        debug!(host = %config.host, port = config.port, "Connected to redis");
        Ok(Self::from_connection(conn, config.prefix.clone()))
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: redis::Connection, prefix: impl Into<String>) -> Self {
        Self {
            conn: Mutex::new(conn),
            prefix: prefix.into(),
            descs: DashMap::new(),
        }
    }

    fn index_key(&self) -> String {
        format!("{}:metrics", self.prefix)
    }

    fn meta_key(&self, name: &str) -> String {
        format!("{}:meta:{}", self.prefix, name)
    }

    fn series_key(&self, name: &str) -> String {
        format!("{}:series:{}", self.prefix, name)
    }

    /// Run `fill` inside an atomic pipeline that also refreshes the index
    /// and metadata for `name`.
    fn write<F>(&self, name: &str, labels: &[String], shape: Shape, fill: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Pipeline, &str, &MetricDesc) -> Result<(), StorageError>,
    {
        let desc = self
            .descs
            .get(name)
            .map(|d| d.value().clone())
            .ok_or_else(|| StorageError::UnknownMetric(name.to_string()))?;
        check_write(&desc, labels, shape)?;

        let meta = serde_json::to_string(&desc)?;
        let series_key = self.series_key(name);

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.sadd(self.index_key(), name).ignore();
        pipe.set(self.meta_key(name), meta).ignore();
        fill(&mut pipe, &series_key, &desc)?;

        let mut conn = self.conn.lock();
        pipe.query::<()>(&mut *conn)?;
        Ok(())
    }
}

fn field(labels: &[String], part: &str) -> Result<String, StorageError> {
    Ok(serde_json::to_string(&(labels, part))?)
}

/// Accumulated hash fields of one series
#[derive(Default)]
struct Fields {
    value: f64,
    sum: f64,
    count: u64,
    /// Per-bucket counts, last slot is `+Inf`
    buckets: Vec<u64>,
}

impl Fields {
    fn into_metric(self, desc: &MetricDesc, values: Vec<String>) -> Metric {
        let mut pairs: Vec<LabelPair> = desc
            .labels
            .iter()
            .zip(values)
            .map(|(name, value)| {
                let mut pair = LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value);
                pair
            })
            .collect();
        pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));

        let mut metric = Metric::default();
        metric.set_label(pairs.into());
        match desc.shape {
            Shape::Counter => {
                let mut counter = proto::Counter::default();
                counter.set_value(self.value);
                metric.set_counter(counter);
            }
            Shape::Gauge => {
                let mut gauge = proto::Gauge::default();
                gauge.set_value(self.value);
                metric.set_gauge(gauge);
            }
            Shape::Histogram => {
                let mut histogram = proto::Histogram::default();
                histogram.set_sample_sum(self.sum);
                histogram.set_sample_count(self.count);
                // `+Inf` comes from the sample count when encoding
                let mut cumulative = 0u64;
                for (bound, count) in desc.buckets.iter().zip(&self.buckets) {
                    cumulative += *count;
                    let mut bucket = proto::Bucket::default();
                    bucket.set_upper_bound(*bound);
                    bucket.set_cumulative_count(cumulative);
                    histogram.mut_bucket().push(bucket);
                }
                metric.set_histogram(histogram);
            }
        }
        metric
    }
}

fn metric_type(shape: Shape) -> MetricType {
    match shape {
        Shape::Counter => MetricType::COUNTER,
        Shape::Gauge => MetricType::GAUGE,
        Shape::Histogram => MetricType::HISTOGRAM,
    }
}

/// Rebuild a family from its hash fields; `None` when it has no series.
fn decode_family(desc: &MetricDesc, fields: HashMap<String, String>) -> Result<Option<MetricFamily>, StorageError> {
    let mut by_labels: BTreeMap<Vec<String>, Fields> = BTreeMap::new();

    for (raw_field, raw_value) in fields {
        let (labels, part): (Vec<String>, String) = serde_json::from_str(&raw_field)?;
        let value: f64 = match raw_value.parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(metric = %desc.name, field = %raw_field, "Skipping non-numeric redis field");
                continue;
            }
        };

        let series = by_labels.entry(labels).or_insert_with(|| Fields {
            buckets: vec![0; desc.buckets.len() + 1],
            ..Fields::default()
        });
        match part.as_str() {
            VALUE_PART => series.value = value,
            SUM_PART => series.sum = value,
            COUNT_PART => series.count = value as u64,
            bucket => {
                let slot = bucket
                    .strip_prefix('b')
                    .and_then(|idx| idx.parse::<usize>().ok())
                    .and_then(|idx| series.buckets.get_mut(idx));
                if let Some(slot) = slot {
                    *slot = value as u64;
                }
            }
        }
    }

    if by_labels.is_empty() {
        return Ok(None);
    }

    let mut family = MetricFamily::default();
    family.set_name(desc.name.clone());
    family.set_help(desc.help.clone());
    family.set_field_type(metric_type(desc.shape));
    for (values, series) in by_labels {
        family.mut_metric().push(series.into_metric(desc, values));
    }
    Ok(Some(family))
}

impl Storage for RedisStorage {
    fn register(&self, desc: &MetricDesc) -> Result<(), StorageError> {
        desc.validate()?;
        if let Some(existing) = self.descs.get(&desc.name) {
            return existing.check_compatible(desc);
        }
        self.descs.insert(desc.name.clone(), desc.clone());
        Ok(())
    }

    fn add_counter(&self, name: &str, labels: &[String], delta: f64) -> Result<(), StorageError> {
        check_increment(name, delta)?;
        self.write(name, labels, Shape::Counter, |pipe, key, _| {
            pipe.hincr(key, field(labels, VALUE_PART)?, delta).ignore();
            Ok(())
        })
    }

    fn observe_histogram(&self, name: &str, labels: &[String], value: f64) -> Result<(), StorageError> {
        self.write(name, labels, Shape::Histogram, |pipe, key, desc| {
            let bucket = format!("b{}", bucket_index(&desc.buckets, value));
            pipe.hincr(key, field(labels, SUM_PART)?, value).ignore();
            pipe.hincr(key, field(labels, COUNT_PART)?, 1).ignore();
            pipe.hincr(key, field(labels, &bucket)?, 1).ignore();
            Ok(())
        })
    }

    fn set_gauge(&self, name: &str, labels: &[String], value: f64) -> Result<(), StorageError> {
        self.write(name, labels, Shape::Gauge, |pipe, key, _| {
            pipe.hset(key, field(labels, VALUE_PART)?, value).ignore();
            Ok(())
        })
    }

    fn collect(&self) -> Result<Vec<MetricFamily>, StorageError> {
        let mut conn = self.conn.lock();
        let names: Vec<String> = conn.smembers(self.index_key())?;

        let mut families = Vec::with_capacity(names.len());
        for name in names {
            let meta: Option<String> = conn.get(self.meta_key(&name))?;
            let Some(meta) = meta else {
                continue;
            };
            let desc: MetricDesc = serde_json::from_str(&meta)?;
            let fields: HashMap<String, String> = conn.hgetall(self.series_key(&name))?;
            if let Some(family) = decode_family(&desc, fields)? {
                families.push(family);
            }
        }
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        Ok(families)
    }

    fn wipe(&self) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        let names: Vec<String> = conn.smembers(self.index_key())?;

        let mut keys = Vec::with_capacity(names.len() * 2 + 1);
        for name in &names {
            keys.push(self.meta_key(name));
            keys.push(self.series_key(name));
        }
        keys.push(self.index_key());

        let _: () = conn.del(keys)?;
        debug!(prefix = %self.prefix, families = names.len(), "Wiped redis store");
        Ok(())
    }
}
