//! Shared test helpers

use std::sync::Arc;

use prometheus::proto::{Histogram, Metric};
use reqmetrics::lifecycle::ManualClock;
use reqmetrics::storage::MemoryStorage;
use reqmetrics::{Config, Monitor};

/// Monitor over a private memory store and a manual clock
pub fn monitor(toml: &str, clock: Arc<ManualClock>) -> Arc<Monitor> {
    let config = Config::from_toml_str(toml).unwrap();
    Arc::new(
        Monitor::builder(config)
            .storage(Arc::new(MemoryStorage::new()))
            .clock(clock)
            .build()
            .unwrap(),
    )
}

/// Series of the built-in family `name`, label values in declared order
fn metrics(monitor: &Monitor, name: &str) -> Vec<(Vec<String>, Metric)> {
    let declared: Vec<&str> = monitor
        .registry()
        .iter()
        .find(|m| m.instrument.name() == name)
        .map(|m| m.kind.labels().to_vec())
        .unwrap_or_default();

    monitor
        .storage()
        .collect()
        .unwrap()
        .into_iter()
        .filter(|f| f.get_name() == name)
        .flat_map(|f| f.get_metric().to_vec())
        .map(|metric| {
            let values = declared
                .iter()
                .map(|label| {
                    metric
                        .get_label()
                        .iter()
                        .find(|pair| pair.get_name() == *label)
                        .map(|pair| pair.get_value().to_string())
                        .unwrap_or_default()
                })
                .collect();
            (values, metric)
        })
        .collect()
}

/// Every (labels, value) pair of the counter or gauge family `name`
pub fn series(monitor: &Monitor, name: &str) -> Vec<(Vec<String>, f64)> {
    metrics(monitor, name)
        .into_iter()
        .map(|(labels, metric)| {
            let value = if metric.has_gauge() {
                metric.get_gauge().get_value()
            } else {
                metric.get_counter().get_value()
            };
            (labels, value)
        })
        .collect()
}

/// Every (labels, histogram) pair of the histogram family `name`
pub fn histograms(monitor: &Monitor, name: &str) -> Vec<(Vec<String>, Histogram)> {
    metrics(monitor, name)
        .into_iter()
        .map(|(labels, metric)| (labels, metric.get_histogram().clone()))
        .collect()
}

/// Cumulative counts of the finite buckets
pub fn cumulative(histogram: &Histogram) -> Vec<u64> {
    histogram
        .get_bucket()
        .iter()
        .map(|b| b.get_cumulative_count())
        .collect()
}

pub fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
