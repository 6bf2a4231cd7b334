//! Metric kinds and their fixed shapes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Instrument shape backing a metric family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Counter,
    Histogram,
    Gauge,
}

impl Shape {
    /// Exposition `# TYPE` keyword
    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Counter => "counter",
            Shape::Histogram => "histogram",
            Shape::Gauge => "gauge",
        }
    }
}

/// The closed set of built-in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    /// Responses per route
    ResponseCount,
    /// Bytes written to the client
    SentBytes,
    /// Bytes read from the client
    ReceivedBytes,
    /// Response latency in milliseconds
    Latency,
    /// Connections by state
    Connections,
    /// Captured errors and exceptions
    Exception,
}

const HTTP_LABELS: &[&str] = &["app", "api", "module", "method", "code"];

impl MetricKind {
    /// Every kind, in registration order
    pub const ALL: [MetricKind; 6] = [
        MetricKind::ResponseCount,
        MetricKind::SentBytes,
        MetricKind::ReceivedBytes,
        MetricKind::Latency,
        MetricKind::Connections,
        MetricKind::Exception,
    ];

    pub fn shape(self) -> Shape {
        match self {
            MetricKind::Latency => Shape::Histogram,
            MetricKind::Connections => Shape::Gauge,
            _ => Shape::Counter,
        }
    }

    /// Family name, prefixed with the app name at registration
    pub fn metric_name(self) -> &'static str {
        match self {
            MetricKind::ResponseCount => "module_responses",
            MetricKind::SentBytes => "module_sent_bytes",
            MetricKind::ReceivedBytes => "module_received_bytes",
            MetricKind::Latency => "response_duration_milliseconds",
            MetricKind::Connections => "module_connections",
            MetricKind::Exception => "module_exceptions",
        }
    }

    /// Ordered label schema
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            MetricKind::ResponseCount | MetricKind::SentBytes | MetricKind::ReceivedBytes => {
                HTTP_LABELS
            }
            MetricKind::Latency => &HTTP_LABELS[..4],
            MetricKind::Connections => &["app", "state"],
            MetricKind::Exception => &["app", "exception", "module"],
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            MetricKind::ResponseCount => "number of /path",
            MetricKind::SentBytes => "traffic sent by /path",
            MetricKind::ReceivedBytes => "traffic received by /path",
            MetricKind::Latency => "response latency",
            MetricKind::Connections => "number of http connections",
            MetricKind::Exception => "number of errors and exceptions",
        }
    }

    /// Key used under `monitor_switch`
    pub fn config_key(self) -> &'static str {
        match self {
            MetricKind::ResponseCount => "response_count",
            MetricKind::SentBytes => "sent_bytes",
            MetricKind::ReceivedBytes => "received_bytes",
            MetricKind::Latency => "latency",
            MetricKind::Connections => "connections",
            MetricKind::Exception => "exception",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.config_key() == s)
            .ok_or_else(|| format!("unknown metric kind {s:?}"))
    }
}
