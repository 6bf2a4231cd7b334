//! Metric kinds, switches and instruments
//!
//! The registry holds one instrument per enabled kind; the exposition
//! module renders whatever the backing storage has collected.

mod exposition;
mod kind;
mod registry;
mod switch;

pub use exposition::{render, CONTENT_TYPE};
pub use kind::{MetricKind, Shape};
pub use registry::{describe, Counter, Gauge, Histogram, Instrument, RegisteredMetric, Registry};
pub use switch::{RejectedEntry, Switch, SwitchConfig, SwitchValue};
