//! Request lifecycle
//!
//! Captures the begin and end of a request, resolves its route against the
//! configured switches and writes the request's samples exactly once.

mod clock;
mod context;
mod controller;
mod finalizer;
mod monitor;

pub use clock::{elapsed_millis, Clock, ManualClock, SystemClock};
pub use context::RequestContext;
pub use controller::{Controller, ShutdownHook, Stage};
pub use finalizer::SELF_MODULE;
pub use monitor::{Monitor, MonitorBuilder, RequestScope};
