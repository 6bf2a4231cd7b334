//! Process-wide lifecycle controller
//!
//! For one-shot deployments (one request per process). The controller
//! captures the begin timestamp when it is constructed, owns the monitor
//! once initialized, and finalizes exactly once when its shutdown hook is
//! dropped at process end.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::context::RequestContext;
use super::finalizer;
use super::monitor::{Monitor, MonitorBuilder};
use crate::config::Config;
use crate::error::Result;
use crate::fault::{ExceptionSink, FaultObserver};
use crate::metrics::CONTENT_TYPE;

static GLOBAL: Lazy<Controller> = Lazy::new(Controller::new);

/// Lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Uninitialized,
    Initialized,
    Finalized,
}

struct State {
    stage: Stage,
    monitor: Option<Arc<Monitor>>,
    begin: f64,
    end: Option<f64>,
}

/// Owns the lifecycle state machine
pub struct Controller {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let begin = clock.now();
        Self {
            clock,
            state: Mutex::new(State {
                stage: Stage::Uninitialized,
                monitor: None,
                begin,
                end: None,
            }),
        }
    }

    /// The process singleton, constructed on first access
    pub fn global() -> &'static Controller {
        &GLOBAL
    }

    pub fn stage(&self) -> Stage {
        self.state.lock().stage
    }

    pub fn begin_timestamp(&self) -> f64 {
        self.state.lock().begin
    }

    pub fn end_timestamp(&self) -> Option<f64> {
        self.state.lock().end
    }

    /// Build the monitor from configuration. See [`Controller::initialize_with`].
    pub fn initialize<F>(&self, config: Config, source: F) -> Result<ShutdownHook<'_>>
    where
        F: FnOnce() -> RequestContext + Send + 'static,
    {
        self.initialize_with(MonitorBuilder::new(config), source)
    }

    /// Build the monitor once and arm the process-end hook.
    ///
    /// The returned guard runs the teardown fault check and then finalizes
    /// with the context produced by `source` when dropped; keep it alive for
    /// the whole request, typically at the top of `main`. Later calls ignore
    /// `builder` and `source` and return a disarmed guard over the existing
    /// monitor. On error the controller stays uninitialized.
    pub fn initialize_with<F>(&self, builder: MonitorBuilder, source: F) -> Result<ShutdownHook<'_>>
    where
        F: FnOnce() -> RequestContext + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(monitor) = &state.monitor {
            debug!("Controller already initialized");
            return Ok(ShutdownHook {
                controller: self,
                monitor: Arc::clone(monitor),
                source: None,
            });
        }

        let monitor = Arc::new(builder.clock(Arc::clone(&self.clock)).build()?);
        state.monitor = Some(Arc::clone(&monitor));
        state.stage = Stage::Initialized;
        info!(begin = state.begin, "Metrics lifecycle initialized");
        Ok(ShutdownHook {
            controller: self,
            monitor,
            source: Some(Box::new(source)),
        })
    }

    /// The monitor, while recording is allowed
    pub fn monitor(&self) -> Option<Arc<Monitor>> {
        let state = self.state.lock();
        match state.stage {
            Stage::Initialized => state.monitor.clone(),
            _ => None,
        }
    }

    fn with_monitor<F>(&self, f: F) -> bool
    where
        F: FnOnce(&Monitor) -> bool,
    {
        match self.monitor() {
            Some(monitor) => f(&monitor),
            None => {
                debug!("Metrics lifecycle not active, dropping sample");
                false
            }
        }
    }

    /// Close the window and run the finalizer.
    ///
    /// Runs at most once per controller. Returns `false` when not
    /// initialized, already finalized, or the request is unresolvable.
    pub fn finalize(&self, ctx: &RequestContext) -> bool {
        let (monitor, begin, end) = {
            let mut state = self.state.lock();
            if state.stage != Stage::Initialized {
                debug!(stage = ?state.stage, "Finalize skipped");
                return false;
            }
            let Some(monitor) = state.monitor.clone() else {
                return false;
            };
            let end = self.clock.now();
            state.end = Some(end);
            state.stage = Stage::Finalized;
            (monitor, state.begin, end)
        };
        finalizer::run(&monitor, ctx, begin, end)
    }

    pub fn record_latency(&self, millis: f64, module: &str, api: &str, method: &str) -> bool {
        self.with_monitor(|m| m.record_latency(millis, module, api, method))
    }

    pub fn record_response_count(&self, times: u64, module: &str, api: &str, method: &str, code: u16) -> bool {
        self.with_monitor(|m| m.record_response_count(times, module, api, method, code))
    }

    pub fn record_sent_bytes(&self, bytes: u64, module: &str, api: &str, method: &str, code: u16) -> bool {
        self.with_monitor(|m| m.record_sent_bytes(bytes, module, api, method, code))
    }

    pub fn record_received_bytes(&self, bytes: u64, module: &str, api: &str, method: &str, code: u16) -> bool {
        self.with_monitor(|m| m.record_received_bytes(bytes, module, api, method, code))
    }

    pub fn record_exception(&self, count: u64, exception: &str, module: &str) -> bool {
        self.with_monitor(|m| m.record_exception(count, exception, module))
    }

    pub fn record_gauge(&self, value: f64, state: &str) -> bool {
        self.with_monitor(|m| m.record_gauge(value, state))
    }

    /// Clear the backend. Fails if never initialized.
    pub fn flush(&self) -> bool {
        let monitor = self.state.lock().monitor.clone();
        match monitor {
            Some(monitor) => monitor.flush(),
            None => false,
        }
    }

    /// Exposition document and its content type; empty before
    /// initialization
    pub fn render(&self) -> (String, &'static str) {
        let monitor = self.state.lock().monitor.clone();
        let body = match monitor.map(|m| m.render()) {
            Some(Ok(body)) => body,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Failed to collect metrics");
                String::new()
            }
            None => String::new(),
        };
        (body, CONTENT_TYPE)
    }
}

impl ExceptionSink for Controller {
    fn record_exception(&self, count: u64, exception: &str, module: &str) -> bool {
        Controller::record_exception(self, count, exception, module)
    }
}

/// Process-end callback returned by [`Controller::initialize_with`]
pub struct ShutdownHook<'a> {
    controller: &'a Controller,
    monitor: Arc<Monitor>,
    source: Option<Box<dyn FnOnce() -> RequestContext + Send>>,
}

impl ShutdownHook<'_> {
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Whether dropping this guard finalizes the controller
    pub fn is_armed(&self) -> bool {
        self.source.is_some()
    }
}

impl Drop for ShutdownHook<'_> {
    fn drop(&mut self) {
        let Some(source) = self.source.take() else {
            return;
        };
        FaultObserver::new(self.controller).teardown_check();
        self.controller.finalize(&source());
    }
}
