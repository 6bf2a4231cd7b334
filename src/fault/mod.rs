//! Exception bridge
//!
//! Turns process-level fault events into Exception samples. Observers only
//! count: errors are handed back and panics keep unwinding.

mod layer;

pub use layer::FaultLayer;

use std::fmt;
use std::panic;
use std::sync::Arc;
use tracing::{debug, Level};

use crate::lifecycle::SELF_MODULE;

/// Class of a fault event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Notice,
    Warning,
    Error,
    Deprecated,
    Exception,
    Fatal,
}

impl Severity {
    /// Value of the `exception` label
    pub fn bucket(self) -> &'static str {
        match self {
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Deprecated => "info",
            Severity::Exception => "exception",
            Severity::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bucket())
    }
}

impl From<Level> for Severity {
    fn from(level: Level) -> Self {
        match level {
            Level::ERROR => Severity::Error,
            Level::WARN => Severity::Warning,
            _ => Severity::Notice,
        }
    }
}

/// Anything that can count exceptions
pub trait ExceptionSink: Send + Sync {
    fn record_exception(&self, count: u64, exception: &str, module: &str) -> bool;
}

impl<T: ExceptionSink + ?Sized> ExceptionSink for &T {
    fn record_exception(&self, count: u64, exception: &str, module: &str) -> bool {
        (**self).record_exception(count, exception, module)
    }
}

impl<T: ExceptionSink + ?Sized> ExceptionSink for Arc<T> {
    fn record_exception(&self, count: u64, exception: &str, module: &str) -> bool {
        (**self).record_exception(count, exception, module)
    }
}

/// Records fault events against a sink
pub struct FaultObserver<S> {
    sink: S,
    module: String,
}

impl<S: ExceptionSink> FaultObserver<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            module: SELF_MODULE.to_string(),
        }
    }

    /// Attribute samples to `module` instead of `self`
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Count one non-fatal event. Execution continues.
    pub fn notify(&self, severity: Severity) -> bool {
        debug!(%severity, module = %self.module, "Fault notification");
        self.sink.record_exception(1, severity.bucket(), &self.module)
    }

    /// Count an `Err` as an exception and return the result unchanged
    pub fn observe<T, E>(&self, result: Result<T, E>) -> Result<T, E> {
        if result.is_err() {
            self.notify(Severity::Exception);
        }
        result
    }

    /// Process-end check with the fatal error, if any, that ended it
    pub fn teardown(&self, fatal: Option<Severity>) -> bool {
        match fatal {
            Some(severity) => self.notify(severity),
            None => false,
        }
    }

    /// Record `error` when called while the current thread is unwinding.
    ///
    /// A panic that ends the process is counted in the same bucket as any
    /// other hard error; `Severity::Fatal` is only recorded when a caller
    /// passes it to [`teardown`](Self::teardown).
    pub fn teardown_check(&self) -> bool {
        let fatal = std::thread::panicking().then_some(Severity::Error);
        self.teardown(fatal)
    }
}

impl<S: ExceptionSink + 'static> FaultObserver<S> {
    /// Count every panic as an exception, then run the previous hook
    pub fn install_panic_hook(self) {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            self.notify(Severity::Exception);
            previous(info);
        }));
    }
}
