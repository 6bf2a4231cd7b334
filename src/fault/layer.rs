//! Tracing layer feeding the exception bridge

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::{ExceptionSink, FaultObserver, Severity};

/// Counts WARN and ERROR events as Exception samples.
///
/// Events emitted by this crate are skipped so a failing write cannot feed
/// back into itself.
pub struct FaultLayer<S> {
    observer: FaultObserver<S>,
}

impl<S: ExceptionSink> FaultLayer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            observer: FaultObserver::new(sink),
        }
    }

    pub fn with_module(self, module: impl Into<String>) -> Self {
        Self {
            observer: self.observer.with_module(module),
        }
    }
}

impl<S, Sub> Layer<Sub> for FaultLayer<S>
where
    S: ExceptionSink + 'static,
    Sub: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, Sub>) {
        let meta = event.metadata();
        if *meta.level() > Level::WARN || is_own_target(meta.target()) {
            return;
        }
        self.observer.notify(Severity::from(*meta.level()));
    }
}

fn is_own_target(target: &str) -> bool {
    const CRATE: &str = env!("CARGO_CRATE_NAME");
    target == CRATE || target.strip_prefix(CRATE).is_some_and(|rest| rest.starts_with("::"))
}
