//! Tracing/logging initialization

use anyhow::Result;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::Identity,
    prelude::*,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;
use crate::fault::{ExceptionSink, FaultLayer};

/// Initialize the tracing subscriber based on configuration.
///
/// Fails if the host already installed a global subscriber.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    install(config, Identity::new())
}

/// Same as [`init_tracing`], also counting host WARN/ERROR events as
/// Exception samples on `sink`
pub fn init_tracing_with_faults<S>(config: &LoggingConfig, sink: S) -> Result<()>
where
    S: ExceptionSink + 'static,
{
    install(config, FaultLayer::new(sink))
}

fn install<L>(config: &LoggingConfig, extra: L) -> Result<()>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(extra).with(filter);

    match config.format.as_str() {
        "json" => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE);
            subscriber.with(fmt_layer).try_init()?;
        }
        _ => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_span_events(FmtSpan::CLOSE);
            subscriber.with(fmt_layer).try_init()?;
        }
    }

    Ok(())
}
