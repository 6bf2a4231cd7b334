//! End-of-request pass
//!
//! Resolves, for every registered kind, whether the request contributes a
//! sample and under which `api` label, then writes the samples.

use tracing::{debug, warn};

use super::clock::elapsed_millis;
use super::context::RequestContext;
use super::monitor::Monitor;
use crate::metrics::{MetricKind, Switch};
use crate::router::{self, ParsedUri};

/// Module label used by the automatic pass
pub const SELF_MODULE: &str = "self";

/// Write the sample set for one request.
///
/// Returns `false` when the request could not be resolved (no uri, no
/// method, or no path in the uri). A method outside `log_method` is not a
/// failure: the pass completes without writing anything.
pub(crate) fn run(monitor: &Monitor, ctx: &RequestContext, begin: f64, end: f64) -> bool {
    let (Some(uri), Some(method)) = (ctx.uri.as_deref(), ctx.method.as_deref()) else {
        debug!("Request uri or method unavailable, skipping metrics");
        return false;
    };

    let request = match ParsedUri::parse(uri) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Unparsable request uri, skipping metrics");
            return false;
        }
    };

    let config = monitor.config();
    if !config.observes_method(method) {
        debug!(%method, "Method not observed");
        return true;
    }

    let method = method.to_ascii_uppercase();
    let code = ctx.response_code.to_string();
    let mut written = 0usize;

    for metric in monitor.registry().iter() {
        let api = match config.switches.get(metric.kind) {
            Switch::Disabled => continue,
            Switch::Unconditional => request.path.as_str(),
            Switch::Routes(rules) => match router::matches(&request, rules) {
                Some(raw) => raw,
                None => continue,
            },
        };

        let value = match metric.kind {
            MetricKind::ResponseCount => Some(1.0),
            MetricKind::SentBytes => ctx.sent_bytes.map(|b| b as f64),
            MetricKind::ReceivedBytes => ctx.received_bytes.map(|b| b as f64),
            MetricKind::Latency => Some(elapsed_millis(begin, end)),
            MetricKind::Connections | MetricKind::Exception => None,
        };
        let labels = match metric.kind {
            MetricKind::ResponseCount | MetricKind::SentBytes | MetricKind::ReceivedBytes => Some(vec![
                config.app.clone(),
                api.to_string(),
                SELF_MODULE.to_string(),
                method.clone(),
                code.clone(),
            ]),
            MetricKind::Latency => Some(vec![
                config.app.clone(),
                api.to_string(),
                SELF_MODULE.to_string(),
                method.clone(),
            ]),
            MetricKind::Connections | MetricKind::Exception => None,
        };

        // zero or missing values would skew aggregation
        let (Some(value), Some(labels)) = (value.filter(|v| *v > 0.0), labels) else {
            continue;
        };

        match metric.instrument.record(value, &labels) {
            Ok(()) => written += 1,
            Err(e) => warn!(kind = %metric.kind, error = %e, "Failed to write sample"),
        }
    }

    debug!(path = %request.path, %method, samples = written, "Request metrics finalized");
    true
}
