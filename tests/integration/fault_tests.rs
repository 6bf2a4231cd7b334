//! Exception bridge against a live monitor

use std::sync::Arc;

use reqmetrics::fault::{FaultObserver, Severity};
use reqmetrics::lifecycle::ManualClock;

use crate::common::{labels, monitor, series};

#[test]
fn test_warning_notification_records_one_sample() {
    let monitor = monitor("app = \"shop\"", Arc::new(ManualClock::new(0.0)));
    let observer = FaultObserver::new(Arc::clone(&monitor));

    assert!(observer.notify(Severity::Warning));
    // execution continues and later work is still recorded
    assert!(monitor.record_gauge(1.0, "active"));

    assert_eq!(
        series(&monitor, "shop_module_exceptions"),
        vec![(labels(&["shop", "warning", "self"]), 1.0)]
    );
}

#[test]
fn test_observed_error_is_propagated() {
    let monitor = monitor("app = \"shop\"", Arc::new(ManualClock::new(0.0)));
    let observer = FaultObserver::new(Arc::clone(&monitor)).with_module("payments");

    let result: Result<(), std::io::Error> = observer.observe(Err(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        "gateway timeout",
    )));

    let err = result.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    assert_eq!(err.to_string(), "gateway timeout");
    assert_eq!(
        series(&monitor, "shop_module_exceptions"),
        vec![(labels(&["shop", "exception", "payments"]), 1.0)]
    );
}

#[test]
fn test_disabled_exception_kind_does_not_fail_host() {
    let monitor = monitor(
        "app = \"shop\"\n[monitor_switch]\nexception = false",
        Arc::new(ManualClock::new(0.0)),
    );
    let observer = FaultObserver::new(Arc::clone(&monitor));

    assert!(!observer.notify(Severity::Error));
    assert!(series(&monitor, "shop_module_exceptions").is_empty());
}
