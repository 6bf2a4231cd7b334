//! End-of-request pass

use std::sync::Arc;

use reqmetrics::lifecycle::ManualClock;
use reqmetrics::RequestContext;

use crate::common::{cumulative, histograms, labels, monitor, series};

const ROUTED: &str = r#"
app = "shop"
idc = "bj"
buckets = [10.0, 100.0, 1000.0]

[monitor_switch]
response_count = ["/api/search?limit&offset", "/api/search?q", "/api/items"]
latency = ["/api/search?q"]
sent_bytes = false
received_bytes = false
"#;

#[test]
fn test_unmatched_path_produces_no_route_scoped_sample() {
    let monitor = monitor(ROUTED, Arc::new(ManualClock::new(0.0)));
    let mut scope = monitor.begin_request();
    assert!(scope.finalize(&RequestContext::new("/checkout?limit=1", "GET", 200)));

    assert!(series(&monitor, "shop_module_responses").is_empty());
    assert!(histograms(&monitor, "shop_response_duration_milliseconds").is_empty());
}

#[test]
fn test_required_params_must_be_present() {
    let monitor = monitor(
        "app = \"shop\"\n[monitor_switch]\nresponse_count = [\"/a?x\"]",
        Arc::new(ManualClock::new(0.0)),
    );

    for uri in ["/a?x=1&y=2", "/a?y=2", "/a"] {
        monitor.begin_request().finalize(&RequestContext::new(uri, "GET", 200));
    }

    assert_eq!(
        series(&monitor, "shop_module_responses"),
        vec![(labels(&["shop", "/a?x", "self", "GET", "200"]), 1.0)]
    );
}

#[test]
fn test_first_satisfied_rule_labels_the_sample() {
    let clock = Arc::new(ManualClock::new(10.0));
    let monitor = monitor(ROUTED, clock.clone());
    let mut scope = monitor.begin_request();
    clock.set(10.05);
    scope.finalize(&RequestContext::new(
        "https://shop.example/api/search?q=shoes&limit=10&offset=0",
        "get",
        200,
    ));

    assert_eq!(
        series(&monitor, "shop_module_responses"),
        vec![(
            labels(&["shop", "/api/search?limit&offset", "self", "GET", "200"]),
            1.0
        )]
    );
    // latency rules differ per kind
    let latency = histograms(&monitor, "shop_response_duration_milliseconds");
    assert_eq!(latency.len(), 1);
    assert_eq!(latency[0].0, labels(&["shop", "/api/search?q", "self", "GET"]));
    let histogram = &latency[0].1;
    assert_eq!(histogram.get_sample_count(), 1);
    assert_eq!(histogram.get_sample_sum(), 50.0);
    assert_eq!(cumulative(histogram), vec![0, 1, 1]);
}

#[test]
fn test_observed_method_filter() {
    let toml = "app = \"shop\"\nlog_method = [\"GET\"]\n[monitor_switch]\nresponse_count = true";

    let monitor_get = monitor(toml, Arc::new(ManualClock::new(0.0)));
    assert!(monitor_get
        .begin_request()
        .finalize(&RequestContext::new("/x", "GET", 200)));
    assert_eq!(
        series(&monitor_get, "shop_module_responses"),
        vec![(labels(&["shop", "/x", "self", "GET", "200"]), 1.0)]
    );

    let monitor_delete = monitor(toml, Arc::new(ManualClock::new(0.0)));
    assert!(monitor_delete
        .begin_request()
        .finalize(&RequestContext::new("/x", "DELETE", 200)));
    assert!(monitor_delete.storage().collect().unwrap().is_empty());
}

#[test]
fn test_unresolvable_request_writes_nothing() {
    let monitor = monitor("app = \"shop\"", Arc::new(ManualClock::new(0.0)));

    assert!(!monitor.begin_request().finalize(&RequestContext::default()));
    assert!(!monitor
        .begin_request()
        .finalize(&RequestContext::new("?q=1", "GET", 200)));
    assert!(monitor.storage().collect().unwrap().is_empty());
}

#[test]
fn test_byte_counts_from_context() {
    let monitor = monitor("app = \"shop\"", Arc::new(ManualClock::new(0.0)));
    let ctx = RequestContext::new("/upload", "POST", 201)
        .with_sent_bytes(512)
        .with_received_bytes(0);
    monitor.begin_request().finalize(&ctx);

    assert_eq!(
        series(&monitor, "shop_module_sent_bytes"),
        vec![(labels(&["shop", "/upload", "self", "POST", "201"]), 512.0)]
    );
    // zero-sized bodies are not written
    assert!(series(&monitor, "shop_module_received_bytes").is_empty());
}
