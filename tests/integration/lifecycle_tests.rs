//! Controller lifecycle

use std::sync::Arc;
use std::thread;

use reqmetrics::lifecycle::{ManualClock, MonitorBuilder, Stage};
use reqmetrics::storage::MemoryStorage;
use reqmetrics::{Config, Controller, Monitor, RequestContext, CONTENT_TYPE};

use crate::common::{histograms, labels, monitor, series};

fn builder(toml: &str) -> MonitorBuilder {
    Monitor::builder(Config::from_toml_str(toml).unwrap()).storage(Arc::new(MemoryStorage::new()))
}

fn request() -> RequestContext {
    RequestContext::new("/x", "GET", 200)
}

#[test]
fn test_process_end_twice_writes_one_sample_set() {
    let clock = Arc::new(ManualClock::new(100.0));
    let controller = Controller::with_clock(clock.clone());
    let hook = controller
        .initialize_with(builder("app = \"shop\"\nbuckets = [100.0, 200.0]"), request)
        .unwrap();
    let monitor = Arc::clone(hook.monitor());
    clock.set(100.1234);

    assert!(controller.finalize(&request()));
    assert!(!controller.finalize(&request()));
    drop(hook);

    assert_eq!(
        series(&monitor, "shop_module_responses"),
        vec![(labels(&["shop", "/x", "self", "GET", "200"]), 1.0)]
    );
    let latency = histograms(&monitor, "shop_response_duration_milliseconds");
    assert_eq!(latency.len(), 1);
    assert_eq!(latency[0].1.get_sample_count(), 1);
    assert_eq!(latency[0].1.get_sample_sum(), 123.0);
}

#[test]
fn test_disabled_kind_manual_calls_fail() {
    let controller = Controller::with_clock(Arc::new(ManualClock::new(0.0)));
    let hook = controller
        .initialize_with(
            builder("app = \"shop\"\nbuckets = [10.0]\n[monitor_switch]\nlatency = false\nexception = false"),
            request,
        )
        .unwrap();

    assert!(hook.monitor().registry().get(reqmetrics::MetricKind::Latency).is_none());
    assert!(!controller.record_latency(5.0, "self", "/x", "GET"));
    assert!(!controller.record_exception(1, "warning", "self"));
    assert!(controller.record_response_count(1, "self", "/x", "GET", 200));
}

#[test]
fn test_uninitialized_flush_has_no_side_effect() {
    let config = Config::from_toml_str("app = \"shared_check\"\nadapter = \"apcu\"").unwrap();
    let monitor = Monitor::new(config).unwrap();
    assert!(monitor.record_gauge(2.0, "active"));

    let controller = Controller::new();
    assert!(!controller.flush());
    assert_eq!(controller.render(), (String::new(), CONTENT_TYPE));
    assert_eq!(controller.stage(), Stage::Uninitialized);

    assert_eq!(
        series(&monitor, "shared_check_module_connections"),
        vec![(labels(&["shared_check", "active"]), 2.0)]
    );
}

#[test]
fn test_shutdown_hook_reads_context_at_drop() {
    let controller = Controller::with_clock(Arc::new(ManualClock::new(0.0)));
    let monitor = {
        let hook = controller
            .initialize_with(builder("app = \"shop\""), || RequestContext::new("/late", "POST", 500))
            .unwrap();
        assert!(controller.record_response_count(2, "search", "/api", "GET", 200));
        Arc::clone(hook.monitor())
    };

    assert_eq!(controller.stage(), Stage::Finalized);
    let responses = series(&monitor, "shop_module_responses");
    assert_eq!(responses.len(), 2);
    assert!(responses.contains(&(labels(&["shop", "/late", "self", "POST", "500"]), 1.0)));
    assert!(responses.contains(&(labels(&["shop", "/api", "search", "GET", "200"]), 2.0)));
}

#[test]
fn test_concurrent_request_scopes() {
    let monitor = monitor("app = \"shop\"", Arc::new(ManualClock::new(0.0)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || {
                for _ in 0..25 {
                    let mut scope = monitor.begin_request();
                    assert!(scope.finalize(&RequestContext::new("/x", "GET", 200)));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        series(&monitor, "shop_module_responses"),
        vec![(labels(&["shop", "/x", "self", "GET", "200"]), 200.0)]
    );
}

#[test]
fn test_render_document() {
    let controller = Controller::with_clock(Arc::new(ManualClock::new(0.0)));
    let _hook = controller
        .initialize_with(builder("app = \"shop\"\nidc = \"bj\""), request)
        .unwrap();
    controller.record_response_count(1, "self", "/x", "GET", 200);
    controller.record_gauge(4.0, "active");

    let (body, content_type) = controller.render();
    assert_eq!(content_type, "text/plain; version=0.0.4");
    assert_eq!(content_type, CONTENT_TYPE);
    assert_eq!(
        body,
        "# HELP shop_module_connections [bj] number of http connections\n\
         # TYPE shop_module_connections gauge\n\
         shop_module_connections{app=\"shop\",state=\"active\"} 4\n\
         # HELP shop_module_responses [bj] number of /path\n\
         # TYPE shop_module_responses counter\n\
         shop_module_responses{api=\"/x\",app=\"shop\",code=\"200\",method=\"GET\",module=\"self\"} 1\n"
    );
}
