//! Storage adapters behind a monitor

use std::sync::Arc;

use reqmetrics::error::{ConfigError, Error};
use reqmetrics::lifecycle::ManualClock;
use reqmetrics::{Config, Monitor, RequestContext};

use crate::common::{labels, series};

#[test]
fn test_apc_monitors_share_samples() {
    let config = || Config::from_toml_str("app = \"apc_shared\"\nadapter = \"apc\"").unwrap();
    let first = Arc::new(Monitor::new(config()).unwrap());
    let second = Arc::new(Monitor::new(config()).unwrap());

    first.begin_request().finalize(&RequestContext::new("/x", "GET", 200));
    second.begin_request().finalize(&RequestContext::new("/x", "GET", 200));

    assert_eq!(
        series(&second, "apc_shared_module_responses"),
        vec![(labels(&["apc_shared", "/x", "self", "GET", "200"]), 2.0)]
    );
}

#[test]
fn test_memory_monitors_are_private() {
    let config = || Config::from_toml_str("app = \"private\"").unwrap();
    let first = Monitor::new(config()).unwrap();
    let second = Monitor::new(config()).unwrap();

    assert!(first.record_response_count(1, "self", "/x", "GET", 200));
    assert!(series(&second, "private_module_responses").is_empty());
}

#[test]
fn test_redis_without_connection_fails_setup() {
    let config = Config::from_toml_str("adapter = \"redis\"").unwrap();
    match Monitor::new(config) {
        Err(Error::Config(ConfigError::MissingRedisConnection)) => {}
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("redis adapter built without connection parameters"),
    }
}

#[test]
fn test_unknown_entries_are_reported() {
    let config = Config::from_toml_str(
        "app = \"shop\"\ncolour = \"blue\"\n[monitor_switch]\nqueue_depth = true\nresponse_count = [\"?q\"]",
    )
    .unwrap();
    let monitor = Monitor::new(config).unwrap();

    let keys: Vec<&str> = monitor.report().rejected.iter().map(|r| r.key.as_str()).collect();
    assert!(keys.contains(&"colour"));
    assert!(keys.contains(&"monitor_switch.queue_depth"));
    assert!(keys.contains(&"monitor_switch.response_count"));
    // the only route was rejected, so the kind is off
    assert!(!monitor.record_response_count(1, "self", "/x", "GET", 200));
}

#[test]
fn test_redis_roundtrip_through_monitor() {
    let Ok(url) = std::env::var("TEST_REDIS_URL") else {
        return;
    };
    let config = Config::from_toml_str(&format!(
        "app = \"redis_it\"\nadapter = \"redis\"\n[redis]\nurl = \"{url}\"\nprefix = \"reqmetrics_it\""
    ))
    .unwrap();
    let monitor = Arc::new(
        Monitor::builder(config)
            .clock(Arc::new(ManualClock::new(0.0)))
            .build()
            .unwrap(),
    );
    assert!(monitor.flush());

    monitor.begin_request().finalize(&RequestContext::new("/x", "GET", 200));
    assert_eq!(
        series(&monitor, "redis_it_module_responses"),
        vec![(labels(&["redis_it", "/x", "self", "GET", "200"]), 1.0)]
    );
    assert!(monitor.flush());
}
