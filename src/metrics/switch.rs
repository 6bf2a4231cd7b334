//! Per-kind metric switches
//!
//! Each kind is either off, on for every request, or on only for requests
//! matching one of its route rules.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::kind::MetricKind;
use crate::router::RouteRule;

/// Raw value of a `monitor_switch` entry as written in configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SwitchValue {
    Flag(bool),
    Routes(Vec<String>),
}

/// Resolved switch for one kind
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Switch {
    Disabled,
    #[default]
    Unconditional,
    Routes(Vec<RouteRule>),
}

impl Switch {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Switch::Disabled)
    }
}

/// A switch entry that could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    /// Dotted config path of the entry
    pub key: String,
    pub reason: String,
}

/// Switches for every kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchConfig {
    switches: BTreeMap<MetricKind, Switch>,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            switches: MetricKind::ALL
                .into_iter()
                .map(|kind| (kind, Switch::Unconditional))
                .collect(),
        }
    }
}

impl SwitchConfig {
    /// Merge raw `monitor_switch` entries over the defaults.
    ///
    /// Unknown kinds and unparsable route specs are returned as rejected
    /// entries; a route list left empty after rejection disables the kind.
    pub fn compile(raw: &BTreeMap<String, SwitchValue>) -> (Self, Vec<RejectedEntry>) {
        let mut config = Self::default();
        let mut rejected = Vec::new();

        for (key, value) in raw {
            let kind = match key.parse::<MetricKind>() {
                Ok(kind) => kind,
                Err(reason) => {
                    rejected.push(RejectedEntry {
                        key: format!("monitor_switch.{key}"),
                        reason,
                    });
                    continue;
                }
            };

            let switch = match value {
                SwitchValue::Flag(true) => Switch::Unconditional,
                SwitchValue::Flag(false) => Switch::Disabled,
                SwitchValue::Routes(specs) => {
                    let mut rules = Vec::with_capacity(specs.len());
                    for spec in specs {
                        match RouteRule::parse(spec) {
                            Ok(rule) => rules.push(rule),
                            Err(e) => rejected.push(RejectedEntry {
                                key: format!("monitor_switch.{key}"),
                                reason: e.to_string(),
                            }),
                        }
                    }
                    if rules.is_empty() {
                        Switch::Disabled
                    } else {
                        Switch::Routes(rules)
                    }
                }
            };
            config.switches.insert(kind, switch);
        }

        (config, rejected)
    }

    pub fn get(&self, kind: MetricKind) -> &Switch {
        self.switches.get(&kind).unwrap_or(&Switch::Disabled)
    }

    pub fn set(&mut self, kind: MetricKind, switch: Switch) {
        self.switches.insert(kind, switch);
    }

    /// Kinds that are not disabled, in registration order
    pub fn enabled(&self) -> impl Iterator<Item = MetricKind> + '_ {
        self.switches
            .iter()
            .filter(|(_, switch)| switch.is_enabled())
            .map(|(kind, _)| *kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(&str, SwitchValue)]) -> BTreeMap<String, SwitchValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_defaults_enable_everything() {
        let (config, rejected) = SwitchConfig::compile(&BTreeMap::new());
        assert!(rejected.is_empty());
        assert_eq!(config.enabled().count(), MetricKind::ALL.len());
    }

    #[test]
    fn test_flags_and_routes() {
        let (config, rejected) = SwitchConfig::compile(&raw(&[
            ("sent_bytes", SwitchValue::Flag(false)),
            (
                "latency",
                SwitchValue::Routes(vec!["/a?x".into(), "/b".into()]),
            ),
            ("connections", SwitchValue::Routes(vec![])),
        ]));
        assert!(rejected.is_empty());
        assert_eq!(config.get(MetricKind::SentBytes), &Switch::Disabled);
        assert_eq!(config.get(MetricKind::Connections), &Switch::Disabled);
        assert_eq!(config.get(MetricKind::ResponseCount), &Switch::Unconditional);
        match config.get(MetricKind::Latency) {
            Switch::Routes(rules) => {
                assert_eq!(rules.len(), 2);
                assert_eq!(rules[0].raw(), "/a?x");
            }
            other => panic!("unexpected switch {other:?}"),
        }
    }

    #[test]
    fn test_rejections_are_reported() {
        let (config, rejected) = SwitchConfig::compile(&raw(&[
            ("qps", SwitchValue::Flag(true)),
            ("response_count", SwitchValue::Routes(vec!["?x".into()])),
        ]));
        assert_eq!(rejected.len(), 2);
        assert!(rejected.iter().any(|r| r.key == "monitor_switch.qps"));
        // every route rejected: the kind falls back to disabled
        assert_eq!(config.get(MetricKind::ResponseCount), &Switch::Disabled);
    }
}
