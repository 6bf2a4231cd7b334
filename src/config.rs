//! Configuration management
//!
//! Loads the monitor configuration from TOML, merges it over defaults and
//! validates it. Hard failures abort setup; soft rejections (unknown keys,
//! mistyped values, unusable switch entries) are collected into a
//! [`ConfigReport`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::error::ConfigError;
use crate::metrics::{RejectedEntry, SwitchConfig, SwitchValue};
use crate::storage::{check_buckets, Adapter};

/// Root configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name, also the metric name prefix
    pub app: String,
    /// Data-center tag, shown in help text
    pub idc: String,
    /// HTTP methods observed by the automatic pass
    pub log_method: Vec<String>,
    /// Latency histogram bounds in milliseconds; empty disables latency
    pub buckets: Vec<f64>,
    /// Storage backend name
    pub adapter: String,
    /// Connection parameters for the redis adapter
    pub redis: Option<RedisConfig>,
    /// Per-kind switches keyed by kind name
    pub monitor_switch: BTreeMap<String, SwitchValue>,
    pub logging: LoggingConfig,
    /// Entries dropped while parsing: unknown keys and mistyped values
    pub rejected: Vec<RejectedEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: "default".to_string(),
            idc: String::new(),
            log_method: vec!["GET".to_string(), "POST".to_string()],
            buckets: Vec::new(),
            adapter: Adapter::Memory.as_str().to_string(),
            redis: None,
            monitor_switch: BTreeMap::new(),
            logging: LoggingConfig::default(),
            rejected: Vec::new(),
        }
    }
}

/// Redis connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    /// Full connection URL; overrides host/port/password/database
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub database: i64,
    /// Connect timeout in milliseconds
    pub timeout_ms: u64,
    /// Key prefix for every stored key
    pub prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            database: 0,
            timeout_ms: 100,
            prefix: "reqmetrics".to_string(),
        }
    }
}

impl RedisConfig {
    /// URL handed to the redis client
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Output format: "json" or "pretty"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Configuration after validation
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub app: String,
    pub idc: String,
    /// Upper-cased methods
    pub log_method: Vec<String>,
    pub buckets: Vec<f64>,
    pub adapter: Adapter,
    pub redis: Option<RedisConfig>,
    pub switches: SwitchConfig,
}

impl ResolvedConfig {
    pub fn observes_method(&self, method: &str) -> bool {
        self.log_method.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// Entries dropped during validation
#[derive(Debug, Clone, Default)]
pub struct ConfigReport {
    pub rejected: Vec<RejectedEntry>,
}

impl ConfigReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text.
    ///
    /// Absent keys keep their defaults. Only malformed TOML is an error: an
    /// unknown key or a value of the wrong type is recorded in
    /// [`Config::rejected`] and the default is kept.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(contents)?;
        Ok(Self::from_table(table))
    }

    fn from_table(table: toml::Table) -> Self {
        let mut config = Self::default();
        let mut rejected = Vec::new();

        for (key, value) in table {
            let applied = match key.as_str() {
                "app" => assign(value, &mut config.app),
                "idc" => assign(value, &mut config.idc),
                "log_method" => assign(value, &mut config.log_method),
                "buckets" => assign(value, &mut config.buckets),
                "adapter" => assign(value, &mut config.adapter),
                "redis" => {
                    let mut redis = RedisConfig::default();
                    let merged = merge_section(&key, value, &mut redis, &mut rejected);
                    if merged.is_ok() {
                        config.redis = Some(redis);
                    }
                    merged
                }
                "logging" => merge_section(&key, value, &mut config.logging, &mut rejected),
                "monitor_switch" => merge_switches(value, &mut config.monitor_switch, &mut rejected),
                _ => Err("unknown configuration key".to_string()),
            };
            if let Err(reason) = applied {
                rejected.push(RejectedEntry { key, reason });
            }
        }

        config.rejected = rejected;
        config
    }

    /// Validate and resolve.
    ///
    /// `has_connection` tells whether the caller supplies a prebuilt backend
    /// connection, which satisfies the redis adapter without a `[redis]`
    /// section.
    pub fn validate(&self, has_connection: bool) -> Result<(ResolvedConfig, ConfigReport), ConfigError> {
        let adapter: Adapter = self.adapter.parse()?;
        if adapter.needs_connection() && self.redis.is_none() && !has_connection {
            return Err(ConfigError::MissingRedisConnection);
        }

        if !is_metric_prefix(&self.app) {
            return Err(ConfigError::InvalidApp(self.app.clone()));
        }

        check_buckets(&self.buckets).map_err(ConfigError::InvalidBuckets)?;

        let mut log_method = Vec::with_capacity(self.log_method.len());
        for method in &self.log_method {
            let method = method.trim();
            if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ConfigError::InvalidLogMethod(method.to_string()));
            }
            log_method.push(method.to_ascii_uppercase());
        }

        let (switches, switch_rejected) = SwitchConfig::compile(&self.monitor_switch);
        let mut rejected = self.rejected.clone();
        rejected.extend(switch_rejected);
        for entry in &rejected {
            warn!(key = %entry.key, reason = %entry.reason, "Ignoring configuration entry");
        }

        let resolved = ResolvedConfig {
            app: self.app.clone(),
            idc: self.idc.clone(),
            log_method,
            buckets: self.buckets.clone(),
            adapter,
            redis: self.redis.clone(),
            switches,
        };
        Ok((resolved, ConfigReport { rejected }))
    }
}

fn assign<T: DeserializeOwned>(value: toml::Value, slot: &mut T) -> Result<(), String> {
    *slot = value.try_into().map_err(|e: toml::de::Error| e.message().to_string())?;
    Ok(())
}

fn expect_table(value: toml::Value) -> Result<toml::Table, String> {
    match value {
        toml::Value::Table(table) => Ok(table),
        other => Err(format!("expected a table, found {}", other.type_str())),
    }
}

/// Apply a section's fields one at a time over `slot`, rejecting each field
/// that is unknown or does not fit its type.
fn merge_section<T>(
    section: &str,
    value: toml::Value,
    slot: &mut T,
    rejected: &mut Vec<RejectedEntry>,
) -> Result<(), String>
where
    T: Serialize + DeserializeOwned,
{
    let fields = expect_table(value)?;
    let defaults = toml::Value::try_from(&*slot).map_err(|e| e.to_string())?;
    let mut accepted = expect_table(defaults)?;

    for (field, value) in fields {
        let mut candidate = accepted.clone();
        candidate.insert(field.clone(), value);
        match toml::Value::Table(candidate.clone()).try_into::<T>() {
            Ok(_) => accepted = candidate,
            Err(e) => rejected.push(RejectedEntry {
                key: format!("{section}.{field}"),
                reason: e.message().to_string(),
            }),
        }
    }

    assign(toml::Value::Table(accepted), slot)
}

fn merge_switches(
    value: toml::Value,
    switches: &mut BTreeMap<String, SwitchValue>,
    rejected: &mut Vec<RejectedEntry>,
) -> Result<(), String> {
    for (kind, value) in expect_table(value)? {
        match value.try_into::<SwitchValue>() {
            Ok(switch) => {
                switches.insert(kind, switch);
            }
            Err(_) => rejected.push(RejectedEntry {
                key: format!("monitor_switch.{kind}"),
                reason: "expected true, false or a list of route specs".to_string(),
            }),
        }
    }
    Ok(())
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn is_metric_prefix(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
