//! Engine configuration.
//!
//! Loaded from a JSON file or from `INDO_*` environment variables. Values are
//! normalized and validated before the engine sees them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connectivity::DEFAULT_HEALTH_PATH;
use crate::models::EntityTable;
use crate::queue::MutationQueue;
use crate::util::{normalize_http_base_url, normalize_text_option};
use crate::{Error, Result};

pub const ENV_API_URL: &str = "INDO_API_URL";
pub const ENV_API_KEY: &str = "INDO_API_KEY";
pub const ENV_ACCESS_TOKEN: &str = "INDO_ACCESS_TOKEN";
pub const ENV_POLL_INTERVAL_SECS: &str = "INDO_POLL_INTERVAL_SECS";
pub const ENV_QUEUE_PATH: &str = "INDO_QUEUE_PATH";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 45;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 4;
const MAX_POLL_INTERVAL_SECS: u64 = 24 * 60 * 60;
const MAX_PROBE_TIMEOUT_SECS: u64 = 300;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub api_base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_realtime_tables")]
    pub realtime_tables: Vec<EntityTable>,
    #[serde(default)]
    pub queue_path: Option<PathBuf>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EngineConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("health_path", &self.health_path)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .field("realtime_tables", &self.realtime_tables)
            .field("queue_path", &self.queue_path)
            .finish()
    }
}

fn default_health_path() -> String {
    DEFAULT_HEALTH_PATH.to_string()
}

const fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

const fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_realtime_tables() -> Vec<EntityTable> {
    EntityTable::ALL.to_vec()
}

impl EngineConfig {
    pub fn new(api_base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            api_key: api_key.into(),
            access_token: None,
            health_path: default_health_path(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            realtime_tables: default_realtime_tables(),
            queue_path: None,
        }
    }

    /// Build from `INDO_*` variables; `None` when the API URL is unset.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let Some(api_base_url) = normalize_text_option(lookup(ENV_API_URL)) else {
            return Ok(None);
        };
        let api_key = normalize_text_option(lookup(ENV_API_KEY))
            .ok_or_else(|| Error::Config(format!("{ENV_API_KEY} is required with {ENV_API_URL}")))?;

        let mut config = Self::new(api_base_url, api_key);
        config.access_token = normalize_text_option(lookup(ENV_ACCESS_TOKEN));
        if let Some(raw) = normalize_text_option(lookup(ENV_POLL_INTERVAL_SECS)) {
            config.poll_interval_secs = raw.parse().map_err(|_| {
                Error::Config(format!("{ENV_POLL_INTERVAL_SECS} must be a whole number"))
            })?;
        }
        config.queue_path = normalize_text_option(lookup(ENV_QUEUE_PATH)).map(PathBuf::from);

        config.validated().map(Some)
    }

    /// Trim and check every field
    pub fn validated(mut self) -> Result<Self> {
        self.api_base_url = normalize_required_http_url(&self.api_base_url, "api_base_url")?;
        self.api_key = normalize_text_option(Some(self.api_key))
            .ok_or_else(|| Error::Config("field 'api_key' is required".to_string()))?;
        self.access_token = normalize_text_option(self.access_token);
        self.health_path = normalize_text_option(Some(self.health_path))
            .unwrap_or_else(default_health_path);

        check_secs("poll_interval_secs", self.poll_interval_secs, MAX_POLL_INTERVAL_SECS)?;
        check_secs("probe_timeout_secs", self.probe_timeout_secs, MAX_PROBE_TIMEOUT_SECS)?;

        let mut seen = HashSet::new();
        self.realtime_tables.retain(|table| seen.insert(*table));
        Ok(self)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn resolved_queue_path(&self) -> PathBuf {
        self.queue_path
            .clone()
            .unwrap_or_else(MutationQueue::default_path)
    }
}

fn check_secs(field: &str, value: u64, max: u64) -> Result<()> {
    if value == 0 || value > max {
        return Err(Error::Config(format!(
            "field '{field}' must be between 1 and {max} seconds"
        )));
    }
    Ok(())
}

/// Parse and validate a JSON config document.
pub fn parse_engine_config(payload: &str) -> Result<EngineConfig> {
    let config: EngineConfig = serde_json::from_str(payload)
        .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
    config.validated()
}

pub fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let payload = std::fs::read_to_string(path).map_err(|error| {
        Error::Config(format!("failed to read {}: {error}", path.display()))
    })?;
    parse_engine_config(&payload)
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("indo").join("config.json"))
}

fn normalize_required_http_url(raw: &str, field: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(Error::Config(format!("field '{field}' is required")));
    }
    normalize_http_base_url(raw).ok_or_else(|| {
        Error::Config(format!("field '{field}' must include http:// or https://"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn parse_applies_defaults_and_normalizes() {
        let config = parse_engine_config(
            r#"{
                "api_base_url": " https://api.example.com/ ",
                "api_key": " anon "
            }"#,
        )
        .unwrap();

        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.api_key, "anon");
        assert_eq!(config.health_path, "/api/health");
        assert_eq!(config.poll_interval(), Duration::from_secs(45));
        assert_eq!(config.probe_timeout(), Duration::from_secs(4));
        assert_eq!(config.realtime_tables, EntityTable::ALL.to_vec());
        assert_eq!(config.access_token, None);
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let error = parse_engine_config(
            r#"{"api_base_url": "https://x.io", "api_key": "k", "region": "eu"}"#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("region"));
    }

    #[test]
    fn parse_rejects_bad_values() {
        assert!(parse_engine_config(r#"{"api_base_url": "x.io", "api_key": "k"}"#).is_err());
        assert!(parse_engine_config(r#"{"api_base_url": "https://x.io", "api_key": " "}"#)
            .is_err());
        assert!(parse_engine_config(
            r#"{"api_base_url": "https://x.io", "api_key": "k", "poll_interval_secs": 0}"#
        )
        .is_err());
    }

    #[test]
    fn parse_reads_table_names() {
        let config = parse_engine_config(
            r#"{"api_base_url": "https://x.io", "api_key": "k", "realtime_tables": ["tasks", "time_entries"]}"#,
        )
        .unwrap();
        assert_eq!(
            config.realtime_tables,
            vec![EntityTable::Tasks, EntityTable::TimeEntries]
        );
    }

    #[test]
    fn env_lookup_builds_config() {
        let vars = HashMap::from([
            (ENV_API_URL, "https://api.example.com"),
            (ENV_API_KEY, "anon"),
            (ENV_ACCESS_TOKEN, "session"),
            (ENV_POLL_INTERVAL_SECS, "30"),
            (ENV_QUEUE_PATH, "/tmp/indo/queue.db"),
        ]);
        let config = EngineConfig::from_lookup(|key| vars.get(key).map(ToString::to_string))
            .unwrap()
            .unwrap();

        assert_eq!(config.access_token.as_deref(), Some("session"));
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(
            config.resolved_queue_path(),
            PathBuf::from("/tmp/indo/queue.db")
        );
    }

    #[test]
    fn env_lookup_without_url_is_none() {
        assert!(EngineConfig::from_lookup(|_| None).unwrap().is_none());
    }

    #[test]
    fn env_lookup_requires_key_and_numeric_interval() {
        let missing_key = HashMap::from([(ENV_API_URL, "https://x.io")]);
        assert!(
            EngineConfig::from_lookup(|key| missing_key.get(key).map(ToString::to_string))
                .is_err()
        );

        let bad_interval = HashMap::from([
            (ENV_API_URL, "https://x.io"),
            (ENV_API_KEY, "k"),
            (ENV_POLL_INTERVAL_SECS, "soon"),
        ]);
        assert!(
            EngineConfig::from_lookup(|key| bad_interval.get(key).map(ToString::to_string))
                .is_err()
        );
    }

    #[test]
    fn oversized_intervals_are_rejected() {
        let huge_poll = format!(
            r#"{{"api_base_url": "https://x.io", "api_key": "k", "poll_interval_secs": {}}}"#,
            u64::MAX
        );
        assert!(parse_engine_config(&huge_poll).is_err());
        assert!(parse_engine_config(
            r#"{"api_base_url": "https://x.io", "api_key": "k", "probe_timeout_secs": 301}"#
        )
        .is_err());

        let at_limit = parse_engine_config(
            r#"{"api_base_url": "https://x.io", "api_key": "k", "poll_interval_secs": 86400}"#,
        )
        .unwrap();
        assert_eq!(at_limit.poll_interval(), Duration::from_secs(86_400));

        let max = u64::MAX.to_string();
        let vars = HashMap::from([
            (ENV_API_URL, "https://x.io"),
            (ENV_API_KEY, "k"),
            (ENV_POLL_INTERVAL_SECS, max.as_str()),
        ]);
        assert!(EngineConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).is_err());
    }

    #[test]
    fn duplicate_tables_are_dropped_in_order() {
        let config = parse_engine_config(
            r#"{"api_base_url": "https://x.io", "api_key": "k", "realtime_tables": ["tasks", "notes", "tasks"]}"#,
        )
        .unwrap();
        assert_eq!(
            config.realtime_tables,
            vec![EntityTable::Tasks, EntityTable::Notes]
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = EngineConfig::new("https://x.io", "secret-key");
        config.access_token = Some("secret-token".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(!debug.contains("secret-token"));
    }
}
