//! Runtime configuration.
//!
//! A flat key/value schema persisted as pretty JSON under
//! `$HOME/.mc-sentry/config.json`. Mutation goes through [`ConfigStore::set`],
//! which coerces the value to the key's declared type, rewrites the whole
//! file, then reloads it. Readers take cheap [`ConfigStore::snapshot`] copies
//! and tolerate eventually-consistent values.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::probe::Endpoint;

/// Well-known file locations under the per-user data directory.
///
/// Everything lives in `$HOME/.mc-sentry/`, with a temp-dir fallback when
/// HOME is not available.
pub struct Paths;

impl Paths {
    fn data_dir() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".mc-sentry");
        }
        std::env::temp_dir().join("mc-sentry")
    }

    /// `$HOME/.mc-sentry/config.json`
    pub fn config_file_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    /// Directory holding the rolling log files.
    pub fn log_dir() -> PathBuf {
        Self::data_dir().join("log")
    }

    /// `$HOME/.mc-sentry/.config.env` (token file, see the discord module).
    pub fn config_env_path() -> PathBuf {
        Self::data_dir().join(".config.env")
    }

    pub fn ensure_log_directory() -> std::io::Result<()> {
        std::fs::create_dir_all(Self::log_dir())
    }
}

/// Default seconds between probes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// The persisted configuration document. Identifier fields use 0 for
/// "not configured".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    pub monitored_endpoint: Option<String>,
    pub polling_interval_seconds: u64,
    pub notification_channel_id: u64,
    pub mention_role_id: u64,
    pub guild_id: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            monitored_endpoint: None,
            polling_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            notification_channel_id: 0,
            mention_role_id: 0,
            guild_id: 0,
        }
    }
}

/// The fixed configuration schema. Anything outside this set is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    MonitoredEndpoint,
    PollingIntervalSeconds,
    NotificationChannelId,
    MentionRoleId,
    GuildId,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::MonitoredEndpoint,
        ConfigKey::PollingIntervalSeconds,
        ConfigKey::NotificationChannelId,
        ConfigKey::MentionRoleId,
        ConfigKey::GuildId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::MonitoredEndpoint => "monitored_endpoint",
            ConfigKey::PollingIntervalSeconds => "polling_interval_seconds",
            ConfigKey::NotificationChannelId => "notification_channel_id",
            ConfigKey::MentionRoleId => "mention_role_id",
            ConfigKey::GuildId => "guild_id",
        }
    }

    fn parse(key: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to write configuration: {0}")]
    Persistence(#[source] std::io::Error),
    #[error("failed to encode configuration: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to load configuration from {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// Literal values that clear the monitored endpoint.
const UNSET_LITERALS: [&str; 3] = ["none", "null", "unset"];

/// In-memory configuration plus its on-disk location.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    values: BotConfig,
}

impl ConfigStore {
    /// Loads the config file, creating it with defaults on first run.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        let mut store = Self {
            path: path.to_path_buf(),
            values: BotConfig::default(),
        };
        if !path.exists() {
            store.persist()?;
            info!("Config: created default configuration at {:?}", path);
            return Ok(store);
        }
        store.reload()?;
        info!("Config: loaded configuration from {:?}", path);
        Ok(store)
    }

    /// Store backed by `path` with the given values, without touching disk.
    pub fn with_values(path: &Path, values: BotConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            values,
        }
    }

    /// Cheap copy for readers (monitor loop, command echo).
    pub fn snapshot(&self) -> BotConfig {
        self.values.clone()
    }

    /// Renders the current value of `key` for display.
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let key = ConfigKey::parse(key)?;
        Ok(self.render(key))
    }

    pub fn render(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::MonitoredEndpoint => self
                .values
                .monitored_endpoint
                .clone()
                .unwrap_or_else(|| "none".to_string()),
            ConfigKey::PollingIntervalSeconds => self.values.polling_interval_seconds.to_string(),
            ConfigKey::NotificationChannelId => self.values.notification_channel_id.to_string(),
            ConfigKey::MentionRoleId => self.values.mention_role_id.to_string(),
            ConfigKey::GuildId => self.values.guild_id.to_string(),
        }
    }

    /// Validates and applies one `key = value` mutation, then writes the
    /// whole document back to disk and reloads it.
    ///
    /// On a coercion failure the store is left untouched. On a persistence
    /// failure the in-memory value stays applied; the divergence is logged
    /// and surfaced to the caller.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = ConfigKey::parse(key)?;
        let value = value.trim();
        match key {
            ConfigKey::MonitoredEndpoint => {
                if UNSET_LITERALS.contains(&value.to_ascii_lowercase().as_str()) {
                    self.values.monitored_endpoint = None;
                } else {
                    let endpoint: Endpoint = value.parse().map_err(|e| ConfigError::Invalid {
                        key: key.as_str(),
                        reason: format!("{e}"),
                    })?;
                    self.values.monitored_endpoint = Some(endpoint.to_string());
                }
            }
            ConfigKey::PollingIntervalSeconds => {
                let secs = Self::coerce_u64(key, value)?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        key: key.as_str(),
                        reason: "must be at least 1 second".to_string(),
                    });
                }
                self.values.polling_interval_seconds = secs;
            }
            ConfigKey::NotificationChannelId => {
                self.values.notification_channel_id = Self::coerce_u64(key, value)?;
            }
            ConfigKey::MentionRoleId => {
                self.values.mention_role_id = Self::coerce_u64(key, value)?;
            }
            ConfigKey::GuildId => {
                self.values.guild_id = Self::coerce_u64(key, value)?;
            }
        }

        // Full rewrite, then reload, so memory always mirrors what the
        // next startup will read.
        match self.persist() {
            Ok(()) => self.reload(),
            Err(e) => {
                error!("Config: persisting after set {} failed: {}", key.as_str(), e);
                Err(e)
            }
        }
    }

    fn coerce_u64(key: ConfigKey, value: &str) -> Result<u64, ConfigError> {
        value.parse::<u64>().map_err(|_| ConfigError::Invalid {
            key: key.as_str(),
            reason: format!("'{value}' is not a non-negative integer"),
        })
    }

    /// Rewrites the whole config file.
    pub fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Persistence)?;
        }
        let json = serde_json::to_string_pretty(&self.values).map_err(ConfigError::Serialize)?;
        std::fs::write(&self.path, json).map_err(ConfigError::Persistence)
    }

    /// Replaces in-memory values with whatever is on disk.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::Load {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        self.values = serde_json::from_str(&content).map_err(|e| ConfigError::Load {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// Shared handle used by the monitor loop and the command surface.
/// Critical sections are short and never held across an await.
pub type SharedConfigStore = Arc<Mutex<ConfigStore>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::load_or_init(&dir.path().join("config.json")).unwrap()
    }

    #[test]
    fn interval_is_coerced_to_integer() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set("polling_interval_seconds", "30").unwrap();
        assert_eq!(store.snapshot().polling_interval_seconds, 30);
        assert_eq!(store.get("polling_interval_seconds").unwrap(), "30");
    }

    #[test]
    fn unknown_key_is_rejected_and_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let before = store.snapshot();
        match store.set("ping_intervall", "30") {
            Err(ConfigError::UnknownKey(k)) => assert_eq!(k, "ping_intervall"),
            other => panic!("expected UnknownKey, got {other:?}"),
        }
        assert!(store.get("ping_intervall").is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn uncoercible_value_is_rejected_and_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let before = store.snapshot();
        assert!(matches!(
            store.set("polling_interval_seconds", "abc"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            store.set("notification_channel_id", "-4"),
            Err(ConfigError::Invalid { .. })
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        assert!(matches!(
            store.set("polling_interval_seconds", "0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert_eq!(
            store.snapshot().polling_interval_seconds,
            DEFAULT_POLL_INTERVAL_SECS
        );
    }

    #[test]
    fn endpoint_accepts_host_port_and_unset_literals() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set("monitored_endpoint", "mc.example.com:25570").unwrap();
        assert_eq!(
            store.snapshot().monitored_endpoint.as_deref(),
            Some("mc.example.com:25570")
        );
        assert!(matches!(
            store.set("monitored_endpoint", "mc.example.com:notaport"),
            Err(ConfigError::Invalid { .. })
        ));
        store.set("monitored_endpoint", "none").unwrap();
        assert_eq!(store.snapshot().monitored_endpoint, None);
        assert_eq!(store.get("monitored_endpoint").unwrap(), "none");
    }

    #[test]
    fn persisted_values_round_trip_through_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        {
            let mut store = ConfigStore::load_or_init(&path).unwrap();
            store.set("monitored_endpoint", "play.example.net").unwrap();
            store.set("polling_interval_seconds", "15").unwrap();
            store.set("notification_channel_id", "123456789").unwrap();
        }
        let reopened = ConfigStore::load_or_init(&path).unwrap();
        let snap = reopened.snapshot();
        // The default port is made explicit by coercion before persisting.
        assert_eq!(
            snap.monitored_endpoint.as_deref(),
            Some("play.example.net:25565")
        );
        assert_eq!(snap.polling_interval_seconds, 15);
        assert_eq!(snap.notification_channel_id, 123_456_789);
    }

    #[test]
    fn first_run_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = ConfigStore::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.snapshot(), BotConfig::default());
    }
}
