//! TOML-based application configuration.
//!
//! Stores engine settings including:
//! - Accrual and advisory cadences
//! - Lockout policy (rollover rule)
//! - Advisory oracle endpoint and timeout
//! - Emergency notification channel
//!
//! Configuration is stored at `~/.config/screenwarden/config.toml`.
//! Credentials never live here; see [`crate::credentials`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::advisory::DEFAULT_RECOMMENDATION;
use crate::error::{ConfigError, Result};
use crate::lockout::LockPolicy;
use crate::scheduler::Cadences;

/// Upper bound for every interval and timeout, one year in seconds.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Polling cadences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_accrual_interval")]
    pub accrual_interval_secs: u64,
    /// Usage credited per accrual tick. Defaults to the accrual interval.
    #[serde(default)]
    pub accrual_increment_secs: Option<u64>,
    #[serde(default = "default_advisory_interval")]
    pub advisory_interval_secs: u64,
    #[serde(default = "default_usage_source")]
    pub usage_source: String,
}

/// Lockout policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockoutConfig {
    #[serde(default)]
    pub clear_on_rollover: bool,
}

/// Advisory oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_advisory_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_recommendation")]
    pub fallback_recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Log,
    Webhook,
}

/// Emergency notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    #[serde(default = "default_channel")]
    pub channel: ChannelKind,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_emergency_timeout")]
    pub timeout_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/screenwarden/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub lockout: LockoutConfig,
    #[serde(default)]
    pub advisory: AdvisoryConfig,
    #[serde(default)]
    pub emergency: EmergencyConfig,
}

// Default functions
fn default_accrual_interval() -> u64 {
    10
}
fn default_advisory_interval() -> u64 {
    60
}
fn default_usage_source() -> String {
    "device".into()
}
fn default_true() -> bool {
    true
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_advisory_timeout() -> u64 {
    15
}
fn default_recommendation() -> String {
    DEFAULT_RECOMMENDATION.into()
}
fn default_channel() -> ChannelKind {
    ChannelKind::Log
}
fn default_emergency_timeout() -> u64 {
    20
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            accrual_interval_secs: default_accrual_interval(),
            accrual_increment_secs: None,
            advisory_interval_secs: default_advisory_interval(),
            usage_source: default_usage_source(),
        }
    }
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_secs: default_advisory_timeout(),
            fallback_recommendation: default_recommendation(),
        }
    }
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            webhook_url: String::new(),
            timeout_secs: default_emergency_timeout(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(root: &mut serde_json::Value, key: &str, value: &str) -> Result<()> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown().into());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    // Optional numbers are serialized as null until first set.
                    serde_json::Value::Null => match value.parse::<u64>() {
                        Ok(n) => serde_json::Value::Number(n.into()),
                        Err(_) if value == "none" => serde_json::Value::Null,
                        Err(_) => serde_json::Value::String(value.into()),
                    },
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown().into())
    }

    /// Location of `config.toml` inside the data directory.
    pub fn file_path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::file_path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Render as the TOML written to disk.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::file_path()?;
        let content = self.to_toml().map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    /// Reject cadences and timeouts the scheduler cannot run with: zero,
    /// or longer than [`MAX_DURATION_SECS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("scheduler.accrual_interval_secs", self.scheduler.accrual_interval_secs),
            ("scheduler.advisory_interval_secs", self.scheduler.advisory_interval_secs),
            ("advisory.timeout_secs", self.advisory.timeout_secs),
            ("emergency.timeout_secs", self.emergency.timeout_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".into(),
                });
            }
            if value > MAX_DURATION_SECS {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be at most {MAX_DURATION_SECS} seconds"),
                });
            }
        }
        if self.scheduler.accrual_increment_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.accrual_increment_secs".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn cadences(&self) -> Cadences {
        let accrual = Duration::from_secs(self.scheduler.accrual_interval_secs);
        Cadences {
            accrual,
            accrual_increment_secs: self
                .scheduler
                .accrual_increment_secs
                .unwrap_or(self.scheduler.accrual_interval_secs),
            advisory: Duration::from_secs(self.scheduler.advisory_interval_secs),
            usage_source: self.scheduler.usage_source.clone(),
        }
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            clear_on_rollover: self.lockout.clear_on_rollover,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.scheduler.accrual_interval_secs, 10);
        assert_eq!(parsed.advisory.timeout_secs, 15);
        assert_eq!(parsed.emergency.channel, ChannelKind::Log);
        assert!(!parsed.lockout.clear_on_rollover);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            "[scheduler]\nadvisory_interval_secs = 300\n\n[lockout]\nclear_on_rollover = true\n",
        )
        .unwrap();
        assert_eq!(parsed.scheduler.advisory_interval_secs, 300);
        assert_eq!(parsed.scheduler.accrual_interval_secs, 10);
        assert!(parsed.lock_policy().clear_on_rollover);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("lockout.clear_on_rollover").as_deref(), Some("false"));
        assert_eq!(cfg.get("scheduler.accrual_interval_secs").as_deref(), Some("10"));
        assert_eq!(cfg.get("emergency.channel").as_deref(), Some("log"));
        assert!(cfg.get("scheduler.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.apply("lockout.clear_on_rollover", "true").unwrap();
        cfg.apply("advisory.timeout_secs", "30").unwrap();
        cfg.apply("emergency.channel", "webhook").unwrap();
        cfg.apply("scheduler.accrual_increment_secs", "5").unwrap();
        assert!(cfg.lockout.clear_on_rollover);
        assert_eq!(cfg.advisory.timeout_secs, 30);
        assert_eq!(cfg.emergency.channel, ChannelKind::Webhook);
        assert_eq!(cfg.cadences().accrual_increment_secs, 5);
    }

    #[test]
    fn apply_rejects_unknown_and_invalid_values() {
        let mut cfg = Config::default();
        assert!(cfg.apply("lockout.nonexistent", "true").is_err());
        assert!(cfg.apply("lockout.clear_on_rollover", "maybe").is_err());
        assert!(cfg.apply("emergency.channel", "carrier-pigeon").is_err());
        assert!(cfg.apply("scheduler.accrual_interval_secs", "0").is_err());
        assert_eq!(cfg.scheduler.accrual_interval_secs, 10);
    }

    #[test]
    fn cadences_are_independent() {
        let mut cfg = Config::default();
        cfg.apply("scheduler.accrual_interval_secs", "7").unwrap();
        let cadences = cfg.cadences();
        assert_eq!(cadences.accrual, Duration::from_secs(7));
        assert_eq!(cadences.accrual_increment_secs, 7);
        assert_eq!(cadences.advisory, Duration::from_secs(60));
    }

    #[test]
    fn durations_beyond_one_year_are_rejected() {
        let mut cfg = Config::default();
        let too_long = (MAX_DURATION_SECS + 1).to_string();
        for key in [
            "scheduler.accrual_interval_secs",
            "scheduler.advisory_interval_secs",
            "advisory.timeout_secs",
            "emergency.timeout_secs",
        ] {
            assert!(cfg.apply(key, &too_long).is_err(), "{key} accepted {too_long}");
            assert!(cfg.apply(key, &u64::MAX.to_string()).is_err());
        }
        cfg.apply("emergency.timeout_secs", &MAX_DURATION_SECS.to_string())
            .unwrap();
        assert_eq!(cfg.emergency.timeout_secs, MAX_DURATION_SECS);
    }

    #[test]
    fn oversized_file_value_fails_validation() {
        let parsed: Config = toml::from_str("[advisory]\ntimeout_secs = 99999999999\n").unwrap();
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn to_toml_is_readable_back() {
        let mut cfg = Config::default();
        cfg.apply("scheduler.usage_source", "tablet").unwrap();
        let parsed: Config = toml::from_str(&cfg.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.scheduler.usage_source, "tablet");
    }
}
