//! Layered configuration.
//!
//! Sources, lowest to highest priority:
//! 1. built-in defaults
//! 2. `<config_dir>/cykel/config.toml`
//! 3. `./cykel.toml`
//! 4. `CYKEL_*` environment variables, `__` separating sections
//!    (`CYKEL_REMOTE__TIMEOUT_MS=500` -> `remote.timeout_ms`)

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::crypto::KdfParams;
use crate::prediction::{PredictionPolicy, MAX_PERIOD_DURATION_DAYS};
use crate::tracker::TrackerOptions;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] figment::Error),
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

const fn default_timeout_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Upper bound on a remote prediction call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Overrides the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Keep a sealed local mirror of the history.
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default)]
    pub kdf: KdfParams,
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache: true,
            kdf: KdfParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CykelConfig {
    #[serde(default)]
    pub policy: PredictionPolicy,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl CykelConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global) = dirs::config_dir().map(|p| p.join("cykel").join("config.toml")) {
            if global.exists() {
                figment = figment.merge(Toml::file(global));
            }
        }

        let local = PathBuf::from("cykel.toml");
        if local.exists() {
            figment = figment.merge(Toml::file(local));
        }

        // The passphrase is read by the CLI directly and never enters the config.
        figment.merge(Env::prefixed("CYKEL_").ignore(&["passphrase"]).split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let policy = &self.policy;
        for (field, value) in [
            ("policy.remote_confidence_threshold", policy.remote_confidence_threshold),
            ("policy.sparse_history_confidence", policy.sparse_history_confidence),
            ("policy.established_history_confidence", policy.established_history_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("{value} is outside [0, 1]")));
            }
        }

        if !(1..MAX_PERIOD_DURATION_DAYS).contains(&policy.default_period_duration) {
            return Err(invalid(
                "policy.default_period_duration",
                format!("must be between 1 and {}", MAX_PERIOD_DURATION_DAYS - 1),
            ));
        }

        if self.remote.timeout_ms == 0 {
            return Err(invalid("remote.timeout_ms", "must be positive".into()));
        }

        Ok(())
    }

    pub fn tracker_options(&self) -> TrackerOptions {
        TrackerOptions {
            policy: self.policy.clone(),
            remote_timeout: Duration::from_millis(self.remote.timeout_ms),
        }
    }
}

fn invalid(field: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = CykelConfig::default();
        config.validate().unwrap();
        assert_eq!(config.policy.remote_confidence_threshold, 0.7);
        assert_eq!(config.policy.default_period_duration, 5);
        assert_eq!(config.remote.timeout_ms, 3000);
        assert!(config.storage.cache);
    }

    #[test]
    fn env_overrides_nested_sections() {
        Jail::expect_with(|jail| {
            jail.set_env("CYKEL_REMOTE__TIMEOUT_MS", "500");
            jail.set_env("CYKEL_POLICY__DEFAULT_PERIOD_DURATION", "4");

            let config = CykelConfig::load().expect("config loads");
            assert_eq!(config.remote.timeout_ms, 500);
            assert_eq!(config.policy.default_period_duration, 4);
            assert_eq!(config.tracker_options().remote_timeout, Duration::from_millis(500));
            Ok(())
        });
    }

    #[test]
    fn local_file_is_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "cykel.toml",
                r#"
                [policy]
                remote_confidence_threshold = 0.6

                [storage]
                cache = false
                "#,
            )?;

            let config = CykelConfig::load().expect("config loads");
            assert_eq!(config.policy.remote_confidence_threshold, 0.6);
            assert!(!config.storage.cache);
            Ok(())
        });
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("CYKEL_POLICY__SPARSE_HISTORY_CONFIDENCE", "1.4");
            let result = CykelConfig::load();
            assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
            Ok(())
        });
    }
}
