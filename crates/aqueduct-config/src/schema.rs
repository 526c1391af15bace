//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::ConfigError;

/// Root configuration for the Aqueduct engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct AqueductConfig {
    /// Pipeline engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Custom error page settings.
    #[serde(default)]
    pub custom_errors: CustomErrorsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AqueductConfig {
    /// Validates semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.execution_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "engine.execution_timeout_secs must be greater than zero".to_string(),
            });
        }
        for (status, path) in &self.custom_errors.redirects {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "custom_errors.redirects.{status} must be an absolute path, got '{path}'"
                    ),
                });
            }
        }
        if let Some(path) = &self.custom_errors.default_redirect {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "custom_errors.default_redirect must be an absolute path, got '{path}'"
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Pipeline engine configuration section.
///
/// # Example
///
/// ```
/// use aqueduct_config::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.execution_timeout().as_secs(), 110);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Wall-clock budget for a request's observer work, in seconds.
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,

    /// Grace period before re-checking an elapsed deadline that fired while
    /// no observer was eligible for interruption, in milliseconds.
    #[serde(default = "default_timeout_grace")]
    pub timeout_grace_ms: u64,

    /// Notify the error observer for every recorded error, not only the
    /// first one per request.
    #[serde(default)]
    pub notify_all_errors: bool,
}

impl EngineConfig {
    /// Returns the execution timeout as a [`Duration`].
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Returns the idle-deadline grace period as a [`Duration`].
    #[must_use]
    pub const fn timeout_grace(&self) -> Duration {
        Duration::from_millis(self.timeout_grace_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_timeout_secs: default_execution_timeout(),
            timeout_grace_ms: default_timeout_grace(),
            notify_all_errors: false,
        }
    }
}

fn default_execution_timeout() -> u64 {
    110
}

fn default_timeout_grace() -> u64 {
    500
}

/// Custom error page configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct CustomErrorsConfig {
    /// Enable custom error redirects.
    #[serde(default)]
    pub enabled: bool,

    /// Redirect used when no per-status redirect matches.
    #[serde(default)]
    pub default_redirect: Option<String>,

    /// Per-status redirects, keyed by HTTP status code.
    ///
    /// TOML table keys are strings, so the codes are written as
    /// `404 = "/missing"` and parsed into numeric keys.
    #[serde(default, with = "status_keys")]
    pub redirects: HashMap<u16, String>,
}

/// Serde adapter mapping string table keys to numeric status codes.
mod status_keys {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::{BTreeMap, HashMap};

    pub fn serialize<S>(map: &HashMap<u16, String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let keyed: BTreeMap<String, &String> = map
            .iter()
            .map(|(status, target)| (status.to_string(), target))
            .collect();
        keyed.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<HashMap<u16, String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = HashMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(status, target)| {
                status
                    .parse::<u16>()
                    .map(|code| (code, target))
                    .map_err(|_| D::Error::custom(format!("invalid status code key '{status}'")))
            })
            .collect()
    }
}

impl CustomErrorsConfig {
    /// Returns the redirect explicitly mapped for a status code, if any.
    #[must_use]
    pub fn redirect_for(&self, status: u16) -> Option<&str> {
        self.redirects.get(&status).map(String::as_str)
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AqueductConfig::default();
        assert_eq!(config.engine.execution_timeout(), Duration::from_secs(110));
        assert_eq!(config.engine.timeout_grace(), Duration::from_millis(500));
        assert!(!config.engine.notify_all_errors);
        assert!(!config.custom_errors.enabled);
        assert!(config.logging.enabled);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = AqueductConfig::default();
        config.engine.execution_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_redirect_rejected() {
        let mut config = AqueductConfig::default();
        config
            .custom_errors
            .redirects
            .insert(404, "missing.html".to_string());
        assert!(config.validate().is_err());

        config
            .custom_errors
            .redirects
            .insert(404, "/missing.html".to_string());
        config.validate().expect("absolute path is valid");
        assert_eq!(config.custom_errors.redirect_for(404), Some("/missing.html"));
        assert_eq!(config.custom_errors.redirect_for(500), None);
    }

    #[test]
    fn test_toml_round_trip() {
        let toml = r#"
            [engine]
            execution_timeout_secs = 5
            notify_all_errors = true

            [custom_errors]
            enabled = true
            default_redirect = "/error"

            [custom_errors.redirects]
            404 = "/missing"
        "#;
        let config: AqueductConfig = toml::from_str(toml).expect("parses");
        assert_eq!(config.engine.execution_timeout_secs, 5);
        assert!(config.engine.notify_all_errors);
        assert!(config.custom_errors.enabled);
        assert_eq!(config.custom_errors.redirect_for(404), Some("/missing"));
    }

    #[test]
    fn test_redirects_survive_serialization() {
        let mut config = AqueductConfig::default();
        config.custom_errors.enabled = true;
        config.custom_errors.default_redirect = Some("/error".to_string());
        config
            .custom_errors
            .redirects
            .insert(404, "/missing".to_string());
        config
            .custom_errors
            .redirects
            .insert(500, "/error".to_string());

        let rendered = toml::to_string(&config).expect("serializes");
        let parsed: AqueductConfig = toml::from_str(&rendered).expect("parses back");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_non_numeric_redirect_key_rejected() {
        let toml = r#"
            [custom_errors.redirects]
            missing = "/missing"
        "#;
        let err = toml::from_str::<AqueductConfig>(toml).expect_err("non-numeric key");
        assert!(err.to_string().contains("invalid status code key"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
            [engine]
            exeuction_timeout_secs = 5
        "#;
        assert!(toml::from_str::<AqueductConfig>(toml).is_err());
    }
}
