//! Layered configuration loader.
//!
//! Later layers override earlier ones: defaults, then a TOML file, then
//! environment variables.

use std::env;
use std::path::Path;

use crate::error::ConfigError;
use crate::schema::{AqueductConfig, LogFormat};

/// Builder that assembles an [`AqueductConfig`] from layered sources.
///
/// # Example
///
/// ```no_run
/// use aqueduct_config::ConfigLoader;
///
/// # fn main() -> Result<(), aqueduct_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("aqueduct.toml")?
///     .with_env_prefix("AQUEDUCT")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: AqueductConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Creates a loader seeded with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current values with the contents of a TOML file.
    ///
    /// The file is parsed as a whole document: sections absent from the file
    /// fall back to their defaults, not to values set by an earlier layer.
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be read,
    /// [`ConfigError::UnsupportedFormat`] for non-`.toml` extensions, and
    /// [`ConfigError::FileParse`] on invalid content.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            return Err(ConfigError::UnsupportedFormat { path: display });
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: display.clone(),
            source,
        })?;

        self.config = toml::from_str(&contents).map_err(|err| ConfigError::FileParse {
            path: display,
            message: err.to_string(),
        })?;
        Ok(self)
    }

    /// Enables environment variable overrides with the given prefix.
    ///
    /// Variables follow the shape `{PREFIX}_{SECTION}_{FIELD}`, for example
    /// `AQUEDUCT_ENGINE_EXECUTION_TIMEOUT_SECS=30`. A `.env` file in the
    /// working directory is loaded first if present.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Finalizes the configuration, applying environment overrides and
    /// running semantic validation.
    pub fn load(mut self) -> Result<AqueductConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            dotenvy::dotenv().ok();
            self.apply_env(&prefix)?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    fn apply_env(&mut self, prefix: &str) -> Result<(), ConfigError> {
        if let Some(value) = env_var(prefix, "ENGINE_EXECUTION_TIMEOUT_SECS") {
            self.config.engine.execution_timeout_secs =
                parse_env(&value, prefix, "ENGINE_EXECUTION_TIMEOUT_SECS")?;
        }
        if let Some(value) = env_var(prefix, "ENGINE_TIMEOUT_GRACE_MS") {
            self.config.engine.timeout_grace_ms =
                parse_env(&value, prefix, "ENGINE_TIMEOUT_GRACE_MS")?;
        }
        if let Some(value) = env_var(prefix, "ENGINE_NOTIFY_ALL_ERRORS") {
            self.config.engine.notify_all_errors =
                parse_env(&value, prefix, "ENGINE_NOTIFY_ALL_ERRORS")?;
        }
        if let Some(value) = env_var(prefix, "CUSTOM_ERRORS_ENABLED") {
            self.config.custom_errors.enabled = parse_env(&value, prefix, "CUSTOM_ERRORS_ENABLED")?;
        }
        if let Some(value) = env_var(prefix, "CUSTOM_ERRORS_DEFAULT_REDIRECT") {
            self.config.custom_errors.default_redirect = Some(value);
        }
        if let Some(value) = env_var(prefix, "LOGGING_ENABLED") {
            self.config.logging.enabled = parse_env(&value, prefix, "LOGGING_ENABLED")?;
        }
        if let Some(value) = env_var(prefix, "LOGGING_LEVEL") {
            self.config.logging.level = value;
        }
        if let Some(value) = env_var(prefix, "LOGGING_FORMAT") {
            self.config.logging.format = match value.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(ConfigError::InvalidEnvValue {
                        variable: format!("{prefix}_LOGGING_FORMAT"),
                        message: format!("expected 'json' or 'pretty', got '{other}'"),
                    })
                }
            };
        }
        Ok(())
    }
}

fn env_var(prefix: &str, suffix: &str) -> Option<String> {
    env::var(format!("{prefix}_{suffix}")).ok()
}

fn parse_env<T>(value: &str, prefix: &str, suffix: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err| ConfigError::InvalidEnvValue {
        variable: format!("{prefix}_{suffix}"),
        message: format!("{err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_load() {
        let config = ConfigLoader::new().load().expect("defaults load");
        assert_eq!(config.engine.execution_timeout_secs, 110);
    }

    #[test]
    fn test_file_layer() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        writeln!(
            file,
            "[engine]\nexecution_timeout_secs = 7\n\n[custom_errors]\nenabled = true"
        )
        .expect("write temp file");

        let config = ConfigLoader::new()
            .with_file(file.path())
            .expect("file layer")
            .load()
            .expect("load");
        assert_eq!(config.engine.execution_timeout_secs, 7);
        assert!(config.custom_errors.enabled);
        // Sections absent from the file keep their defaults.
        assert_eq!(config.engine.timeout_grace_ms, 500);
    }

    #[test]
    fn test_later_file_replaces_earlier_layer() {
        let mut first = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        writeln!(first, "[engine]\nexecution_timeout_secs = 7").expect("write temp file");

        let mut second = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        writeln!(second, "[logging]\nlevel = \"debug\"").expect("write temp file");

        let config = ConfigLoader::new()
            .with_file(first.path())
            .expect("first file")
            .with_file(second.path())
            .expect("second file")
            .load()
            .expect("load");

        // The second file is a whole document: the engine section reverts to
        // its defaults rather than keeping the first file's values.
        assert_eq!(config.engine.execution_timeout_secs, 110);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_file_errors() {
        let result = ConfigLoader::new().with_file("/nonexistent/aqueduct.toml");
        assert!(matches!(result, Err(ConfigError::FileRead { .. })));
    }

    #[test]
    fn test_unsupported_extension() {
        let result = ConfigLoader::new().with_file("aqueduct.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("AQTEST_ENGINE_EXECUTION_TIMEOUT_SECS", "42");
        env::set_var("AQTEST_LOGGING_FORMAT", "pretty");
        let config = ConfigLoader::new()
            .with_env_prefix("AQTEST")
            .load()
            .expect("load");
        env::remove_var("AQTEST_ENGINE_EXECUTION_TIMEOUT_SECS");
        env::remove_var("AQTEST_LOGGING_FORMAT");

        assert_eq!(config.engine.execution_timeout_secs, 42);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_parse_failure() {
        env::set_var("AQBAD_ENGINE_EXECUTION_TIMEOUT_SECS", "soon");
        let result = ConfigLoader::new().with_env_prefix("AQBAD").load();
        env::remove_var("AQBAD_ENGINE_EXECUTION_TIMEOUT_SECS");
        assert!(matches!(result, Err(ConfigError::InvalidEnvValue { .. })));
    }
}
