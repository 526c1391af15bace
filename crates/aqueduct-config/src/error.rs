//! Configuration error types.

use thiserror::Error;

/// Errors produced while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    FileRead {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse config file '{path}': {message}")]
    FileParse {
        /// Path that was parsed.
        path: String,
        /// Parser diagnostic.
        message: String,
    },

    /// The configuration file has an unsupported extension.
    #[error("unsupported config format for '{path}' (expected .toml)")]
    UnsupportedFormat {
        /// Path that was rejected.
        path: String,
    },

    /// An environment variable held a value of the wrong type.
    #[error("invalid value for {variable}: {message}")]
    InvalidEnvValue {
        /// Variable name.
        variable: String,
        /// What was wrong with it.
        message: String,
    },

    /// A configuration value failed semantic validation.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What was wrong.
        message: String,
    },
}
