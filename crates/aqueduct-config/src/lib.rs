//! # Aqueduct Config
//!
//! Typed configuration for the Aqueduct request-execution engine.
//!
//! Configuration is loaded in layers, later layers overriding earlier ones:
//!
//! 1. Default values (built into the code)
//! 2. Configuration file (TOML)
//! 3. Environment variables (`AQUEDUCT_` prefix)
//!
//! # Example
//!
//! ```no_run
//! use aqueduct_config::ConfigLoader;
//!
//! # fn main() -> Result<(), aqueduct_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_file("aqueduct.toml")?
//!     .with_env_prefix("AQUEDUCT")
//!     .load()?;
//! println!("execution timeout: {:?}", config.engine.execution_timeout());
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/aqueduct-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{AqueductConfig, CustomErrorsConfig, EngineConfig, LogFormat, LoggingConfig};
