//! # Aqueduct
//!
//! **Stage-Driven Request-Execution Pipeline Engine**
//!
//! Aqueduct walks each request through a fixed, totally ordered set of
//! processing stages:
//!
//! - 🪜 **Fixed Stage Order** – Twenty named stages, decided at compile time
//! - 🔁 **Explicit Suspension** – Begin/end operation pairs with completion
//!   signals instead of futures
//! - 🧹 **Guaranteed Cleanup** – The shortcut tail always runs, exactly once
//! - ⏱️ **Checked Timeouts** – Cooperative interruption, never unwinding
//!   observer code from outside
//! - 🔒 **Sealed Registration** – Observers register before the first
//!   request and never after
//!
//! ## Quick Start
//!
//! ```
//! use aqueduct::prelude::*;
//! use aqueduct::core::fixtures::{RecordingResponse, StaticHandler, TableLookup};
//! use http::Method;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), PipelineFault> {
//! let lookup = TableLookup::new().route(
//!     Method::GET,
//!     "/ping",
//!     HandlerKind::Sync(Arc::new(StaticHandler::new("pong"))),
//! );
//! let engine = Engine::builder().lookup(Arc::new(lookup)).build();
//!
//! let response = RecordingResponse::new();
//! let probe = response.probe();
//! engine.process_request(RequestContext::new(Method::GET, "/ping", Box::new(response)))?;
//! assert_eq!(probe.body_string(), "pong");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! validate → begin_request … map_request_handler → resolve handler
//!          → post_map … pre_request_handler_execute → HANDLER
//!          → post_request_handler_execute
//!          → release_request_state … end_request   (shortcut tail)
//!          → render outcome → teardown
//! ```

#![doc(html_root_url = "https://docs.rs/aqueduct/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use aqueduct_core as core;

// Re-export the engine
pub use aqueduct_engine as engine;

// Re-export configuration
pub use aqueduct_config as config;

use aqueduct_config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Initializes process-wide logging from configuration.
///
/// Call once at startup, before the first request. Returns an error if a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    if !config.enabled {
        return Ok(());
    }
    let filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to install logging: {err}"))?,
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to install logging: {err}"))?,
    }
    tracing::debug!(level = %config.level, "logging initialized");
    Ok(())
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use aqueduct::prelude::*;
/// ```
pub mod prelude {
    pub use aqueduct_core::{
        AsyncRequestHandler, CompletionHandle, EngineError, EngineResult, FnObserver, HandlerKind,
        HandlerLookup, ObserverResult, PipelineFault, Principal, RequestContext, RequestHandler,
        RequestId, ResponseChannel, Stage, StageObserver,
    };

    // Re-export the engine surface
    pub use aqueduct_engine::{
        Engine, EngineBuilder, PipelineModule, RequestCoordinator, RequestValidator,
        StageRegistrar,
    };

    // Re-export configuration loading
    pub use aqueduct_config::{AqueductConfig, ConfigLoader};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_builds_an_engine() {
        let engine = Engine::builder().build();
        assert_eq!(engine.registry().observer_count(Stage::BeginRequest), 0);
    }
}
