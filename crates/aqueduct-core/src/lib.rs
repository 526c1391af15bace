//! # Aqueduct Core
//!
//! Core types and traits for the Aqueduct request-execution engine.
//!
//! This crate provides the foundational vocabulary used throughout Aqueduct:
//!
//! - [`Stage`] - The fixed, totally ordered set of request-processing stages
//! - [`StageObserver`] - A callback registered for a stage
//! - [`RequestContext`] - Per-request mutable state carried through the pipeline
//! - [`RequestHandler`] / [`AsyncRequestHandler`] - Terminal handler contracts
//! - [`ResponseChannel`] - The narrow response-writing surface the engine consumes
//! - [`EngineError`] / [`PipelineFault`] - Recoverable request errors vs. engine defects

#![doc(html_root_url = "https://docs.rs/aqueduct-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod ambient;
mod completion;
mod context;
mod error;
pub mod fixtures;
mod handler;
mod observer;
mod response;
mod stage;

pub use completion::{CompletionHandle, CompletionSink};
pub use context::{Principal, RequestContext, RequestId};
pub use error::{EngineError, EngineResult, ErrorEnvelope, PipelineFault};
pub use handler::{AsyncRequestHandler, HandlerKind, HandlerLookup, RequestHandler};
pub use observer::{AsyncState, BeginOp, EndOp, FnObserver, ObserverResult, StageObserver};
pub use response::ResponseChannel;
pub use stage::{Stage, STAGE_COUNT};
