//! # Aqueduct Engine
//!
//! The stage-driven request-execution engine: an explicit, resumable state
//! machine that walks each request through a fixed, totally ordered set of
//! processing stages.
//!
//! Key pieces:
//!
//! - [`Engine`] - built once, shared across requests; the host entry point
//! - [`StageRegistrar`] / [`StageRegistry`] - observer registration, sealed
//!   before the first request
//! - [`PipelineModule`] - a unit of behavior that registers observers
//! - [`RequestCoordinator`] - ownership, suspension, and resumption of one
//!   in-flight request
//! - [`HandlerResolver`] - verb/path handler resolution with a
//!   reusable-handler cache
//!
//! Asynchrony is expressed as begin/end operation pairs with explicit
//! completion signals, not futures: a begin-operation that defers parks the
//! whole execution state, and the completion signal resumes it on whatever
//! thread delivers the signal. Timeouts are cooperative and checked; no
//! observer code is ever unwound from outside.

#![doc(html_root_url = "https://docs.rs/aqueduct-engine/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod adapter;
mod aggregator;
mod coordinator;
mod engine;
mod registry;
mod resolver;
mod sequencer;
mod timeout;

pub use coordinator::{CompletionCallback, RequestCoordinator};
pub use engine::{CompletionToken, Engine, EngineBuilder};
pub use registry::{PipelineModule, RequestValidator, StageRegistrar, StageRegistry};
pub use resolver::HandlerResolver;
