//! Stage observer contracts.
//!
//! Observers are registered per stage during module initialization and are
//! shared read-only across concurrent requests afterwards: they must not hold
//! per-request mutable state themselves. Per-request state belongs on the
//! [`RequestContext`] they receive.

use crate::completion::CompletionHandle;
use crate::context::RequestContext;
use crate::error::EngineError;
use std::any::Any;
use std::sync::Arc;

/// Result of a stage observer invocation.
pub type ObserverResult = Result<(), EngineError>;

/// A callback executed during a stage.
///
/// Synchronous observers implement this trait directly. Asynchronous
/// begin/end pairs are adapted into the same shape by the engine, so a
/// stage's observer list is uniform.
pub trait StageObserver: Send + Sync {
    /// Runs the observer for the current request.
    fn on_stage(&self, ctx: &mut RequestContext) -> ObserverResult;
}

/// Opaque per-registration state threaded through an asynchronous begin/end
/// pair.
pub type AsyncState = Arc<dyn Any + Send + Sync>;

/// The begin half of an asynchronous stage observer.
///
/// Receives the completion handle to invoke (from any thread) once the
/// asynchronous work finishes. A synchronous error return skips the end half.
pub type BeginOp = Arc<
    dyn Fn(&mut RequestContext, CompletionHandle, Option<&AsyncState>) -> ObserverResult
        + Send
        + Sync,
>;

/// The end half of an asynchronous stage observer, run exactly once per
/// successful begin, on the thread that resumes the request.
pub type EndOp = Arc<dyn Fn(&mut RequestContext, Option<&AsyncState>) -> ObserverResult + Send + Sync>;

/// An observer built from a plain function or closure.
///
/// # Example
///
/// ```
/// use aqueduct_core::{FnObserver, StageObserver};
///
/// let observer = FnObserver::new(|ctx| {
///     tracing::debug!(request_id = %ctx.request_id(), "observed");
///     Ok(())
/// });
/// ```
pub struct FnObserver<F> {
    func: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&mut RequestContext) -> ObserverResult + Send + Sync,
{
    /// Creates a new function-based observer.
    #[must_use]
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> StageObserver for FnObserver<F>
where
    F: Fn(&mut RequestContext) -> ObserverResult + Send + Sync,
{
    fn on_stage(&self, ctx: &mut RequestContext) -> ObserverResult {
        (self.func)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::RecordingResponse;
    use http::Method;

    #[test]
    fn test_fn_observer_runs() {
        let observer = FnObserver::new(|ctx: &mut RequestContext| {
            ctx.set_locale("en-US");
            Ok(())
        });
        let mut ctx =
            RequestContext::new(Method::GET, "/", Box::new(RecordingResponse::new()));
        observer.on_stage(&mut ctx).unwrap();
        assert_eq!(ctx.locale(), Some("en-US"));
    }

    #[test]
    fn test_fn_observer_propagates_error() {
        let observer = FnObserver::new(|_: &mut RequestContext| Err(EngineError::observer("no")));
        let mut ctx =
            RequestContext::new(Method::GET, "/", Box::new(RecordingResponse::new()));
        assert!(observer.on_stage(&mut ctx).is_err());
    }
}
