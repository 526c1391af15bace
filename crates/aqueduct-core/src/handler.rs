//! Handler contracts for the fixed execution step of the pipeline.
//!
//! A handler is the terminal piece of request processing, executed between
//! the `PreRequestHandlerExecute` and `PostRequestHandlerExecute` stages. The
//! engine supports a synchronous contract ([`RequestHandler`], invoked
//! inline) and an asynchronous contract ([`AsyncRequestHandler`], a begin/end
//! pair that follows the same suspend/resume rule as asynchronous stage
//! observers).

use crate::completion::CompletionHandle;
use crate::context::RequestContext;
use crate::error::EngineResult;
use http::Method;
use std::sync::Arc;

/// A synchronous request handler, invoked inline by the sequencer.
pub trait RequestHandler: Send + Sync {
    /// Processes the request, writing the response through the context.
    fn handle(&self, ctx: &mut RequestContext) -> EngineResult<()>;

    /// Returns `true` if the resolver may cache this handler for reuse by
    /// later requests to the same verb and path.
    fn is_reusable(&self) -> bool {
        false
    }
}

/// An asynchronous request handler expressed as a begin/end operation pair.
///
/// `begin_handle` starts the work and returns; the engine suspends the
/// request until the [`CompletionHandle`] is invoked (from any thread), at
/// which point `end_handle` runs exactly once on the resuming thread.
pub trait AsyncRequestHandler: Send + Sync {
    /// Starts asynchronous processing of the request.
    ///
    /// If this returns an error the end-operation is skipped and the error is
    /// routed to the error aggregator without suspending.
    fn begin_handle(&self, ctx: &mut RequestContext, done: CompletionHandle) -> EngineResult<()>;

    /// Completes asynchronous processing of the request.
    fn end_handle(&self, ctx: &mut RequestContext) -> EngineResult<()>;

    /// Returns `true` if the resolver may cache this handler for reuse.
    fn is_reusable(&self) -> bool {
        false
    }
}

/// A resolved handler, either synchronous or asynchronous.
#[derive(Clone)]
pub enum HandlerKind {
    /// A synchronous handler, invoked inline.
    Sync(Arc<dyn RequestHandler>),
    /// An asynchronous handler, following the begin/end suspend rule.
    Async(Arc<dyn AsyncRequestHandler>),
}

impl HandlerKind {
    /// Returns `true` if both values refer to the same handler instance.
    ///
    /// Identity comparison is what the sequencer uses to detect handler
    /// remapping between `MapRequestHandler` and handler execution.
    #[must_use]
    pub fn same_handler(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Sync(a), Self::Sync(b)) => Arc::ptr_eq(a, b),
            (Self::Async(a), Self::Async(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Returns `true` if the handler declares itself reusable.
    #[must_use]
    pub fn is_reusable(&self) -> bool {
        match self {
            Self::Sync(h) => h.is_reusable(),
            Self::Async(h) => h.is_reusable(),
        }
    }
}

impl std::fmt::Debug for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("HandlerKind::Sync"),
            Self::Async(_) => f.write_str("HandlerKind::Async"),
        }
    }
}

/// External collaborator that maps a request line to a handler.
///
/// Invoked by the engine's handler resolver after the `MapRequestHandler`
/// stage. Returning `None` produces a handler-not-found error.
pub trait HandlerLookup: Send + Sync {
    /// Locates the handler for the given verb and path, if any.
    fn locate(&self, verb: &Method, path: &str) -> Option<HandlerKind>;
}

impl<F> HandlerLookup for F
where
    F: Fn(&Method, &str) -> Option<HandlerKind> + Send + Sync,
{
    fn locate(&self, verb: &Method, path: &str) -> Option<HandlerKind> {
        self(verb, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    impl RequestHandler for NoopHandler {
        fn handle(&self, _ctx: &mut RequestContext) -> EngineResult<()> {
            Ok(())
        }

        fn is_reusable(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_same_handler_is_identity_not_equality() {
        let a: Arc<dyn RequestHandler> = Arc::new(NoopHandler);
        let b: Arc<dyn RequestHandler> = Arc::new(NoopHandler);
        let ka = HandlerKind::Sync(a.clone());
        let ka2 = HandlerKind::Sync(a);
        let kb = HandlerKind::Sync(b);

        assert!(ka.same_handler(&ka2));
        assert!(!ka.same_handler(&kb));
    }

    #[test]
    fn test_reusable_passthrough() {
        let kind = HandlerKind::Sync(Arc::new(NoopHandler));
        assert!(kind.is_reusable());
    }

    #[test]
    fn test_fn_lookup() {
        let handler: Arc<dyn RequestHandler> = Arc::new(NoopHandler);
        let kind = HandlerKind::Sync(handler);
        let lookup = move |verb: &Method, path: &str| {
            (verb == Method::GET && path == "/ok").then(|| kind.clone())
        };
        assert!(lookup.locate(&Method::GET, "/ok").is_some());
        assert!(lookup.locate(&Method::POST, "/ok").is_none());
        assert!(lookup.locate(&Method::GET, "/missing").is_none());
    }
}
