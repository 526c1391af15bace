//! Internal observer representations.
//!
//! A stage's observer list is uniform from the sequencer's point of view:
//! each slot is either a synchronous observer invoked inline or an
//! asynchronous begin/end pair subject to the suspend/resume protocol.

use aqueduct_core::{AsyncRequestHandler, AsyncState, BeginOp, EndOp, StageObserver};
use std::sync::Arc;

/// One registered observer slot within a stage.
pub(crate) enum ObserverEntry {
    /// A synchronous observer, invoked inline.
    Sync(Arc<dyn StageObserver>),
    /// An asynchronous begin/end pair.
    Async(AsyncPair),
}

/// An asynchronous observer registration.
///
/// The optional shared state is threaded unchanged into both halves, so a
/// registration can carry its own collaborators without closing over them
/// twice.
pub(crate) struct AsyncPair {
    pub begin: BeginOp,
    pub end: EndOp,
    pub shared: Option<AsyncState>,
}

/// The end half left behind by a begin-operation that suspended.
///
/// Stored on the execution state while the request is parked; consumed
/// exactly once by whichever thread resumes the request.
pub(crate) enum PendingEnd {
    /// End half of an asynchronous stage observer.
    Observer {
        end: EndOp,
        shared: Option<AsyncState>,
    },
    /// End half of an asynchronous request handler.
    Handler(Arc<dyn AsyncRequestHandler>),
}

impl std::fmt::Debug for PendingEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observer { .. } => f.write_str("PendingEnd::Observer"),
            Self::Handler(_) => f.write_str("PendingEnd::Handler"),
        }
    }
}
