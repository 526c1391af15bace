//! Resumable execution state for one request.
//!
//! The pipeline is an explicit state machine rather than a generator: the
//! [`Cursor`] records exactly where a request stands, so ownership of the
//! whole [`ExecState`] can be handed from thread to thread at suspension
//! points and picked up again without unwinding anything.

use crate::adapter::PendingEnd;
use aqueduct_core::{HandlerKind, RequestContext, Stage};

/// Position of a request inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cursor {
    /// Run the request validator, before the first stage.
    Validate,
    /// Run observer `observer` of stage `index`.
    Stage { index: usize, observer: usize },
    /// Run the pending end half, then continue after observer `observer` of
    /// stage `index`.
    RunEnd { index: usize, observer: usize },
    /// Resolve the handler for the request line.
    ResolveHandler,
    /// Execute the resolved handler.
    ExecuteHandler,
    /// Run the pending end half of an asynchronous handler.
    HandlerEnd,
    /// All stages done; render and tear down.
    Finished,
}

impl Cursor {
    /// Returns the position after all observers of stage `index` have run.
    pub(crate) fn after_stage(index: usize) -> Self {
        if index == Stage::MapRequestHandler.index() {
            Self::ResolveHandler
        } else if index == Stage::PreRequestHandlerExecute.index() {
            Self::ExecuteHandler
        } else if index + 1 < aqueduct_core::STAGE_COUNT {
            Self::Stage {
                index: index + 1,
                observer: 0,
            }
        } else {
            Self::Finished
        }
    }

    /// First position of the shortcut tail.
    pub(crate) const fn tail_start() -> Self {
        Self::Stage {
            index: Stage::TAIL_START as usize,
            observer: 0,
        }
    }

    /// Returns `true` if the position lies in the shortcut tail (or past it).
    ///
    /// Short-circuits never jump backwards: once inside the tail, errors and
    /// stop requests keep the cursor where it is.
    pub(crate) const fn in_tail(self) -> bool {
        match self {
            Self::Stage { index, .. } | Self::RunEnd { index, .. } => {
                index >= Stage::TAIL_START as usize
            }
            Self::Finished => true,
            Self::Validate | Self::ResolveHandler | Self::ExecuteHandler | Self::HandlerEnd => {
                false
            }
        }
    }
}

/// The complete, transferable execution state of one in-flight request.
pub(crate) struct ExecState {
    /// Per-request context, mutated only by the current owner.
    pub ctx: RequestContext,
    /// Where the request stands.
    pub cursor: Cursor,
    /// Handlers for this request, outermost first: pushed at resolution,
    /// swapped when an observer remaps after resolution, popped once the
    /// handler's execution ends.
    pub handler_stack: Vec<HandlerKind>,
    /// End half awaiting a resume, if the request is suspended.
    pub pending_end: Option<PendingEnd>,
    /// `true` once the error notifier has been invoked for this request.
    pub notified: bool,
}

impl ExecState {
    pub(crate) fn new(ctx: RequestContext) -> Self {
        Self {
            ctx,
            cursor: Cursor::Validate,
            handler_stack: Vec::new(),
            pending_end: None,
            notified: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqueduct_core::STAGE_COUNT;

    #[test]
    fn test_after_stage_inserts_fixed_steps() {
        assert_eq!(
            Cursor::after_stage(Stage::MapRequestHandler.index()),
            Cursor::ResolveHandler
        );
        assert_eq!(
            Cursor::after_stage(Stage::PreRequestHandlerExecute.index()),
            Cursor::ExecuteHandler
        );
        assert_eq!(
            Cursor::after_stage(Stage::PostRequestHandlerExecute.index()),
            Cursor::Stage {
                index: Stage::ReleaseRequestState.index(),
                observer: 0
            }
        );
        assert_eq!(Cursor::after_stage(STAGE_COUNT - 1), Cursor::Finished);
    }

    #[test]
    fn test_tail_membership() {
        assert!(!Cursor::Validate.in_tail());
        assert!(!Cursor::ExecuteHandler.in_tail());
        assert!(!Cursor::Stage {
            index: Stage::PostRequestHandlerExecute.index(),
            observer: 0
        }
        .in_tail());
        assert!(Cursor::tail_start().in_tail());
        assert!(Cursor::Stage {
            index: Stage::EndRequest.index(),
            observer: 3
        }
        .in_tail());
        assert!(Cursor::RunEnd {
            index: Stage::LogRequest.index(),
            observer: 0
        }
        .in_tail());
        assert!(Cursor::Finished.in_tail());
    }
}
