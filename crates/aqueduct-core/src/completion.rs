//! Completion signalling for asynchronous begin/end operations.

use std::sync::Arc;

/// Receives the completion signal of one in-flight asynchronous operation.
///
/// Implemented by the engine; external code only ever sees the
/// [`CompletionHandle`] wrapper.
pub trait CompletionSink: Send + Sync {
    /// Signals that the asynchronous operation has finished.
    ///
    /// May be called from any thread. Only the first call has an effect; the
    /// implementation must discard duplicates.
    fn complete(&self);
}

/// The handle a begin-operation uses to signal completion.
///
/// The handle is given to an asynchronous observer's (or handler's)
/// begin-operation. Invoking [`CompletionHandle::complete`] from any thread
/// resumes the suspended request. The handle is consumed on completion, so a
/// single handle cannot signal twice; the underlying operation additionally
/// discards duplicate signals should the handle be cloned into several
/// callbacks.
#[derive(Clone)]
pub struct CompletionHandle {
    sink: Arc<dyn CompletionSink>,
}

impl CompletionHandle {
    /// Wraps a sink into a handle.
    #[must_use]
    pub fn new(sink: Arc<dyn CompletionSink>) -> Self {
        Self { sink }
    }

    /// Signals completion of the asynchronous operation.
    pub fn complete(self) {
        self.sink.complete();
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle").finish_non_exhaustive()
    }
}
