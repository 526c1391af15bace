//! Per-request coordination: ownership, suspension, and resumption.
//!
//! Exactly one thread owns a request's execution state at any moment. The
//! state lives in a slot; taking it out makes the caller the owner, and
//! parking it back suspends the request. A begin-operation that signals
//! completion while still on the stack is detected through the resume gate
//! and finished inline by the owning thread, so the common synchronous case
//! never pays for a thread handoff.

use crate::adapter::{ObserverEntry, PendingEnd};
use crate::aggregator::{record_failure, render_outcome, FailurePolicy, FlowDecision};
use crate::registry::StageRegistry;
use crate::resolver::HandlerResolver;
use crate::sequencer::{Cursor, ExecState};
use crate::timeout::{ExecutionWindow, SupervisorSignal, WindowState};
use aqueduct_config::AqueductConfig;
use aqueduct_core::ambient::{self, AmbientState};
use aqueduct_core::{
    CompletionHandle, CompletionSink, EngineError, HandlerKind, ObserverResult, PipelineFault,
    RequestContext, Stage,
};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Callback invoked with the final context once the request settles.
pub type CompletionCallback = Box<dyn FnOnce(&RequestContext) + Send>;

/// Where the request's execution state currently lives.
enum Slot {
    /// Parked; the next resume takes ownership.
    Ready(Box<ExecState>),
    /// A thread owns the state and is driving it.
    Running,
    /// The request settled and was torn down.
    Completed,
}

/// Arbitrates completion signals that race with their own begin-operation.
struct ResumeGate {
    /// A begin-operation is currently on the owner's stack.
    in_begin: bool,
    /// Cleared by a completion signal arriving during the begin-operation,
    /// telling the owner to finish inline instead of suspending.
    must_yield: bool,
}

/// One in-flight asynchronous operation.
///
/// The claim flag is the single arbiter between the completion signal, the
/// deadline supervisor, and a begin-operation that failed synchronously:
/// whoever swaps it first owns the operation's outcome.
struct AsyncOperation {
    coordinator: Weak<CoordinatorInner>,
    claimed: AtomicBool,
    seq: u64,
}

impl CompletionSink for AsyncOperation {
    fn complete(&self) {
        if self.claimed.swap(true, Ordering::SeqCst) {
            tracing::trace!(seq = self.seq, "duplicate completion signal discarded");
            return;
        }
        let Some(inner) = self.coordinator.upgrade() else {
            return;
        };
        {
            let mut gate = inner.gate.lock();
            if gate.in_begin {
                // Completed while the begin-operation is still running: the
                // owner finishes inline.
                gate.must_yield = false;
                return;
            }
        }
        {
            let mut pending = inner.pending.lock();
            match pending.as_ref() {
                Some(current) if current.seq == self.seq => *pending = None,
                _ => {
                    tracing::warn!(seq = self.seq, "stale completion signal discarded");
                    return;
                }
            }
        }
        if let Err(fault) = inner.resume_parked() {
            tracing::error!(%fault, "completion signal could not resume the request");
        }
    }
}

struct CoordinatorInner {
    registry: Arc<StageRegistry>,
    resolver: Option<Arc<HandlerResolver>>,
    config: Arc<AqueductConfig>,
    slot: Mutex<Slot>,
    gate: Mutex<ResumeGate>,
    pending: Mutex<Option<Arc<AsyncOperation>>>,
    interrupt: AtomicBool,
    window: ExecutionWindow,
    supervisor: Arc<SupervisorSignal>,
    started: AtomicBool,
    op_seq: AtomicU64,
    on_complete: Mutex<Option<CompletionCallback>>,
    done: Mutex<bool>,
    done_cvar: Condvar,
}

enum StepResult {
    Continue(Box<ExecState>),
    Suspended,
    Finished(Box<ExecState>),
}

impl CoordinatorInner {
    fn failure_policy(&self) -> FailurePolicy<'_> {
        FailurePolicy {
            notifier: self.registry.error_notifier(),
            notify_all: self.config.engine.notify_all_errors,
            window: &self.window,
        }
    }

    /// Runs `f` with the interruption window open.
    fn call_guarded<R>(&self, f: impl FnOnce() -> R) -> Result<R, Box<dyn Any + Send>> {
        self.window.set(WindowState::Eligible);
        let outcome = catch_unwind(AssertUnwindSafe(f));
        self.window.set(WindowState::Idle);
        outcome
    }

    /// Absorbs an observer outcome and the boundary flags, short-circuiting
    /// to the shortcut tail when warranted. Inside the tail a short-circuit
    /// never moves the cursor.
    fn settle(&self, state: &mut ExecState, outcome: Result<ObserverResult, Box<dyn Any + Send>>) {
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(EngineError::observer(panic_message(payload.as_ref()))),
        };

        let policy = self.failure_policy();
        let mut jump = false;
        if let Some(err) = failure {
            let ExecState { ctx, notified, .. } = state;
            jump |= record_failure(&policy, ctx, notified, err) == FlowDecision::JumpTail;
        }
        if self.interrupt.swap(false, Ordering::SeqCst) {
            let ExecState { ctx, notified, .. } = state;
            jump |= record_failure(&policy, ctx, notified, EngineError::Timeout)
                == FlowDecision::JumpTail;
        }
        if state.ctx.stop_requested() {
            state.ctx.reset_stop();
            jump = true;
        }
        if jump && !state.cursor.in_tail() {
            state.cursor = Cursor::tail_start();
        }

        // Identity and locale set by observers become ambient immediately.
        let _displaced = ambient::install(ambient_of(&state.ctx));
    }

    fn step(self: &Arc<Self>, mut state: Box<ExecState>) -> StepResult {
        match state.cursor {
            Cursor::Validate => {
                state.cursor = Cursor::Stage {
                    index: 0,
                    observer: 0,
                };
                let outcome = match self.registry.validator() {
                    Some(validator) => {
                        let validator = Arc::clone(validator);
                        self.call_guarded(|| validator.validate(&state.ctx))
                    }
                    // Still settle: the host may have requested completion
                    // before the first stage.
                    None => Ok(Ok(())),
                };
                self.settle(&mut state, outcome);
                StepResult::Continue(state)
            }

            Cursor::Stage { index, observer } => {
                let entries = self.registry.observers_at(index);
                let Some(entry) = entries.get(observer) else {
                    state.cursor = Cursor::after_stage(index);
                    return StepResult::Continue(state);
                };
                match entry {
                    ObserverEntry::Sync(obs) => {
                        let obs = Arc::clone(obs);
                        state.cursor = Cursor::Stage {
                            index,
                            observer: observer + 1,
                        };
                        let outcome = self.call_guarded(|| obs.on_stage(&mut state.ctx));
                        self.settle(&mut state, outcome);
                        StepResult::Continue(state)
                    }
                    ObserverEntry::Async(pair) => {
                        let begin = Arc::clone(&pair.begin);
                        let end = Arc::clone(&pair.end);
                        let shared = pair.shared.clone();
                        let pending = PendingEnd::Observer {
                            end,
                            shared: shared.clone(),
                        };
                        let skip = Cursor::Stage {
                            index,
                            observer: observer + 1,
                        };
                        let resume = Cursor::RunEnd { index, observer };
                        self.run_begin(state, skip, resume, pending, move |ctx, handle| {
                            begin(ctx, handle, shared.as_ref())
                        })
                    }
                }
            }

            Cursor::RunEnd { index, observer } => {
                let pending = state.pending_end.take();
                state.cursor = Cursor::Stage {
                    index,
                    observer: observer + 1,
                };
                let outcome = match pending {
                    Some(PendingEnd::Observer { end, shared }) => {
                        self.call_guarded(|| end(&mut state.ctx, shared.as_ref()))
                    }
                    _ => {
                        tracing::error!("resumed without a pending end operation");
                        Ok(Ok(()))
                    }
                };
                self.settle(&mut state, outcome);
                StepResult::Continue(state)
            }

            Cursor::ResolveHandler => {
                state.cursor = Cursor::Stage {
                    index: Stage::PostMapRequestHandler.index(),
                    observer: 0,
                };
                if let Some(mapped) = state.ctx.handler().cloned() {
                    // An observer already mapped the request.
                    state.handler_stack.push(mapped);
                } else if let Some(resolver) = &self.resolver {
                    let found = resolver.resolve(state.ctx.method(), state.ctx.path());
                    if let Some(handler) = found {
                        state.handler_stack.push(handler.clone());
                        state.ctx.set_handler(handler);
                    } else {
                        let err = EngineError::handler_not_found(
                            state.ctx.method().to_string(),
                            state.ctx.path().to_string(),
                        );
                        self.settle(&mut state, Ok(Err(err)));
                    }
                }
                StepResult::Continue(state)
            }

            Cursor::ExecuteHandler => {
                let post_exec = Cursor::Stage {
                    index: Stage::PostRequestHandlerExecute.index(),
                    observer: 0,
                };
                let Some(handler) = state.ctx.handler().cloned() else {
                    state.handler_stack.pop();
                    state.cursor = post_exec;
                    if self.resolver.is_some() {
                        // Resolution produced a handler earlier; an observer
                        // cleared it since.
                        let err = EngineError::handler_not_found(
                            state.ctx.method().to_string(),
                            state.ctx.path().to_string(),
                        );
                        self.settle(&mut state, Ok(Err(err)));
                    }
                    return StepResult::Continue(state);
                };
                let top_matches = state
                    .handler_stack
                    .last()
                    .map(|top| top.same_handler(&handler));
                match top_matches {
                    Some(false) => {
                        // Replaced after resolution; swap the executing entry.
                        tracing::debug!(
                            request_id = %state.ctx.request_id(),
                            "executing remapped handler"
                        );
                        state.handler_stack.pop();
                        state.handler_stack.push(handler.clone());
                    }
                    Some(true) => {}
                    None => state.handler_stack.push(handler.clone()),
                }
                match handler {
                    HandlerKind::Sync(sync) => {
                        state.cursor = post_exec;
                        let outcome = self.call_guarded(|| sync.handle(&mut state.ctx));
                        state.handler_stack.pop();
                        self.settle(&mut state, outcome);
                        StepResult::Continue(state)
                    }
                    HandlerKind::Async(handler) => {
                        let pending = PendingEnd::Handler(Arc::clone(&handler));
                        self.run_begin(state, post_exec, Cursor::HandlerEnd, pending, {
                            move |ctx, handle| handler.begin_handle(ctx, handle)
                        })
                    }
                }
            }

            Cursor::HandlerEnd => {
                let pending = state.pending_end.take();
                state.handler_stack.pop();
                state.cursor = Cursor::Stage {
                    index: Stage::PostRequestHandlerExecute.index(),
                    observer: 0,
                };
                let outcome = match pending {
                    Some(PendingEnd::Handler(handler)) => {
                        self.call_guarded(|| handler.end_handle(&mut state.ctx))
                    }
                    _ => {
                        tracing::error!("resumed without a pending handler end operation");
                        Ok(Ok(()))
                    }
                };
                self.settle(&mut state, outcome);
                StepResult::Continue(state)
            }

            Cursor::Finished => StepResult::Finished(state),
        }
    }

    /// Runs a begin-operation and decides between suspension, inline
    /// completion, and synchronous failure.
    fn run_begin(
        self: &Arc<Self>,
        mut state: Box<ExecState>,
        skip: Cursor,
        resume: Cursor,
        pending: PendingEnd,
        invoke: impl FnOnce(&mut RequestContext, CompletionHandle) -> ObserverResult,
    ) -> StepResult {
        let seq = self.op_seq.fetch_add(1, Ordering::Relaxed);
        let op = Arc::new(AsyncOperation {
            coordinator: Arc::downgrade(self),
            claimed: AtomicBool::new(false),
            seq,
        });
        *self.pending.lock() = Some(Arc::clone(&op));
        {
            let mut gate = self.gate.lock();
            gate.in_begin = true;
            gate.must_yield = true;
        }

        let handle = CompletionHandle::new(Arc::clone(&op) as Arc<dyn CompletionSink>);
        let outcome = self.call_guarded(|| invoke(&mut state.ctx, handle));
        let failed = !matches!(outcome, Ok(Ok(())));

        let mut gate = self.gate.lock();
        gate.in_begin = false;

        // A deadline flagged while the begin-operation ran must be consumed
        // here: the supervisor has already exited, so parking now would leave
        // nobody to claim the suspension.
        if failed || self.interrupt.load(Ordering::SeqCst) {
            // A begin that does not suspend skips its end half; whatever
            // completion signal still arrives must find nothing to resume.
            op.claimed.store(true, Ordering::SeqCst);
            *self.pending.lock() = None;
            drop(gate);
            if matches!(pending, PendingEnd::Handler(_)) {
                state.handler_stack.pop();
            }
            state.cursor = skip;
            self.settle(&mut state, outcome);
            return StepResult::Continue(state);
        }

        state.pending_end = Some(pending);
        state.cursor = resume;

        if gate.must_yield {
            // Park under the gate so the completion signal can never observe
            // a half-suspended request.
            *self.slot.lock() = Slot::Ready(state);
            self.window.set(WindowState::Suspended);
            drop(gate);
            tracing::trace!(seq, "request suspended awaiting completion signal");
            return StepResult::Suspended;
        }

        // The completion signal arrived while the begin-operation was still
        // running; finish inline.
        *self.pending.lock() = None;
        drop(gate);
        StepResult::Continue(state)
    }

    /// Takes the parked state and drives it on the calling thread.
    fn resume_parked(self: &Arc<Self>) -> Result<(), PipelineFault> {
        let state = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Running) {
                Slot::Ready(state) => state,
                Slot::Running => return Err(PipelineFault::ConcurrentAdvance),
                Slot::Completed => {
                    *slot = Slot::Completed;
                    return Err(PipelineFault::CompletedReentry);
                }
            }
        };
        let prior = ambient::install(ambient_of(&state.ctx));
        self.drive(state, prior);
        Ok(())
    }

    fn drive(self: &Arc<Self>, mut state: Box<ExecState>, prior: AmbientState) {
        let span = tracing::debug_span!("pipeline", request_id = %state.ctx.request_id());
        let _guard = span.enter();
        loop {
            state = match self.step(state) {
                StepResult::Continue(next) => next,
                StepResult::Suspended => {
                    ambient::restore(prior);
                    return;
                }
                StepResult::Finished(finished) => {
                    drop(_guard);
                    self.finish(finished, prior);
                    return;
                }
            };
        }
    }

    /// Renders the outcome and tears the request down. Every path through
    /// the pipeline ends here exactly once.
    fn finish(self: &Arc<Self>, mut state: Box<ExecState>, prior: AmbientState) {
        self.window.set(WindowState::Done);
        self.supervisor.stop();

        render_outcome(&mut state.ctx, &self.config.custom_errors);

        state.ctx.clear_handler();
        state.handler_stack.clear();
        state.ctx.response_mut().release();
        if state.ctx.resolution_stale() {
            if let Some(resolver) = &self.resolver {
                resolver.evict(state.ctx.method(), state.ctx.path());
            }
        }
        ambient::restore(prior);

        tracing::info!(
            request_id = %state.ctx.request_id(),
            method = %state.ctx.method(),
            path = state.ctx.path(),
            errors = state.ctx.errors().len(),
            elapsed_ms = state.ctx.elapsed().as_millis() as u64,
            "request settled"
        );

        *self.slot.lock() = Slot::Completed;
        let callback = self.on_complete.lock().take();
        if let Some(callback) = callback {
            callback(&state.ctx);
        }
        let mut done = self.done.lock();
        *done = true;
        self.done_cvar.notify_all();
    }

    /// Claims a suspended request whose deadline elapsed, discarding the
    /// pending operation and driving the shortcut tail with a timeout.
    fn claim_suspended(self: &Arc<Self>) {
        let op = self.pending.lock().as_ref().map(Arc::clone);
        let Some(op) = op else { return };
        if op.claimed.swap(true, Ordering::SeqCst) {
            // The completion signal won the race.
            return;
        }
        {
            let mut pending = self.pending.lock();
            match pending.as_ref() {
                Some(current) if current.seq == op.seq => *pending = None,
                _ => return,
            }
        }

        let state = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Running) {
                Slot::Ready(state) => Some(state),
                Slot::Running => {
                    None
                }
                Slot::Completed => {
                    *slot = Slot::Completed;
                    None
                }
            }
        };
        let Some(mut state) = state else {
            tracing::warn!("suspended request vanished before the timeout claim");
            return;
        };

        tracing::warn!(
            request_id = %state.ctx.request_id(),
            "deadline elapsed while suspended; abandoning pending operation"
        );
        state.pending_end = None;
        state.cursor = match state.cursor {
            Cursor::RunEnd { index, observer } => Cursor::Stage {
                index,
                observer: observer + 1,
            },
            Cursor::HandlerEnd => {
                state.handler_stack.pop();
                Cursor::Stage {
                    index: Stage::PostRequestHandlerExecute.index(),
                    observer: 0,
                }
            }
            other => other,
        };

        let prior = ambient::install(ambient_of(&state.ctx));
        let policy = self.failure_policy();
        {
            let ExecState { ctx, notified, .. } = &mut *state;
            if record_failure(&policy, ctx, notified, EngineError::Timeout)
                == FlowDecision::JumpTail
                && !state.cursor.in_tail()
            {
                state.cursor = Cursor::tail_start();
            }
        }
        self.drive(state, prior);
    }

    /// Decides the supervisor's action for an elapsed deadline; returns the
    /// re-armed deadline when the elapse must not interrupt anything.
    fn on_deadline_elapsed(self: &Arc<Self>, grace: Duration) -> Option<Instant> {
        match self.window.load() {
            WindowState::Done => None,
            WindowState::Eligible => {
                tracing::debug!("deadline elapsed; flagging checked interrupt");
                self.interrupt.store(true, Ordering::SeqCst);
                None
            }
            WindowState::Suspended => {
                self.claim_suspended();
                None
            }
            // Between observers; interruption would race with bookkeeping.
            WindowState::Idle => Some(Instant::now() + grace),
        }
    }

    fn spawn_supervisor(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let timeout = self.config.engine.execution_timeout();
        let grace = self.config.engine.timeout_grace();
        let spawned = std::thread::Builder::new()
            .name("aqueduct-deadline".into())
            .spawn(move || {
                let mut deadline = Instant::now() + timeout;
                loop {
                    if inner.supervisor.wait_until(deadline) {
                        return;
                    }
                    match inner.on_deadline_elapsed(grace) {
                        Some(rearmed) => deadline = rearmed,
                        None => return,
                    }
                }
            });
        if spawned.is_err() {
            tracing::error!("failed to spawn deadline supervisor; request runs unsupervised");
        }
    }
}

fn ambient_of(ctx: &RequestContext) -> AmbientState {
    AmbientState {
        locale: ctx.locale().map(ToString::to_string),
        principal: ctx.principal().clone(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(
            || "observer panicked".to_string(),
            |message| format!("observer panicked: {message}"),
        )
}

/// Drives one request through the pipeline.
///
/// A coordinator is single-use: it owns the request's execution state from
/// [`start`](Self::start) until the request settles. Most hosts go through
/// [`Engine::process_request`](crate::Engine::process_request) instead of
/// using a coordinator directly.
pub struct RequestCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RequestCoordinator {
    /// Creates a coordinator for one request.
    #[must_use]
    pub fn new(
        registry: Arc<StageRegistry>,
        resolver: Option<Arc<HandlerResolver>>,
        config: Arc<AqueductConfig>,
        ctx: RequestContext,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                registry,
                resolver,
                config,
                slot: Mutex::new(Slot::Ready(Box::new(ExecState::new(ctx)))),
                gate: Mutex::new(ResumeGate {
                    in_begin: false,
                    must_yield: false,
                }),
                pending: Mutex::new(None),
                interrupt: AtomicBool::new(false),
                window: ExecutionWindow::new(),
                supervisor: Arc::new(SupervisorSignal::new()),
                started: AtomicBool::new(false),
                op_seq: AtomicU64::new(0),
                on_complete: Mutex::new(None),
                done: Mutex::new(false),
                done_cvar: Condvar::new(),
            }),
        }
    }

    /// Registers a callback invoked with the final context once the request
    /// settles, before any waiter wakes.
    pub fn on_complete(&self, callback: impl FnOnce(&RequestContext) + Send + 'static) {
        *self.inner.on_complete.lock() = Some(Box::new(callback));
    }

    /// Starts the request, driving it on the calling thread until it settles
    /// or suspends.
    pub fn start(&self) -> Result<(), PipelineFault> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(PipelineFault::AlreadyStarted);
        }
        self.inner.spawn_supervisor();
        self.inner.resume_parked()
    }

    /// Resumes a suspended request on the calling thread.
    ///
    /// The engine resumes suspended requests itself when their completion
    /// signal arrives; calling this while another thread owns the request, or
    /// after it settled, is a pipeline fault.
    pub fn resume(&self) -> Result<(), PipelineFault> {
        self.inner.resume_parked()
    }

    /// Returns `true` once the request has settled.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(*self.inner.slot.lock(), Slot::Completed)
    }

    /// Blocks until the request settles.
    pub fn wait(&self) {
        let mut done = self.inner.done.lock();
        while !*done {
            self.inner.done_cvar.wait(&mut done);
        }
    }
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}
