//! Timeout bookkeeping shared between a request and its deadline supervisor.
//!
//! Interruption is cooperative and checked: the supervisor never unwinds
//! observer code. What it may do when the deadline elapses depends on the
//! request's current [`WindowState`]:
//!
//! - `Eligible` - observer code is on a thread right now; the supervisor sets
//!   a one-shot interrupt flag that the sequencer consumes at the next
//!   observer boundary.
//! - `Suspended` - the request is parked awaiting a completion signal; the
//!   supervisor may claim the pending operation and drive the shortcut tail
//!   itself, discarding a late completion.
//! - `Idle` - the sequencer is between observers; interruption would race
//!   with bookkeeping, so the supervisor re-arms after a grace period.
//! - `Done` - the request settled; the supervisor exits.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

/// What the deadline supervisor may do to the request right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WindowState {
    /// Between observers; not safe to interrupt.
    Idle,
    /// Observer code is running and may be flagged for interruption.
    Eligible,
    /// Parked awaiting an asynchronous completion.
    Suspended,
    /// The request settled.
    Done,
}

const IDLE: u8 = 0;
const ELIGIBLE: u8 = 1;
const SUSPENDED: u8 = 2;
const DONE: u8 = 3;

/// Lock-free publication of the request's interruption window.
///
/// Written by whichever thread owns the request, read by the supervisor.
#[derive(Debug)]
pub(crate) struct ExecutionWindow(AtomicU8);

impl ExecutionWindow {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(IDLE))
    }

    pub(crate) fn set(&self, state: WindowState) {
        let raw = match state {
            WindowState::Idle => IDLE,
            WindowState::Eligible => ELIGIBLE,
            WindowState::Suspended => SUSPENDED,
            WindowState::Done => DONE,
        };
        self.0.store(raw, Ordering::SeqCst);
    }

    pub(crate) fn load(&self) -> WindowState {
        match self.0.load(Ordering::SeqCst) {
            ELIGIBLE => WindowState::Eligible,
            SUSPENDED => WindowState::Suspended,
            DONE => WindowState::Done,
            _ => WindowState::Idle,
        }
    }
}

/// Shutdown latch for the deadline supervisor thread.
#[derive(Debug, Default)]
pub(crate) struct SupervisorSignal {
    stopped: Mutex<bool>,
    cvar: Condvar,
}

impl SupervisorSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Tells the supervisor to exit; called at teardown.
    pub(crate) fn stop(&self) {
        *self.stopped.lock() = true;
        self.cvar.notify_all();
    }

    /// Blocks until `deadline` or until stopped. Returns `true` if stopped.
    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cvar.wait_until(&mut stopped, deadline).timed_out() {
                return *stopped;
            }
        }
        true
    }
}
