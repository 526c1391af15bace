//! Error recording, notification, and terminal rendering.
//!
//! Every failure raised by observer or handler code funnels through
//! [`record_failure`]: the error is recorded on the context, the
//! error-notification observer gets its one chance to react, and the caller
//! learns whether to continue in place or jump to the shortcut tail. The
//! first recorded error is the one rendered into the response by
//! [`render_outcome`] once the pipeline finishes.

use crate::timeout::{ExecutionWindow, WindowState};
use aqueduct_config::CustomErrorsConfig;
use aqueduct_core::{EngineError, RequestContext, StageObserver};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// What the sequencer should do after a failure was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlowDecision {
    /// Keep going from the current position.
    Continue,
    /// Short-circuit to the shortcut tail (no-op if already inside it).
    JumpTail,
}

/// Notification policy and collaborators for one request.
pub(crate) struct FailurePolicy<'a> {
    pub notifier: Option<&'a Arc<dyn StageObserver>>,
    pub notify_all: bool,
    pub window: &'a ExecutionWindow,
}

/// Absorbs one failure from observer or handler code.
///
/// A deliberate end-of-response interruption is not recorded at all; it only
/// requests early completion. Everything else is recorded in order. The
/// notifier runs for the first notifiable error (or every one, under
/// `notify_all`), and may clear the context's errors to resume normal
/// processing.
pub(crate) fn record_failure(
    policy: &FailurePolicy<'_>,
    ctx: &mut RequestContext,
    notified: &mut bool,
    error: EngineError,
) -> FlowDecision {
    if matches!(error, EngineError::ResponseEnded) {
        tracing::debug!(request_id = %ctx.request_id(), "response ended; requesting completion");
        ctx.complete_request();
        return FlowDecision::Continue;
    }

    let notifiable = error.is_notifiable();
    if matches!(error, EngineError::HandlerNotFound { .. }) {
        ctx.mark_resolution_stale();
    }
    tracing::warn!(request_id = %ctx.request_id(), %error, "request error recorded");
    ctx.add_error(error);

    let should_notify = notifiable && (policy.notify_all || !*notified);
    if should_notify {
        if let Some(notifier) = policy.notifier {
            *notified = true;
            policy.window.set(WindowState::Eligible);
            let outcome = catch_unwind(AssertUnwindSafe(|| notifier.on_stage(ctx)));
            policy.window.set(WindowState::Idle);
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(%err, "error notifier failed");
                    ctx.add_error(err);
                }
                Err(_) => {
                    tracing::error!("error notifier panicked");
                    ctx.add_error(EngineError::observer("error notifier panicked"));
                }
            }
            if ctx.error().is_none() {
                // The notifier handled the error itself.
                return FlowDecision::Continue;
            }
        }
    }
    FlowDecision::JumpTail
}

/// Renders the request's outcome into the response.
///
/// Runs exactly once, after `EndRequest`. With no recorded error the
/// buffered response is flushed as-is. With an error the behavior depends on
/// whether headers already went out: before headers the buffered output is
/// discarded and replaced by a custom-error redirect or the default error
/// body; after headers only a best-effort trailer can be appended before the
/// connection is closed.
pub(crate) fn render_outcome(ctx: &mut RequestContext, custom: &CustomErrorsConfig) {
    let Some(error) = ctx.error() else {
        ctx.response_mut().flush();
        return;
    };

    let status = error.status_code();
    let request_id = ctx.request_id().to_string();
    let envelope = error.to_envelope(Some(&request_id));
    // Validation failures never leave the default rendering path, and a
    // timeout redirects only through an explicit per-status mapping.
    let may_redirect = custom.enabled && !matches!(error, EngineError::Validation { .. });
    let is_timeout = matches!(error, EngineError::Timeout);
    tracing::warn!(request_id = %request_id, %error, status = status.as_u16(), "rendering error outcome");

    if ctx.response().headers_sent() {
        let response = ctx.response_mut();
        response.write(b"\nrequest terminated before completion\n");
        response.close();
        return;
    }

    let target = if may_redirect && !ctx.path().contains("errorpath=") {
        custom
            .redirect_for(status.as_u16())
            .or_else(|| {
                if is_timeout {
                    None
                } else {
                    custom.default_redirect.as_deref()
                }
            })
            .map(|target| format!("{target}?errorpath={}", ctx.path()))
    } else {
        None
    };

    let response = ctx.response_mut();
    response.clear_headers();
    response.clear_content();
    if let Some(location) = target {
        response.redirect(&location);
        return;
    }

    response.set_status_code(status);
    match serde_json::to_vec(&envelope) {
        Ok(body) => response.write(&body),
        Err(_) => response.write(envelope.message.as_bytes()),
    }
    response.flush();
}
