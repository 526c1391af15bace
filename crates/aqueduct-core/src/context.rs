//! Per-request context.
//!
//! The [`RequestContext`] carries every piece of per-request mutable state
//! the pipeline needs: the request line, the response surface, the current
//! handler, accumulated errors, and the stop-requested flag. It is owned by
//! whichever thread currently drives the request's sequencer; observers
//! receive it as `&mut` and therefore never race on it.

use crate::error::EngineError;
use crate::handler::HandlerKind;
use crate::response::ResponseChannel;
use http::Method;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity installed for the request while it executes.
///
/// Installed into the request-scoped ambient state at start and restored to
/// the prior value at teardown, on every exit path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Principal {
    /// No authenticated caller.
    #[default]
    Anonymous,
    /// An authenticated caller.
    User {
        /// Caller name.
        name: String,
        /// Roles granted to the caller.
        roles: Vec<String>,
    },
}

/// Per-request mutable state.
///
/// Created by the request coordinator at start and torn down once the
/// `EndRequest` stage and all cleanup hooks have run. Mutated exclusively by
/// the thread currently owning the sequencer.
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    path: String,
    response: Box<dyn ResponseChannel>,
    principal: Principal,
    locale: Option<String>,
    handler: Option<HandlerKind>,
    errors: Vec<EngineError>,
    stop_requested: bool,
    resolution_stale: bool,
    started_at: Instant,
}

impl RequestContext {
    /// Creates a context for a request line and response surface.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>, response: Box<dyn ResponseChannel>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            path: path.into(),
            response,
            principal: Principal::Anonymous,
            locale: None,
            handler: None,
            errors: Vec::new(),
            stop_requested: false,
            resolution_stale: false,
            started_at: Instant::now(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request verb.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the response surface.
    #[must_use]
    pub fn response(&self) -> &dyn ResponseChannel {
        self.response.as_ref()
    }

    /// Returns the response surface mutably.
    pub fn response_mut(&mut self) -> &mut dyn ResponseChannel {
        self.response.as_mut()
    }

    /// Returns the principal to install for this request.
    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Sets the principal, typically from an `AuthenticateRequest` observer.
    pub fn set_principal(&mut self, principal: Principal) {
        self.principal = principal;
    }

    /// Returns the locale to install for this request, if any.
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Sets the locale installed for this request.
    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = Some(locale.into());
    }

    /// Returns the currently selected handler, if one has been resolved.
    #[must_use]
    pub fn handler(&self) -> Option<&HandlerKind> {
        self.handler.as_ref()
    }

    /// Replaces the handler for this request.
    ///
    /// `PostMapRequestHandler` observers may call this to remap the request;
    /// the sequencer detects the identity change before handler execution and
    /// adjusts its handler stack.
    pub fn set_handler(&mut self, handler: HandlerKind) {
        self.handler = Some(handler);
    }

    /// Clears the handler slot. Called during teardown.
    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    /// Requests early completion of the pipeline.
    ///
    /// Callable from any stage observer. The sequencer observes the flag at
    /// the next safe checkpoint (after the current observer returns) and
    /// jumps to the shortcut tail; tail observers still run exactly once.
    pub fn complete_request(&mut self) {
        self.stop_requested = true;
    }

    /// Returns `true` if early completion has been requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Clears the stop-requested flag.
    ///
    /// Used by the sequencer once it has honoured the flag by entering the
    /// shortcut tail; further requests inside the tail are no-ops.
    pub fn reset_stop(&mut self) {
        self.stop_requested = false;
    }

    /// Records an error against this request.
    pub fn add_error(&mut self, error: EngineError) {
        self.errors.push(error);
    }

    /// Returns the current (first recorded) error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&EngineError> {
        self.errors.first()
    }

    /// Returns all recorded errors in recording order.
    #[must_use]
    pub fn errors(&self) -> &[EngineError] {
        &self.errors
    }

    /// Clears all recorded errors.
    ///
    /// An error-notification observer may call this to resume normal
    /// processing after handling the error itself.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Marks the cached handler resolution for this request line as stale.
    ///
    /// Set when handler resolution produced a 404; the coordinator evicts the
    /// cache entry at teardown.
    pub fn mark_resolution_stale(&mut self) {
        self.resolution_stale = true;
    }

    /// Returns `true` if the cached handler resolution should be evicted.
    #[must_use]
    pub fn resolution_stale(&self) -> bool {
        self.resolution_stale
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("stop_requested", &self.stop_requested)
            .field("errors", &self.errors.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::RecordingResponse;

    fn ctx() -> RequestContext {
        RequestContext::new(Method::GET, "/users", Box::new(RecordingResponse::new()))
    }

    #[test]
    fn test_new_context_defaults() {
        let ctx = ctx();
        assert_eq!(ctx.method(), &Method::GET);
        assert_eq!(ctx.path(), "/users");
        assert_eq!(ctx.principal(), &Principal::Anonymous);
        assert!(!ctx.stop_requested());
        assert!(ctx.error().is_none());
        assert!(ctx.handler().is_none());
    }

    #[test]
    fn test_complete_request_sets_and_resets() {
        let mut ctx = ctx();
        ctx.complete_request();
        assert!(ctx.stop_requested());
        ctx.reset_stop();
        assert!(!ctx.stop_requested());
    }

    #[test]
    fn test_first_error_is_current() {
        let mut ctx = ctx();
        ctx.add_error(EngineError::observer("first"));
        ctx.add_error(EngineError::observer("second"));
        assert_eq!(ctx.errors().len(), 2);
        assert!(ctx.error().unwrap().to_string().contains("first"));
        ctx.clear_errors();
        assert!(ctx.error().is_none());
    }

    #[test]
    fn test_request_ids_are_unique_and_ordered() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
    }
}
