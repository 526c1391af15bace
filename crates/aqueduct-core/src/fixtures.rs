//! Test fixtures for Aqueduct development and testing.
//!
//! This module provides an in-memory response channel and small helper
//! handlers used in tests across the Aqueduct codebase.
//!
//! # Example
//!
//! ```
//! use aqueduct_core::fixtures::RecordingResponse;
//! use aqueduct_core::{RequestContext, ResponseChannel};
//! use http::Method;
//!
//! let response = RecordingResponse::new();
//! let probe = response.probe();
//! let ctx = RequestContext::new(Method::GET, "/users", Box::new(response));
//! assert!(!ctx.response().headers_sent());
//! assert_eq!(probe.flush_count(), 0);
//! ```

use crate::context::RequestContext;
use crate::error::EngineResult;
use crate::handler::{HandlerKind, HandlerLookup, RequestHandler};
use crate::response::ResponseChannel;
use bytes::BytesMut;
use http::{Method, StatusCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct ResponseState {
    status: StatusCode,
    headers_sent: bool,
    body: BytesMut,
    flush_count: usize,
    redirect: Option<String>,
    closed: bool,
    released: bool,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers_sent: false,
            body: BytesMut::new(),
            flush_count: 0,
            redirect: None,
            closed: false,
            released: false,
        }
    }
}

/// An in-memory [`ResponseChannel`] that records everything written to it.
///
/// The channel itself is moved into the [`RequestContext`]; tests keep a
/// [`ResponseProbe`] to inspect the outcome after the request completes.
#[derive(Debug, Default)]
pub struct RecordingResponse {
    state: Arc<Mutex<ResponseState>>,
}

impl RecordingResponse {
    /// Creates a new empty recording response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a probe sharing this response's recorded state.
    #[must_use]
    pub fn probe(&self) -> ResponseProbe {
        ResponseProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl ResponseChannel for RecordingResponse {
    fn status_code(&self) -> StatusCode {
        self.state.lock().unwrap().status
    }

    fn set_status_code(&mut self, status: StatusCode) {
        let mut state = self.state.lock().unwrap();
        if !state.headers_sent {
            state.status = status;
        }
    }

    fn headers_sent(&self) -> bool {
        self.state.lock().unwrap().headers_sent
    }

    fn clear_headers(&mut self) {
        // The fixture keeps no header collection; clearing is observable only
        // through not having sent headers yet.
    }

    fn clear_content(&mut self) {
        self.state.lock().unwrap().body.clear();
    }

    fn write(&mut self, fragment: &[u8]) {
        self.state.lock().unwrap().body.extend_from_slice(fragment);
    }

    fn flush(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.headers_sent = true;
        state.flush_count += 1;
    }

    fn redirect(&mut self, location: &str) {
        let mut state = self.state.lock().unwrap();
        state.redirect = Some(location.to_string());
        state.headers_sent = true;
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }

    fn release(&mut self) {
        self.state.lock().unwrap().released = true;
    }
}

/// Read-only view into a [`RecordingResponse`], valid after the request's
/// context has been torn down.
#[derive(Debug, Clone)]
pub struct ResponseProbe {
    state: Arc<Mutex<ResponseState>>,
}

impl ResponseProbe {
    /// Returns the final status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.state.lock().unwrap().status
    }

    /// Returns the accumulated body as a UTF-8 string (lossy).
    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().unwrap().body).into_owned()
    }

    /// Returns how many times the response was flushed.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.state.lock().unwrap().flush_count
    }

    /// Returns the redirect target, if a redirect was issued.
    #[must_use]
    pub fn redirect_target(&self) -> Option<String> {
        self.state.lock().unwrap().redirect.clone()
    }

    /// Returns `true` if the connection was closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Returns `true` if buffers were released at teardown.
    #[must_use]
    pub fn released(&self) -> bool {
        self.state.lock().unwrap().released
    }

    /// Marks headers as already sent, to exercise the headers-sent error
    /// rendering path.
    pub fn force_headers_sent(&self) {
        self.state.lock().unwrap().headers_sent = true;
    }
}

/// A reusable handler that writes a fixed body and succeeds.
#[derive(Debug, Clone)]
pub struct StaticHandler {
    body: &'static str,
}

impl StaticHandler {
    /// Creates a handler that writes `body` to the response.
    #[must_use]
    pub const fn new(body: &'static str) -> Self {
        Self { body }
    }
}

impl RequestHandler for StaticHandler {
    fn handle(&self, ctx: &mut RequestContext) -> EngineResult<()> {
        let body = self.body.as_bytes().to_vec();
        ctx.response_mut().write(&body);
        Ok(())
    }

    fn is_reusable(&self) -> bool {
        true
    }
}

/// A [`HandlerLookup`] backed by a verb+path table.
#[derive(Default)]
pub struct TableLookup {
    routes: HashMap<(Method, String), HandlerKind>,
}

impl TableLookup {
    /// Creates an empty lookup table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a verb and path.
    #[must_use]
    pub fn route(mut self, verb: Method, path: impl Into<String>, handler: HandlerKind) -> Self {
        self.routes.insert((verb, path.into()), handler);
        self
    }
}

impl HandlerLookup for TableLookup {
    fn locate(&self, verb: &Method, path: &str) -> Option<HandlerKind> {
        self.routes.get(&(verb.clone(), path.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_response_round_trip() {
        let mut response = RecordingResponse::new();
        let probe = response.probe();

        response.set_status_code(StatusCode::CREATED);
        response.write(b"hello");
        response.flush();

        assert_eq!(probe.status(), StatusCode::CREATED);
        assert_eq!(probe.body_string(), "hello");
        assert_eq!(probe.flush_count(), 1);
        assert!(response.headers_sent());

        // Status is frozen once headers are out.
        response.set_status_code(StatusCode::OK);
        assert_eq!(probe.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_table_lookup_routes() {
        let handler = HandlerKind::Sync(Arc::new(StaticHandler::new("ok")));
        let table = TableLookup::new().route(Method::GET, "/ping", handler);
        assert!(table.locate(&Method::GET, "/ping").is_some());
        assert!(table.locate(&Method::GET, "/pong").is_none());
    }
}
