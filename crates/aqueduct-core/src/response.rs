//! The response-writing surface the engine consumes.
//!
//! Byte-level response buffering belongs to the host; the engine only needs
//! this narrow contract, used almost entirely by the terminal error-rendering
//! path.

use http::StatusCode;

/// The narrow response surface exposed to the pipeline engine.
///
/// Implementations are per-request and owned by the [`RequestContext`];
/// they are never shared across threads while a request is suspended, so the
/// trait requires only `Send`.
///
/// [`RequestContext`]: crate::RequestContext
pub trait ResponseChannel: Send {
    /// Returns the current response status code.
    fn status_code(&self) -> StatusCode;

    /// Sets the response status code. Has no effect once headers were sent.
    fn set_status_code(&mut self, status: StatusCode);

    /// Returns `true` if response headers have already been sent.
    fn headers_sent(&self) -> bool;

    /// Clears all buffered headers. Only valid before headers are sent.
    fn clear_headers(&mut self);

    /// Clears all buffered body content. Only valid before headers are sent.
    fn clear_content(&mut self);

    /// Appends a body fragment.
    fn write(&mut self, fragment: &[u8]);

    /// Flushes buffered output to the client.
    fn flush(&mut self);

    /// Issues a redirect to the given location without ending the response.
    fn redirect(&mut self, location: &str);

    /// Closes the connection, abandoning any buffered output.
    fn close(&mut self);

    /// Releases request/response buffers at teardown.
    fn release(&mut self);
}
