//! Error types for Aqueduct.
//!
//! Two distinct families exist and must never be conflated:
//!
//! - [`EngineError`] - failures that occur while processing a request. These
//!   are recorded by the error aggregator, may trigger the error-notification
//!   observer, and are rendered into the response. The request still finishes
//!   its shortcut tail.
//! - [`PipelineFault`] - violations of the sequencer's own invariants
//!   (re-entrant advance, double completion, mutation of a sealed registry).
//!   These indicate a programming defect in the host, are never recorded or
//!   recovered, and surface directly to the caller with full diagnostics.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;

/// A failure raised while running stage observers or handler execution.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The request failed early validation (malformed request).
    ///
    /// Never triggers the error-notification observer and never redirects to
    /// a custom error page.
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// No handler could be resolved for the request path.
    #[error("no handler for {verb} {path}")]
    HandlerNotFound {
        /// Request verb.
        verb: String,
        /// Request path.
        path: String,
    },

    /// The execution deadline elapsed while observer code was running.
    ///
    /// Produced only by the timeout supervisor.
    #[error("the request timed out")]
    Timeout,

    /// Any other failure from a stage observer or from handler execution.
    #[error("observer error: {message}")]
    Observer {
        /// Human-readable error message.
        message: String,
        /// The underlying error, if any (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A deliberate end-of-response interruption.
    ///
    /// This is an intentional short-circuit, not a failure: the aggregator
    /// discards it and only sets the stop-requested flag.
    #[error("response ended")]
    ResponseEnded,
}

impl EngineError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a handler-not-found error.
    #[must_use]
    pub fn handler_not_found(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self::HandlerNotFound {
            verb: verb.into(),
            path: path.into(),
        }
    }

    /// Creates an observer error from a message.
    #[must_use]
    pub fn observer(message: impl Into<String>) -> Self {
        Self::Observer {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an observer error wrapping a source error.
    pub fn observer_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Observer {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the HTTP status code associated with this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::HandlerNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Observer { .. } | Self::ResponseEnded => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a machine-readable error code for the envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::HandlerNotFound { .. } => "HANDLER_NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::Observer { .. } => "OBSERVER_ERROR",
            Self::ResponseEnded => "RESPONSE_ENDED",
        }
    }

    /// Returns `true` if this error participates in error notification.
    ///
    /// Validation failures are benign and excluded; a deliberate
    /// end-of-response interruption is not an error at all.
    #[must_use]
    pub const fn is_notifiable(&self) -> bool {
        !matches!(self, Self::Validation { .. } | Self::ResponseEnded)
    }

    /// Converts this error to a serializable envelope for the default error
    /// body.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.code().to_string(),
            message: self.to_string(),
            status: self.status_code().as_u16(),
            request_id: request_id.map(ToString::to_string),
        }
    }
}

/// Serializable error envelope rendered as the default error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// HTTP status code.
    pub status: u16,
    /// Request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// A violation of the pipeline engine's own invariants.
///
/// Faults are programming defects, not request failures: they bypass the
/// error aggregator entirely and abort request handling at the host boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineFault {
    /// `advance()`/`resume()` was called after the request already completed.
    #[error("pipeline advanced after completion (double completion)")]
    CompletedReentry,

    /// `advance()` was called while another thread owned the sequencer.
    #[error("pipeline advanced re-entrantly while another owner was running")]
    ConcurrentAdvance,

    /// The request was started more than once.
    #[error("request coordinator started twice")]
    AlreadyStarted,
}
