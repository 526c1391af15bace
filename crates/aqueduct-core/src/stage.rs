//! The fixed stage order of the request pipeline.
//!
//! Every request traverses the stages below in exactly this order. The order
//! is total, decided at compile time, and never changes at run time. Handler
//! execution happens between [`Stage::PreRequestHandlerExecute`] and
//! [`Stage::PostRequestHandlerExecute`]; it is a fixed step of the sequencer,
//! not a registrable stage.

/// One named, ordered phase of request processing.
///
/// Observers are registered per stage and run in registration order within a
/// stage. The suffix starting at [`Stage::ReleaseRequestState`] is the
/// *shortcut tail*: those stages run even when the request is short-circuited
/// by an error, a timeout, or an explicit early-completion request, so that
/// state release and logging are never skipped.
///
/// # Example
///
/// ```
/// use aqueduct_core::Stage;
///
/// assert!(Stage::BeginRequest < Stage::EndRequest);
/// assert!(Stage::ReleaseRequestState.is_tail());
/// assert!(!Stage::AuthorizeRequest.is_tail());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// First stage of the pipeline.
    BeginRequest = 0,
    /// A security observer establishes the identity of the caller.
    AuthenticateRequest = 1,
    /// The caller identity has been established.
    PostAuthenticateRequest = 2,
    /// A security observer verifies caller authorization.
    AuthorizeRequest = 3,
    /// Caller authorization has been verified.
    PostAuthorizeRequest = 4,
    /// Caching observers may serve the request from a cache.
    ResolveRequestCache = 5,
    /// Cache resolution has finished.
    PostResolveRequestCache = 6,
    /// Observers may influence handler selection for the request.
    MapRequestHandler = 7,
    /// The request has been mapped to a handler.
    PostMapRequestHandler = 8,
    /// State observers acquire per-request state (for example, a session).
    AcquireRequestState = 9,
    /// Request state has been acquired.
    PostAcquireRequestState = 10,
    /// Last stage before the handler executes.
    PreRequestHandlerExecute = 11,
    /// The handler has finished executing.
    PostRequestHandlerExecute = 12,
    /// State observers release per-request state. First stage of the tail.
    ReleaseRequestState = 13,
    /// Request state has been released.
    PostReleaseRequestState = 14,
    /// Caching observers may store the response for later requests.
    UpdateRequestCache = 15,
    /// Cache update has finished.
    PostUpdateRequestCache = 16,
    /// Logging observers record the request.
    LogRequest = 17,
    /// Logging has finished.
    PostLogRequest = 18,
    /// Last stage of the pipeline.
    EndRequest = 19,
}

/// Number of registrable stages.
pub const STAGE_COUNT: usize = 20;

impl Stage {
    /// The first stage of the shortcut tail.
    ///
    /// Stages from here on always run, exactly once, regardless of early
    /// completion or unrecovered errors.
    pub const TAIL_START: Self = Self::ReleaseRequestState;

    /// Returns every stage in execution order.
    #[must_use]
    pub const fn all() -> [Self; STAGE_COUNT] {
        [
            Self::BeginRequest,
            Self::AuthenticateRequest,
            Self::PostAuthenticateRequest,
            Self::AuthorizeRequest,
            Self::PostAuthorizeRequest,
            Self::ResolveRequestCache,
            Self::PostResolveRequestCache,
            Self::MapRequestHandler,
            Self::PostMapRequestHandler,
            Self::AcquireRequestState,
            Self::PostAcquireRequestState,
            Self::PreRequestHandlerExecute,
            Self::PostRequestHandlerExecute,
            Self::ReleaseRequestState,
            Self::PostReleaseRequestState,
            Self::UpdateRequestCache,
            Self::PostUpdateRequestCache,
            Self::LogRequest,
            Self::PostLogRequest,
            Self::EndRequest,
        ]
    }

    /// Returns the zero-based position of this stage in the execution order.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the stage at the given execution-order position.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::all().get(index).copied()
    }

    /// Returns `true` if this stage belongs to the shortcut tail.
    #[must_use]
    pub const fn is_tail(self) -> bool {
        self.index() >= Self::TAIL_START.index()
    }

    /// Returns the stage name used in logs and diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BeginRequest => "begin_request",
            Self::AuthenticateRequest => "authenticate_request",
            Self::PostAuthenticateRequest => "post_authenticate_request",
            Self::AuthorizeRequest => "authorize_request",
            Self::PostAuthorizeRequest => "post_authorize_request",
            Self::ResolveRequestCache => "resolve_request_cache",
            Self::PostResolveRequestCache => "post_resolve_request_cache",
            Self::MapRequestHandler => "map_request_handler",
            Self::PostMapRequestHandler => "post_map_request_handler",
            Self::AcquireRequestState => "acquire_request_state",
            Self::PostAcquireRequestState => "post_acquire_request_state",
            Self::PreRequestHandlerExecute => "pre_request_handler_execute",
            Self::PostRequestHandlerExecute => "post_request_handler_execute",
            Self::ReleaseRequestState => "release_request_state",
            Self::PostReleaseRequestState => "post_release_request_state",
            Self::UpdateRequestCache => "update_request_cache",
            Self::PostUpdateRequestCache => "post_update_request_cache",
            Self::LogRequest => "log_request",
            Self::PostLogRequest => "post_log_request",
            Self::EndRequest => "end_request",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_total_and_fixed() {
        let all = Stage::all();
        assert_eq!(all.len(), STAGE_COUNT);
        for pair in all.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for (i, stage) in all.iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert_eq!(Stage::from_index(i), Some(*stage));
        }
        assert_eq!(Stage::from_index(STAGE_COUNT), None);
    }

    #[test]
    fn test_tail_starts_at_release_request_state() {
        assert_eq!(Stage::TAIL_START, Stage::ReleaseRequestState);
        for stage in Stage::all() {
            assert_eq!(stage.is_tail(), stage >= Stage::ReleaseRequestState);
        }
    }

    #[test]
    fn test_handler_boundary_stages_are_adjacent() {
        assert_eq!(
            Stage::PreRequestHandlerExecute.index() + 1,
            Stage::PostRequestHandlerExecute.index()
        );
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = Stage::all().iter().map(|s| s.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), STAGE_COUNT);
    }
}
