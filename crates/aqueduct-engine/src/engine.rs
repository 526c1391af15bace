//! The engine facade: construction and request entry points.

use crate::coordinator::RequestCoordinator;
use crate::registry::{PipelineModule, StageRegistry};
use crate::resolver::HandlerResolver;
use aqueduct_config::AqueductConfig;
use aqueduct_core::{HandlerLookup, PipelineFault, RequestContext};
use std::sync::Arc;

/// The request-execution engine.
///
/// Built once from a set of [`PipelineModule`]s, a handler lookup, and
/// configuration; shared read-only across all concurrent requests.
///
/// # Example
///
/// ```
/// use aqueduct_core::fixtures::{RecordingResponse, StaticHandler, TableLookup};
/// use aqueduct_core::{HandlerKind, RequestContext};
/// use aqueduct_engine::Engine;
/// use http::Method;
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), aqueduct_core::PipelineFault> {
/// let lookup = TableLookup::new().route(
///     Method::GET,
///     "/ping",
///     HandlerKind::Sync(Arc::new(StaticHandler::new("pong"))),
/// );
/// let engine = Engine::builder().lookup(Arc::new(lookup)).build();
///
/// let response = RecordingResponse::new();
/// let probe = response.probe();
/// engine.process_request(RequestContext::new(Method::GET, "/ping", Box::new(response)))?;
/// assert_eq!(probe.body_string(), "pong");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Engine {
    registry: Arc<StageRegistry>,
    resolver: Option<Arc<HandlerResolver>>,
    config: Arc<AqueductConfig>,
}

impl Engine {
    /// Returns a builder for a new engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Creates a coordinator for one request without starting it.
    ///
    /// Useful for hosts that need the coordinator surface itself; most use
    /// [`process_request`](Self::process_request) or
    /// [`begin_process_request`](Self::begin_process_request).
    #[must_use]
    pub fn coordinator(&self, ctx: RequestContext) -> RequestCoordinator {
        RequestCoordinator::new(
            Arc::clone(&self.registry),
            self.resolver.clone(),
            Arc::clone(&self.config),
            ctx,
        )
    }

    /// Processes a request to completion, blocking the calling thread across
    /// any suspensions.
    pub fn process_request(&self, ctx: RequestContext) -> Result<(), PipelineFault> {
        let coordinator = self.coordinator(ctx);
        coordinator.start()?;
        coordinator.wait();
        Ok(())
    }

    /// Starts a request without blocking, invoking `on_complete` with the
    /// final context once it settles (possibly on another thread).
    pub fn begin_process_request(
        &self,
        ctx: RequestContext,
        on_complete: impl FnOnce(&RequestContext) + Send + 'static,
    ) -> Result<CompletionToken, PipelineFault> {
        let coordinator = self.coordinator(ctx);
        coordinator.on_complete(on_complete);
        coordinator.start()?;
        Ok(CompletionToken { coordinator })
    }

    /// Blocks until a request started with
    /// [`begin_process_request`](Self::begin_process_request) settles.
    pub fn end_process_request(&self, token: CompletionToken) {
        token.coordinator.wait();
    }

    /// Returns the sealed observer registry.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Returns the handler resolver, if a lookup was configured.
    #[must_use]
    pub fn resolver(&self) -> Option<&HandlerResolver> {
        self.resolver.as_deref()
    }
}

/// Token tracking a request started with [`Engine::begin_process_request`].
#[derive(Debug)]
pub struct CompletionToken {
    coordinator: RequestCoordinator,
}

impl CompletionToken {
    /// Returns `true` once the request has settled.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.coordinator.is_completed()
    }

    /// Blocks until the request settles.
    pub fn wait(&self) {
        self.coordinator.wait();
    }
}

/// Builder for an [`Engine`].
pub struct EngineBuilder {
    modules: Vec<Arc<dyn PipelineModule>>,
    lookup: Option<Arc<dyn HandlerLookup>>,
    config: AqueductConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            lookup: None,
            config: AqueductConfig::default(),
        }
    }
}

impl EngineBuilder {
    /// Adds a pipeline module; modules initialize in the order added.
    #[must_use]
    pub fn module(mut self, module: Arc<dyn PipelineModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// Sets the handler lookup. Without one, handler resolution is skipped
    /// entirely and requests run through the stages alone; with one, an
    /// unmapped request is recorded as handler-not-found.
    #[must_use]
    pub fn lookup(mut self, lookup: Arc<dyn HandlerLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn config(mut self, config: AqueductConfig) -> Self {
        self.config = config;
        self
    }

    /// Initializes all modules, seals the registry, and builds the engine.
    #[must_use]
    pub fn build(self) -> Engine {
        let registry = Arc::new(StageRegistry::build(&self.modules));
        tracing::debug!(registry = ?registry, "engine built");
        Engine {
            registry,
            resolver: self
                .lookup
                .map(|lookup| Arc::new(HandlerResolver::new(lookup))),
            config: Arc::new(self.config),
        }
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("modules", &self.modules.len())
            .field("has_lookup", &self.lookup.is_some())
            .finish_non_exhaustive()
    }
}
