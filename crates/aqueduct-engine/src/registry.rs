//! Stage observer registration and the sealed registry.
//!
//! Modules register observers during engine construction through a
//! [`StageRegistrar`]. Sealing the registrar produces an immutable
//! [`StageRegistry`] shared read-only across all concurrent requests; there
//! is no way to mutate a sealed registry, so late registration is a compile
//! error rather than a runtime fault.

use crate::adapter::{AsyncPair, ObserverEntry};
use aqueduct_core::{
    AsyncState, BeginOp, EndOp, EngineResult, RequestContext, Stage, StageObserver, STAGE_COUNT,
};
use std::sync::Arc;

/// A unit of pipeline behavior that registers observers at construction.
///
/// Modules are initialized exactly once, before the first request, and are
/// shared read-only afterwards. Per-request state belongs on the
/// [`RequestContext`], never on the module itself.
pub trait PipelineModule: Send + Sync {
    /// Module name used in construction logs.
    fn name(&self) -> &'static str;

    /// Registers this module's observers.
    fn init(&self, registrar: &mut StageRegistrar);
}

/// Validates a request before any stage observer runs.
///
/// A validation failure is recorded against the request and skips the main
/// stages; it never triggers error notification.
pub trait RequestValidator: Send + Sync {
    /// Checks the incoming request, rejecting it with a validation error.
    fn validate(&self, ctx: &RequestContext) -> EngineResult<()>;
}

impl<F> RequestValidator for F
where
    F: Fn(&RequestContext) -> EngineResult<()> + Send + Sync,
{
    fn validate(&self, ctx: &RequestContext) -> EngineResult<()> {
        self(ctx)
    }
}

/// Mutable registration surface handed to [`PipelineModule::init`].
pub struct StageRegistrar {
    stages: [Vec<ObserverEntry>; STAGE_COUNT],
    error_notifier: Option<Arc<dyn StageObserver>>,
    validator: Option<Arc<dyn RequestValidator>>,
}

impl Default for StageRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

impl StageRegistrar {
    /// Creates an empty registrar.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: std::array::from_fn(|_| Vec::new()),
            error_notifier: None,
            validator: None,
        }
    }

    /// Registers a synchronous observer for a stage.
    ///
    /// Observers run in registration order within their stage.
    pub fn add_observer(&mut self, stage: Stage, observer: Arc<dyn StageObserver>) {
        self.stages[stage.index()].push(ObserverEntry::Sync(observer));
    }

    /// Registers an asynchronous begin/end observer pair for a stage.
    ///
    /// The pair occupies a single ordered slot: later observers in the same
    /// stage run only after the end half has completed. `shared` is passed
    /// unchanged to both halves.
    pub fn add_async_observer(
        &mut self,
        stage: Stage,
        begin: BeginOp,
        end: EndOp,
        shared: Option<AsyncState>,
    ) {
        self.stages[stage.index()].push(ObserverEntry::Async(AsyncPair { begin, end, shared }));
    }

    /// Installs the error-notification observer.
    ///
    /// Invoked at most once per request by default (the first notifiable
    /// error), with the error already recorded on the context. Clearing the
    /// context's errors from the notifier resumes normal processing.
    pub fn set_error_notifier(&mut self, notifier: Arc<dyn StageObserver>) {
        if self.error_notifier.is_some() {
            tracing::warn!("error notifier replaced by a later registration");
        }
        self.error_notifier = Some(notifier);
    }

    /// Installs the request validator, run before the first stage.
    pub fn set_request_validator(&mut self, validator: Arc<dyn RequestValidator>) {
        if self.validator.is_some() {
            tracing::warn!("request validator replaced by a later registration");
        }
        self.validator = Some(validator);
    }

    /// Seals the registrar into an immutable registry.
    #[must_use]
    pub fn seal(self) -> StageRegistry {
        StageRegistry {
            stages: self.stages,
            error_notifier: self.error_notifier,
            validator: self.validator,
        }
    }
}

/// The immutable, sealed set of registered observers.
///
/// Shared read-only across every concurrent request for the lifetime of the
/// engine.
pub struct StageRegistry {
    stages: [Vec<ObserverEntry>; STAGE_COUNT],
    error_notifier: Option<Arc<dyn StageObserver>>,
    validator: Option<Arc<dyn RequestValidator>>,
}

impl StageRegistry {
    /// Builds a registry by initializing each module in order and sealing.
    #[must_use]
    pub fn build(modules: &[Arc<dyn PipelineModule>]) -> Self {
        let mut registrar = StageRegistrar::new();
        for module in modules {
            tracing::debug!(module = module.name(), "initializing pipeline module");
            module.init(&mut registrar);
        }
        registrar.seal()
    }

    /// Returns the number of observers registered for a stage.
    #[must_use]
    pub fn observer_count(&self, stage: Stage) -> usize {
        self.stages[stage.index()].len()
    }

    pub(crate) fn observers_at(&self, index: usize) -> &[ObserverEntry] {
        &self.stages[index]
    }

    pub(crate) fn error_notifier(&self) -> Option<&Arc<dyn StageObserver>> {
        self.error_notifier.as_ref()
    }

    pub(crate) fn validator(&self) -> Option<&Arc<dyn RequestValidator>> {
        self.validator.as_ref()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total: usize = self.stages.iter().map(Vec::len).sum();
        f.debug_struct("StageRegistry")
            .field("observers", &total)
            .field("has_error_notifier", &self.error_notifier.is_some())
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqueduct_core::FnObserver;

    #[test]
    fn test_observers_keep_registration_order() {
        let mut registrar = StageRegistrar::new();
        registrar.add_observer(
            Stage::BeginRequest,
            Arc::new(FnObserver::new(|_ctx| Ok(()))),
        );
        registrar.add_async_observer(
            Stage::BeginRequest,
            Arc::new(
                |_ctx: &mut RequestContext,
                 done: aqueduct_core::CompletionHandle,
                 _state: Option<&AsyncState>| {
                    done.complete();
                    Ok(())
                },
            ),
            Arc::new(|_ctx: &mut RequestContext, _state: Option<&AsyncState>| Ok(())),
            None,
        );
        let registry = registrar.seal();

        assert_eq!(registry.observer_count(Stage::BeginRequest), 2);
        assert!(matches!(
            registry.observers_at(0)[0],
            ObserverEntry::Sync(_)
        ));
        assert!(matches!(
            registry.observers_at(0)[1],
            ObserverEntry::Async(_)
        ));
    }

    #[test]
    fn test_build_initializes_modules_in_order() {
        struct One;
        struct Two;
        impl PipelineModule for One {
            fn name(&self) -> &'static str {
                "one"
            }
            fn init(&self, registrar: &mut StageRegistrar) {
                registrar.add_observer(Stage::EndRequest, Arc::new(FnObserver::new(|_ctx| Ok(()))));
            }
        }
        impl PipelineModule for Two {
            fn name(&self) -> &'static str {
                "two"
            }
            fn init(&self, registrar: &mut StageRegistrar) {
                registrar.add_observer(Stage::EndRequest, Arc::new(FnObserver::new(|_ctx| Ok(()))));
            }
        }

        let modules: Vec<Arc<dyn PipelineModule>> = vec![Arc::new(One), Arc::new(Two)];
        let registry = StageRegistry::build(&modules);
        assert_eq!(registry.observer_count(Stage::EndRequest), 2);
        assert_eq!(registry.observer_count(Stage::BeginRequest), 0);
    }
}
