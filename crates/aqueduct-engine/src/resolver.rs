//! Handler resolution with a reusable-handler cache.
//!
//! Resolution runs once per request, after the `MapRequestHandler` stage,
//! unless an observer already mapped a handler onto the context. Handlers
//! that declare themselves reusable are cached by verb and path so repeat
//! requests skip the lookup; a request that ends with a handler-not-found
//! error evicts its cache entry at teardown, so a stale mapping heals on the
//! next request.

use aqueduct_core::{HandlerKind, HandlerLookup};
use http::Method;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps request lines to handlers, caching reusable ones.
pub struct HandlerResolver {
    lookup: Arc<dyn HandlerLookup>,
    cache: Mutex<HashMap<(Method, String), HandlerKind>>,
}

impl HandlerResolver {
    /// Creates a resolver over a host-supplied lookup.
    #[must_use]
    pub fn new(lookup: Arc<dyn HandlerLookup>) -> Self {
        Self {
            lookup,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the handler for a verb and path, if any.
    #[must_use]
    pub fn resolve(&self, verb: &Method, path: &str) -> Option<HandlerKind> {
        if let Some(cached) = self.cache.lock().get(&(verb.clone(), path.to_string())) {
            tracing::trace!(%verb, path, "handler cache hit");
            return Some(cached.clone());
        }

        let handler = self.lookup.locate(verb, path)?;
        if handler.is_reusable() {
            self.cache
                .lock()
                .insert((verb.clone(), path.to_string()), handler.clone());
        }
        Some(handler)
    }

    /// Evicts the cached handler for a verb and path.
    pub fn evict(&self, verb: &Method, path: &str) {
        if self
            .cache
            .lock()
            .remove(&(verb.clone(), path.to_string()))
            .is_some()
        {
            tracing::debug!(%verb, path, "evicted stale handler mapping");
        }
    }

    /// Number of cached handler mappings.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl std::fmt::Debug for HandlerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerResolver")
            .field("cached", &self.cached_len())
            .finish()
    }
}
