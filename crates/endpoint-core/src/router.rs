//! URI path to handler routing
//!
//! Handlers register on an exact path or on a prefix pattern ending in `*`
//! (`/sensors/*` catches everything underneath). Lookup tries exact matches
//! first, then the first matching prefix in registration order.

use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::server::handler::CoapHandler;

#[derive(Debug, Clone, PartialEq, Eq)]
struct UriMatcher {
    uri: String,
    wildcard: bool,
}

impl UriMatcher {
    fn new(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self {
                uri: prefix.to_string(),
                wildcard: true,
            },
            None => Self {
                uri: pattern.to_string(),
                wildcard: false,
            },
        }
    }

    fn matches(&self, path: &str) -> bool {
        if self.wildcard {
            path.starts_with(&self.uri)
        } else {
            path == self.uri
        }
    }
}

pub(crate) struct ResourceRouter {
    handlers: RwLock<Vec<(UriMatcher, Arc<dyn CoapHandler>)>>,
}

impl ResourceRouter {
    pub(crate) fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a handler; an existing registration on the same pattern is
    /// replaced.
    pub(crate) fn add(&self, pattern: &str, handler: Arc<dyn CoapHandler>) {
        let matcher = UriMatcher::new(pattern);
        let mut handlers = self.handlers.write().unwrap();
        handlers.retain(|(existing, _)| *existing != matcher);
        handlers.push((matcher, handler));
        debug!(uri = pattern, "handler added");
    }

    /// Removes every registration of exactly this handler object.
    pub(crate) fn remove(&self, handler: &Arc<dyn CoapHandler>) {
        self.handlers
            .write()
            .unwrap()
            .retain(|(_, existing)| !Arc::ptr_eq(existing, handler));
    }

    pub(crate) fn find(&self, path: &str) -> Option<Arc<dyn CoapHandler>> {
        let handlers = self.handlers.read().unwrap();
        if let Some((_, handler)) = handlers
            .iter()
            .find(|(matcher, _)| !matcher.wildcard && matcher.matches(path))
        {
            return Some(Arc::clone(handler));
        }
        handlers
            .iter()
            .find(|(matcher, _)| matcher.wildcard && matcher.matches(path))
            .map(|(_, handler)| Arc::clone(handler))
    }
}
