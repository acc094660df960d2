//! Route table and lookup.
//!
//! # Responsibilities
//! - Store (method, pattern, handler) entries in registration order
//! - Resolve a method + path to the first matching entry
//! - Return matched route with its captures, or explicit no-match
//!
//! # Design Decisions
//! - Immutable once the server is built (shared without locks)
//! - O(routes × segments) linear scan; tables are small and static
//! - First registered match wins; no specificity ranking, no dedup

use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use super::matcher::PathPattern;
use crate::dispatch::Handler;
use crate::http::Params;

/// One registered route.
pub struct Route {
    method: Method,
    pattern: PathPattern,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

/// Successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: Params,
}

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Duplicates are kept; the earlier one shadows later ones.
    pub fn register<H: Handler>(&mut self, method: Method, pattern: impl Into<PathPattern>, handler: H) {
        let pattern = pattern.into();
        tracing::debug!(method = %method, pattern = %pattern, "Route registered");
        self.routes.push(Route {
            method,
            pattern,
            handler: Arc::new(handler),
        });
    }

    /// First route whose method equals `method` and whose pattern matches `path`.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route
                    .pattern
                    .matches(path)
                    .map(|params| RouteMatch { route, params })
            })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
