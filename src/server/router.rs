//! Routing table: `(method, normalized path) -> handler`.
//!
//! Built once before the server starts and read-only afterwards. Matching is
//! exact after normalization; there are no patterns or wildcards.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::http::request::{Method, Request};
use crate::http::response::Response;

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A route handler shared by every connection.
pub type BoxedHandler = Arc<dyn Fn(Request) -> BoxFuture + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("the route {method} '{path}' was added twice")]
    Duplicate { method: Method, path: String },
}

/// Strips leading and trailing `/`, `\`, spaces and tabs.
pub fn normalize(path: &str) -> &str {
    path.trim_matches(|c| matches!(c, '/' | '\\' | ' ' | '\t'))
}

/// Boxes any `Fn(Request) -> impl Future<Output = Response>`.
pub fn boxed<F, Fut>(handler: F) -> BoxedHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req| -> BoxFuture { Box::pin(handler(req)) })
}

#[derive(Default, Clone)]
pub struct RoutingTable {
    routes: HashMap<(Method, String), BoxedHandler>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails when the normalized `(method, path)` pair already exists; the
    /// first handler is kept.
    pub fn register<F, Fut>(&mut self, method: Method, path: &str, handler: F) -> Result<(), RouteError>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.register_boxed(method, path, boxed(handler))
    }

    pub fn register_boxed(&mut self, method: Method, path: &str, handler: BoxedHandler) -> Result<(), RouteError> {
        let key = (method, normalize(path).to_string());
        if self.routes.contains_key(&key) {
            return Err(RouteError::Duplicate {
                method,
                path: key.1,
            });
        }

        self.routes.insert(key, handler);
        Ok(())
    }

    pub fn resolve(&self, method: Method, path: &str) -> Option<BoxedHandler> {
        self.routes
            .get(&(method, normalize(path).to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.routes.keys().collect();
        keys.sort_by(|a, b| a.1.cmp(&b.1));
        f.debug_struct("RoutingTable").field("routes", &keys).finish()
    }
}
