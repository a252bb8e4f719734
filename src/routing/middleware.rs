//! Middleware contracts.
//!
//! Two kinds exist. Global middleware sees the raw request before admission
//! and routing, and may add response headers (CORS and the like). Route
//! middleware runs after routing with the full request context. Both return
//! `false` to stop the request.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request};

use crate::http::context::RequestContext;

/// Middleware run before admission and routing, in registration order.
pub trait GlobalMiddleware: Send + Sync + 'static {
    /// Inspect the request. `response_headers` are merged into the final response.
    fn handle(&self, request: &Request<Body>, response_headers: &mut HeaderMap) -> bool;
}

impl<F> GlobalMiddleware for F
where
    F: Fn(&Request<Body>, &mut HeaderMap) -> bool + Send + Sync + 'static,
{
    fn handle(&self, request: &Request<Body>, response_headers: &mut HeaderMap) -> bool {
        self(request, response_headers)
    }
}

/// Middleware attached to a single route, run in bind order.
pub trait RouteMiddleware: Send + Sync + 'static {
    fn handle(&self, ctx: &mut RequestContext) -> bool;
}

impl<F> RouteMiddleware for F
where
    F: Fn(&mut RequestContext) -> bool + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut RequestContext) -> bool {
        self(ctx)
    }
}

pub type SharedRouteMiddleware = Arc<dyn RouteMiddleware>;
pub type SharedGlobalMiddleware = Arc<dyn GlobalMiddleware>;

/// Run a route chain, stopping at the first middleware that returns `false`.
pub fn run_route_chain(chain: &[SharedRouteMiddleware], ctx: &mut RequestContext) -> bool {
    chain.iter().all(|middleware| middleware.handle(ctx))
}

/// Run the global chain, stopping at the first middleware that returns `false`.
pub fn run_global_chain(
    chain: &[SharedGlobalMiddleware],
    request: &Request<Body>,
    response_headers: &mut HeaderMap,
) -> bool {
    chain
        .iter()
        .all(|middleware| middleware.handle(request, response_headers))
}
