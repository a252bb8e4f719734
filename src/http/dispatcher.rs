//! Request dispatch.
//!
//! # Responsibilities
//! - Run global middleware, admission, routing and invocation in order
//! - Fall back to static files when no route matches
//! - Contain handler panics and report them as 502
//! - Log every completed request and return its context to the pool
//!
//! # Design Decisions
//! - Handlers are synchronous user code and run on the blocking pool
//! - Admission rejections never create a context and are only counted
//! - Clients never see panic messages or stack traces

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::ConfigStore;
use crate::http::context::{ContextPool, RequestContext};
use crate::http::request::{client_ip, decoded_path, X_REQUEST_ID};
use crate::http::response::{EnvelopeFinalizer, ResponseFinalizer};
use crate::http::static_files::StaticFiles;
use crate::net::InflightTracker;
use crate::observability::metrics;
use crate::routing::handler::InvokeError;
use crate::routing::middleware::{
    run_global_chain, run_route_chain, GlobalMiddleware, SharedGlobalMiddleware,
};
use crate::routing::registry::RouteEntry;
use crate::routing::segment::{RouteMatch, SegmentRouter};
use crate::security::Admission;

/// Body of the 429 response.
pub const RATE_LIMITED_BODY: &str = "too many requests";

/// Body of the 502 response written after a handler panic.
pub const PANIC_BODY: &str = "processing error";

/// Body of the 404 response.
pub const NOT_FOUND_BODY: &str = "not found";

/// Handler name recorded for static file requests.
const STATIC_HANDLER: &str = "static";

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Route panics raised inside handlers into a thread local slot instead of stderr.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                let trace = format!("{info}\n{}", Backtrace::force_capture());
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

enum Outcome {
    Completed,
    Failed(InvokeError),
    Panicked { message: String, trace: String },
}

/// Route middleware then handler, with panics contained.
fn run_route(entry: &RouteEntry, ctx: &mut RequestContext, args: &[String]) -> Outcome {
    CAPTURING.with(|c| c.set(true));
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        if !run_route_chain(&entry.middleware, ctx) {
            return Ok(());
        }
        entry.handler.call(ctx, args)
    }));
    CAPTURING.with(|c| c.set(false));

    match result {
        Ok(Ok(())) => Outcome::Completed,
        Ok(Err(e)) => Outcome::Failed(e),
        Err(payload) => Outcome::Panicked {
            message: panic_message(payload.as_ref()),
            trace: LAST_PANIC
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_default(),
        },
    }
}

/// The request pipeline shared by every connection.
pub struct Dispatcher {
    router: SegmentRouter,
    global: Vec<SharedGlobalMiddleware>,
    admission: Arc<Admission>,
    finalizer: Arc<dyn ResponseFinalizer>,
    pool: ContextPool,
    config: Arc<ConfigStore>,
    inflight: InflightTracker,
}

impl Dispatcher {
    /// Dispatcher with admission built from the current config snapshot.
    pub fn new(router: SegmentRouter, config: Arc<ConfigStore>) -> Self {
        install_panic_hook();
        let admission = Arc::new(Admission::new(&config.snapshot().rate));
        Self {
            router,
            global: Vec::new(),
            admission,
            finalizer: Arc::new(EnvelopeFinalizer),
            pool: ContextPool::default(),
            config,
            inflight: InflightTracker::new(),
        }
    }

    /// Append a global middleware. Runs in registration order.
    pub fn with_global_middleware<M: GlobalMiddleware>(mut self, middleware: M) -> Self {
        self.global.push(Arc::new(middleware));
        self
    }

    pub fn with_finalizer<F: ResponseFinalizer>(mut self, finalizer: F) -> Self {
        self.finalizer = Arc::new(finalizer);
        self
    }

    pub fn with_admission(mut self, admission: Arc<Admission>) -> Self {
        self.admission = admission;
        self
    }

    pub fn admission(&self) -> &Arc<Admission> {
        &self.admission
    }

    pub fn inflight(&self) -> &InflightTracker {
        &self.inflight
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Handle one request end to end.
    pub async fn dispatch(&self, request: Request<Body>, peer: Option<SocketAddr>) -> Response {
        let _inflight = self.inflight.track();
        let mut extra_headers = HeaderMap::new();

        if !run_global_chain(&self.global, &request, &mut extra_headers) {
            let (parts, _body) = request.into_parts();
            let mut ctx = self.checkout(&parts, peer, "", extra_headers);
            let response = self.finalizer.end(&mut ctx);
            return self.complete(ctx, response);
        }

        let client = client_ip(request.headers(), peer);
        if let Err(rejection) = self.admission.check(&client).await {
            metrics::record_rate_limited(rejection.as_str());
            let mut response = (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_BODY).into_response();
            response.headers_mut().extend(extra_headers);
            return response;
        }

        let (parts, body) = request.into_parts();
        let route = self.router.resolve(&decoded_path(&parts.uri));
        let Some(route) = route else {
            return self.serve_static(parts, body, peer, extra_headers).await;
        };

        let mut ctx = self.checkout(
            &parts,
            peer,
            route.entry.handler.qualified_name(),
            extra_headers,
        );
        let limit = self.config.snapshot().http.max_body_bytes;
        match axum::body::to_bytes(body, limit).await {
            Ok(bytes) => ctx.set_body(bytes),
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    error = %e,
                    "Failed to read request body"
                );
                let response = (StatusCode::BAD_REQUEST, "invalid request body").into_response();
                return self.complete(ctx, response);
            }
        }

        self.invoke(ctx, route).await
    }

    async fn invoke(&self, mut ctx: Box<RequestContext>, route: RouteMatch) -> Response {
        let RouteMatch { entry, args } = route;
        let handler_name = entry.handler.qualified_name().to_string();

        let task = tokio::task::spawn_blocking(move || {
            let outcome = run_route(&entry, &mut ctx, &args);
            (ctx, args, outcome)
        });
        let (mut ctx, args, outcome) = match task.await {
            Ok(done) => done,
            Err(e) => {
                metrics::record_handler_panic();
                tracing::error!(handler = %handler_name, error = %e, "Handler task failed");
                return (StatusCode::BAD_GATEWAY, PANIC_BODY).into_response();
            }
        };

        let response = match outcome {
            Outcome::Completed => match ctx.take_custom_response() {
                Some(response) => response,
                None => self.finalizer.end(&mut ctx),
            },
            Outcome::Failed(e) => {
                tracing::error!(
                    handler = %handler_name,
                    request_id = %ctx.request_id,
                    path = %ctx.uri,
                    error = %e,
                    "Handler call rejected"
                );
                self.finalizer.server_error(&mut ctx, &e.to_string())
            }
            Outcome::Panicked { message, trace } => {
                metrics::record_handler_panic();
                tracing::error!(
                    handler = %handler_name,
                    request_id = %ctx.request_id,
                    method = %ctx.method,
                    url = %ctx.uri,
                    client_ip = %ctx.client_ip,
                    user_agent = %user_agent(&ctx.headers),
                    args = ?args,
                    params = %serde_json::to_string(&ctx.params).unwrap_or_default(),
                    body = %String::from_utf8_lossy(&ctx.body),
                    panic = %message,
                    stack = %trace,
                    "Handler panicked"
                );
                (StatusCode::BAD_GATEWAY, PANIC_BODY).into_response()
            }
        };
        self.complete(ctx, response)
    }

    async fn serve_static(
        &self,
        parts: Parts,
        body: Body,
        peer: Option<SocketAddr>,
        extra_headers: HeaderMap,
    ) -> Response {
        let mut ctx = self.checkout(&parts, peer, STATIC_HANDLER, extra_headers);
        let files = StaticFiles::from_config(&self.config.snapshot().static_dir);

        let response = match files.serve(Request::from_parts(parts, body)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(request_id = %ctx.request_id, path = %ctx.uri, reason = %e, "No route or file");
                self.finalizer.not_found(&mut ctx, NOT_FOUND_BODY)
            }
        };
        self.complete(ctx, response)
    }

    fn checkout(
        &self,
        parts: &Parts,
        peer: Option<SocketAddr>,
        handler_name: &str,
        extra_headers: HeaderMap,
    ) -> Box<RequestContext> {
        let mut ctx = self.pool.checkout();
        ctx.begin(parts, peer, handler_name);
        ctx.response_headers = extra_headers;
        ctx
    }

    /// Merge headers, log, record metrics and recycle the context.
    fn complete(&self, mut ctx: Box<RequestContext>, mut response: Response) -> Response {
        let headers = response.headers_mut();
        headers.extend(ctx.response_headers.drain());
        if let Ok(value) = HeaderValue::from_str(&ctx.request_id.to_string()) {
            headers.insert(X_REQUEST_ID, value);
        }

        let status = response.status().as_u16();
        if ctx.method != Method::OPTIONS {
            tracing::info!(
                status,
                latency_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX),
                handler = %ctx.handler_name,
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.uri,
                client_ip = %ctx.client_ip,
                user_agent = %user_agent(&ctx.headers),
                "Request completed"
            );
        }
        metrics::record_request(status, ctx.start);
        self.pool.release(ctx);
        response
    }
}

fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
