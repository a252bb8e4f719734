//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router that feeds every request to the dispatcher
//! - Wire up tower layers (timeout, body limit, tracing)
//! - Serve a listener over plain HTTP or TLS until shutdown
//!
//! # Design Decisions
//! - One catch-all route: path resolution belongs to the segment router
//! - Graceful shutdown stops accepting first, then drains in-flight requests
//! - The drain deadline is enforced by the caller, not here
//! - Dispatch runs in its own task, so a request cut off by the timeout layer
//!   still finishes, is logged and returns its context to the pool

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::HttpConfig;
use crate::http::dispatcher::{Dispatcher, PANIC_BODY};

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(dispatcher: Arc<Dispatcher>, http: &HttpConfig) -> Router {
    Router::new()
        .route("/{*path}", any(dispatch_handler))
        .route("/", any(dispatch_handler))
        .with_state(dispatcher)
        .layer(RequestBodyLimitLayer::new(http.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(http.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

async fn dispatch_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    request: Request<Body>,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let task = tokio::spawn(async move { dispatcher.dispatch(request, peer).await });
    match task.await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Dispatch task failed");
            (StatusCode::BAD_GATEWAY, PANIC_BODY).into_response()
        }
    }
}

/// Serve `app` on `listener` until `shutdown` resolves and the drain finishes.
pub async fn serve<F>(
    listener: std::net::TcpListener,
    app: Router,
    tls: Option<RustlsConfig>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    match tls {
        None => {
            tracing::info!(address = %addr, "HTTP server starting");
            let listener = tokio::net::TcpListener::from_std(listener)?;
            axum::serve(listener, make_service)
                .with_graceful_shutdown(shutdown)
                .await?;
        }
        Some(tls) => {
            tracing::info!(address = %addr, "HTTPS server starting");
            let handle = axum_server::Handle::new();
            let drain = handle.clone();
            tokio::spawn(async move {
                shutdown.await;
                drain.graceful_shutdown(None);
            });
            axum_server::from_tcp_rustls(listener, tls)
                .handle(handle)
                .serve(make_service)
                .await?;
        }
    }

    tracing::info!(address = %addr, "HTTP server stopped");
    Ok(())
}
