//! Response finalization.
//!
//! # Responsibilities
//! - Turn the handler's response intent into an HTTP response
//! - Provide the default `{ "msg", "code", "data" }` JSON envelope
//! - Write plain-text 404 and 500 responses
//!
//! # Design Decisions
//! - Finalizers are pluggable; the dispatcher only knows the trait
//! - A handler supplied custom response bypasses the finalizer entirely
//! - An error message with a zero code is reported as code 2000

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use crate::http::context::RequestContext;

/// Content type of the JSON envelope.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Code reported when a handler set an error message but no code.
pub const DEFAULT_ERROR_CODE: i64 = 2000;

/// Writes the final response for a request.
pub trait ResponseFinalizer: Send + Sync + 'static {
    /// No route and no static file matched.
    fn not_found(&self, ctx: &mut RequestContext, reason: &str) -> Response;

    /// The handler could not be called.
    fn server_error(&self, ctx: &mut RequestContext, reason: &str) -> Response;

    /// Normal completion, including middleware short-circuits.
    fn end(&self, ctx: &mut RequestContext) -> Response;
}

#[derive(Serialize)]
struct Envelope<'a> {
    msg: &'a str,
    code: i64,
    data: &'a Value,
}

/// Default finalizer: JSON envelope on success, plain text on failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeFinalizer;

impl ResponseFinalizer for EnvelopeFinalizer {
    fn not_found(&self, _ctx: &mut RequestContext, reason: &str) -> Response {
        (StatusCode::NOT_FOUND, reason.to_string()).into_response()
    }

    fn server_error(&self, _ctx: &mut RequestContext, reason: &str) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, reason.to_string()).into_response()
    }

    fn end(&self, ctx: &mut RequestContext) -> Response {
        envelope(ctx)
    }
}

/// Render the context's response intent as the JSON envelope.
pub fn envelope(ctx: &mut RequestContext) -> Response {
    if !ctx.ret_error.is_empty() && ctx.ret_code == 0 {
        ctx.ret_code = DEFAULT_ERROR_CODE;
    }
    let data = ctx
        .ret_data
        .get_or_insert_with(|| Value::Object(serde_json::Map::new()));

    let body = match serde_json::to_vec(&Envelope {
        msg: &ctx.ret_error,
        code: ctx.ret_code,
        data,
    }) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode response envelope");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn empty_intent_renders_empty_envelope() {
        let mut ctx = RequestContext::new();
        let response = EnvelopeFinalizer.end(&mut ctx);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert_eq!(
            json_body(response).await,
            json!({ "msg": "", "code": 0, "data": {} })
        );
    }

    #[tokio::test]
    async fn error_without_code_gets_default_code() {
        let mut ctx = RequestContext::new();
        ctx.add_error("name is required");
        let response = EnvelopeFinalizer.end(&mut ctx);

        assert_eq!(
            json_body(response).await,
            json!({ "msg": "name is required", "code": 2000, "data": {} })
        );
    }

    #[tokio::test]
    async fn explicit_code_and_data_are_kept() {
        let mut ctx = RequestContext::new();
        ctx.fail(4001, "denied");
        ctx.set_data(json!({ "retry": true }));
        let response = EnvelopeFinalizer.end(&mut ctx);

        assert_eq!(
            json_body(response).await,
            json!({ "msg": "denied", "code": 4001, "data": { "retry": true } })
        );
    }

    #[tokio::test]
    async fn failures_are_plain_text() {
        let mut ctx = RequestContext::new();
        let response = EnvelopeFinalizer.not_found(&mut ctx, "not found");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = EnvelopeFinalizer.server_error(&mut ctx, "boom");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"boom");
    }
}
