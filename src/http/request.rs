//! Request identification helpers.
//!
//! # Responsibilities
//! - Generate unique, time ordered request IDs (UUID v7)
//! - Resolve the client IP behind proxies
//! - Percent-decode the request path for routing and file lookup
//!
//! # Design Decisions
//! - Request ID assigned as early as possible for tracing
//! - X-Forwarded-For first hop wins, then X-Real-Ip, then the peer address

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::http::{HeaderMap, Uri};
use percent_encoding::percent_decode_str;
use uuid::Uuid;

/// Header carrying the request ID on every response.
pub const X_REQUEST_ID: &str = "x-request-id";

/// New request ID. v7 IDs sort by creation time.
pub fn new_request_id() -> Uuid {
    Uuid::now_v7()
}

/// The URI path with percent escapes decoded. Invalid UTF-8 is replaced.
pub fn decoded_path(uri: &Uri) -> Cow<'_, str> {
    percent_decode_str(uri.path()).decode_utf8_lossy()
}

/// Best guess at the originating client address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}
