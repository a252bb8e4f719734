//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, tower layers, catch-all route)
//!     → dispatcher.rs (global middleware, admission, routing)
//!     → context.rs (pooled per-request state, parameters)
//!     → [route middleware and handler on the blocking pool]
//!     → static_files.rs (fallback when no route matches)
//!     → response.rs (finalizer writes envelope or error)
//!     → Send to client
//! ```

pub mod context;
pub mod dispatcher;
pub mod request;
pub mod response;
pub mod server;
pub mod static_files;

pub use context::{ContextPool, ParamError, RequestContext};
pub use dispatcher::Dispatcher;
pub use request::X_REQUEST_ID;
pub use response::{EnvelopeFinalizer, ResponseFinalizer};
pub use server::{build_router, serve};
pub use static_files::{StaticError, StaticFiles};
