//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     listener.rs (bind configured port, or adopt inherited fd 3)
//!     → tls.rs (optional rustls material)
//!     → hand the socket to the HTTP server
//!
//! Per request:
//!     inflight.rs (guard held for the whole dispatch)
//! ```
//!
//! # Design Decisions
//! - The listening socket outlives any single process across restarts
//! - TLS is optional and handled transparently

pub mod inflight;
pub mod listener;
pub mod tls;

pub use inflight::{InflightGuard, InflightTracker};
pub use listener::{bind_listener, inherit_listener, ListenerError, INHERITED_FD};
