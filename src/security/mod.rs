//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after global middleware):
//!     → rate_limit.rs (Admission: shared bucket or bucket per client)
//!     → 429 on rejection, no request context is created
//!     → Pass to routing
//!
//! Config snapshot changed:
//!     → rate_limit.rs builds a new limiter and swaps it in
//! ```
//!
//! # Design Decisions
//! - Zero rate or zero bucket is a pass-through gate, no bucket bookkeeping
//! - Live limiters are never mutated by reconfiguration

pub mod rate_limit;

pub use rate_limit::{Admission, KeyedLimiter, Limiter, Rejection};
