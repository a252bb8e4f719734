//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     registry.rs (prefix + name + pending middleware → RouteEntry)
//!     → handler.rs (typed function → HandlerDescriptor)
//!     → segment.rs (entries compiled into an immutable trie)
//!
//! Per request:
//!     path → segment.rs (trie walk, wildcard fallback)
//!     → RouteMatch { entry, trailing args }
//!     → middleware.rs (route chain) → handler.rs (coerce args, call)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No reflection: handlers are registered as typed closures
//! - Deterministic: same input always matches same route

pub mod handler;
pub mod middleware;
pub mod registry;
pub mod segment;

pub use handler::{FromSegment, Handler, HandlerDescriptor, InvokeError, ParamKind};
pub use middleware::{GlobalMiddleware, RouteMiddleware};
pub use registry::{Controller, ControllerRoutes, RouteEntry, RouteRegistry};
pub use segment::{RouteMatch, SegmentRouter};
