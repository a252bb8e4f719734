//! Embeddable HTTP dispatch core.
//!
//! Routes requests through a segment trie to typed handlers, wraps them in
//! middleware, admission control and panic isolation, and runs the process
//! with zero downtime restarts.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;
pub mod watch;

pub use config::{AppConfig, ConfigStore};
pub use http::{Dispatcher, EnvelopeFinalizer, RequestContext, ResponseFinalizer};
pub use lifecycle::{LifecycleEvent, LifecycleState, ProcessManager, Shutdown};
pub use routing::{Controller, ControllerRoutes, RouteRegistry};
