//! Process lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (manager.rs):
//!     -g set → listener from fd 3 (handoff.rs)
//!     otherwise → bind http.port
//!     → spawn watchers, signal listener → Serving
//!
//! Restart (SIGHUP, changed binary, changed TLS settings):
//!     → spawn successor with listener at fd 3 (restart.rs)
//!     → spawn failed: keep Serving
//!     → spawn ok: drain (shutdown.rs) → close hooks → exit
//!
//! Shutdown (SIGTERM/SIGINT/SIGQUIT):
//!     → stop accepting → drain within grace → close hooks → exit
//! ```
//!
//! # Design Decisions
//! - The listening socket outlives the parent, so a restart refuses nothing
//! - Drain has a deadline; requests still running after it are abandoned
//! - Daemon mode re-executes the binary rather than forking a live runtime

pub mod daemon;
pub mod handoff;
pub mod manager;
pub mod restart;
pub mod shutdown;
pub mod signals;

pub use handoff::{HandoffError, ListenerHandoff};
pub use manager::{LifecycleError, LifecycleState, ProcessManager};
pub use restart::{RestartError, GRACEFUL_FLAG};
pub use shutdown::Shutdown;
pub use signals::LifecycleEvent;
