//! File change detection subsystem.
//!
//! # Data Flow
//! ```text
//! watch(path) at init
//!     → file_watcher.rs records mtime + sha256
//!
//! Every poll interval (background task):
//!     → mtime moved? → rehash
//!     → digest differs? → notify each subscriber (coalescing channel)
//!
//! Subscribers:
//!     → config store (reload snapshot)
//!     → lifecycle manager (running executable replaced → restart)
//! ```
//!
//! # Design Decisions
//! - Polling instead of OS notifications: works for replaced binaries and
//!   network filesystems alike
//! - Content hash decides, mtime only gates the hashing cost

pub mod file_watcher;

pub use file_watcher::FileWatcher;
