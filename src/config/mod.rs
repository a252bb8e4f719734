//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → store.rs (ArcSwap snapshot shared with all subsystems)
//!
//! On change notification (watch::FileWatcher):
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → store.rs pins the port, flags TLS changes for restart
//!     → atomic swap + watch channel broadcast
//!     → admission rebuilds its limiter
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    AppConfig, HttpConfig, LifecycleConfig, ObservabilityConfig, RateConfig, StaticConfig,
};
pub use store::{ConfigStore, ReloadOutcome};
