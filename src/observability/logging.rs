//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber once per process
//! - Pick the output format for the environment
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for every environment except `local`
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Environment name that selects the human readable formatter.
pub const LOCAL_ENV: &str = "local";

/// Build the level filter: `RUST_LOG` first, then the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig, env: &str) -> Result<(), TryInitError> {
    let json = env != LOCAL_ENV;
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(json.then(|| fmt::layer().json().with_current_span(false)))
        .with((!json).then(|| fmt::layer()))
        .try_init()
}

