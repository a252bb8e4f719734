//! Live configuration snapshot with hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::AppConfig;

/// What a reload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// The snapshot differs from the previous one.
    pub changed: bool,
    /// A setting changed that only a process restart can apply (TLS).
    pub restart_required: bool,
}

/// Holds the current configuration snapshot.
///
/// Readers take a cheap `Arc` snapshot; reloads swap the whole value and then
/// notify subscribers over a watch channel.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: ArcSwap<AppConfig>,
    changes: watch::Sender<Arc<AppConfig>>,
}

impl ConfigStore {
    /// Store without a backing file; `reload` is a no-op.
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let (changes, _) = watch::channel(Arc::clone(&config));
        Self {
            path: None,
            current: ArcSwap::new(config),
            changes,
        }
    }

    /// Store that reloads from `path`.
    pub fn with_path(config: AppConfig, path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(config);
        store.path = Some(path.into());
        store
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<AppConfig> {
        self.current.load_full()
    }

    /// Receive every accepted snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppConfig>> {
        self.changes.subscribe()
    }

    /// Re-read the backing file. On error the current snapshot stays in place.
    pub fn reload(&self) -> Result<ReloadOutcome, ConfigError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(ReloadOutcome {
                changed: false,
                restart_required: false,
            });
        };
        let config = load_config(path)?;
        Ok(self.replace(config))
    }

    /// Swap in a new snapshot.
    ///
    /// The listening port cannot move while serving, so a changed port is
    /// reverted. A changed TLS setting is accepted and flagged for restart.
    pub fn replace(&self, mut config: AppConfig) -> ReloadOutcome {
        let previous = self.current.load_full();

        if config.http.port != previous.http.port {
            tracing::warn!(
                current = previous.http.port,
                requested = config.http.port,
                "http.port cannot change while serving, keeping current port"
            );
            config.http.port = previous.http.port;
        }

        let restart_required = previous.http.tls_changed(&config.http);
        if restart_required {
            tracing::warn!(https = config.http.https, "TLS settings changed, restart required");
        }

        let changed = *previous != config;
        if changed {
            let config = Arc::new(config);
            self.current.store(Arc::clone(&config));
            self.changes.send_replace(config);
            tracing::info!("Configuration updated");
        }

        ReloadOutcome {
            changed,
            restart_required,
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
