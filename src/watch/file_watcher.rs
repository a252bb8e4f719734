//! Polling file watcher with content-hash change detection.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

type Fingerprint = [u8; 32];

/// Last observed state of a tracked file.
struct TrackedFile {
    modified: Option<SystemTime>,
    digest: Option<Fingerprint>,
    subscribers: Vec<mpsc::Sender<()>>,
}

/// Watches a set of files and notifies subscribers when their content changes.
///
/// Each poll compares the modification time first and only hashes the file when
/// it moved, so touching a file without changing its bytes notifies nobody.
/// Notifications coalesce: a subscriber that has not consumed the previous
/// notification does not receive a second one.
pub struct FileWatcher {
    tracked: Mutex<HashMap<PathBuf, TrackedFile>>,
    interval: Duration,
}

impl FileWatcher {
    /// Create a watcher polling at the given interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            tracked: Mutex::new(HashMap::new()),
            interval,
        }
    }

    /// Track `path` and return a receiver that fires on each content change.
    ///
    /// A path that does not exist yet is tracked anyway and reported once it appears.
    pub fn watch(&self, path: impl Into<PathBuf>) -> mpsc::Receiver<()> {
        let path = path.into();
        let (tx, rx) = mpsc::channel(1);

        let mut tracked = self.lock();
        let entry = tracked.entry(path.clone()).or_insert_with(|| {
            let (modified, digest) = match fingerprint(&path) {
                Ok((modified, digest)) => (Some(modified), Some(digest)),
                Err(_) => (None, None),
            };
            TrackedFile {
                modified,
                digest,
                subscribers: Vec::new(),
            }
        });
        entry.subscribers.push(tx);

        tracing::debug!(path = %path.display(), "Watching file");
        rx
    }

    /// Number of tracked paths.
    pub fn tracked_count(&self) -> usize {
        self.lock().len()
    }

    /// Check every tracked file once and notify subscribers of changed ones.
    ///
    /// Returns the paths whose content changed.
    pub fn poll_once(&self) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        let mut tracked = self.lock();

        for (path, state) in tracked.iter_mut() {
            let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if state.modified == Some(modified) {
                continue;
            }
            state.modified = Some(modified);

            let digest = match hash_file(path) {
                Ok(digest) => digest,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to hash watched file");
                    continue;
                }
            };
            if state.digest == Some(digest) {
                continue;
            }
            state.digest = Some(digest);

            state.subscribers.retain(|tx| !tx.is_closed());
            for tx in &state.subscribers {
                // Full means a notification is already pending.
                let _ = tx.try_send(());
            }
            tracing::info!(path = %path.display(), "Watched file changed");
            changed.push(path.clone());
        }

        changed
    }

    /// Run the polling loop until shutdown.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let watcher = Arc::clone(&self);
                        if let Err(e) = tokio::task::spawn_blocking(move || watcher.poll_once()).await {
                            tracing::error!(error = %e, "File watcher poll failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("File watcher stopped");
                        break;
                    }
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, TrackedFile>> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn fingerprint(path: &Path) -> io::Result<(SystemTime, Fingerprint)> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok((modified, hash_file(path)?))
}

fn hash_file(path: &Path) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn bump_mtime(path: &Path, secs: u64) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn content_change_notifies_every_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(&path, "a = 1").unwrap();

        let watcher = FileWatcher::new(Duration::from_secs(1));
        let mut first = watcher.watch(&path);
        let mut second = watcher.watch(&path);
        assert_eq!(watcher.tracked_count(), 1);

        fs::write(&path, "a = 2").unwrap();
        bump_mtime(&path, 5);

        assert_eq!(watcher.poll_once(), vec![path.clone()]);
        assert!(first.try_recv().is_ok());
        assert!(second.try_recv().is_ok());
    }

    #[test]
    fn touch_without_content_change_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary");
        fs::write(&path, "v1").unwrap();

        let watcher = FileWatcher::new(Duration::from_secs(1));
        let mut rx = watcher.watch(&path);

        fs::write(&path, "v1").unwrap();
        bump_mtime(&path, 5);

        assert!(watcher.poll_once().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn notifications_coalesce() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(&path, "v1").unwrap();

        let watcher = FileWatcher::new(Duration::from_secs(1));
        let mut rx = watcher.watch(&path);

        fs::write(&path, "v2").unwrap();
        bump_mtime(&path, 5);
        watcher.poll_once();
        fs::write(&path, "v3").unwrap();
        bump_mtime(&path, 10);
        watcher.poll_once();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn missing_file_reported_once_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.toml");

        let watcher = FileWatcher::new(Duration::from_secs(1));
        let mut rx = watcher.watch(&path);
        assert!(watcher.poll_once().is_empty());

        fs::write(&path, "x = 1").unwrap();
        assert_eq!(watcher.poll_once().len(), 1);
        assert!(rx.try_recv().is_ok());
    }
}
