//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests currently being dispatched
//! - Report how many were abandoned when a drain deadline passes
//!
//! # Design Decisions
//! - Guard based: the count drops even when a handler panics or the request is cancelled

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Tracks in-flight requests for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct InflightTracker {
    active: Arc<AtomicU64>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request. The returned guard releases it on drop.
    pub fn track(&self) -> InflightGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        InflightGuard {
            active: Arc::clone(&self.active),
        }
    }

    /// Requests currently in flight.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count when dropped.
#[derive(Debug)]
pub struct InflightGuard {
    active: Arc<AtomicU64>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_counts() {
        let tracker = InflightTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let first = tracker.track();
        let second = tracker.clone().track();
        assert_eq!(tracker.active_count(), 2);

        drop(first);
        assert_eq!(tracker.active_count(), 1);
        drop(second);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn guard_released_on_panic() {
        let tracker = InflightTracker::new();
        let inner = tracker.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = inner.track();
            panic!("handler blew up");
        });
        assert!(result.is_err());
        assert_eq!(tracker.active_count(), 0);
    }
}
