//! Token bucket admission control.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{AppConfig, RateConfig};

/// Keyed limiters above this count get their idle (full) buckets pruned.
const MAX_IDLE_KEYS: usize = 4096;

/// A simple token bucket. Tokens may go negative to record reservations
/// made by callers that are waiting for their turn.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }
}

/// Outcome of asking the bucket for a token.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Reservation {
    Granted,
    /// Token reserved, usable after the delay.
    Delayed(Duration),
    Denied,
}

/// Rate limiter: `per_second` tokens flow into a bucket of `capacity`.
///
/// A limiter built with a non-positive rate or a zero capacity never touches
/// a bucket and admits everything.
pub struct Limiter {
    per_second: f64,
    capacity: f64,
    max_wait: Duration,
    bucket: Option<Mutex<TokenBucket>>,
}

impl Limiter {
    pub fn new(per_second: f64, capacity: u32, max_wait_millis: u64) -> Self {
        let capacity = f64::from(capacity);
        let bucket = (per_second > 0.0 && capacity > 0.0)
            .then(|| Mutex::new(TokenBucket::new(capacity)));
        Self {
            per_second,
            capacity,
            max_wait: Duration::from_millis(max_wait_millis),
            bucket,
        }
    }

    pub fn from_config(config: &RateConfig) -> Self {
        Self::new(config.per_second, config.bucket, config.wait_millisecond)
    }

    /// True when this limiter admits everything.
    pub fn is_unlimited(&self) -> bool {
        self.bucket.is_none()
    }

    /// Take a token, waiting up to the configured bound for one to arrive.
    pub async fn allow(&self) -> bool {
        match self.reserve() {
            Reservation::Granted => true,
            Reservation::Delayed(wait) => {
                tokio::time::sleep(wait).await;
                true
            }
            Reservation::Denied => false,
        }
    }

    /// Take a token only if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let Some(bucket) = &self.bucket else {
            return true;
        };
        let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.refill(self.capacity, self.per_second);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn reserve(&self) -> Reservation {
        let Some(bucket) = &self.bucket else {
            return Reservation::Granted;
        };
        let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.refill(self.capacity, self.per_second);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Reservation::Granted;
        }
        if self.max_wait.is_zero() {
            return Reservation::Denied;
        }

        let wait = match Duration::try_from_secs_f64((1.0 - bucket.tokens) / self.per_second) {
            Ok(wait) if wait <= self.max_wait => wait,
            _ => return Reservation::Denied,
        };
        bucket.tokens -= 1.0;
        Reservation::Delayed(wait)
    }

    /// A full bucket behaves exactly like a fresh one.
    fn is_idle(&self) -> bool {
        let Some(bucket) = &self.bucket else {
            return true;
        };
        let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.refill(self.capacity, self.per_second);
        bucket.tokens >= self.capacity
    }
}

/// One limiter per key (client IP, API key, ...), all with the same parameters.
pub struct KeyedLimiter {
    config: RateConfig,
    limiters: DashMap<String, Arc<Limiter>>,
}

impl KeyedLimiter {
    pub fn new(config: RateConfig) -> Self {
        Self {
            config,
            limiters: DashMap::new(),
        }
    }

    /// Limiter for `key`, created on first use.
    pub fn get(&self, key: &str) -> Arc<Limiter> {
        if let Some(limiter) = self.limiters.get(key) {
            return Arc::clone(limiter.value());
        }
        if self.limiters.len() >= MAX_IDLE_KEYS {
            self.limiters.retain(|_, limiter| !limiter.is_idle());
        }
        let limiter = self
            .limiters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Limiter::from_config(&self.config)));
        Arc::clone(limiter.value())
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

/// Which gate rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Global,
    Client,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::Global => "global",
            Rejection::Client => "client",
        }
    }
}

enum Gate {
    Open,
    Global(Limiter),
    PerClient(KeyedLimiter),
}

struct AdmissionState {
    config: RateConfig,
    gate: Gate,
}

impl AdmissionState {
    fn new(config: &RateConfig) -> Self {
        let limiter = Limiter::from_config(config);
        let gate = if limiter.is_unlimited() {
            Gate::Open
        } else if config.per_client {
            Gate::PerClient(KeyedLimiter::new(config.clone()))
        } else {
            Gate::Global(limiter)
        };
        Self {
            config: config.clone(),
            gate,
        }
    }
}

/// Admission gate in front of every request.
///
/// Either one bucket shared by all requests, or (with `per_client`) one bucket
/// per client key. Reconfiguration builds a brand new state and swaps it in, so
/// requests already waiting on the old bucket finish against the old bucket.
pub struct Admission {
    state: ArcSwap<AdmissionState>,
}

impl Admission {
    pub fn new(config: &RateConfig) -> Self {
        Self {
            state: ArcSwap::from_pointee(AdmissionState::new(config)),
        }
    }

    /// Admission that lets everything through.
    pub fn unlimited() -> Self {
        Self::new(&RateConfig::default())
    }

    /// Admit or reject a request from `client`.
    pub async fn check(&self, client: &str) -> Result<(), Rejection> {
        let state = self.state.load_full();
        match &state.gate {
            Gate::Open => Ok(()),
            Gate::Global(limiter) => {
                if limiter.allow().await {
                    Ok(())
                } else {
                    Err(Rejection::Global)
                }
            }
            Gate::PerClient(keyed) => {
                if keyed.get(client).allow().await {
                    Ok(())
                } else {
                    Err(Rejection::Client)
                }
            }
        }
    }

    /// Swap in new parameters. Returns true when the limiter was replaced.
    pub fn reconfigure(&self, config: &RateConfig) -> bool {
        if self.state.load().config == *config {
            return false;
        }
        self.state.store(Arc::new(AdmissionState::new(config)));
        tracing::info!(
            per_second = config.per_second,
            bucket = config.bucket,
            wait_millisecond = config.wait_millisecond,
            per_client = config.per_client,
            "Admission limiter replaced"
        );
        true
    }

    /// Follow configuration snapshots until the sender goes away.
    pub fn spawn_reconfigure(
        self: Arc<Self>,
        mut changes: watch::Receiver<Arc<AppConfig>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let config = Arc::clone(&changes.borrow_and_update());
                self.reconfigure(&config.rate);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn zero_config_always_allows() {
        for (rate, bucket) in [(0.0, 10), (5.0, 0), (-1.0, 5)] {
            let limiter = Limiter::new(rate, bucket, 0);
            assert!(limiter.is_unlimited());
            for _ in 0..10_000 {
                assert!(limiter.allow().await);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_per_second_without_wait() {
        let limiter = Limiter::new(1.0, 1, 0);
        assert!(limiter.allow().await);
        assert!(!limiter.allow().await);
        assert!(!limiter.allow().await);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(limiter.allow().await);
        assert!(!limiter.allow().await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_beyond_duration_range_is_denied() {
        let limiter = Limiter::new(1e-20, 1, 10);
        assert!(limiter.allow().await);
        assert!(!limiter.allow().await);
        assert!(!limiter.allow().await);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_next_token_within_bound() {
        let limiter = Limiter::new(10.0, 1, 200);
        assert!(limiter.allow().await);

        let start = Instant::now();
        assert!(limiter.allow().await);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_longer_than_bound_is_denied() {
        let limiter = Limiter::new(1.0, 1, 200);
        assert!(limiter.allow().await);

        let start = Instant::now();
        assert!(!limiter.allow().await);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_capacity() {
        let limiter = Limiter::new(1.0, 3, 0);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn keyed_limiters_are_independent() {
        let keyed = KeyedLimiter::new(RateConfig {
            per_second: 1.0,
            bucket: 1,
            wait_millisecond: 0,
            per_client: true,
        });
        assert!(keyed.get("10.0.0.1").allow().await);
        assert!(!keyed.get("10.0.0.1").allow().await);
        assert!(keyed.get("10.0.0.2").allow().await);
        assert_eq!(keyed.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn admission_per_client_buckets() {
        let admission = Admission::new(&RateConfig {
            per_second: 1.0,
            bucket: 2,
            wait_millisecond: 0,
            per_client: true,
        });
        assert!(admission.check("1.2.3.4").await.is_ok());
        assert!(admission.check("1.2.3.4").await.is_ok());
        assert_eq!(admission.check("1.2.3.4").await, Err(Rejection::Client));
        assert!(admission.check("5.6.7.8").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn reconfigure_swaps_limiter() {
        let admission = Admission::unlimited();
        for _ in 0..100 {
            assert!(admission.check("a").await.is_ok());
        }

        let strict = RateConfig {
            per_second: 1.0,
            bucket: 1,
            wait_millisecond: 0,
            per_client: false,
        };
        assert!(admission.reconfigure(&strict));
        assert!(!admission.reconfigure(&strict));
        assert!(admission.check("a").await.is_ok());
        assert_eq!(admission.check("a").await, Err(Rejection::Global));
    }

    #[tokio::test(start_paused = true)]
    async fn follows_config_snapshots() {
        let admission = Arc::new(Admission::unlimited());
        let store = crate::config::ConfigStore::default();
        let task = Arc::clone(&admission).spawn_reconfigure(store.subscribe());

        let mut next = AppConfig::default();
        next.rate = RateConfig {
            per_second: 1.0,
            bucket: 1,
            wait_millisecond: 0,
            per_client: false,
        };
        store.replace(next);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(admission.check("a").await.is_ok());
        assert!(admission.check("a").await.is_err());
        task.abort();
    }
}
