use parking_lot::Mutex;
use std::collections::hash_map::{Entry, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::LimiterConfig;

/// Counts requests per client in fixed time windows.
///
/// A client may send `limit` requests per window. Windows are fixed, not sliding, so a client can
/// get up to twice the limit through across a window boundary.
///
/// Counters live in a single map shared with a background task that evicts windows once they have
/// been closed for longer than the eviction age. The task runs until `shutdown` is called or the
/// limiter is dropped.
pub struct RateLimiter {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    buckets: Mutex<HashMap<(String, u64), u32>>,
    limit: u32,
    window_ms: u64,
    eviction_age_ms: u64,
    // Windows are numbered from the moment the limiter was created.
    origin: Instant,
}

impl RateLimiter {
    /// Creates the limiter and spawns its sweep task, so it must be called within a Tokio runtime.
    pub fn new(config: &LimiterConfig) -> RateLimiter {
        let shared = Arc::new(Shared {
            buckets: Mutex::new(HashMap::new()),
            limit: config.limit,
            window_ms: as_millis(config.window).max(1),
            eviction_age_ms: as_millis(config.eviction_age),
            origin: Instant::now(),
        });
        let shutdown = CancellationToken::new();

        let sweeper = tokio::spawn(sweep_stale_buckets(
            shared.clone(),
            config.sweep_interval.max(Duration::from_millis(1)),
            shutdown.clone(),
        ));

        RateLimiter {
            shared,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Records a request from `client` and tells whether it is within the limit. Rejected requests
    /// are not counted.
    pub fn admit(&self, client: &str) -> bool {
        self.shared.admit(client)
    }

    pub fn bucket_count(&self) -> usize {
        self.shared.buckets.lock().len()
    }

    /// Stops the sweep task and waits for it to exit. Admitting keeps working afterwards.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            if let Err(e) = sweeper.await {
                error!("rate limiter sweep task failed: {}", e);
            }
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Shared {
    fn now_ms(&self) -> u64 {
        as_millis(self.origin.elapsed())
    }

    fn admit(&self, client: &str) -> bool {
        let window = self.now_ms() / self.window_ms;
        let mut buckets = self.buckets.lock();

        match buckets.entry((client.to_string(), window)) {
            Entry::Vacant(entry) => {
                entry.insert(1);
                true
            }
            Entry::Occupied(mut entry) => {
                let count = entry.get_mut();
                if *count < self.limit {
                    *count += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Removes every window that closed at least `eviction_age_ms` ago and returns how many were
    /// removed.
    fn remove_stale_buckets(&self) -> usize {
        let now = self.now_ms();
        let mut buckets = self.buckets.lock();
        let before = buckets.len();

        buckets.retain(|(_, window), _| {
            let closed_at = window.saturating_add(1).saturating_mul(self.window_ms);
            closed_at.saturating_add(self.eviction_age_ms) > now
        });

        before - buckets.len()
    }
}

async fn sweep_stale_buckets(shared: Arc<Shared>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = time::interval(every);
    info!("rate limiter sweep started, interval: {:?}", every);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let removed = shared.remove_stale_buckets();
                if removed > 0 {
                    debug!(removed = removed, "evicted stale rate limiter windows");
                }
            }
        }
    }

    info!("rate limiter sweep stopped");
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
