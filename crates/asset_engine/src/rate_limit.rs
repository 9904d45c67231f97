use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use harvest_logging::harvest_trace;
use tokio::sync::Mutex;

use crate::clock::Clock;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);

/// Per-host request pacing.
///
/// Each host owns an async lock around its last request time; callers for
/// the same host queue on it, callers for other hosts never wait.
pub struct RateLimiter {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    hosts: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            clock,
            hosts: DashMap::new(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until `host` may be contacted again and claims the slot.
    pub async fn acquire(&self, host: &str) {
        if self.min_interval.is_zero() {
            return;
        }
        let slot = self
            .hosts
            .entry(host.to_ascii_lowercase())
            .or_default()
            .clone();
        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            let now = self.clock.now();
            if ready_at > now {
                let wait = ready_at - now;
                harvest_trace!("rate limit: waiting {:?} before contacting {}", wait, host);
                self.clock.sleep(wait).await;
            }
        }
        *last = Some(self.clock.now());
    }
}
