use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use asset_core::{host_of, strip_tracking};
use bytes::Bytes;
use dashmap::DashMap;
use harvest_logging::{harvest_debug, harvest_trace};
use rand::Rng;
use tokio::sync::OnceCell;

use crate::cache::{FetchCache, FetchOptions, DEFAULT_REQUEST_TIMEOUT};
use crate::clock::Clock;
use crate::{FailureKind, FetchError, FetchResponse};

/// Browser-like agents rotated per request.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub user_agents: Vec<String>,
    pub blocked_hosts: Vec<String>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            blocked_hosts: Vec::new(),
        }
    }
}

/// Polite GETs: rotating agents, bounded retries with jittered backoff, and
/// a hard per-request timeout. Every failure stays scoped to its URL.
///
/// Concurrent calls for one URL share a single retry sequence.
pub struct RespectfulCrawler {
    cache: Arc<FetchCache>,
    clock: Arc<dyn Clock>,
    settings: CrawlSettings,
    agent_cursor: AtomicUsize,
    in_flight: DashMap<String, Arc<OnceCell<Result<FetchResponse, FetchError>>>>,
}

impl RespectfulCrawler {
    pub fn new(cache: Arc<FetchCache>, clock: Arc<dyn Clock>, settings: CrawlSettings) -> Self {
        Self {
            cache,
            clock,
            settings,
            agent_cursor: AtomicUsize::new(0),
            in_flight: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    pub async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        self.fetch(url).await.map(|response| response.body)
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        if self.is_blocked(url) {
            return Err(FetchError::new(
                FailureKind::BlockedHost,
                format!("{url} is on the blocked host list"),
            ));
        }

        let key = strip_tracking(url).unwrap_or_else(|| url.to_string());
        let slot = self.in_flight.entry(key.clone()).or_default().clone();
        let ran_here = AtomicBool::new(false);
        let outcome = slot
            .get_or_init(|| async {
                ran_here.store(true, Ordering::Relaxed);
                self.fetch_with_retries(url).await
            })
            .await
            .clone();
        self.in_flight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));
        if !ran_here.load(Ordering::Relaxed) {
            harvest_trace!("joined in-flight crawl of {}", url);
        }
        outcome
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let attempts = self.settings.max_attempts.max(1);
        let mut last_error = FetchError::new(FailureKind::Network, "no attempt made");
        for attempt in 1..=attempts {
            let options = FetchOptions {
                user_agent: self.next_user_agent(),
                timeout: self.settings.request_timeout,
                params: Vec::new(),
            };
            let error = match self.cache.fetch(url, &options).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => status_error(url, response.status),
                Err(err) => err,
            };
            if !error.is_retryable() {
                return Err(error);
            }
            harvest_debug!("attempt {}/{} for {} failed: {}", attempt, attempts, url, error);
            last_error = error;
            if attempt < attempts {
                self.clock.sleep(self.backoff(attempt)).await;
            }
        }
        Err(last_error)
    }

    fn is_blocked(&self, url: &str) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };
        self.settings.blocked_hosts.iter().any(|blocked| {
            let blocked = blocked.trim().to_ascii_lowercase();
            host == blocked || host.ends_with(&format!(".{blocked}"))
        })
    }

    fn next_user_agent(&self) -> Option<String> {
        if self.settings.user_agents.is_empty() {
            return None;
        }
        let index = self.agent_cursor.fetch_add(1, Ordering::Relaxed);
        Some(self.settings.user_agents[index % self.settings.user_agents.len()].clone())
    }

    /// `base · 2^(attempt-1)` plus up to half a base of jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.settings.backoff_base;
        let exponential = base.saturating_mul(1u32 << (attempt - 1).min(16));
        exponential + jitter(base / 2)
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

fn status_error(url: &str, status: u16) -> FetchError {
    let kind = match status {
        403 | 429 | 451 => FailureKind::BlockedHost,
        other => FailureKind::HttpStatus(other),
    };
    FetchError::new(kind, format!("{url} answered {status}"))
}
