use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use asset_core::{host_of, strip_tracking};
use bytes::Bytes;
use dashmap::DashMap;
use harvest_logging::{harvest_debug, harvest_trace};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::clock::Clock;
use crate::rate_limit::RateLimiter;
use crate::transport::{HttpTransport, TransportRequest};
use crate::{FailureKind, FetchError, FetchResponse};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_MAX_ENTRIES: usize = 1024;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Per-call knobs. `params` take part in the cache key.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: Option<String>,
    pub timeout: Duration,
    pub params: Vec<(String, String)>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn to_response(&self) -> FetchResponse {
        FetchResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            from_cache: true,
        }
    }

    fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

type InFlight = Arc<OnceCell<Result<FetchResponse, FetchError>>>;

/// Conditional-GET cache in front of the transport, paced by the rate limiter.
///
/// At most one request per key is on the wire; its slot is dropped as soon
/// as the fetch settles.
pub struct FetchCache {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, InFlight>,
    network_calls: AtomicU64,
}

impl FetchCache {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            transport,
            limiter,
            clock,
            settings,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            network_calls: AtomicU64::new(0),
        }
    }

    /// Number of requests that actually reached the transport.
    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetches currently on the wire.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Serves `url` from the cache or the network. A caller that finds a
    /// fetch for the same key in flight awaits it and gets its outcome,
    /// whatever the status; `from_cache` is then set on a shared response.
    pub async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        let normalized = strip_tracking(url).ok_or_else(|| {
            FetchError::new(FailureKind::InvalidUrl, format!("not an absolute http(s) url: {url}"))
        })?;
        let host = host_of(&normalized)
            .ok_or_else(|| FetchError::new(FailureKind::InvalidUrl, format!("no host in {url}")))?;
        let key = cache_key(&normalized, &options.params);

        if let Some(hit) = self.fresh_entry(&key) {
            harvest_trace!("cache hit for {}", normalized);
            return Ok(hit);
        }

        let slot = self.in_flight.entry(key.clone()).or_default().clone();
        let ran_here = AtomicBool::new(false);
        let outcome = slot
            .get_or_init(|| async {
                ran_here.store(true, Ordering::Relaxed);
                self.fetch_once(url, &normalized, &host, &key, options).await
            })
            .await
            .clone();
        self.in_flight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));

        if ran_here.load(Ordering::Relaxed) {
            return outcome;
        }
        harvest_trace!("joined in-flight fetch for {}", normalized);
        outcome.map(|mut response| {
            response.from_cache = true;
            response
        })
    }

    fn fresh_entry(&self, key: &str) -> Option<FetchResponse> {
        let entry = self.entries.get(key)?;
        if self.clock.now() < entry.expires_at {
            Some(entry.to_response())
        } else {
            None
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        normalized: &str,
        host: &str,
        key: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        // A fetch for this key may have completed between the lookup and
        // taking the slot.
        if let Some(hit) = self.fresh_entry(key) {
            return Ok(hit);
        }

        let cached = self.entries.get(key).map(|entry| entry.value().clone());
        let revalidating = cached.as_ref().filter(|entry| entry.has_validators());
        let request = TransportRequest {
            url: url.to_string(),
            user_agent: options.user_agent.clone(),
            if_none_match: revalidating.and_then(|entry| entry.etag.clone()),
            if_modified_since: revalidating.and_then(|entry| entry.last_modified.clone()),
        };

        self.limiter.acquire(host).await;
        self.network_calls.fetch_add(1, Ordering::Relaxed);
        let response = match tokio::time::timeout(options.timeout, self.transport.send(&request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::new(
                    FailureKind::Timeout,
                    format!("no response from {url} within {:?}", options.timeout),
                ))
            }
        };

        if response.status == 304 {
            if let Some(mut entry) = cached {
                harvest_debug!("revalidated {} (304)", normalized);
                let freshness = self.freshness(&response).unwrap_or(self.settings.ttl);
                entry.expires_at = self.clock.now() + freshness;
                let served = entry.to_response();
                self.entries.insert(key.to_string(), entry);
                return Ok(served);
            }
        }

        if response.is_success() {
            if let Some(freshness) = self.freshness(&response) {
                self.store(key.to_string(), &response, freshness);
            }
        }
        Ok(response)
    }

    /// How long a response may be served without revalidation; `None` when
    /// it must not be stored at all.
    fn freshness(&self, response: &FetchResponse) -> Option<Duration> {
        let ttl = self.settings.ttl;
        let Some(control) = response.header("cache-control") else {
            return Some(ttl);
        };
        let mut freshness = ttl;
        for directive in control.split(',').map(|d| d.trim().to_ascii_lowercase()) {
            if directive == "no-store" {
                return None;
            }
            if directive == "no-cache" {
                freshness = Duration::ZERO;
            } else if let Some(seconds) = directive
                .strip_prefix("max-age=")
                .and_then(|v| v.trim_matches('"').parse::<u64>().ok())
            {
                freshness = freshness.min(Duration::from_secs(seconds));
            }
        }
        Some(freshness)
    }

    fn store(&self, key: String, response: &FetchResponse, freshness: Duration) {
        let now = self.clock.now();
        let entry = CacheEntry {
            key: key.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            etag: response.header("etag").map(str::to_string),
            last_modified: response.header("last-modified").map(str::to_string),
            stored_at: now,
            expires_at: now + freshness,
        };
        self.entries.insert(key, entry);
        self.enforce_capacity();
    }

    fn enforce_capacity(&self) {
        while self.entries.len() > self.settings.max_entries.max(1) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().stored_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drops every entry.
    pub fn purge(&self) {
        self.entries.clear();
    }

    /// Drops the entry for `url` (fetched without extra params).
    pub fn purge_url(&self, url: &str) -> bool {
        strip_tracking(url)
            .map(|normalized| self.entries.remove(&cache_key(&normalized, &[])).is_some())
            .unwrap_or(false)
    }

    /// Drops entries that have been stale for longer than one more TTL.
    pub fn evict_stale(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.settings.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at + ttl);
        before - self.entries.len()
    }
}

/// `sha256(normalized url + sorted params)` as lower-case hex. The url is
/// expected to have passed through [`strip_tracking`].
pub fn cache_key(canonical_url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    hasher.update(canonical_url.as_bytes());
    for (name, value) in sorted {
        hasher.update(b"\n");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
