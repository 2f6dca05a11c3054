use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::PROXY_CACHE_TTL_SECS;

#[derive(Debug, Clone)]
struct ProxyEntry {
    body: Arc<serde_json::Value>,
    inserted_at: Instant,
}

/// Server-side cache for the per-entry picks endpoint, keyed by upstream path.
/// Shared by every client of the proxy, so its TTL is longer than the client cache's.
pub struct ProxyCache {
    entries: DashMap<String, ProxyEntry>,
    ttl: Duration,
}

impl ProxyCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_ttl(Duration::from_secs(PROXY_CACHE_TTL_SECS)))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn get(&self, key: &str) -> Option<Arc<serde_json::Value>> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(Arc::clone(&entry.body))
        } else {
            None
        }
    }

    pub fn put(&self, key: impl Into<String>, body: serde_json::Value) {
        self.entries.insert(
            key.into(),
            ProxyEntry { body: Arc::new(body), inserted_at: Instant::now() },
        );
    }

    /// Remove entries older than the TTL. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ProxyCache {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(PROXY_CACHE_TTL_SECS))
    }
}

/// Whether `path` (relative to the API root, no query) is the cacheable picks endpoint:
/// `entry/{id}/event/{gw}/picks/`.
pub fn is_cacheable_path(path: &str) -> bool {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    matches!(
        segments.as_slice(),
        ["entry", id, "event", gw, "picks"]
            if id.parse::<u64>().is_ok() && gw.parse::<u32>().is_ok()
    )
}
