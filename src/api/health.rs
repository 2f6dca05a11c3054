//! Shared health counters for the proxy's /health endpoint.
//! Updated by the forwarding handler and the sweeper.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// Picks requests answered from the proxy cache.
    pub cache_hits: AtomicU64,
    /// Picks requests that had to go upstream.
    pub cache_misses: AtomicU64,
    /// Transport failures and 5xx answers from upstream.
    pub upstream_errors: AtomicU64,
    /// Entries removed by the periodic sweep, cumulative.
    pub swept_entries: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swept(&self, n: u64) {
        self.swept_entries.fetch_add(n, Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn upstream_errors(&self) -> u64 {
        self.upstream_errors.load(Ordering::Relaxed)
    }

    pub fn swept_entries(&self) -> u64 {
        self.swept_entries.load(Ordering::Relaxed)
    }

    /// Hits over lookups, `None` before the first lookup.
    pub fn hit_rate(&self) -> Option<f64> {
        let hits = self.cache_hits();
        let total = hits + self.cache_misses();
        (total > 0).then(|| hits as f64 / total as f64)
    }
}
