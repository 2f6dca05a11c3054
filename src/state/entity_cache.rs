use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ENTITY_CACHE_TTL_SECS;
use crate::types::DetailRecord;

/// (entity id, gameweek)
type CacheKey = (u64, u32);

#[derive(Debug, Clone)]
struct CacheEntry {
    record: Arc<DetailRecord>,
    inserted_at: Instant,
}

// ---------------------------------------------------------------------------
// EntityCache
// ---------------------------------------------------------------------------

/// Client-side TTL cache of detail records. At most one entry per key; an expired
/// entry reads as absent and is dropped on the spot.
pub struct EntityCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
}

impl EntityCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_ttl(Duration::from_secs(ENTITY_CACHE_TTL_SECS)))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn get(&self, entity_id: u64, gameweek: u32) -> Option<Arc<DetailRecord>> {
        let key = (entity_id, gameweek);
        let entry = self.entries.get(&key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            debug!(entity_id, gameweek, "cache hit");
            return Some(Arc::clone(&entry.record));
        }
        drop(entry);

        // Lazy invalidation. Re-check under the write lock so a fresh put is not lost.
        self.entries
            .remove_if(&key, |_, e| e.inserted_at.elapsed() >= self.ttl);
        debug!(entity_id, gameweek, "cache entry expired");
        None
    }

    /// Last writer wins.
    pub fn put(&self, entity_id: u64, gameweek: u32, record: Arc<DetailRecord>) {
        self.entries.insert(
            (entity_id, gameweek),
            CacheEntry { record, inserted_at: Instant::now() },
        );
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(ENTITY_CACHE_TTL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pick;

    fn record(points: i64) -> Arc<DetailRecord> {
        Arc::new(DetailRecord {
            picks: vec![Pick {
                member_id: 1,
                name: "P1".to_string(),
                position: 1,
                multiplier: 2,
                is_captain: true,
                is_vice_captain: false,
            }],
            period_points: points,
            total_points: points,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_get_within_ttl_returns_same_payload() {
        let cache = EntityCache::new();
        cache.put(7, 3, record(50));

        let a = cache.get(7, 3).unwrap();
        tokio::time::advance(Duration::from_secs(30 * 60)).await;
        let b = cache.get(7, 3).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.get(7, 4).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_reads_as_absent() {
        let cache = EntityCache::new();
        cache.put(7, 3, record(50));

        tokio::time::advance(Duration::from_secs(ENTITY_CACHE_TTL_SECS + 1)).await;

        assert!(cache.get(7, 3).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn put_replaces_existing_entry() {
        let cache = EntityCache::new();
        cache.put(7, 3, record(50));
        cache.put(7, 3, record(60));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(7, 3).unwrap().period_points, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let cache = EntityCache::with_ttl(Duration::from_secs(60));
        cache.put(1, 1, record(1));
        tokio::time::advance(Duration::from_secs(45)).await;
        cache.put(2, 1, record(2));
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.get(2, 1).is_some());
    }
}
