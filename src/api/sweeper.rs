use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::api::HealthState;
use crate::config::PROXY_SWEEP_INTERVAL_SECS;
use crate::snapshot::SnapshotStore;
use crate::state::ProxyCache;

/// Background task that drops stale proxy cache entries and old snapshot files every hour.
pub struct ProxySweeper {
    cache: Arc<ProxyCache>,
    snapshots: SnapshotStore,
    health: Arc<HealthState>,
}

impl ProxySweeper {
    pub fn new(cache: Arc<ProxyCache>, snapshots: SnapshotStore, health: Arc<HealthState>) -> Self {
        Self { cache, snapshots, health }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(PROXY_SWEEP_INTERVAL_SECS));
        interval.tick().await; // consume immediate first tick

        loop {
            interval.tick().await;
            self.sweep_once().await;
        }
    }

    pub async fn sweep_once(&self) {
        let removed = self.cache.sweep();
        self.health.record_swept(removed as u64);
        info!(removed, remaining = self.cache.len(), "[PROXY] cache sweep");

        if let Err(e) = self.snapshots.cleanup().await {
            error!("[SNAPSHOT] cleanup error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn sweep_counts_removed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ProxyCache::with_ttl(Duration::from_secs(5)));
        let health = Arc::new(HealthState::new());
        cache.put("entry/1/event/1/picks/", json!({}));
        tokio::time::advance(Duration::from_secs(6)).await;

        let sweeper = ProxySweeper::new(
            Arc::clone(&cache),
            SnapshotStore::new(dir.path(), "export"),
            Arc::clone(&health),
        );
        sweeper.sweep_once().await;

        assert!(cache.is_empty());
        assert_eq!(health.swept_entries(), 1);
    }
}
