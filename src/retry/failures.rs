use std::sync::Arc;

use tracing::warn;

use crate::fetcher::FetchError;
use crate::rules::RuleConfig;
use crate::types::Entity;

/// One entity waiting to be retried.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub entity: Entity,
    /// Position in the listing, so retried results land in listing order.
    pub index: usize,
    pub gameweek: u32,
    pub rules: Arc<RuleConfig>,
    pub reason: FetchError,
}

/// Active failure set for one run. Holds at most one record per entity id.
#[derive(Debug, Default)]
pub struct FailureTracker {
    records: Vec<FailureRecord>,
    paused: bool,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transient failure. Always raises the pause flag; the record itself is
    /// only inserted if the entity is not already tracked. Returns whether it was inserted.
    pub fn admit(&mut self, record: FailureRecord) -> bool {
        self.paused = true;
        if self.contains(record.entity.id) {
            return false;
        }
        warn!(
            entity_id = record.entity.id,
            gameweek = record.gameweek,
            reason = %record.reason,
            "[BACKOFF] transient failure, queued for retry"
        );
        self.records.push(record);
        true
    }

    pub fn contains(&self, entity_id: u64) -> bool {
        self.records.iter().any(|r| r.entity.id == entity_id)
    }

    /// Drop the record after a successful retry.
    pub fn resolve(&mut self, entity_id: u64) -> Option<FailureRecord> {
        let pos = self.records.iter().position(|r| r.entity.id == entity_id)?;
        Some(self.records.remove(pos))
    }

    /// Refresh the stored reason after another failed attempt.
    pub fn update_reason(&mut self, entity_id: u64, reason: FetchError) {
        if let Some(r) = self.records.iter_mut().find(|r| r.entity.id == entity_id) {
            r.reason = reason;
        }
    }

    /// Snapshot of the current set, in admission order.
    pub fn pending(&self) -> Vec<FailureRecord> {
        self.records.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn clear_pause(&mut self) {
        self.paused = false;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
