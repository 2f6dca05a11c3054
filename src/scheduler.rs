use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, RETRY_BATCH_GAP_MS, RETRY_BATCH_WIDTH, RETRY_WARN_ROUNDS};
use crate::error::{AppError, Result};
use crate::fetcher::{FetchError, Upstream};
use crate::progress::{fetch_percent, ProgressSink};
use crate::retry::{BackoffController, FailureRecord, FailureTracker};
use crate::rules::{evaluate, Roster, RuleConfig};
use crate::state::EntityCache;
use crate::types::{DetailRecord, Entity, EntityResult};

/// Knobs for one scheduler instance.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Concurrent fetches per group.
    pub batch_width: usize,
    /// Politeness delay between groups while no pause is active.
    pub request_delay: Duration,
    /// Concurrent fetches per retry sub-batch.
    pub retry_width: usize,
    pub retry_gap: Duration,
}

impl SchedulerOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            batch_width: cfg.batch_width,
            request_delay: cfg.request_delay,
            ..Self::default()
        }
    }

    /// Retry sub-batch width actually used: always below the group width, never zero.
    pub fn effective_retry_width(&self) -> usize {
        self.retry_width
            .min(self.batch_width.saturating_sub(1))
            .max(1)
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            batch_width: 5,
            request_delay: Duration::from_millis(50),
            retry_width: RETRY_BATCH_WIDTH,
            retry_gap: Duration::from_millis(RETRY_BATCH_GAP_MS),
        }
    }
}

/// Mutable bookkeeping for one `run`. Results are keyed by listing position of the
/// deduplicated input, so each entity id lands at most once and in listing order.
#[derive(Default)]
struct RunState {
    results: BTreeMap<usize, EntityResult>,
    dropped: usize,
    tracker: FailureTracker,
}

impl RunState {
    fn settled(&self) -> usize {
        self.results.len() + self.dropped
    }
}

// ---------------------------------------------------------------------------
// BatchScheduler
// ---------------------------------------------------------------------------

/// Fetches and evaluates entities group by group. A group is fully resolved before the
/// next one starts; transient failures pause the pipeline until every one has succeeded.
pub struct BatchScheduler {
    upstream: Arc<dyn Upstream>,
    cache: Arc<EntityCache>,
    roster: Arc<Roster>,
    opts: SchedulerOptions,
    progress: ProgressSink,
    cancel: CancellationToken,
}

impl BatchScheduler {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        cache: Arc<EntityCache>,
        roster: Arc<Roster>,
        opts: SchedulerOptions,
    ) -> Self {
        Self {
            upstream,
            cache,
            roster,
            opts,
            progress: ProgressSink::disabled(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch and evaluate every entity. The backoff state is reset on entry and handed
    /// back with the results so the caller owns it between runs.
    ///
    /// Only a cancellation ends the run early; transient failures are retried until they
    /// succeed and permanent ones are logged and left out of the results.
    pub async fn run(
        &self,
        entities: &[Entity],
        gameweek: u32,
        rules: Arc<RuleConfig>,
        mut backoff: BackoffController,
    ) -> Result<(Vec<EntityResult>, BackoffController)> {
        backoff.reset();
        let entities = unique_by_id(entities);
        let mut state = RunState::default();
        let total = entities.len();
        let width = self.opts.batch_width.max(1);
        let group_count = total.div_ceil(width);

        for (group_idx, group) in entities.chunks(width).enumerate() {
            if self.cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let base = group_idx * width;

            let outcomes = join_all(group.iter().map(|e| self.fetch_one(e, gameweek))).await;

            for (offset, (entity, outcome)) in group.iter().zip(outcomes).enumerate() {
                let index = base + offset;
                match outcome {
                    Ok(record) => self.accept(&mut state, index, entity, record, &rules),
                    Err(reason) if reason.is_transient() => {
                        state.tracker.admit(FailureRecord {
                            entity: entity.clone(),
                            index,
                            gameweek,
                            rules: Arc::clone(&rules),
                            reason,
                        });
                    }
                    Err(reason) => {
                        warn!(entity_id = entity.id, gameweek, %reason, "permanent failure, entity dropped");
                        state.dropped += 1;
                    }
                }
            }

            let settled = state.settled();
            self.progress.emit(
                fetch_percent(settled, total),
                format!("Processed {settled}/{total} teams (batch {}/{group_count})", group_idx + 1),
            );

            if state.tracker.is_paused() {
                let recovered = self.drain_failures(&mut state, &mut backoff, total).await?;
                let settled = state.settled();
                self.progress.emit(
                    fetch_percent(settled, total),
                    format!("Recovered {recovered} teams, processed {settled}/{total}"),
                );
            } else if group_idx + 1 < group_count && !self.opts.request_delay.is_zero() {
                self.pause(self.opts.request_delay).await?;
            }
        }

        debug!(results = state.results.len(), dropped = state.dropped, "batch run complete");
        Ok((state.results.into_values().collect(), backoff))
    }

    /// Backoff-retry loop. Runs until the failure set is empty and returns how many
    /// entities succeeded on retry.
    async fn drain_failures(
        &self,
        state: &mut RunState,
        backoff: &mut BackoffController,
        total: usize,
    ) -> Result<usize> {
        let mut recovered = 0;
        let mut rounds = 0u32;

        while !state.tracker.is_empty() {
            rounds += 1;
            let delay = backoff.next_delay();
            let pending = state.tracker.pending();
            if rounds > RETRY_WARN_ROUNDS {
                warn!(
                    rounds,
                    pending = pending.len(),
                    "[BACKOFF] excessive retry rounds, still retrying"
                );
            }

            warn!(
                pending = pending.len(),
                delay_secs = delay.as_secs_f64(),
                round = backoff.round(),
                "[BACKOFF] pausing before retry"
            );
            self.progress.emit(
                fetch_percent(state.settled(), total),
                format!(
                    "Rate limited: waiting {}s before retrying {} teams (round {rounds})",
                    delay.as_secs(),
                    pending.len()
                ),
            );
            self.pause(delay).await?;
            state.tracker.clear_pause();

            let sub_batches: Vec<&[FailureRecord]> = pending.chunks(self.opts.effective_retry_width()).collect();
            for (i, chunk) in sub_batches.iter().enumerate() {
                if i > 0 {
                    self.pause(self.opts.retry_gap).await?;
                }
                info!(round = rounds, teams = chunk.len(), "[BACKOFF] retrying sub-batch {}/{}", i + 1, sub_batches.len());
                self.progress.emit(
                    fetch_percent(state.settled(), total),
                    format!("Retrying {} teams (round {rounds})", chunk.len()),
                );

                let outcomes =
                    join_all(chunk.iter().map(|f| self.fetch_one(&f.entity, f.gameweek))).await;

                for (failure, outcome) in chunk.iter().zip(outcomes) {
                    match outcome {
                        Ok(record) => {
                            state.tracker.resolve(failure.entity.id);
                            self.accept(state, failure.index, &failure.entity, record, &failure.rules);
                            recovered += 1;
                        }
                        Err(reason) if reason.is_transient() => {
                            debug!(entity_id = failure.entity.id, %reason, "retry failed, keeping in failure set");
                            state.tracker.update_reason(failure.entity.id, reason);
                        }
                        Err(reason) => {
                            warn!(entity_id = failure.entity.id, %reason, "permanent failure on retry, entity dropped");
                            state.tracker.resolve(failure.entity.id);
                            state.dropped += 1;
                        }
                    }
                }
            }
        }

        state.tracker.clear_pause();
        backoff.reset();
        info!(recovered, rounds, "[BACKOFF] failure set drained");
        Ok(recovered)
    }

    async fn fetch_one(&self, entity: &Entity, gameweek: u32) -> std::result::Result<Arc<DetailRecord>, FetchError> {
        if let Some(record) = self.cache.get(entity.id, gameweek) {
            return Ok(record);
        }
        let mut record = self.upstream.picks(entity.id, gameweek).await?;
        self.roster.label(&mut record);
        let record = Arc::new(record);
        self.cache.put(entity.id, gameweek, Arc::clone(&record));
        Ok(record)
    }

    fn accept(
        &self,
        state: &mut RunState,
        index: usize,
        entity: &Entity,
        record: Arc<DetailRecord>,
        rules: &RuleConfig,
    ) {
        let evaluation = evaluate(&record, rules, &self.roster);
        state.results.entry(index).or_insert(EntityResult {
            entity: entity.clone(),
            evaluation,
            record,
        });
    }

    async fn pause(&self, d: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            _ = tokio::time::sleep(d) => Ok(()),
        }
    }
}

/// First occurrence of each entity id, in listing order.
fn unique_by_id(entities: &[Entity]) -> Vec<Entity> {
    let mut seen = HashSet::with_capacity(entities.len());
    let unique: Vec<Entity> = entities.iter().filter(|e| seen.insert(e.id)).cloned().collect();
    if unique.len() < entities.len() {
        debug!(duplicates = entities.len() - unique.len(), "duplicate entity ids skipped");
    }
    unique
}
