use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::collector::PaginatedCollector;
use crate::config::limits::{GAMEWEEK_MAX, LEAGUE_ID_MAX};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::Upstream;
use crate::progress::ProgressSink;
use crate::retry::BackoffController;
use crate::rules::{evaluate, Roster, RuleConfig};
use crate::scheduler::{BatchScheduler, SchedulerOptions};
use crate::snapshot::{SnapshotArtifact, SnapshotStore};
use crate::state::EntityCache;
use crate::types::{now_ms, AnalysisResult, DataSource, EntityResult};

/// Reject ids outside the accepted ranges. Runs before any I/O.
pub fn validate_ids(league_id: u64, gameweek: u32) -> Result<()> {
    if !(1..=LEAGUE_ID_MAX).contains(&league_id) {
        return Err(AppError::Validation(format!(
            "league id must be between 1 and {LEAGUE_ID_MAX}, got {league_id}"
        )));
    }
    if !(1..=GAMEWEEK_MAX).contains(&gameweek) {
        return Err(AppError::Validation(format!(
            "gameweek must be between 1 and {GAMEWEEK_MAX}, got {gameweek}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    pub scheduler: SchedulerOptions,
    pub retry_base: Duration,
    pub retry_ceiling: Duration,
    pub max_entries: Option<usize>,
    /// Launch the exporter on a snapshot miss and poll for its output.
    pub snapshot_generate: bool,
    pub snapshot_poll_attempts: u32,
    pub snapshot_poll_interval: Duration,
}

impl AnalyzerOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            scheduler: SchedulerOptions::from_config(cfg),
            retry_base: cfg.retry_base,
            retry_ceiling: cfg.retry_ceiling,
            max_entries: cfg.max_entries,
            snapshot_generate: cfg.snapshot_generate,
            snapshot_poll_attempts: cfg.snapshot_poll_attempts,
            snapshot_poll_interval: cfg.snapshot_poll_interval,
        }
    }
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            scheduler: SchedulerOptions::default(),
            retry_base: Duration::from_secs(5),
            retry_ceiling: Duration::from_secs(40),
            max_entries: None,
            snapshot_generate: false,
            snapshot_poll_attempts: 5,
            snapshot_poll_interval: Duration::from_secs(2),
        }
    }
}

struct MasterData {
    roster: Arc<Roster>,
    current_gameweek: Option<u32>,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Entry point for one league analysis: snapshot first, live pipeline otherwise.
pub struct Analyzer {
    upstream: Arc<dyn Upstream>,
    cache: Arc<EntityCache>,
    snapshots: Option<SnapshotStore>,
    opts: AnalyzerOptions,
    progress: ProgressSink,
    cancel: CancellationToken,
    master: OnceCell<MasterData>,
}

impl Analyzer {
    pub fn new(upstream: Arc<dyn Upstream>, cache: Arc<EntityCache>, opts: AnalyzerOptions) -> Self {
        Self {
            upstream,
            cache,
            snapshots: None,
            opts,
            progress: ProgressSink::disabled(),
            cancel: CancellationToken::new(),
            master: OnceCell::new(),
        }
    }

    pub fn with_snapshots(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The gameweek master data flags as current.
    pub async fn current_gameweek(&self) -> Result<Option<u32>> {
        Ok(self.master_data().await?.current_gameweek)
    }

    pub async fn analyze(&self, league_id: u64, gameweek: u32, rules: RuleConfig) -> Result<AnalysisResult> {
        validate_ids(league_id, gameweek)?;
        rules.validate()?;

        self.progress.emit(5, "Checking for cached snapshot...");
        if let Some(artifact) = self.snapshot_lookup(league_id, gameweek).await? {
            return self.from_snapshot(artifact, &rules).await;
        }

        self.progress.emit(10, "Loading player data...");
        let roster = Arc::clone(&self.master_data().await?.roster);

        self.progress.emit(20, "Fetching league standings...");
        let collection = PaginatedCollector::new(Arc::clone(&self.upstream))
            .with_max_entries(self.opts.max_entries)
            .collect(league_id)
            .await?;
        self.cache.purge_expired();

        let total = collection.entities.len();
        self.progress.emit(30, format!("Processing {total} teams..."));

        let scheduler = BatchScheduler::new(
            Arc::clone(&self.upstream),
            Arc::clone(&self.cache),
            roster,
            self.opts.scheduler.clone(),
        )
        .with_progress(self.progress.clone())
        .with_cancel(self.cancel.clone());

        let backoff = BackoffController::new(self.opts.retry_base, self.opts.retry_ceiling);
        let (entities, _backoff) = scheduler
            .run(&collection.entities, gameweek, Arc::new(rules), backoff)
            .await?;

        let result = AnalysisResult {
            entities,
            collection_display_name: display_name(collection.display_name, league_id),
            data_timestamp: now_ms(),
            source: DataSource::Live,
        };
        self.finish(&result);
        Ok(result)
    }

    /// A fresh artifact if one exists. With generation enabled, a miss launches the
    /// exporter and polls a bounded number of times before giving up.
    async fn snapshot_lookup(&self, league_id: u64, gameweek: u32) -> Result<Option<SnapshotArtifact>> {
        let Some(store) = &self.snapshots else {
            return Ok(None);
        };

        match store.find_fresh(league_id, gameweek).await {
            Ok(Some(artifact)) => return Ok(Some(artifact)),
            Ok(None) => {}
            Err(e) => {
                warn!(league_id, gameweek, "[SNAPSHOT] lookup failed, fetching live: {e}");
                return Ok(None);
            }
        }
        if !self.opts.snapshot_generate {
            return Ok(None);
        }

        if let Err(e) = store.generate(league_id, gameweek) {
            warn!(league_id, gameweek, "[SNAPSHOT] could not start export, fetching live: {e}");
            return Ok(None);
        }

        let attempts = self.opts.snapshot_poll_attempts;
        for attempt in 1..=attempts {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
                _ = tokio::time::sleep(self.opts.snapshot_poll_interval) => {}
            }
            self.progress.emit(5, format!("Waiting for snapshot ({attempt}/{attempts})..."));
            if let Ok(Some(artifact)) = store.find_fresh(league_id, gameweek).await {
                return Ok(Some(artifact));
            }
        }
        info!(league_id, gameweek, attempts, "[SNAPSHOT] not ready after polling, fetching live");
        Ok(None)
    }

    /// Re-evaluate the stored picks under the current rules.
    async fn from_snapshot(&self, artifact: SnapshotArtifact, rules: &RuleConfig) -> Result<AnalysisResult> {
        self.progress.emit(10, "Loading player data...");
        let master = self.master_data().await?;

        let mut seen = HashSet::new();
        let entities: Vec<EntityResult> = artifact
            .teams
            .iter()
            .filter(|t| seen.insert(t.entity.id))
            .map(|t| {
                let record = Arc::new(t.record());
                EntityResult {
                    entity: t.entity.clone(),
                    evaluation: evaluate(&record, rules, &master.roster),
                    record,
                }
            })
            .collect();

        info!(
            league_id = artifact.metadata.league_id,
            gameweek = artifact.metadata.gameweek,
            teams = entities.len(),
            "[SNAPSHOT] answered from snapshot"
        );
        let result = AnalysisResult {
            entities,
            collection_display_name: display_name(artifact.metadata.league_name, artifact.metadata.league_id),
            data_timestamp: artifact.metadata.generated_at,
            source: DataSource::Snapshot,
        };
        self.finish(&result);
        Ok(result)
    }

    async fn master_data(&self) -> Result<&MasterData> {
        self.master
            .get_or_try_init(|| async {
                let bootstrap = self.upstream.bootstrap().await.map_err(AppError::MasterData)?;
                let roster = Roster::from_bootstrap(&bootstrap);
                info!(players = roster.len(), "master data loaded");
                Ok::<_, AppError>(MasterData {
                    roster: Arc::new(roster),
                    current_gameweek: bootstrap.current_period(),
                })
            })
            .await
    }

    fn finish(&self, result: &AnalysisResult) {
        let compliant = result.compliant_count();
        let total = result.entities.len();
        self.progress.emit(
            100,
            format!("Analysis complete: {compliant}/{total} teams compliant ({} data)", result.source),
        );
    }
}

fn display_name(name: String, league_id: u64) -> String {
    if name.trim().is_empty() {
        format!("League {league_id}")
    } else {
        name
    }
}
