//! Builds a snapshot artifact for one league and gameweek.
//! Usage: `export <league_id> <gameweek>`; falls back to LEAGUE_ID / GAMEWEEK.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use league_checker::analyzer::validate_ids;
use league_checker::collector::PaginatedCollector;
use league_checker::config::Config;
use league_checker::error::{AppError, Result};
use league_checker::fetcher::{FplClient, Upstream};
use league_checker::retry::BackoffController;
use league_checker::rules::{Roster, RuleConfig};
use league_checker::scheduler::{BatchScheduler, SchedulerOptions};
use league_checker::snapshot::{SnapshotArtifact, SnapshotStore};
use league_checker::state::EntityCache;
use league_checker::types::now_ms;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Export failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let mut args = std::env::args().skip(1);
    let league_id = match args.next() {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| AppError::Validation(format!("invalid league id: {raw}")))?,
        None => cfg
            .league_id
            .ok_or_else(|| AppError::Config("league id argument or LEAGUE_ID is required".to_string()))?,
    };
    let gameweek = match args.next() {
        Some(raw) => Some(
            raw.parse::<u32>()
                .map_err(|_| AppError::Validation(format!("invalid gameweek: {raw}")))?,
        ),
        None => cfg.gameweek,
    };

    let upstream: Arc<dyn Upstream> = Arc::new(FplClient::new(&cfg.api_base_url)?);
    let bootstrap = upstream.bootstrap().await.map_err(AppError::MasterData)?;
    let gameweek = gameweek
        .or_else(|| bootstrap.current_period())
        .ok_or_else(|| AppError::Config("gameweek not given and no current gameweek".to_string()))?;
    validate_ids(league_id, gameweek)?;

    let started = now_ms();
    info!(league_id, gameweek, "[SNAPSHOT] export starting");

    let collection = PaginatedCollector::new(Arc::clone(&upstream)).collect(league_id).await?;
    let scheduler = BatchScheduler::new(
        upstream,
        EntityCache::new(),
        Arc::new(Roster::from_bootstrap(&bootstrap)),
        SchedulerOptions::from_config(&cfg),
    );
    let backoff = BackoffController::new(cfg.retry_base, cfg.retry_ceiling);
    let (results, _) = scheduler
        .run(&collection.entities, gameweek, Arc::new(RuleConfig::disabled()), backoff)
        .await?;

    let artifact = SnapshotArtifact::from_results(league_id, gameweek, &collection.display_name, &results, now_ms());
    let path = SnapshotStore::new(&cfg.snapshot_dir, &cfg.export_bin).write(&artifact).await?;

    info!(
        league_id,
        gameweek,
        teams = results.len(),
        listed = collection.entities.len(),
        elapsed_ms = now_ms().saturating_sub(started),
        path = %path.display(),
        "[SNAPSHOT] export complete"
    );
    Ok(())
}
