use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use league_checker::analyzer::{Analyzer, AnalyzerOptions};
use league_checker::config::{Config, CHANNEL_CAPACITY};
use league_checker::error::{AppError, Result};
use league_checker::fetcher::{FplClient, Upstream};
use league_checker::progress::ProgressSink;
use league_checker::rules::RuleConfig;
use league_checker::snapshot::SnapshotStore;
use league_checker::state::EntityCache;
use league_checker::types::{AnalysisResult, ProgressEvent};

/// Compliant entries listed in the summary.
const SUMMARY_SAMPLE: usize = 10;

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
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let league_id = cfg
        .league_id
        .ok_or_else(|| AppError::Config("LEAGUE_ID is required".to_string()))?;

    let upstream: Arc<dyn Upstream> = Arc::new(FplClient::new(&cfg.api_base_url)?);

    let (progress_tx, progress_rx) = mpsc::channel::<ProgressEvent>(CHANNEL_CAPACITY);
    let logger = tokio::spawn(progress_logger(progress_rx));

    // Ctrl-C stops the retry loop instead of leaving it waiting forever.
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling analysis");
            ctrl_c.cancel();
        }
    });

    let analyzer = Analyzer::new(upstream, EntityCache::new(), AnalyzerOptions::from_config(&cfg))
        .with_snapshots(SnapshotStore::new(&cfg.snapshot_dir, &cfg.export_bin))
        .with_progress(ProgressSink::new(progress_tx))
        .with_cancel(cancel);

    let gameweek = match cfg.gameweek {
        Some(gw) => gw,
        None => analyzer.current_gameweek().await?.ok_or_else(|| {
            AppError::Config("GAMEWEEK not set and master data has no current gameweek".to_string())
        })?,
    };

    info!(
        league_id,
        gameweek,
        target_club = cfg.rules.target_club,
        rules_enabled = cfg.rules.enabled_count(),
        "Starting league analysis"
    );
    let result = analyzer.analyze(league_id, gameweek, cfg.rules.clone()).await?;

    // Closing the progress stream lets the logger drain before the summary.
    drop(analyzer);
    let _ = logger.await;
    log_summary(&result, &cfg.rules);
    Ok(())
}

async fn progress_logger(mut rx: mpsc::Receiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        info!(percent = event.percent, "PROGRESS {:>3}% | {}", event.percent, event.status);
    }
}

fn log_summary(result: &AnalysisResult, rules: &RuleConfig) {
    let total = result.entities.len();
    let compliant = result.compliant_count();
    let rate = if total > 0 { compliant as f64 / total as f64 * 100.0 } else { 0.0 };

    info!(
        league = %result.collection_display_name,
        source = %result.source,
        data_timestamp = result.data_timestamp,
        "RESULT | {compliant}/{total} teams compliant ({rate:.1}%)"
    );
    if rules.enabled_count() == 0 {
        info!("No rules enabled, every team passes");
    }

    for r in result.entities.iter().filter(|r| r.evaluation.overall_pass).take(SUMMARY_SAMPLE) {
        let e = &r.evaluation;
        info!(
            entity_id = r.entity.id,
            rank = r.entity.rank,
            "  #{:<6} {} ({}) | starters: {} [{}] | C: {} | VC: {}",
            r.entity.rank,
            r.entity.display_name,
            r.entity.owner_name,
            e.qualifying_starters,
            e.qualifying_names.join(", "),
            e.captain_name.as_deref().unwrap_or("-"),
            e.vice_captain_name.as_deref().unwrap_or("-"),
        );
    }
    if compliant > SUMMARY_SAMPLE {
        info!("  ... and {} more", compliant - SUMMARY_SAMPLE);
    }
}
