use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use league_checker::api::{router, ApiState, HealthState, ProxySweeper};
use league_checker::config::Config;
use league_checker::error::Result;
use league_checker::snapshot::SnapshotStore;
use league_checker::state::ProxyCache;

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
    let cache = ProxyCache::new();
    let health = Arc::new(HealthState::new());
    let snapshots = SnapshotStore::new(&cfg.snapshot_dir, &cfg.export_bin);

    // Cache + snapshot sweeper (background, hourly)
    let sweeper = ProxySweeper::new(Arc::clone(&cache), snapshots.clone(), Arc::clone(&health));
    tokio::spawn(async move { sweeper.run().await });

    let state = ApiState::new(&cfg.upstream_api_url, cache, snapshots, health)?;
    let app = router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.proxy_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(upstream = %cfg.upstream_api_url, snapshot_dir = %cfg.snapshot_dir, "[PROXY] listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
