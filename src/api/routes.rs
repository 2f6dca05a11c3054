use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::analyzer::validate_ids;
use crate::api::{HealthState, LatencyStats};
use crate::config::REQUEST_TIMEOUT_MS;
use crate::error::AppError;
use crate::snapshot::SnapshotStore;
use crate::state::proxy_cache::is_cacheable_path;
use crate::state::ProxyCache;

/// Upstream path prefixes the proxy forwards. Everything else is refused.
const ALLOWED_PREFIXES: [&str; 3] = ["bootstrap-static/", "leagues-classic/", "entry/"];

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Clone)]
pub struct ApiState {
    pub client: reqwest::Client,
    pub upstream_base: String,
    pub cache: Arc<ProxyCache>,
    pub snapshots: SnapshotStore,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(
        upstream_base: impl Into<String>,
        cache: Arc<ProxyCache>,
        snapshots: SnapshotStore,
        health: Arc<HealthState>,
    ) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            upstream_base: upstream_base.into().trim_end_matches('/').to_string(),
            cache,
            snapshots,
            health,
            latency: Arc::new(LatencyStats::new()),
            started_at: Instant::now(),
        })
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/fpl/*path", get(forward))
        .route("/api/cache-files", get(list_cache_files))
        .route("/api/generate-cache", post(generate_cache))
        .route("/out/:filename", get(get_snapshot_file))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

/// Allowed prefix, no parent or empty segments.
pub fn is_allowed_path(path: &str) -> bool {
    ALLOWED_PREFIXES.iter().any(|p| path.starts_with(p))
        && !path.split('/').any(|seg| seg == ".." || seg == ".")
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CacheFilesQuery {
    pub pattern: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub league_id: u64,
    pub gameweek: u32,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: Option<f64>,
    pub upstream_errors: u64,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn forward(
    State(state): State<ApiState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let path = path.trim_start_matches('/').to_string();
    if !is_allowed_path(&path) {
        warn!(%path, "[PROXY] refused path");
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "Access denied to this API endpoint." })),
        )
            .into_response();
    }

    let cacheable = is_cacheable_path(&path);
    if cacheable {
        if let Some(body) = state.cache.get(&path) {
            state.health.record_hit();
            debug!(%path, "[PROXY] cache hit");
            return ([("x-cache", "HIT")], Json(body.as_ref().clone())).into_response();
        }
        state.health.record_miss();
    }

    let url = match &query {
        Some(q) if !q.is_empty() => format!("{}/{}?{}", state.upstream_base, path, q),
        _ => format!("{}/{}", state.upstream_base, path),
    };

    let started = Instant::now();
    let fetched = match state.client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status();
            resp.bytes().await.map(|body| (status, body))
        }
        Err(e) => Err(e),
    };
    let (status, body): (reqwest::StatusCode, Bytes) = match fetched {
        Ok(v) => v,
        Err(e) => {
            state.health.record_upstream_error();
            error!(%path, "[PROXY] upstream request failed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Service temporarily unavailable. Please try again later."
                })),
            )
                .into_response();
        }
    };
    state.latency.record(started.elapsed());

    if status.is_server_error() {
        state.health.record_upstream_error();
    }
    if cacheable && status == reqwest::StatusCode::OK {
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(json) => state.cache.put(path.clone(), json),
            Err(e) => debug!(%path, "[PROXY] not caching unparseable body: {e}"),
        }
    }

    let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    (
        status,
        [(header::CONTENT_TYPE, "application/json"), (header::HeaderName::from_static("x-cache"), "MISS")],
        body,
    )
        .into_response()
}

async fn list_cache_files(
    State(state): State<ApiState>,
    Query(params): Query<CacheFilesQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let pattern = params
        .pattern
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("Pattern parameter is required".to_string()))?;
    Ok(Json(state.snapshots.list_pattern(&pattern).await?))
}

async fn generate_cache(
    State(state): State<ApiState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    validate_ids(req.league_id, req.gameweek)?;
    state.snapshots.generate(req.league_id, req.gameweek)?;
    info!(league_id = req.league_id, gameweek = req.gameweek, "[PROXY] snapshot generation requested");
    Ok(Json(GenerateResponse {
        success: true,
        message: "Generation started in background".to_string(),
    }))
}

async fn get_snapshot_file(
    State(state): State<ApiState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let bytes = state.snapshots.read(&filename).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let h = &state.health;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        cache_entries: state.cache.len(),
        cache_hits: h.cache_hits(),
        cache_misses: h.cache_misses(),
        hit_rate: h.hit_rate(),
        upstream_errors: h.upstream_errors(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let to_ms = |us: u64| us as f64 / 1_000.0;
    let p = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms: p.map(|(p50, _, _)| to_ms(p50)),
        p95_ms: p.map(|(_, p95, _)| to_ms(p95)),
        p99_ms: p.map(|(_, _, p99)| to_ms(p99)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::snapshot::{SnapshotArtifact, SnapshotMetadata};

    /// Local stand-in for the upstream API. Counts every request it serves.
    async fn spawn_upstream() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().fallback(move |uri: axum::http::Uri| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                match uri.path() {
                    "/entry/1/event/3/picks/" => (StatusCode::OK, r#"{"picks":[]}"#.to_string()),
                    "/entry/2/event/3/picks/" => (StatusCode::OK, "not json".to_string()),
                    "/entry/9/event/3/picks/" => (StatusCode::TOO_MANY_REQUESTS, "{}".to_string()),
                    _ => (StatusCode::OK, format!(r#"{{"query":"{}"}}"#, uri.query().unwrap_or(""))),
                }
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), hits)
    }

    fn state(base: &str, dir: &std::path::Path) -> ApiState {
        ApiState::new(
            base,
            ProxyCache::new(),
            SnapshotStore::new(dir, "/nonexistent/export-binary"),
            Arc::new(HealthState::new()),
        )
        .unwrap()
    }

    async fn call(state: &ApiState, path: &str, query: Option<&str>) -> (StatusCode, String) {
        let resp = forward(
            State(state.clone()),
            Path(path.to_string()),
            RawQuery(query.map(str::to_string)),
        )
        .await;
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn allowlist_blocks_other_paths() {
        assert!(is_allowed_path("bootstrap-static/"));
        assert!(is_allowed_path("leagues-classic/1/standings/"));
        assert!(is_allowed_path("entry/1/event/2/picks/"));
        assert!(!is_allowed_path("me/"));
        assert!(!is_allowed_path("entry/../me/"));
        assert!(!is_allowed_path("bootstrap-static"));
    }

    #[tokio::test]
    async fn picks_are_cached_after_first_fetch() {
        let (base, hits) = spawn_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let state = state(&base, dir.path());

        let first = call(&state, "entry/1/event/3/picks/", None).await;
        let second = call(&state, "entry/1/event/3/picks/", None).await;

        assert_eq!(first.0, StatusCode::OK);
        assert_eq!(second.0, StatusCode::OK);
        assert_eq!(second.1, r#"{"picks":[]}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(state.health.cache_hits(), 1);
        assert_eq!(state.health.cache_misses(), 1);
        assert_eq!(state.latency.len(), 1);
    }

    #[tokio::test]
    async fn only_good_picks_responses_are_cached() {
        let (base, hits) = spawn_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let state = state(&base, dir.path());

        for _ in 0..2 {
            call(&state, "entry/2/event/3/picks/", None).await;
            let (status, _) = call(&state, "entry/9/event/3/picks/", None).await;
            assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
            call(&state, "leagues-classic/5/standings/", Some("page_standings=1")).await;
        }

        assert_eq!(hits.load(Ordering::SeqCst), 6);
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn query_string_is_forwarded() {
        let (base, _) = spawn_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let state = state(&base, dir.path());

        let (status, body) = call(&state, "leagues-classic/5/standings/", Some("page_standings=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("page_standings=2"));
    }

    #[tokio::test]
    async fn refused_and_unreachable_paths() {
        let dir = tempfile::tempdir().unwrap();
        let unreachable = state("http://127.0.0.1:1", dir.path());

        let (status, _) = call(&unreachable, "me/", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&unreachable, "bootstrap-static/", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("temporarily unavailable"));
        assert_eq!(unreachable.health.upstream_errors(), 1);
    }

    #[tokio::test]
    async fn cache_file_listing_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let state = state("http://127.0.0.1:1", dir.path());
        let artifact = SnapshotArtifact {
            metadata: SnapshotMetadata {
                league_name: "L".to_string(),
                league_id: 42,
                gameweek: 3,
                generated_at: 1_000,
                total_teams: 0,
            },
            teams: vec![],
        };
        state.snapshots.write(&artifact).await.unwrap();

        let Json(files) = list_cache_files(
            State(state.clone()),
            Query(CacheFilesQuery { pattern: Some("gw3-league42-*".to_string()) }),
        )
        .await
        .unwrap();
        assert_eq!(files, vec!["gw3-league42-1000.json".to_string()]);

        let missing = list_cache_files(State(state.clone()), Query(CacheFilesQuery { pattern: None })).await;
        assert!(matches!(missing, Err(AppError::Validation(_))));

        let resp = get_snapshot_file(State(state.clone()), Path(files[0].clone())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let denied = get_snapshot_file(State(state.clone()), Path("config.json".to_string())).await;
        assert!(matches!(denied, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn generate_validates_ids_first() {
        let dir = tempfile::tempdir().unwrap();
        let state = state("http://127.0.0.1:1", dir.path());

        let bad = generate_cache(State(state.clone()), Json(GenerateRequest { league_id: 0, gameweek: 3 })).await;
        assert!(matches!(bad, Err(AppError::Validation(_))));

        // Valid ids but the exporter binary does not exist.
        let spawn_failed =
            generate_cache(State(state), Json(GenerateRequest { league_id: 42, gameweek: 3 })).await;
        assert!(matches!(spawn_failed, Err(AppError::Io(_))));
    }
}
