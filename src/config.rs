use std::time::Duration;

use crate::error::{AppError, Result};
use crate::rules::{CountRule, FlagRule, Operator, RuleConfig};

/// Client-side base URL. Goes through the local proxy, never straight upstream.
pub const API_BASE_URL: &str = "http://localhost:3001/api/fpl";
/// What the proxy forwards to.
pub const UPSTREAM_API_URL: &str = "https://fantasy.premierleague.com/api";

/// Per-request timeout for every upstream call (milliseconds).
pub const REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Entries per standings page. A shorter page is the last one when `has_next` is missing.
pub const LISTING_PAGE_SIZE: usize = 50;

/// Hard ceiling on standings pages walked for one league.
pub const MAX_LISTING_PAGES: u32 = 20;

/// Client-side detail cache lifetime (seconds).
pub const ENTITY_CACHE_TTL_SECS: u64 = 60 * 60;

/// Proxy-side detail cache lifetime (seconds). Shared by every client session.
pub const PROXY_CACHE_TTL_SECS: u64 = 3 * 60 * 60;

/// How often the proxy sweeps its cache and the snapshot directory (seconds).
pub const PROXY_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Snapshot artifacts older than this are ignored by `find_fresh` (seconds).
pub const SNAPSHOT_FRESHNESS_SECS: u64 = 60 * 60;

/// Max filenames returned by a snapshot listing.
pub const SNAPSHOT_LIST_LIMIT: usize = 10;

/// Newest artifacts kept per (league, gameweek) by the cleanup sweep.
pub const SNAPSHOT_KEEP_PER_KEY: usize = 2;

/// Retry sub-batch width. Kept below the main batch width.
pub const RETRY_BATCH_WIDTH: usize = 3;

/// Gap between retry sub-batches (milliseconds).
pub const RETRY_BATCH_GAP_MS: u64 = 1_000;

/// Backoff rounds after which the loop starts warning. It keeps going regardless.
pub const RETRY_WARN_ROUNDS: u32 = 20;

/// Channel capacity for progress events.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Accepted id ranges.
pub mod limits {
    pub const LEAGUE_ID_MAX: u64 = 999_999_999;
    pub const GAMEWEEK_MAX: u32 = 38;
    pub const STARTERS_THRESHOLD_MAX: u32 = 11;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub upstream_api_url: String,
    pub log_level: String,
    pub proxy_port: u16,
    /// Shared directory holding snapshot artifacts (SNAPSHOT_DIR)
    pub snapshot_dir: String,
    /// Executable launched by `SnapshotStore::generate` (EXPORT_BIN)
    pub export_bin: String,
    /// Concurrent detail fetches per group (BATCH_WIDTH)
    pub batch_width: usize,
    /// Politeness delay between groups (REQUEST_DELAY_MS)
    pub request_delay: Duration,
    /// First backoff pause (RETRY_BASE_MS)
    pub retry_base: Duration,
    /// Fairness ceiling; a computed pause above it resets the sequence (RETRY_CEILING_MS)
    pub retry_ceiling: Duration,
    pub league_id: Option<u64>,
    /// Falls back to the current gameweek from master data when unset (GAMEWEEK)
    pub gameweek: Option<u32>,
    /// Stop listing once this many entries are collected (MAX_ENTRIES)
    pub max_entries: Option<usize>,
    pub rules: RuleConfig,
    /// Trigger a background export and poll for it before fetching live (SNAPSHOT_GENERATE)
    pub snapshot_generate: bool,
    pub snapshot_poll_attempts: u32,
    pub snapshot_poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let operator = env_or("RULE_STARTERS_OPERATOR", "minimum");
        let operator = Operator::parse(&operator).ok_or_else(|| {
            AppError::Config(format!(
                "RULE_STARTERS_OPERATOR must be one of exactly, minimum, maximum (got {operator})"
            ))
        })?;

        let rules = RuleConfig {
            target_club: parse_env("TARGET_CLUB_ID", 1u32)?,
            starters: CountRule {
                enabled: parse_env("RULE_STARTERS_ENABLED", true)?,
                operator,
                threshold: parse_env("RULE_STARTERS_COUNT", 2u32)?,
            },
            captain: FlagRule {
                enabled: parse_env("RULE_CAPTAIN_ENABLED", true)?,
            },
            vice_captain: FlagRule {
                enabled: parse_env("RULE_VICE_CAPTAIN_ENABLED", true)?,
            },
        };

        let batch_width: usize = parse_env("BATCH_WIDTH", 5)?;
        if batch_width == 0 {
            return Err(AppError::Config("BATCH_WIDTH must be at least 1".to_string()));
        }

        Ok(Self {
            api_base_url: env_or("API_BASE_URL", API_BASE_URL),
            upstream_api_url: env_or("UPSTREAM_API_URL", UPSTREAM_API_URL),
            log_level: env_or("LOG_LEVEL", "info"),
            proxy_port: std::env::var("PROXY_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("PROXY_PORT must be a valid port number".to_string()))?,
            snapshot_dir: env_or("SNAPSHOT_DIR", "out"),
            export_bin: env_or("EXPORT_BIN", "export"),
            batch_width,
            request_delay: Duration::from_millis(parse_env("REQUEST_DELAY_MS", 50u64)?),
            retry_base: Duration::from_millis(parse_env("RETRY_BASE_MS", 5_000u64)?),
            retry_ceiling: Duration::from_millis(parse_env("RETRY_CEILING_MS", 40_000u64)?),
            league_id: parse_optional_env("LEAGUE_ID")?,
            gameweek: parse_optional_env("GAMEWEEK")?,
            max_entries: parse_optional_env("MAX_ENTRIES")?,
            rules,
            snapshot_generate: parse_env("SNAPSHOT_GENERATE", false)?,
            snapshot_poll_attempts: parse_env("SNAPSHOT_POLL_ATTEMPTS", 5u32)?,
            snapshot_poll_interval: Duration::from_millis(parse_env(
                "SNAPSHOT_POLL_INTERVAL_MS",
                2_000u64,
            )?),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

fn parse_optional_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        _ => Ok(None),
    }
}
