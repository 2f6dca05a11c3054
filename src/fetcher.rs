use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::REQUEST_TIMEOUT_MS;
use crate::types::{Bootstrap, DetailRecord, Entity, Pick};

/// Failure of a single upstream request.
///
/// Transient variants are retried until they succeed; permanent ones drop the entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("upstream error (HTTP {0})")]
    Upstream(u16),

    #[error("network error: {0}")]
    Transport(String),

    #[error("not found (HTTP 404)")]
    NotFound,

    #[error("request rejected (HTTP {0})")]
    Rejected(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => FetchError::RateLimited,
            404 => FetchError::NotFound,
            500..=599 => FetchError::Upstream(status),
            _ => FetchError::Rejected(status),
        }
    }

    pub fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::from_status(status.as_u16())
        } else {
            FetchError::Transport(e.to_string())
        }
    }

    /// Whether the error is worth waiting out. Transport failures count as transient,
    /// so a fault that never heals keeps the backoff loop running.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited
                | FetchError::Timeout
                | FetchError::Upstream(_)
                | FetchError::Transport(_)
        )
    }
}

/// One page of the standings listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandingsPage {
    /// Only present on page 1.
    pub league_name: Option<String>,
    pub entries: Vec<Entity>,
    /// Explicit "more pages" signal. `None` when the response omits it.
    pub has_next: Option<bool>,
}

/// The remote API as seen by the pipeline.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn standings_page(&self, league_id: u64, page: u32) -> Result<StandingsPage, FetchError>;

    async fn picks(&self, entry_id: u64, gameweek: u32) -> Result<DetailRecord, FetchError>;

    async fn bootstrap(&self) -> Result<Bootstrap, FetchError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct FplClient {
    client: reqwest::Client,
    base_url: String,
}

impl FplClient {
    pub fn new(base_url: impl Into<String>) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_body(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("GET {url}");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        let body = resp.bytes().await.map_err(FetchError::from_transport)?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Upstream for FplClient {
    async fn standings_page(&self, league_id: u64, page: u32) -> Result<StandingsPage, FetchError> {
        let url = format!(
            "{}/leagues-classic/{}/standings/?page_new_entries=1&page_standings={}&phase=1",
            self.base_url, league_id, page
        );
        parse_standings(&self.get_body(&url).await?)
    }

    async fn picks(&self, entry_id: u64, gameweek: u32) -> Result<DetailRecord, FetchError> {
        let url = format!("{}/entry/{}/event/{}/picks/", self.base_url, entry_id, gameweek);
        parse_picks(&self.get_body(&url).await?)
    }

    async fn bootstrap(&self) -> Result<Bootstrap, FetchError> {
        let url = format!("{}/bootstrap-static/", self.base_url);
        let body = self.get_body(&url).await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawLeague {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStandingEntry {
    entry: u64,
    #[serde(default)]
    entry_name: String,
    #[serde(default)]
    player_name: String,
    #[serde(default)]
    rank: u32,
    #[serde(default)]
    total: i64,
}

#[derive(Debug, Deserialize)]
struct RawStandings {
    has_next: Option<bool>,
    #[serde(default)]
    results: Vec<RawStandingEntry>,
}

#[derive(Debug, Deserialize)]
struct RawStandingsResponse {
    league: Option<RawLeague>,
    standings: Option<RawStandings>,
}

impl RawStandingsResponse {
    fn into_page(self) -> StandingsPage {
        let league_name = self.league.and_then(|l| l.name);
        let Some(standings) = self.standings else {
            return StandingsPage { league_name, entries: Vec::new(), has_next: None };
        };
        let entries = standings
            .results
            .into_iter()
            .map(|r| Entity {
                id: r.entry,
                display_name: r.entry_name,
                owner_name: r.player_name,
                rank: r.rank,
                total_score: r.total,
            })
            .collect();
        StandingsPage { league_name, entries, has_next: standings.has_next }
    }
}

#[derive(Debug, Deserialize)]
struct RawPick {
    element: u32,
    #[serde(default)]
    position: u8,
    #[serde(default)]
    multiplier: u8,
    #[serde(default)]
    is_captain: bool,
    #[serde(default)]
    is_vice_captain: bool,
}

#[derive(Debug, Deserialize)]
struct RawEntryHistory {
    #[serde(default)]
    points: i64,
    #[serde(default)]
    total_points: i64,
}

#[derive(Debug, Deserialize)]
struct RawPicksResponse {
    picks: Option<Vec<RawPick>>,
    entry_history: Option<RawEntryHistory>,
}

impl RawPicksResponse {
    fn into_record(self) -> Result<DetailRecord, FetchError> {
        let picks = self
            .picks
            .ok_or_else(|| FetchError::Malformed("picks response has no `picks` array".to_string()))?;
        let (period_points, total_points) = self
            .entry_history
            .map(|h| (h.points, h.total_points))
            .unwrap_or((0, 0));

        Ok(DetailRecord {
            picks: picks
                .into_iter()
                .map(|p| Pick {
                    member_id: p.element,
                    name: String::new(),
                    position: p.position,
                    multiplier: p.multiplier,
                    is_captain: p.is_captain,
                    is_vice_captain: p.is_vice_captain,
                })
                .collect(),
            period_points,
            total_points,
        })
    }
}

/// Parse a raw standings body.
fn parse_standings(body: &[u8]) -> Result<StandingsPage, FetchError> {
    serde_json::from_slice::<RawStandingsResponse>(body)
        .map(RawStandingsResponse::into_page)
        .map_err(|e| FetchError::Malformed(e.to_string()))
}

/// Parse a raw picks body.
fn parse_picks(body: &[u8]) -> Result<DetailRecord, FetchError> {
    serde_json::from_slice::<RawPicksResponse>(body)
        .map_err(|e| FetchError::Malformed(e.to_string()))?
        .into_record()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert!(FetchError::from_status(429).is_transient());
        assert!(FetchError::from_status(500).is_transient());
        assert!(FetchError::from_status(503).is_transient());
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Transport("connection reset".to_string()).is_transient());

        assert_eq!(FetchError::from_status(404), FetchError::NotFound);
        assert!(!FetchError::NotFound.is_transient());
        assert!(!FetchError::from_status(403).is_transient());
        assert!(!FetchError::Malformed("x".to_string()).is_transient());
    }

    #[test]
    fn parses_first_standings_page() {
        let raw = br#"{"league":{"id":42,"name":"Gooners"},"standings":{"has_next":true,"page":1,"results":[{"entry":101,"entry_name":"Team A","player_name":"Ann","rank":1,"total":250},{"entry":102,"entry_name":"Team B","player_name":"Bob","rank":2,"total":240}]}}"#;
        let page = parse_standings(raw).unwrap();
        assert_eq!(page.league_name.as_deref(), Some("Gooners"));
        assert_eq!(page.has_next, Some(true));
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].id, 101);
        assert_eq!(page.entries[0].display_name, "Team A");
        assert_eq!(page.entries[1].owner_name, "Bob");
        assert_eq!(page.entries[1].total_score, 240);
    }

    #[test]
    fn missing_has_next_stays_none() {
        let raw = br#"{"standings":{"results":[]}}"#;
        let page = parse_standings(raw).unwrap();
        assert!(page.league_name.is_none());
        assert!(page.has_next.is_none());
        assert!(page.entries.is_empty());
    }

    #[test]
    fn parses_picks_with_history() {
        let raw = br#"{"picks":[{"element":7,"position":1,"multiplier":2,"is_captain":true,"is_vice_captain":false},{"element":9,"position":12,"multiplier":0,"is_captain":false,"is_vice_captain":true}],"entry_history":{"points":61,"total_points":300}}"#;
        let record = parse_picks(raw).unwrap();
        assert_eq!(record.picks.len(), 2);
        assert_eq!(record.captain().map(|p| p.member_id), Some(7));
        assert_eq!(record.vice_captain().map(|p| p.member_id), Some(9));
        assert!(!record.picks[1].is_active());
        assert_eq!(record.period_points, 61);
        assert_eq!(record.total_points, 300);
    }

    #[test]
    fn picks_without_array_are_malformed() {
        let err = parse_picks(br#"{"detail":"Not found."}"#).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
        assert!(!err.is_transient());
    }
}
