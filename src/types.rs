use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::rules::Evaluation;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// One league entry as listed on the standings pages. Read-only once collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u64,
    /// Team name chosen by the manager.
    pub display_name: String,
    /// Manager's name.
    pub owner_name: String,
    pub rank: u32,
    pub total_score: i64,
}

// ---------------------------------------------------------------------------
// Detail records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub member_id: u32,
    /// Filled from the roster after fetch; `Unknown` when the id is not in master data.
    #[serde(default)]
    pub name: String,
    pub position: u8,
    /// 0 = on the bench, 1 = starting, 2+ = captaincy multiplier.
    pub multiplier: u8,
    pub is_captain: bool,
    pub is_vice_captain: bool,
}

impl Pick {
    pub fn is_active(&self) -> bool {
        self.multiplier > 0
    }
}

/// Everything fetched for one entry in one gameweek. Immutable once cached.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetailRecord {
    pub picks: Vec<Pick>,
    #[serde(default)]
    pub period_points: i64,
    #[serde(default)]
    pub total_points: i64,
}

impl DetailRecord {
    pub fn captain(&self) -> Option<&Pick> {
        self.picks.iter().find(|p| p.is_captain)
    }

    pub fn vice_captain(&self) -> Option<&Pick> {
        self.picks.iter().find(|p| p.is_vice_captain)
    }
}

// ---------------------------------------------------------------------------
// Master data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: u32,
    pub web_name: String,
    /// Club id.
    pub team: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodInfo {
    pub id: u32,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub finished: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bootstrap {
    #[serde(rename = "elements")]
    pub players: Vec<Player>,
    #[serde(default)]
    pub events: Vec<PeriodInfo>,
}

impl Bootstrap {
    /// The gameweek flagged current, else the latest finished one.
    pub fn current_period(&self) -> Option<u32> {
        self.events
            .iter()
            .find(|e| e.is_current)
            .map(|e| e.id)
            .or_else(|| self.events.iter().filter(|e| e.finished).map(|e| e.id).max())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EntityResult {
    pub entity: Entity,
    pub evaluation: Evaluation,
    pub record: Arc<DetailRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Snapshot,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Live => write!(f, "live"),
            DataSource::Snapshot => write!(f, "snapshot"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub entities: Vec<EntityResult>,
    pub collection_display_name: String,
    /// Unix milliseconds the underlying data was fetched at.
    pub data_timestamp: u64,
    pub source: DataSource,
}

impl AnalysisResult {
    pub fn compliant_count(&self) -> usize {
        self.entities.iter().filter(|r| r.evaluation.overall_pass).count()
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Published by the orchestrator; the presentation layer subscribes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// 0-100.
    pub percent: u8,
    pub status: String,
}

/// Wall-clock Unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
