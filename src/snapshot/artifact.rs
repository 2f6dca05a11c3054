use serde::{Deserialize, Serialize};

use crate::types::{DetailRecord, Entity, EntityResult, Pick};

/// Parsed `gw{gameweek}-league{league_id}-{generated_at}.json` file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotName {
    pub gameweek: u32,
    pub league_id: u64,
    /// Unix milliseconds.
    pub generated_at: u64,
}

impl SnapshotName {
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".json")?;
        let (gameweek, league_id, rest) = split_key(stem)?;
        let generated_at = parse_digits(rest)?;
        Some(Self { gameweek, league_id, generated_at })
    }

    pub fn file_name(&self) -> String {
        format!("gw{}-league{}-{}.json", self.gameweek, self.league_id, self.generated_at)
    }

    pub fn key(&self) -> (u64, u32) {
        (self.league_id, self.gameweek)
    }
}

/// Parse a listing pattern `gw{gameweek}-league{league_id}-*` into `(league_id, gameweek)`.
pub fn parse_pattern(pattern: &str) -> Option<(u64, u32)> {
    let (gameweek, league_id, rest) = split_key(pattern)?;
    (rest == "*").then_some((league_id, gameweek))
}

/// `gw{g}-league{l}-{rest}` -> (g, l, rest)
fn split_key(s: &str) -> Option<(u32, u64, &str)> {
    let s = s.strip_prefix("gw")?;
    let (gameweek, s) = s.split_once("-league")?;
    let (league_id, rest) = s.split_once('-')?;
    Some((parse_digits(gameweek)?, parse_digits(league_id)?, rest))
}

fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub league_name: String,
    pub league_id: u64,
    pub gameweek: u32,
    /// Unix milliseconds.
    pub generated_at: u64,
    pub total_teams: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTeam {
    #[serde(flatten)]
    pub entity: Entity,
    pub gameweek_points: i64,
    #[serde(default)]
    pub total_points: i64,
    pub picks: Vec<Pick>,
}

impl SnapshotTeam {
    pub fn record(&self) -> DetailRecord {
        DetailRecord {
            picks: self.picks.clone(),
            period_points: self.gameweek_points,
            total_points: self.total_points,
        }
    }
}

/// A whole league's picks for one gameweek, precomputed by the exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotArtifact {
    pub metadata: SnapshotMetadata,
    pub teams: Vec<SnapshotTeam>,
}

impl SnapshotArtifact {
    pub fn from_results(
        league_id: u64,
        gameweek: u32,
        league_name: &str,
        results: &[EntityResult],
        generated_at: u64,
    ) -> Self {
        let teams: Vec<SnapshotTeam> = results
            .iter()
            .map(|r| SnapshotTeam {
                entity: r.entity.clone(),
                gameweek_points: r.record.period_points,
                total_points: r.record.total_points,
                picks: r.record.picks.clone(),
            })
            .collect();
        Self {
            metadata: SnapshotMetadata {
                league_name: league_name.to_string(),
                league_id,
                gameweek,
                generated_at,
                total_teams: teams.len(),
            },
            teams,
        }
    }

    pub fn name(&self) -> SnapshotName {
        SnapshotName {
            gameweek: self.metadata.gameweek,
            league_id: self.metadata.league_id,
            generated_at: self.metadata.generated_at,
        }
    }

    /// Whether the embedded timestamp is within `freshness_ms` of `now_ms`.
    pub fn is_fresh(&self, now_ms: u64, freshness_ms: u64) -> bool {
        now_ms.saturating_sub(self.metadata.generated_at) <= freshness_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_and_format() {
        let name = SnapshotName::parse("gw7-league314159-1730000000000.json").unwrap();
        assert_eq!(name, SnapshotName { gameweek: 7, league_id: 314159, generated_at: 1_730_000_000_000 });
        assert_eq!(name.file_name(), "gw7-league314159-1730000000000.json");
    }

    #[test]
    fn rejects_foreign_names() {
        for bad in [
            "gw7-league1-123.txt",
            "gw7-league1-.json",
            "../gw7-league1-1.json",
            "gwX-league1-1.json",
            "gw7-league1-1-2.json",
            "league1-gw7-1.json",
            "gw7-league-1-1.json",
        ] {
            assert!(SnapshotName::parse(bad).is_none(), "{bad} should be rejected");
        }
    }

    #[test]
    fn pattern_requires_wildcard_suffix() {
        assert_eq!(parse_pattern("gw3-league42-*"), Some((42, 3)));
        assert_eq!(parse_pattern("gw3-league42-"), None);
        assert_eq!(parse_pattern("gw3-league42-123"), None);
        assert_eq!(parse_pattern("*"), None);
    }

    #[test]
    fn team_entry_flattens_entity_fields() {
        let raw = r#"{"metadata":{"league_name":"L","league_id":1,"gameweek":2,"generated_at":5,"total_teams":1},
            "teams":[{"id":9,"display_name":"T","owner_name":"O","rank":1,"total_score":10,
            "gameweek_points":44,"picks":[{"member_id":3,"name":"X","position":1,"multiplier":2,"is_captain":true,"is_vice_captain":false}]}]}"#;
        let artifact: SnapshotArtifact = serde_json::from_str(raw).unwrap();
        let team = &artifact.teams[0];
        assert_eq!(team.entity.id, 9);
        assert_eq!(team.record().period_points, 44);
        assert_eq!(team.record().captain().map(|p| p.member_id), Some(3));
        assert!(artifact.is_fresh(5 + 1_000, 1_000));
        assert!(!artifact.is_fresh(5 + 1_001, 1_000));
    }
}
