use serde::{Deserialize, Serialize};

use crate::config::limits::STARTERS_THRESHOLD_MAX;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Exactly,
    Minimum,
    Maximum,
    /// Anything else arriving over the wire. Rejected by `validate`, fails closed in evaluation.
    #[serde(other)]
    Unknown,
}

impl Operator {
    /// Parses a known operator name. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "exactly" => Some(Operator::Exactly),
            "minimum" => Some(Operator::Minimum),
            "maximum" => Some(Operator::Maximum),
            _ => None,
        }
    }

    pub fn compare(self, count: u32, threshold: u32) -> bool {
        match self {
            Operator::Exactly => count == threshold,
            Operator::Minimum => count >= threshold,
            Operator::Maximum => count <= threshold,
            Operator::Unknown => false,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operator::Exactly => "exactly",
            Operator::Minimum => "minimum",
            Operator::Maximum => "maximum",
            Operator::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Counts starting picks from the target club and compares against `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRule {
    pub enabled: bool,
    pub operator: Operator,
    pub threshold: u32,
}

/// Requires the designated pick (captain or vice-captain) to play for the target club.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRule {
    pub enabled: bool,
}

/// Supplied once per analysis run and never mutated during it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub target_club: u32,
    pub starters: CountRule,
    pub captain: FlagRule,
    pub vice_captain: FlagRule,
}

impl RuleConfig {
    /// Every rule off. Used by the exporter, which only needs the picks.
    pub fn disabled() -> Self {
        Self {
            target_club: 0,
            starters: CountRule { enabled: false, operator: Operator::Minimum, threshold: 0 },
            captain: FlagRule { enabled: false },
            vice_captain: FlagRule { enabled: false },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.starters.operator == Operator::Unknown {
            return Err(AppError::Validation(
                "starters rule operator must be one of exactly, minimum, maximum".to_string(),
            ));
        }
        if self.starters.threshold > STARTERS_THRESHOLD_MAX {
            return Err(AppError::Validation(format!(
                "starters rule threshold must be between 0 and {STARTERS_THRESHOLD_MAX}, got {}",
                self.starters.threshold
            )));
        }
        Ok(())
    }

    pub fn enabled_count(&self) -> usize {
        [self.starters.enabled, self.captain.enabled, self.vice_captain.enabled]
            .iter()
            .filter(|e| **e)
            .count()
    }
}
