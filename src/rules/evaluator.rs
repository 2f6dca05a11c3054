use serde::{Deserialize, Serialize};

use crate::rules::{RuleConfig, Roster};
use crate::types::DetailRecord;

/// Outcome of judging one detail record. Disabled rules always report `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub starters_pass: bool,
    pub captain_pass: bool,
    pub vice_captain_pass: bool,
    /// Starting picks from the target club.
    pub qualifying_starters: u32,
    pub qualifying_names: Vec<String>,
    pub captain_name: Option<String>,
    pub vice_captain_name: Option<String>,
    pub captain_qualifies: bool,
    pub vice_captain_qualifies: bool,
    pub overall_pass: bool,
}

/// Judge one record against the rule set. No I/O, no shared state.
pub fn evaluate(record: &DetailRecord, rules: &RuleConfig, roster: &Roster) -> Evaluation {
    let club = rules.target_club;

    let mut qualifying_starters = 0u32;
    let mut qualifying_names = Vec::new();
    for pick in record.picks.iter().filter(|p| p.is_active()) {
        if roster.plays_for(pick.member_id, club) {
            qualifying_starters += 1;
            qualifying_names.push(roster.name(pick.member_id).to_string());
        }
    }

    let captain = record.captain();
    let vice_captain = record.vice_captain();
    let captain_qualifies = captain.is_some_and(|p| roster.plays_for(p.member_id, club));
    let vice_captain_qualifies = vice_captain.is_some_and(|p| roster.plays_for(p.member_id, club));

    let starters_pass = !rules.starters.enabled
        || rules
            .starters
            .operator
            .compare(qualifying_starters, rules.starters.threshold);
    let captain_pass = !rules.captain.enabled || captain_qualifies;
    let vice_captain_pass = !rules.vice_captain.enabled || vice_captain_qualifies;

    Evaluation {
        starters_pass,
        captain_pass,
        vice_captain_pass,
        qualifying_starters,
        qualifying_names,
        captain_name: captain.map(|p| roster.name(p.member_id).to_string()),
        vice_captain_name: vice_captain.map(|p| roster.name(p.member_id).to_string()),
        captain_qualifies,
        vice_captain_qualifies,
        overall_pass: starters_pass && captain_pass && vice_captain_pass,
    }
}
