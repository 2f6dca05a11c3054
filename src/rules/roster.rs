use std::collections::HashMap;

use crate::types::{Bootstrap, DetailRecord};

const UNKNOWN_NAME: &str = "Unknown";

/// Player names and club membership from master data.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    names: HashMap<u32, String>,
    clubs: HashMap<u32, u32>,
}

impl Roster {
    pub fn from_bootstrap(bootstrap: &Bootstrap) -> Self {
        let mut roster = Self::default();
        for player in &bootstrap.players {
            roster.names.insert(player.id, player.web_name.clone());
            roster.clubs.insert(player.id, player.team);
        }
        roster
    }

    pub fn name(&self, member_id: u32) -> &str {
        self.names.get(&member_id).map(String::as_str).unwrap_or(UNKNOWN_NAME)
    }

    pub fn club(&self, member_id: u32) -> Option<u32> {
        self.clubs.get(&member_id).copied()
    }

    pub fn plays_for(&self, member_id: u32, club: u32) -> bool {
        self.club(member_id) == Some(club)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Fill in pick names from master data.
    pub fn label(&self, record: &mut DetailRecord) {
        for pick in &mut record.picks {
            pick.name = self.name(pick.member_id).to_string();
        }
    }
}
