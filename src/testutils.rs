//! Scripted in-memory upstream shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::fetcher::{FetchError, StandingsPage, Upstream};
use crate::types::{Bootstrap, DetailRecord, Entity, PeriodInfo, Pick, Player};

pub const TARGET_CLUB: u32 = 1;

pub fn entity(id: u64) -> Entity {
    Entity {
        id,
        display_name: format!("Team {id}"),
        owner_name: format!("Owner {id}"),
        rank: id as u32,
        total_score: 1_000 - id as i64,
    }
}

pub fn entities(n: u64) -> Vec<Entity> {
    (1..=n).map(entity).collect()
}

/// Members 1-4 play for club 1, 5-15 for club 2. Gameweek 7 is current.
pub fn bootstrap() -> Bootstrap {
    Bootstrap {
        players: (1..=15)
            .map(|id| Player {
                id,
                web_name: format!("Player{id}"),
                team: if id <= 4 { TARGET_CLUB } else { 2 },
            })
            .collect(),
        events: vec![
            PeriodInfo { id: 6, is_current: false, finished: true },
            PeriodInfo { id: 7, is_current: true, finished: false },
        ],
    }
}

/// Eleven starters, two of them from club 1; member 1 captains, member 2 is vice.
pub fn record() -> DetailRecord {
    DetailRecord {
        picks: (1..=15u32)
            .map(|id| Pick {
                member_id: id,
                name: String::new(),
                position: id as u8,
                multiplier: match id {
                    1 => 2,
                    2 | 5..=13 => 1,
                    _ => 0,
                },
                is_captain: id == 1,
                is_vice_captain: id == 2,
            })
            .collect(),
        period_points: 55,
        total_points: 400,
    }
}

/// Split `entities` into full pages of `page_size` with an explicit `has_next`.
pub fn pages(entities: &[Entity], page_size: usize, league_name: &str) -> Vec<StandingsPage> {
    let chunks: Vec<&[Entity]> = entities.chunks(page_size).collect();
    let last = chunks.len().saturating_sub(1);
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| StandingsPage {
            league_name: (i == 0).then(|| league_name.to_string()),
            entries: chunk.to_vec(),
            has_next: Some(i < last),
        })
        .collect()
}

#[derive(Default)]
pub struct FakeUpstream {
    pages: Vec<StandingsPage>,
    listing_error: Option<FetchError>,
    scripted: Mutex<HashMap<u64, VecDeque<FetchError>>>,
    permanent: HashMap<u64, FetchError>,
    listing_calls: AtomicUsize,
    picks_calls: AtomicUsize,
    picks_calls_by_id: Mutex<HashMap<u64, usize>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeUpstream {
    pub fn new(pages: Vec<StandingsPage>) -> Self {
        Self { pages, ..Default::default() }
    }

    pub fn with_entities(n: u64) -> Self {
        Self::new(pages(&entities(n), 50, "Test League"))
    }

    pub fn listing_fails(mut self, err: FetchError) -> Self {
        self.listing_error = Some(err);
        self
    }

    /// Fail the next `errors.len()` picks calls for `id`, in order.
    pub fn script(self, id: u64, errors: Vec<FetchError>) -> Self {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.insert(id, errors.into());
        }
        self
    }

    pub fn always_fail(mut self, id: u64, err: FetchError) -> Self {
        self.permanent.insert(id, err);
        self
    }

    /// Hold every picks call open for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Most picks calls that were ever open at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn picks_calls(&self) -> usize {
        self.picks_calls.load(Ordering::SeqCst)
    }

    pub fn picks_calls_for(&self, id: u64) -> usize {
        self.picks_calls_by_id.lock().unwrap().get(&id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn standings_page(&self, _league_id: u64, page: u32) -> Result<StandingsPage, FetchError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.listing_error {
            return Err(err.clone());
        }
        Ok(self
            .pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_default())
    }

    async fn picks(&self, entry_id: u64, _gameweek: u32) -> Result<DetailRecord, FetchError> {
        self.picks_calls.fetch_add(1, Ordering::SeqCst);
        *self.picks_calls_by_id.lock().unwrap().entry(entry_id).or_default() += 1;

        let open = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(open, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.permanent.get(&entry_id) {
            return Err(err.clone());
        }
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&entry_id)
            .and_then(VecDeque::pop_front);
        if let Some(err) = scripted {
            return Err(err);
        }
        Ok(record())
    }

    async fn bootstrap(&self) -> Result<Bootstrap, FetchError> {
        Ok(bootstrap())
    }
}
