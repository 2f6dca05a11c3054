use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{LISTING_PAGE_SIZE, MAX_LISTING_PAGES};
use crate::error::{AppError, Result};
use crate::fetcher::Upstream;
use crate::types::Entity;

/// Everything the standings listing yields for one league.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub entities: Vec<Entity>,
    pub display_name: String,
}

/// Walks the standings pages of a league in order.
pub struct PaginatedCollector {
    upstream: Arc<dyn Upstream>,
    page_size: usize,
    max_pages: u32,
    max_entries: Option<usize>,
}

impl PaginatedCollector {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self {
            upstream,
            page_size: LISTING_PAGE_SIZE,
            max_pages: MAX_LISTING_PAGES,
            max_entries: None,
        }
    }

    /// Stop once this many entities are collected.
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Fetch pages 1..N sequentially. Any listing error aborts the collection.
    ///
    /// Stops on an empty page, on an explicit `has_next == false`, or, when the flag is
    /// missing, on a page shorter than a full one. Never walks past `max_pages`.
    /// An id already seen on an earlier page is skipped; the first occurrence wins.
    pub async fn collect(&self, league_id: u64) -> Result<Collection> {
        let mut entities: Vec<Entity> = Vec::new();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut display_name = String::new();

        for page in 1..=self.max_pages {
            let result = self
                .upstream
                .standings_page(league_id, page)
                .await
                .map_err(AppError::Listing)?;

            if page == 1 {
                display_name = result.league_name.clone().unwrap_or_default();
            }
            if result.entries.is_empty() {
                debug!(league_id, page, "empty standings page, listing complete");
                break;
            }

            let count = result.entries.len();
            for entry in result.entries {
                if seen.insert(entry.id) {
                    entities.push(entry);
                } else {
                    debug!(league_id, page, entity_id = entry.id, "entry repeated across pages, skipped");
                }
            }
            debug!(league_id, page, count, total = entities.len(), "standings page");

            if let Some(max) = self.max_entries {
                if entities.len() >= max {
                    entities.truncate(max);
                    info!(league_id, max, "entry cap reached, listing stopped");
                    break;
                }
            }

            let last_page = match result.has_next {
                Some(has_next) => !has_next,
                None => count < self.page_size,
            };
            if last_page {
                break;
            }
            if page == self.max_pages {
                warn!(league_id, max_pages = self.max_pages, "page ceiling reached, listing truncated");
            }
        }

        info!(league_id, entries = entities.len(), league = %display_name, "league listing collected");
        Ok(Collection { entities, display_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchError, StandingsPage};
    use crate::testutils::{entities, pages, FakeUpstream};

    #[tokio::test]
    async fn single_full_page_with_no_more_pages() {
        let upstream = Arc::new(FakeUpstream::new(pages(&entities(50), 50, "Fifty")));
        let collection = PaginatedCollector::new(upstream.clone()).collect(1).await.unwrap();

        assert_eq!(collection.entities.len(), 50);
        assert_eq!(collection.display_name, "Fifty");
        assert_eq!(upstream.listing_calls(), 1);
    }

    #[tokio::test]
    async fn short_page_ends_listing_when_flag_missing() {
        let all = entities(70);
        let pages = vec![
            StandingsPage { league_name: Some("L".into()), entries: all[..50].to_vec(), has_next: None },
            StandingsPage { league_name: None, entries: all[50..].to_vec(), has_next: None },
            StandingsPage { league_name: None, entries: entities(5), has_next: None },
        ];
        let upstream = Arc::new(FakeUpstream::new(pages));
        let collection = PaginatedCollector::new(upstream.clone()).collect(1).await.unwrap();

        assert_eq!(collection.entities.len(), 70);
        assert_eq!(upstream.listing_calls(), 2);
    }

    #[tokio::test]
    async fn walks_pages_in_order() {
        let upstream = Arc::new(FakeUpstream::new(pages(&entities(120), 50, "Big")));
        let collection = PaginatedCollector::new(upstream.clone()).collect(1).await.unwrap();

        let ids: Vec<u64> = collection.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, (1..=120).collect::<Vec<_>>());
        assert_eq!(upstream.listing_calls(), 3);
        assert_eq!(collection.display_name, "Big");
    }

    #[tokio::test]
    async fn empty_page_stops() {
        let upstream = Arc::new(FakeUpstream::new(vec![]));
        let collection = PaginatedCollector::new(upstream.clone()).collect(1).await.unwrap();
        assert!(collection.entities.is_empty());
        assert_eq!(upstream.listing_calls(), 1);
    }

    #[tokio::test]
    async fn page_ceiling_bounds_pathological_listing() {
        let endless: Vec<StandingsPage> = entities(30 * 50)
            .chunks(50)
            .map(|chunk| StandingsPage { league_name: None, entries: chunk.to_vec(), has_next: Some(true) })
            .collect();
        let upstream = Arc::new(FakeUpstream::new(endless));
        let collection = PaginatedCollector::new(upstream.clone()).collect(1).await.unwrap();

        assert_eq!(upstream.listing_calls(), MAX_LISTING_PAGES as usize);
        assert_eq!(collection.entities.len(), 50 * MAX_LISTING_PAGES as usize);
    }

    #[tokio::test]
    async fn entry_cap_truncates_and_stops_paging() {
        let upstream = Arc::new(FakeUpstream::new(pages(&entities(150), 50, "Capped")));
        let collection = PaginatedCollector::new(upstream.clone())
            .with_max_entries(Some(60))
            .collect(1)
            .await
            .unwrap();

        assert_eq!(collection.entities.len(), 60);
        assert_eq!(upstream.listing_calls(), 2);
    }

    #[tokio::test]
    async fn entry_repeated_on_next_page_is_kept_once() {
        let all = entities(60);
        let mut second: Vec<Entity> = vec![all[49].clone()];
        second.extend_from_slice(&all[50..]);
        let pages = vec![
            StandingsPage { league_name: Some("Shifty".into()), entries: all[..50].to_vec(), has_next: Some(true) },
            StandingsPage { league_name: None, entries: second, has_next: Some(false) },
        ];
        let upstream = Arc::new(FakeUpstream::new(pages));
        let collection = PaginatedCollector::new(upstream).collect(1).await.unwrap();

        let ids: Vec<u64> = collection.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, (1..=60).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn listing_error_is_fatal() {
        let upstream = Arc::new(FakeUpstream::with_entities(10).listing_fails(FetchError::Upstream(502)));
        let err = PaginatedCollector::new(upstream).collect(1).await.unwrap_err();
        assert!(matches!(err, AppError::Listing(FetchError::Upstream(502))));
    }
}
