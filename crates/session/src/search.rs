//! Free-text recipe search: a debounced remote query plus an instant
//! local fuzzy preview over the bootstrapped catalog.
//!
//! Every keystroke bumps the search generation. The debounce timer is the
//! only task that gets aborted; a request already in flight keeps running
//! and its stale-stamped response is dropped at apply time, so an
//! out-of-order reply can never clobber a newer one.

#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use metrics::counter;
use tracing::{debug, info, warn};

use palate_api::ApiResult;
use palate_core::RecipeSummary;

use crate::model::{SearchStatus, SessionUpdate};
use crate::Session;

/// Queries shorter than this (trimmed) never reach the network.
pub const MIN_QUERY_CHARS: usize = 3;

const PREVIEW_LIMIT: usize = 10;

impl Session {
    /// Record a keystroke. Short queries clear search state immediately;
    /// anything else restarts the debounce timer for the text captured
    /// right now.
    pub fn on_query_change(&mut self, text: &str) {
        self.search.query = text.to_string();
        self.search.generation += 1;
        self.rebuild_search_preview();
        if let Some(timer) = self.search.timer.take() {
            timer.abort();
        }
        let query = self.search.query.trim().to_string();
        if query.chars().count() < MIN_QUERY_CHARS {
            self.search.results.clear();
            self.search.status = SearchStatus::Idle;
            return;
        }
        let generation = self.search.generation;
        let delay = Duration::from_millis(self.search.debounce_ms);
        let tx = self.updates_tx.clone();
        self.search.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionUpdate::SearchFire { generation, query });
        }));
    }

    /// Timer fired: issue the remote search for the captured query. The
    /// request task is fire-and-forget on purpose; superseded replies are
    /// ignored on arrival, not cancelled mid-flight.
    pub(crate) fn apply_search_fire(&mut self, generation: u64, query: String) {
        if generation != self.search.generation {
            debug!(generation, current = self.search.generation, "search: stale timer dropped");
            return;
        }
        self.search.status = SearchStatus::Searching;
        let api = self.api.clone();
        let tx = self.updates_tx.clone();
        tokio::spawn(async move {
            let t0 = Instant::now();
            let result = api.search_recipes(&query).await;
            match &result {
                Ok(rows) => {
                    info!(query = %query, hits = rows.len(), took_ms = %t0.elapsed().as_millis(), "search: done")
                }
                Err(e) => warn!(query = %query, error = %e, "search: failed"),
            }
            let _ = tx.send(SessionUpdate::SearchDone { generation, result });
        });
    }

    pub(crate) fn apply_search_done(
        &mut self,
        generation: u64,
        result: ApiResult<Vec<RecipeSummary>>,
    ) {
        if generation != self.search.generation {
            debug!(generation, current = self.search.generation, "search: stale response dropped");
            counter!("session_stale_drops_total", 1u64, "kind" => "search");
            return;
        }
        match result {
            Ok(rows) => {
                self.search.results = rows;
                self.search.status = SearchStatus::Done;
            }
            Err(e) => {
                self.search.status = SearchStatus::Error(e.to_string());
            }
        }
    }

    /// Instant, network-free matches against the bootstrapped recipe
    /// titles. Same minimum-length gate as the remote search.
    fn rebuild_search_preview(&mut self) {
        self.search.preview.clear();
        let needle = self.search.query.trim().to_lowercase();
        if needle.chars().count() < MIN_QUERY_CHARS {
            return;
        }
        let Some(data) = self.boot.data.as_ref() else {
            return;
        };
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, &String)> = data
            .recipes
            .keys()
            .filter_map(|title| {
                matcher.fuzzy_match(&title.to_lowercase(), &needle).map(|score| (score, title))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        self.search.preview =
            scored.into_iter().take(PREVIEW_LIMIT).map(|(_, title)| title.clone()).collect();
    }
}
