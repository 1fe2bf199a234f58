//! Allergen selection plus substitute lookups.
//!
//! Selection and fetch lifecycle are deliberately separate: deselecting an
//! allergen keeps its cached substitutes, and reselecting reuses them
//! without another network call. Only an errored lookup rearms.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use palate_api::PalateApi;
use palate_core::SubstituteSet;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{FetchState, ResourceCache};

/// One allergen row as the allergens screen sees it.
#[derive(Debug, Clone)]
pub struct AllergenEntry {
    pub name: String,
    pub selected: bool,
    pub state: FetchState<SubstituteSet>,
}

/// Tracks which allergens the user selected and owns one substitute fetch
/// per allergen name. Each name's lifecycle is independent.
pub struct AllergenStore {
    api: Arc<dyn PalateApi>,
    selected: Mutex<BTreeSet<String>>,
    cache: ResourceCache<String, SubstituteSet>,
}

impl AllergenStore {
    pub fn new(api: Arc<dyn PalateApi>) -> Self {
        Self { api, selected: Mutex::new(BTreeSet::new()), cache: ResourceCache::new("allergens") }
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.lock().unwrap().contains(name)
    }

    /// Selected names in stable alphabetical order, ready for a
    /// recommend request's exclusion list.
    pub fn selected(&self) -> Vec<String> {
        self.selected.lock().unwrap().iter().cloned().collect()
    }

    pub fn state(&self, name: &str) -> FetchState<SubstituteSet> {
        self.cache.state(&name.to_string())
    }

    pub fn entry(&self, name: &str) -> AllergenEntry {
        AllergenEntry {
            name: name.to_string(),
            selected: self.is_selected(name),
            state: self.state(name),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.cache.subscribe()
    }

    /// Every name that is selected or has fetch history, sorted by name.
    pub fn entries(&self) -> Vec<AllergenEntry> {
        let mut names: BTreeSet<String> = self.selected.lock().unwrap().clone();
        names.extend(self.cache.keys());
        names
            .into_iter()
            .map(|name| {
                let selected = self.is_selected(&name);
                let state = self.cache.state(&name);
                AllergenEntry { name, selected, state }
            })
            .collect()
    }

    /// Flip selection; returns the new selected flag. Selecting starts a
    /// substitute fetch only when the name has no usable outcome yet
    /// (never fetched, or last fetch failed). Deselecting never drops
    /// cached substitutes.
    pub fn toggle(&self, name: &str) -> bool {
        let now_selected = {
            let mut sel = self.selected.lock().unwrap();
            if sel.remove(name) {
                false
            } else {
                sel.insert(name.to_string());
                true
            }
        };
        if now_selected {
            let key = name.to_string();
            if self.cache.begin_retry(&key) {
                info!(allergen = %key, "allergens: fetch start");
                let api = self.api.clone();
                let cache = self.cache.clone();
                tokio::spawn(async move {
                    let out = api.allergen_substitutes(&key).await;
                    match &out {
                        Ok(set) => {
                            info!(allergen = %key, count = set.substitutes.len(), "allergens: fetch ok")
                        }
                        Err(e) => warn!(allergen = %key, error = %e, "allergens: fetch failed"),
                    }
                    cache.complete(&key, out);
                });
            }
        }
        now_selected
    }

    /// Await a Ready/Error outcome for one name. Callers should wrap this
    /// in a timeout; a name that never started fetching never settles.
    pub async fn wait_settled(&self, name: &str) -> FetchState<SubstituteSet> {
        let mut rx = self.subscribe();
        loop {
            let s = self.state(name);
            if s.is_settled() {
                return s;
            }
            if rx.changed().await.is_err() {
                return s;
            }
        }
    }
}
