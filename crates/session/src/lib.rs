//! Palate session: the active screen, the data screens hand each other,
//! and the background tasks that keep both fresh.
//!
//! The session never blocks. Every remote call runs on a spawned task that
//! reports back through an update channel, and [`Session::process_updates`]
//! applies whatever has arrived since the last call. Completions that went
//! stale in the meantime (a superseded search generation, a recipe detail
//! the user already left) are dropped at apply time.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use palate_api::{ApiResult, PalateApi, RecommendRequest};
use palate_core::transform::to_match_results;
use palate_core::{
    AppData, AppSettings, MatchCandidate, RecipeRef, RecipeSummary, Restaurant, Screen,
    UserProfile,
};
use palate_persist::{onboarding_complete, Store};
use palate_store::{AllergenStore, RecipeResolver, RecipeSteps};

mod model;
mod onboarding;
mod search;

pub use model::{
    BootstrapState, DetailState, HomeState, MatchesState, SearchState, SearchStatus,
    SessionUpdate,
};
pub use onboarding::{OnboardingWizard, ALLERGEN_OPTIONS, GOAL_OPTIONS, TOTAL_STEPS};
pub use search::MIN_QUERY_CHARS;

pub struct Session {
    api: Arc<dyn PalateApi>,
    store: Arc<dyn Store>,
    pub screen: Screen,
    pub boot: BootstrapState,
    pub home: HomeState,
    pub matches: MatchesState,
    pub detail: DetailState,
    pub search: SearchState,
    pub allergens: AllergenStore,
    pub resolver: RecipeResolver,
    pub onboarding: OnboardingWizard,
    pub profile: UserProfile,
    pub settings: AppSettings,
    /// One-line status for refused actions, shown by the frontend.
    pub log: String,
    updates_tx: mpsc::UnboundedSender<SessionUpdate>,
    updates_rx: mpsc::UnboundedReceiver<SessionUpdate>,
}

impl Session {
    /// Build a session and start fetching the bootstrap payload. The
    /// persisted completion flag decides whether onboarding shows first.
    pub fn new(api: Arc<dyn PalateApi>, store: Arc<dyn Store>) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let screen =
            if onboarding_complete(store.as_ref()) { Screen::Home } else { Screen::Onboarding };
        info!(screen = ?screen, "session starting");
        let mut this = Self {
            allergens: AllergenStore::new(api.clone()),
            resolver: RecipeResolver::new(api.clone()),
            api,
            store,
            screen,
            boot: BootstrapState::default(),
            home: HomeState::default(),
            matches: MatchesState::default(),
            detail: DetailState::default(),
            search: SearchState::default(),
            onboarding: OnboardingWizard::new(),
            profile: UserProfile::default(),
            settings: AppSettings::default(),
            log: String::new(),
            updates_tx,
            updates_rx,
        };
        this.search.debounce_ms = std::env::var("PALATE_SEARCH_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(500);
        this.start_bootstrap();
        this
    }

    fn start_bootstrap(&mut self) {
        self.boot.loading = true;
        self.boot.fatal = None;
        let api = self.api.clone();
        let tx = self.updates_tx.clone();
        self.boot.task = Some(tokio::spawn(async move {
            let t0 = Instant::now();
            let result = api.fetch_app_data().await;
            match &result {
                Ok(d) => {
                    info!(recipes = d.recipes.len(), took_ms = %t0.elapsed().as_millis(), "bootstrap: data loaded")
                }
                Err(e) => {
                    warn!(error = %e, took_ms = %t0.elapsed().as_millis(), "bootstrap: data failed")
                }
            }
            let _ = tx.send(SessionUpdate::Bootstrap(result));
        }));
    }

    /// Apply everything background tasks reported since the last call.
    /// Returns how many updates were applied.
    pub fn process_updates(&mut self) -> usize {
        let mut processed = 0usize;
        while processed < 256 {
            match self.updates_rx.try_recv() {
                Ok(SessionUpdate::Bootstrap(result)) => {
                    self.apply_bootstrap(result);
                    processed += 1;
                }
                Ok(SessionUpdate::Matches { generation, result }) => {
                    self.apply_matches(generation, result);
                    processed += 1;
                }
                Ok(SessionUpdate::Steps { reference, result }) => {
                    self.apply_steps(reference, result);
                    processed += 1;
                }
                Ok(SessionUpdate::SearchFire { generation, query }) => {
                    self.apply_search_fire(generation, query);
                    processed += 1;
                }
                Ok(SessionUpdate::SearchDone { generation, result }) => {
                    self.apply_search_done(generation, result);
                    processed += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            }
        }
        if processed > 0 {
            counter!("session_updates_processed", processed as u64);
        }
        processed
    }

    fn apply_bootstrap(&mut self, result: ApiResult<AppData>) {
        self.boot.loading = false;
        self.boot.task = None;
        match result {
            Ok(data) => {
                self.profile = data.initial_user_profile.clone();
                self.settings = data.initial_settings;
                self.boot.data = Some(data);
            }
            Err(e) => {
                self.boot.fatal = Some(e.to_string());
            }
        }
    }

    /// True once the bootstrap payload arrived.
    pub fn is_ready(&self) -> bool {
        self.boot.data.is_some()
    }

    pub fn restaurants(&self) -> &[Restaurant] {
        self.boot.data.as_ref().map(|d| d.restaurants.as_slice()).unwrap_or(&[])
    }

    pub fn common_allergens(&self) -> &[String] {
        self.boot.data.as_ref().map(|d| d.common_allergens.as_slice()).unwrap_or(&[])
    }

    // ----------------- Navigation -----------------

    pub fn navigate(&mut self, screen: Screen) {
        if screen == self.screen {
            return;
        }
        if self.screen == Screen::RecipeDetail {
            // Leaving detail: a resolution still in flight has no observer.
            self.detail.pending = None;
        }
        debug!(from = ?self.screen, to = ?screen, "nav: screen change");
        self.screen = screen;
    }

    /// Detail is reachable from both the results flow and the recipe
    /// browser; back returns to whichever of the two has data.
    pub fn back_from_detail(&mut self) {
        let target =
            if self.matches.results.is_empty() { Screen::Recipes } else { Screen::Results };
        self.navigate(target);
    }

    // ----------------- Translate -----------------

    /// Ask the recommender for matches. Refused (with a status line) until
    /// both the comfort dish and the target cuisine are filled in.
    pub fn translate(&mut self) {
        let dish = self.home.comfort_dish.trim().to_string();
        let cuisine = self.home.target_cuisine.trim().to_string();
        if dish.is_empty() || cuisine.is_empty() {
            self.log = "pick a comfort dish and a target cuisine first".into();
            return;
        }
        if self.boot.data.is_none() {
            self.log = "still loading app data".into();
            return;
        }
        self.matches.generation += 1;
        let generation = self.matches.generation;
        self.matches.loading = true;
        self.matches.error = None;
        let excluded =
            if self.home.allergen_filter { self.allergens.selected() } else { Vec::new() };
        let req = RecommendRequest {
            comfort_dish: dish,
            target_cuisine: cuisine,
            excluded_allergens: excluded,
        };
        let api = self.api.clone();
        let tx = self.updates_tx.clone();
        self.matches.task = Some(tokio::spawn(async move {
            let t0 = Instant::now();
            let result = api.recommend(&req).await;
            match &result {
                Ok(rows) => {
                    info!(candidates = rows.len(), took_ms = %t0.elapsed().as_millis(), "translate: recommend ok")
                }
                Err(e) => warn!(error = %e, "translate: recommend failed"),
            }
            let _ = tx.send(SessionUpdate::Matches { generation, result });
        }));
    }

    fn apply_matches(&mut self, generation: u64, result: ApiResult<Vec<MatchCandidate>>) {
        if generation != self.matches.generation {
            debug!(generation, current = self.matches.generation, "translate: stale response dropped");
            counter!("session_stale_drops_total", 1u64, "kind" => "matches");
            return;
        }
        self.matches.loading = false;
        self.matches.task = None;
        match result {
            Ok(candidates) => {
                let empty = HashMap::new();
                let known = self.boot.data.as_ref().map(|d| &d.recipes).unwrap_or(&empty);
                self.matches.results = to_match_results(candidates, known);
                self.navigate(Screen::Results);
            }
            Err(e) => {
                self.matches.error = Some(e.to_string());
            }
        }
    }

    // ----------------- Recipe detail -----------------

    /// Open detail for a catalog dish or match result (title key only).
    pub fn view_recipe(&mut self, title: &str) {
        self.open_detail(RecipeRef::by_title(title), title.to_string());
    }

    /// Open detail for a search hit (id plus title).
    pub fn select_search_result(&mut self, row: &RecipeSummary) {
        self.open_detail(RecipeRef::from_summary(row), row.title.clone());
    }

    fn open_detail(&mut self, reference: RecipeRef, title: String) {
        if reference.is_empty() {
            self.log = "nothing to open: recipe reference is empty".into();
            return;
        }
        self.detail.title = title;
        self.detail.steps = None;
        self.detail.error = None;
        self.detail.loading = true;
        self.detail.pending = Some(reference.clone());
        self.navigate(Screen::RecipeDetail);
        let resolver = self.resolver.clone();
        let tx = self.updates_tx.clone();
        self.detail.task = Some(tokio::spawn(async move {
            let result = resolver.resolve(&reference).await;
            let _ = tx.send(SessionUpdate::Steps { reference, result });
        }));
    }

    fn apply_steps(&mut self, reference: RecipeRef, result: ApiResult<RecipeSteps>) {
        if self.detail.pending.as_ref() != Some(&reference) {
            debug!(reference = %reference.label(), "detail: late resolution dropped");
            counter!("session_stale_drops_total", 1u64, "kind" => "detail");
            return;
        }
        self.detail.loading = false;
        self.detail.task = None;
        match result {
            Ok(steps) => {
                self.detail.steps = Some(steps);
            }
            Err(e) => {
                self.detail.error = Some(e.to_string());
            }
        }
    }

    // ----------------- Profile, settings, onboarding -----------------

    /// Add to the personal allergen list; already-present names are kept
    /// once.
    pub fn add_profile_allergen(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        if !self.profile.allergens.iter().any(|a| a == name) {
            self.profile.allergens.push(name.to_string());
        }
    }

    pub fn remove_profile_allergen(&mut self, name: &str) {
        self.profile.allergens.retain(|a| a != name);
    }

    /// Partial settings update; unset fields keep their value.
    pub fn update_settings(&mut self, notifications: Option<bool>, show_calories: Option<bool>) {
        if let Some(v) = notifications {
            self.settings.notifications = v;
        }
        if let Some(v) = show_calories {
            self.settings.show_calories = v;
        }
    }

    /// Complete the wizard: persist the seed, adopt the display name, and
    /// move to the home screen. Refused unless the wizard is on its last
    /// step.
    pub fn finish_onboarding(&mut self) {
        if !self.onboarding.finish(self.store.as_ref()) {
            self.log = "onboarding can only finish from the last step".into();
            return;
        }
        let name = self.onboarding.name.trim();
        if !name.is_empty() {
            self.profile.name = name.to_string();
        }
        self.navigate(Screen::Home);
    }
}
