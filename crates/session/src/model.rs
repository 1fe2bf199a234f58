#![forbid(unsafe_code)]

use palate_api::ApiError;
use palate_core::{AppData, MatchCandidate, MatchResult, RecipeRef, RecipeSummary};
use palate_store::RecipeSteps;

use tokio::task::JoinHandle;

/// Messages background tasks send back to the session.
#[derive(Debug)]
pub enum SessionUpdate {
    Bootstrap(Result<AppData, ApiError>),
    Matches { generation: u64, result: Result<Vec<MatchCandidate>, ApiError> },
    Steps { reference: RecipeRef, result: Result<RecipeSteps, ApiError> },
    // Search debouncer: timer fire first, then the network outcome.
    SearchFire { generation: u64, query: String },
    SearchDone { generation: u64, result: Result<Vec<RecipeSummary>, ApiError> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    Idle,
    Searching,
    Done,
    Error(String),
}

impl Default for SearchStatus {
    fn default() -> Self {
        SearchStatus::Idle
    }
}

#[derive(Default)]
pub struct BootstrapState {
    pub loading: bool,
    pub data: Option<AppData>,
    /// Startup data failure; the main app cannot render past this.
    pub fatal: Option<String>,
    pub task: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct HomeState {
    pub comfort_dish: String,
    pub target_cuisine: String,
    /// When set, the allergen store's selection rides along as exclusions.
    pub allergen_filter: bool,
}

#[derive(Default)]
pub struct MatchesState {
    pub generation: u64,
    pub loading: bool,
    pub results: Vec<MatchResult>,
    pub error: Option<String>,
    pub task: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct DetailState {
    /// Reference whose resolution the detail screen is waiting for;
    /// cleared on navigation away so late completions land nowhere.
    pub pending: Option<RecipeRef>,
    pub title: String,
    pub steps: Option<RecipeSteps>,
    pub error: Option<String>,
    pub loading: bool,
    pub task: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct SearchState {
    pub query: String,
    /// Bumped on every keystroke; stamps timers and their responses.
    pub generation: u64,
    pub status: SearchStatus,
    pub results: Vec<RecipeSummary>,
    /// Local fuzzy matches over the bootstrapped recipe titles.
    pub preview: Vec<String>,
    pub debounce_ms: u64,
    pub timer: Option<JoinHandle<()>>,
}
