//! Palate public API boundary (HTTP+JSON).
//!
//! This crate defines the trait and wire types every frontend depends on.
//! The real implementation talks to the remote recommender service; a mock
//! serves tests.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use palate_core::{AppData, MatchCandidate, RecipeSummary, SubstituteSet};

/// Where the recommender service listens when nothing is configured.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";

/// Body of `POST /api/recommend`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendRequest {
    pub comfort_dish: String,
    pub target_cuisine: String,
    pub excluded_allergens: Vec<String>,
}

/// Reply of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}

/// `{"error": "..."}` body the service sends with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct RemoteError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct InstructionsEnvelope {
    #[serde(default)]
    instructions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    recipes: Vec<RecipeSummary>,
}

/// API errors suitable for caching and replay; every variant is cheap to
/// clone and keeps the original message.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
pub enum ApiError {
    /// Transport failure: connection refused, DNS, timeout. The service
    /// itself never answered.
    #[error("unreachable: {0}")]
    Unreachable(String),
    /// The service answered with an error status and message.
    #[error("http {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    /// True when retrying without fixing the environment is pointless
    /// because the service is down.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ApiError::Unreachable(_))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Declarative Palate API surface.
#[async_trait::async_trait]
pub trait PalateApi: Send + Sync {
    /// Startup payload: cuisine catalogs, recipe map, allergen data, seeds.
    async fn fetch_app_data(&self) -> ApiResult<AppData>;

    /// Liveness probe for the backing service.
    async fn health(&self) -> ApiResult<HealthStatus>;

    /// Rank target-cuisine dishes against the comfort dish.
    async fn recommend(&self, req: &RecommendRequest) -> ApiResult<Vec<MatchCandidate>>;

    /// Substitute suggestions for one allergen.
    async fn allergen_substitutes(&self, allergen: &str) -> ApiResult<SubstituteSet>;

    /// Instructions looked up by numeric recipe id.
    async fn recipe_details(&self, id: i64) -> ApiResult<Vec<String>>;

    /// Instructions looked up by exact title.
    async fn recipe_by_title(&self, title: &str) -> ApiResult<Vec<String>>;

    /// Full-text recipe search.
    async fn search_recipes(&self, query: &str) -> ApiResult<Vec<RecipeSummary>>;
}

/// Path for the by-title lookup; titles go through URL encoding so spaces
/// and punctuation survive the round trip.
fn recipe_title_path(title: &str) -> String {
    format!("/api/recipe/{}", urlencoding::encode(title))
}

// ----------------- HTTP implementation -----------------

/// HTTP client for the recommender service.
pub struct HttpApi {
    client: reqwest::Client,
    base: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let timeout = std::env::var("PALATE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let base = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base })
    }

    /// Base URL from `PALATE_API_URL`, falling back to [`DEFAULT_API_URL`].
    pub fn from_env() -> ApiResult<Self> {
        let base = std::env::var("PALATE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(base)
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn transport(e: reqwest::Error) -> ApiError {
        ApiError::Unreachable(e.to_string())
    }

    async fn get_json<T: DeserializeOwned>(&self, op: &'static str, path: &str) -> ApiResult<T> {
        let t0 = Instant::now();
        let url = format!("{}{}", self.base, path);
        let resp = self.client.get(&url).send().await.map_err(Self::transport);
        let out = match resp {
            Ok(r) => Self::decode(r).await,
            Err(e) => Err(e),
        };
        Self::observe(op, t0, out.is_ok());
        out
    }

    async fn post_json<B, T>(&self, op: &'static str, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let t0 = Instant::now();
        let url = format!("{}{}", self.base, path);
        let resp = self.client.post(&url).json(body).send().await.map_err(Self::transport);
        let out = match resp {
            Ok(r) => Self::decode(r).await,
            Err(e) => Err(e),
        };
        Self::observe(op, t0, out.is_ok());
        out
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> ApiResult<T> {
        let status = resp.status();
        if !status.is_success() {
            let message = match resp.json::<RemoteError>().await {
                Ok(body) => body.error,
                Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
            };
            return Err(match status.as_u16() {
                404 => ApiError::NotFound(message),
                s => ApiError::Remote { status: s, message },
            });
        }
        resp.json::<T>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn observe(op: &'static str, t0: Instant, ok: bool) {
        histogram!("palate_api_request_ms", t0.elapsed().as_millis() as f64, "op" => op);
        if !ok {
            counter!("palate_api_errors_total", 1u64, "op" => op);
        }
    }
}

#[async_trait::async_trait]
impl PalateApi for HttpApi {
    async fn fetch_app_data(&self) -> ApiResult<AppData> {
        let t0 = Instant::now();
        info!("api: data start");
        let data: AppData = self.get_json("data", "/api/data").await?;
        info!(
            recipes = data.recipes.len(),
            cuisines = data.target_cuisines.len(),
            took_ms = %t0.elapsed().as_millis(),
            "api: data ok"
        );
        Ok(data)
    }

    async fn health(&self) -> ApiResult<HealthStatus> {
        self.get_json("health", "/api/health").await
    }

    async fn recommend(&self, req: &RecommendRequest) -> ApiResult<Vec<MatchCandidate>> {
        let t0 = Instant::now();
        info!(
            dish = %req.comfort_dish,
            cuisine = %req.target_cuisine,
            excluded = req.excluded_allergens.len(),
            "api: recommend start"
        );
        let out: Vec<MatchCandidate> = self.post_json("recommend", "/api/recommend", req).await?;
        info!(count = out.len(), took_ms = %t0.elapsed().as_millis(), "api: recommend ok");
        Ok(out)
    }

    async fn allergen_substitutes(&self, allergen: &str) -> ApiResult<SubstituteSet> {
        let t0 = Instant::now();
        info!(allergen = %allergen, "api: substitutes start");
        let mut body = HashMap::new();
        body.insert("allergen", allergen);
        let set: SubstituteSet =
            self.post_json("substitutes", "/api/allergen/substitutes", &body).await?;
        info!(
            count = set.substitutes.len(),
            took_ms = %t0.elapsed().as_millis(),
            "api: substitutes ok"
        );
        Ok(set)
    }

    async fn recipe_details(&self, id: i64) -> ApiResult<Vec<String>> {
        let t0 = Instant::now();
        let path = format!("/api/recipe/details/{}", id);
        let env: InstructionsEnvelope = self.get_json("details", &path).await?;
        info!(id, steps = env.instructions.len(), took_ms = %t0.elapsed().as_millis(), "api: details ok");
        Ok(env.instructions)
    }

    async fn recipe_by_title(&self, title: &str) -> ApiResult<Vec<String>> {
        let t0 = Instant::now();
        let env: InstructionsEnvelope =
            self.get_json("by_title", &recipe_title_path(title)).await?;
        info!(title = %title, steps = env.instructions.len(), took_ms = %t0.elapsed().as_millis(), "api: by-title ok");
        Ok(env.instructions)
    }

    async fn search_recipes(&self, query: &str) -> ApiResult<Vec<RecipeSummary>> {
        let t0 = Instant::now();
        let mut body = HashMap::new();
        body.insert("query", query);
        let env: SearchEnvelope = self.post_json("search", "/api/recipe/search", &body).await?;
        info!(query = %query, hits = env.recipes.len(), took_ms = %t0.elapsed().as_millis(), "api: search ok");
        Ok(env.recipes)
    }
}

// ----------------- Mock implementation -----------------

/// Simple in-memory mock implementation for tests. Fields are canned
/// replies keyed by the request input; call counters record how often each
/// endpoint was hit, and the `*_failures` counters script failures that
/// burn down to success.
#[derive(Default)]
pub struct MockApi {
    pub app_data: Option<AppData>,
    /// Candidates keyed by comfort dish.
    pub candidates: HashMap<String, Vec<MatchCandidate>>,
    pub substitutes: HashMap<String, SubstituteSet>,
    pub instructions_by_id: HashMap<i64, Vec<String>>,
    pub instructions_by_title: HashMap<String, Vec<String>>,
    pub search_results: HashMap<String, Vec<RecipeSummary>>,
    /// Artificial latency per comfort dish / query, for paused-clock
    /// timing tests.
    pub recommend_delay_ms: HashMap<String, u64>,
    pub search_delay_ms: HashMap<String, u64>,
    /// Remaining scripted failures.
    pub recommend_failures: Mutex<u32>,
    pub substitute_failures: Mutex<HashMap<String, u32>>,
    pub search_failures: Mutex<HashMap<String, u32>>,
    /// Last recommend body seen, for asserting what callers send.
    pub last_recommend: Mutex<Option<RecommendRequest>>,
    pub calls: CallCounts,
}

#[derive(Default)]
pub struct CallCounts {
    pub app_data: AtomicU32,
    pub recommend: AtomicU32,
    pub substitutes: AtomicU32,
    pub details_by_id: AtomicU32,
    pub details_by_title: AtomicU32,
    pub search: AtomicU32,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_data_calls(&self) -> u32 {
        self.calls.app_data.load(Ordering::SeqCst)
    }

    pub fn recommend_calls(&self) -> u32 {
        self.calls.recommend.load(Ordering::SeqCst)
    }

    pub fn substitute_calls(&self) -> u32 {
        self.calls.substitutes.load(Ordering::SeqCst)
    }

    pub fn details_by_id_calls(&self) -> u32 {
        self.calls.details_by_id.load(Ordering::SeqCst)
    }

    pub fn details_by_title_calls(&self) -> u32 {
        self.calls.details_by_title.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> u32 {
        self.calls.search.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PalateApi for MockApi {
    async fn fetch_app_data(&self) -> ApiResult<AppData> {
        self.calls.app_data.fetch_add(1, Ordering::SeqCst);
        self.app_data.clone().ok_or_else(|| ApiError::Unreachable("no app data".into()))
    }

    async fn health(&self) -> ApiResult<HealthStatus> {
        Ok(HealthStatus { status: "ok".into(), service: "palate api".into() })
    }

    async fn recommend(&self, req: &RecommendRequest) -> ApiResult<Vec<MatchCandidate>> {
        self.calls.recommend.fetch_add(1, Ordering::SeqCst);
        *self.last_recommend.lock().unwrap() = Some(req.clone());
        if req.comfort_dish.trim().is_empty() || req.target_cuisine.trim().is_empty() {
            return Err(ApiError::Remote {
                status: 400,
                message: "comfortDish (source recipe) and targetCuisine are required".into(),
            });
        }
        {
            let mut left = self.recommend_failures.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(ApiError::Unreachable("connection refused".into()));
            }
        }
        if let Some(ms) = self.recommend_delay_ms.get(&req.comfort_dish) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        Ok(self.candidates.get(&req.comfort_dish).cloned().unwrap_or_default())
    }

    async fn allergen_substitutes(&self, allergen: &str) -> ApiResult<SubstituteSet> {
        self.calls.substitutes.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.substitute_failures.lock().unwrap();
            if let Some(left) = failures.get_mut(allergen) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ApiError::Remote {
                        status: 500,
                        message: format!("substitute lookup failed for {}", allergen),
                    });
                }
            }
        }
        self.substitutes
            .get(allergen)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("no substitutes for {}", allergen)))
    }

    async fn recipe_details(&self, id: i64) -> ApiResult<Vec<String>> {
        self.calls.details_by_id.fetch_add(1, Ordering::SeqCst);
        self.instructions_by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("recipe {}", id)))
    }

    async fn recipe_by_title(&self, title: &str) -> ApiResult<Vec<String>> {
        self.calls.details_by_title.fetch_add(1, Ordering::SeqCst);
        self.instructions_by_title
            .get(title)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("recipe {}", title)))
    }

    async fn search_recipes(&self, query: &str) -> ApiResult<Vec<RecipeSummary>> {
        self.calls.search.fetch_add(1, Ordering::SeqCst);
        if let Some(ms) = self.search_delay_ms.get(query) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        {
            let mut failures = self.search_failures.lock().unwrap();
            if let Some(left) = failures.get_mut(query) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ApiError::Remote {
                        status: 500,
                        message: format!("search failed for {}", query),
                    });
                }
            }
        }
        Ok(self.search_results.get(query).cloned().unwrap_or_default())
    }
}
