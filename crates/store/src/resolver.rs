//! Two-tier recipe instruction lookup with per-reference memoization.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use palate_api::{ApiError, ApiResult, PalateApi};
use palate_core::RecipeRef;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{FetchState, ResourceCache};

/// Resolved instructions for one recipe reference. An empty list is a
/// valid terminal state meaning no instructions exist anywhere.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RecipeSteps {
    pub instructions: Vec<String>,
}

impl RecipeSteps {
    pub fn has_instructions(&self) -> bool {
        !self.instructions.is_empty()
    }
}

/// Resolves instructions id-first with a title fallback, memoizing the
/// composite outcome per [`RecipeRef`]. Errors memoize as well: a broken
/// lookup is not retried within the session. Clones share the cache.
#[derive(Clone)]
pub struct RecipeResolver {
    api: Arc<dyn PalateApi>,
    cache: ResourceCache<RecipeRef, RecipeSteps>,
}

impl RecipeResolver {
    pub fn new(api: Arc<dyn PalateApi>) -> Self {
        Self { api, cache: ResourceCache::new("resolver") }
    }

    pub fn state(&self, reference: &RecipeRef) -> FetchState<RecipeSteps> {
        self.cache.state(reference)
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.cache.subscribe()
    }

    /// Resolve once per reference; repeated and concurrent calls for the
    /// same reference share a single network round.
    pub async fn resolve(&self, reference: &RecipeRef) -> ApiResult<RecipeSteps> {
        if reference.is_empty() {
            return Err(ApiError::Validation("recipe reference needs an id or a title".into()));
        }
        let api = self.api.clone();
        let r = reference.clone();
        self.cache.get_or_fetch(reference.clone(), move || fetch_two_tier(api, r)).await
    }
}

/// Id tier first; a missing or empty id answer falls through to the title
/// tier. A 404 on either tier means "absent", never an error.
async fn fetch_two_tier(api: Arc<dyn PalateApi>, r: RecipeRef) -> ApiResult<RecipeSteps> {
    let t0 = Instant::now();
    if let Some(id) = r.id {
        match api.recipe_details(id).await {
            Ok(steps) if !steps.is_empty() => {
                info!(id, steps = steps.len(), took_ms = %t0.elapsed().as_millis(), "resolver: id tier hit");
                return Ok(RecipeSteps { instructions: steps });
            }
            Ok(_) => debug!(id, "resolver: id tier empty"),
            Err(ApiError::NotFound(_)) => debug!(id, "resolver: id unknown"),
            Err(e) => return Err(e),
        }
    }
    if let Some(title) = r.title.as_deref().filter(|t| !t.trim().is_empty()) {
        match api.recipe_by_title(title).await {
            Ok(steps) => {
                info!(title = %title, steps = steps.len(), took_ms = %t0.elapsed().as_millis(), "resolver: title tier hit");
                return Ok(RecipeSteps { instructions: steps });
            }
            Err(ApiError::NotFound(_)) => {
                debug!(title = %title, "resolver: title unknown");
                return Ok(RecipeSteps::default());
            }
            Err(e) => return Err(e),
        }
    }
    // Id produced nothing and there is no usable title.
    Ok(RecipeSteps::default())
}
