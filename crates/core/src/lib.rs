//! Palate core types: the domain model shared by every crate.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod transform;

/// Screens the session can present. Switching screens is a pure state
/// change; any data a screen needs is loaded by the stores, not by the
/// navigation itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Screen {
    Onboarding,
    Home,
    Results,
    Recipes,
    RecipeDetail,
    Restaurants,
    Allergens,
    Profile,
    Settings,
}

/// A fully described dish from the bootstrap catalog, keyed by title.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Recipe {
    pub name: String,
    pub image: String,
    pub prep_time: String,
    pub cook_time: String,
    pub servings: String,
    pub difficulty: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
}

/// Slim recipe row returned by the remote search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RecipeSummary {
    pub id: i64,
    pub title: String,
    pub region: Option<String>,
    pub prep_time: Option<u32>,
    pub cook_time: Option<u32>,
    pub servings: Option<u32>,
}

/// How a recipe's instructions can be looked up remotely: by numeric id,
/// by exact title, or both. Used as the resolver cache key, so two refs
/// naming the same dish differently are distinct entries on purpose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RecipeRef {
    pub id: Option<i64>,
    pub title: Option<String>,
}

impl RecipeRef {
    pub fn by_id(id: i64) -> Self {
        Self { id: Some(id), title: None }
    }

    pub fn by_title(title: impl Into<String>) -> Self {
        Self { id: None, title: Some(title.into()) }
    }

    pub fn from_summary(s: &RecipeSummary) -> Self {
        Self { id: Some(s.id), title: Some(s.title.clone()) }
    }

    /// True when neither lookup key is usable.
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.title.as_deref().map_or(true, |t| t.trim().is_empty())
    }

    /// Short human label for logs.
    pub fn label(&self) -> String {
        match (&self.title, self.id) {
            (Some(t), _) if !t.is_empty() => t.clone(),
            (_, Some(id)) => format!("#{}", id),
            _ => "<empty>".into(),
        }
    }
}

/// One raw candidate from the recommender, before display shaping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchCandidate {
    pub recipe_title: String,
    pub final_score: f64,
    pub explanation: Explanation,
}

/// The recommender sends explanations either as one sentence or as a
/// list of reasons; both decode from the same field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Explanation {
    Text(String),
    Reasons(Vec<String>),
}

impl Explanation {
    /// Single display string, list variants joined with " • ".
    pub fn joined(&self) -> String {
        match self {
            Explanation::Text(s) => s.clone(),
            Explanation::Reasons(parts) => parts.join(" • "),
        }
    }
}

/// A display-ready match row produced by [`transform::to_match_results`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// 1-based rank in presentation order.
    pub id: u32,
    pub name: String,
    pub match_score_percent: u8,
    pub explanation: String,
    pub ingredients: Vec<String>,
    pub has_recipe: bool,
}

/// One substitute suggestion for an allergen.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Substitute {
    pub name: String,
    pub description: String,
    #[serde(default, rename = "wikipedia", skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Substitute lookup result for one allergen.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SubstituteSet {
    pub category: String,
    pub matched_entity: String,
    pub substitutes: Vec<Substitute>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub cuisine: String,
    pub price: String,
    pub match_score: u8,
    pub distance: String,
    pub rating: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub join_date: String,
    pub translations_completed: u32,
    pub recipes_viewed: u32,
    pub allergens: Vec<String>,
    pub favorite_cuisines: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub notifications: bool,
    pub show_calories: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self { notifications: false, show_calories: true }
    }
}

/// Everything `/api/data` hands the client at startup: cuisine catalogs,
/// the title-keyed recipe map, allergen data, and profile/settings seeds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AppData {
    pub comfort_cuisines: Vec<String>,
    pub target_cuisines: Vec<String>,
    pub common_allergens: Vec<String>,
    pub allergen_substitutes: HashMap<String, Vec<Substitute>>,
    pub initial_user_profile: UserProfile,
    pub initial_settings: AppSettings,
    pub restaurants: Vec<Restaurant>,
    pub recipes: HashMap<String, Recipe>,
}

pub mod prelude {
    pub use super::{
        AppData, AppSettings, Explanation, MatchCandidate, MatchResult, Recipe, RecipeRef,
        RecipeSummary, Restaurant, Screen, Substitute, SubstituteSet, UserProfile,
    };
}
