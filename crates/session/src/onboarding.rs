//! Three-step onboarding wizard.
//!
//! Linear and deliberately small: the only gated transition is leaving
//! step 1 without a name. Finishing persists the profile seed plus the
//! completion flag; a failed write is logged, never fatal.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use palate_persist::{ProfileSeed, Store};
use tracing::{info, warn};

/// Goal choices offered on step 2, as (value, label).
pub const GOAL_OPTIONS: [(&str, &str); 4] = [
    ("explore", "Explore new cuisines"),
    ("comfort", "Find comfort in familiar flavours"),
    ("allergies", "Manage dietary restrictions"),
    ("cook", "Discover new recipes"),
];

/// Allergen pills offered on step 3.
pub const ALLERGEN_OPTIONS: [&str; 6] = ["Dairy", "Gluten", "Nuts", "Shellfish", "Eggs", "Soy"];

pub const TOTAL_STEPS: u8 = 3;

/// Collects the profile seed across three steps: name and home food,
/// goal and cuisines of interest, allergen preferences.
pub struct OnboardingWizard {
    pub step: u8,
    pub name: String,
    /// Set when a gated Next was refused, so the form can show the error.
    pub name_touched: bool,
    /// Chip picked from the comfort-food catalog, if any.
    pub home_food_choice: Option<String>,
    /// Free text; overrides the picked chip when non-empty.
    pub home_food_hint: String,
    pub goal: Option<String>,
    pub cuisines: BTreeSet<String>,
    pub allergens: BTreeSet<String>,
    pub done: bool,
}

impl Default for OnboardingWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl OnboardingWizard {
    pub fn new() -> Self {
        Self {
            step: 1,
            name: String::new(),
            name_touched: false,
            home_food_choice: None,
            home_food_hint: String::new(),
            goal: None,
            cuisines: BTreeSet::new(),
            allergens: BTreeSet::new(),
            done: false,
        }
    }

    /// Advance one step. Step 1 requires a non-empty trimmed name; a
    /// refused advance marks the name field touched instead.
    pub fn next(&mut self) -> bool {
        if self.step == 1 && self.name.trim().is_empty() {
            self.name_touched = true;
            return false;
        }
        if self.step < TOTAL_STEPS {
            self.step += 1;
            true
        } else {
            false
        }
    }

    /// Step back, never gated.
    pub fn back(&mut self) {
        if self.step > 1 {
            self.step -= 1;
        }
    }

    /// Validation text for the name field, shown only after a refusal.
    pub fn name_error(&self) -> Option<&'static str> {
        if self.name_touched && self.name.trim().is_empty() {
            Some("Please enter your name")
        } else {
            None
        }
    }

    /// Empty clears the goal; anything else is kept verbatim.
    pub fn set_goal(&mut self, goal: &str) {
        self.goal = if goal.is_empty() { None } else { Some(goal.to_string()) };
    }

    pub fn pick_home_food(&mut self, dish: &str) {
        self.home_food_choice = Some(dish.to_string());
    }

    pub fn toggle_cuisine(&mut self, name: &str) {
        if !self.cuisines.remove(name) {
            self.cuisines.insert(name.to_string());
        }
    }

    pub fn toggle_allergen(&mut self, name: &str) {
        if !self.allergens.remove(name) {
            self.allergens.insert(name.to_string());
        }
    }

    /// Free-text hint wins over a picked chip; both blank means none.
    pub fn resolved_home_food(&self) -> Option<String> {
        let hint = self.home_food_hint.trim();
        if !hint.is_empty() {
            return Some(hint.to_string());
        }
        self.home_food_choice.as_deref().filter(|c| !c.trim().is_empty()).map(String::from)
    }

    /// The seed `finish` persists. Optional answers stay unset when the
    /// user skipped them.
    pub fn seed(&self) -> ProfileSeed {
        ProfileSeed {
            name: self.name.trim().to_string(),
            goal: self.goal.clone(),
            home_food: self.resolved_home_food(),
            cuisines: self.cuisines.iter().cloned().collect(),
            allergens: self.allergens.iter().cloned().collect(),
        }
    }

    /// Persist the seed and complete the wizard. Only valid once, from the
    /// last step. A failed store write is logged and does not block
    /// completion.
    pub fn finish(&mut self, store: &dyn Store) -> bool {
        if self.step != TOTAL_STEPS || self.done {
            return false;
        }
        let seed = self.seed();
        if let Err(e) = seed.save(store) {
            warn!(error = %e, "onboarding: seed not persisted");
        }
        info!(name = %seed.name, goal = seed.goal.as_deref().unwrap_or(""), "onboarding: finished");
        self.done = true;
        true
    }
}
