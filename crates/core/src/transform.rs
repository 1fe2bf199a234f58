//! Shapes raw recommender candidates into display-ready match rows.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::{MatchCandidate, MatchResult, Recipe};

/// Turn recommender candidates into ranked display rows.
///
/// Candidates keep the order the recommender sent them in; ids are the
/// 1-based positions after invalid entries are dropped. A score outside
/// `[0, 1]` (or non-finite) is a data error and drops the candidate.
pub fn to_match_results(
    candidates: Vec<MatchCandidate>,
    known: &HashMap<String, Recipe>,
) -> Vec<MatchResult> {
    let mut rows = Vec::with_capacity(candidates.len());
    for cand in candidates {
        let score = cand.final_score;
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            tracing::warn!(title = %cand.recipe_title, score, "dropping candidate with out-of-range score");
            continue;
        }
        // Positive halves round away from zero, i.e. up.
        let percent = (score * 100.0).round() as u8;
        let (ingredients, has_recipe) = match known.get(&cand.recipe_title) {
            Some(r) => (r.ingredients.clone(), true),
            None => (Vec::new(), false),
        };
        rows.push(MatchResult {
            id: (rows.len() + 1) as u32,
            name: cand.recipe_title,
            match_score_percent: percent,
            explanation: cand.explanation.joined(),
            ingredients,
            has_recipe,
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Explanation;

    fn cand(title: &str, score: f64, explanation: Explanation) -> MatchCandidate {
        MatchCandidate { recipe_title: title.into(), final_score: score, explanation }
    }

    fn text(s: &str) -> Explanation {
        Explanation::Text(s.into())
    }

    #[test]
    fn scores_scale_with_halves_rounding_up() {
        let rows = to_match_results(
            vec![
                cand("a", 0.87, text("x")),
                cand("b", 0.005, text("x")),
                cand("c", 0.875, text("x")),
                cand("d", 1.0, text("x")),
                cand("e", 0.0, text("x")),
            ],
            &HashMap::new(),
        );
        let percents: Vec<u8> = rows.iter().map(|r| r.match_score_percent).collect();
        assert_eq!(percents, vec![87, 1, 88, 100, 0]);
    }

    #[test]
    fn order_is_preserved_and_ids_are_positional() {
        // Recommender order stands even when scores are not descending.
        let rows = to_match_results(
            vec![
                cand("low", 0.2, text("x")),
                cand("high", 0.9, text("x")),
                cand("mid", 0.5, text("x")),
            ],
            &HashMap::new(),
        );
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["low", "high", "mid"]);
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn out_of_range_scores_drop_and_ranks_close_up() {
        let rows = to_match_results(
            vec![
                cand("ok1", 0.4, text("x")),
                cand("too-big", 1.2, text("x")),
                cand("negative", -0.1, text("x")),
                cand("nan", f64::NAN, text("x")),
                cand("ok2", 0.6, text("x")),
            ],
            &HashMap::new(),
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "ok1");
        assert_eq!(rows[1].name, "ok2");
        assert_eq!(rows[1].id, 2);
    }

    #[test]
    fn explanation_lists_join_with_bullet() {
        let rows = to_match_results(
            vec![cand(
                "Pad Thai",
                0.81,
                Explanation::Reasons(vec![
                    "shares tamarind tang".into(),
                    "similar umami base".into(),
                ]),
            )],
            &HashMap::new(),
        );
        assert_eq!(rows[0].explanation, "shares tamarind tang • similar umami base");
        assert_eq!(rows[0].match_score_percent, 81);
    }

    #[test]
    fn known_recipes_supply_ingredients_and_has_recipe() {
        let mut known = HashMap::new();
        known.insert(
            "Pad Thai".to_string(),
            Recipe {
                name: "Pad Thai".into(),
                ingredients: vec!["Rice Noodles".into(), "Tamarind".into()],
                ..Recipe::default()
            },
        );
        let rows = to_match_results(
            vec![
                cand("Pad Thai", 0.81, text("close match")),
                cand("Unlisted Dish", 0.5, text("loose match")),
            ],
            &known,
        );
        assert!(rows[0].has_recipe);
        assert_eq!(rows[0].ingredients, vec!["Rice Noodles", "Tamarind"]);
        assert!(!rows[1].has_recipe);
        assert!(rows[1].ingredients.is_empty());
    }
}
