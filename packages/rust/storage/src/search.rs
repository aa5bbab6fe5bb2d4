//! Local candidate search over the recipe index.

use std::collections::HashSet;

use recipeforge_shared::{Recipe, normalize_query};

use crate::index::RecipeIndex;

/// Finds candidate recipes for a query. Relevance ranking happens later;
/// a searcher only decides what is worth ranking.
pub trait Searcher: Send + Sync {
    /// Up to `count` recipes whose match score is at least `min_score`,
    /// best match first.
    fn search(
        &self,
        index: &RecipeIndex,
        query: &str,
        min_score: Option<u8>,
        count: Option<usize>,
    ) -> Vec<Recipe>;
}

/// Token-overlap searcher. Title, alias and index-title words dominate;
/// ingredient words add a smaller bonus. An exact title or alias hit scores 100.
#[derive(Debug, Clone, Default)]
pub struct KeywordSearcher;

const NAME_WEIGHT: f64 = 80.0;
const INGREDIENT_WEIGHT: f64 = 20.0;

impl KeywordSearcher {
    pub fn new() -> Self {
        Self
    }

    /// Match score (0–100) of `recipe` against the normalized `query`.
    pub fn score(&self, recipe: &Recipe, query: &str) -> u8 {
        let query = normalize_query(query);
        let terms = tokenize(&query);
        if terms.is_empty() {
            return 0;
        }

        let exact = normalize_query(&recipe.title) == query
            || recipe.aliases.iter().any(|a| normalize_query(a) == query)
            || recipe
                .index_title
                .as_deref()
                .is_some_and(|t| normalize_query(t) == query);
        if exact {
            return 100;
        }

        let mut names = tokenize(&recipe.title);
        for alias in &recipe.aliases {
            names.extend(tokenize(alias));
        }
        if let Some(index_title) = &recipe.index_title {
            names.extend(tokenize(index_title));
        }
        let ingredients: HashSet<String> =
            recipe.ingredients.iter().flat_map(|i| tokenize(i)).collect();

        let total = terms.len() as f64;
        let name_hits = terms.iter().filter(|t| names.contains(*t)).count() as f64;
        let ingredient_hits = terms.iter().filter(|t| ingredients.contains(*t)).count() as f64;

        let score = name_hits / total * NAME_WEIGHT + ingredient_hits / total * INGREDIENT_WEIGHT;
        score.round().min(99.0) as u8
    }
}

impl Searcher for KeywordSearcher {
    fn search(
        &self,
        index: &RecipeIndex,
        query: &str,
        min_score: Option<u8>,
        count: Option<usize>,
    ) -> Vec<Recipe> {
        let floor = min_score.unwrap_or(1).max(1);

        let mut scored: Vec<(u8, Recipe)> = index
            .recipes()
            .into_iter()
            .filter_map(|r| {
                let s = self.score(&r, query);
                (s >= floor).then_some((s, r))
            })
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.title.cmp(&b.title)));

        let take = count.unwrap_or(usize::MAX);
        scored.into_iter().take(take).map(|(_, r)| r).collect()
    }
}

/// Lowercase words of two or more alphanumeric characters.
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(id: &str, title: &str, ingredients: &[&str]) -> Recipe {
        Recipe {
            id: id.into(),
            title: title.into(),
            ingredients: ingredients.iter().map(|i| i.to_string()).collect(),
            ..Default::default()
        }
    }

    fn index_of(recipes: &[Recipe]) -> RecipeIndex {
        let index = RecipeIndex::new();
        for r in recipes {
            index.add_recipe(r).unwrap();
        }
        index
    }

    #[test]
    fn exact_title_scores_highest() {
        let searcher = KeywordSearcher::new();
        let r = recipe("1", "Pasta Carbonara", &["spaghetti", "eggs"]);
        assert_eq!(searcher.score(&r, " pasta carbonara "), 100);
        assert_eq!(searcher.score(&r, "carbonara"), 80);
        assert_eq!(searcher.score(&r, "tacos"), 0);
    }

    #[test]
    fn alias_counts_as_exact() {
        let searcher = KeywordSearcher::new();
        let mut r = recipe("1", "Spaghetti alla Bolognese", &[]);
        r.aliases.insert("Spag Bol".into());
        assert_eq!(searcher.score(&r, "spag bol"), 100);
    }

    #[test]
    fn ingredient_matches_add_a_bonus() {
        let searcher = KeywordSearcher::new();
        let with = recipe("1", "Weeknight Pasta", &["200g pancetta"]);
        let without = recipe("2", "Weeknight Pasta", &["olive oil"]);
        assert!(searcher.score(&with, "pancetta pasta") > searcher.score(&without, "pancetta pasta"));
    }

    #[test]
    fn search_orders_and_truncates() {
        let index = index_of(&[
            recipe("1", "Pasta", &[]),
            recipe("2", "Pasta Primavera", &["zucchini"]),
            recipe("3", "Tomato Soup", &["tomato"]),
            recipe("4", "Baked Pasta with Tomato", &["tomato"]),
        ]);

        let results = KeywordSearcher::new().search(&index, "tomato pasta", None, Some(2));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "4");

        let all = KeywordSearcher::new().search(&index, "pasta", None, None);
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids[0], "1");
        assert!(!ids.contains(&"3"));
    }

    #[test]
    fn min_score_filters_weak_matches() {
        let index = index_of(&[
            recipe("1", "Chicken Curry", &[]),
            recipe("2", "Rice Bowl", &["chicken"]),
        ]);
        let results = KeywordSearcher::new().search(&index, "chicken", Some(50), None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "1");
    }
}
