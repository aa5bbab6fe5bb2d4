//! Concurrent in-memory lookup of recipes by title and alias.

use std::collections::{BTreeSet, HashMap};

use dashmap::DashMap;

use recipeforge_shared::{Recipe, RecipeForgeError, Result, normalize_query};

/// Title/alias → recipes-by-id, plus an id-keyed view for membership checks.
///
/// Safe to share across tasks; no external locking is needed.
#[derive(Debug, Default)]
pub struct RecipeIndex {
    by_key: DashMap<String, HashMap<String, Recipe>>,
    by_id: DashMap<String, Recipe>,
}

impl RecipeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `recipe` under its title and every alias.
    ///
    /// Re-adding an id replaces the stored copy under each of its keys and
    /// drops it from keys the new copy no longer carries.
    pub fn add_recipe(&self, recipe: &Recipe) -> Result<()> {
        if recipe.id.trim().is_empty() {
            return Err(RecipeForgeError::validation(format!(
                "recipe id must not be empty (title: {:?})",
                recipe.title
            )));
        }

        let keys = index_keys(recipe);
        let previous = self.by_id.insert(recipe.id.clone(), recipe.clone());

        for key in &keys {
            self.by_key
                .entry(key.clone())
                .or_default()
                .insert(recipe.id.clone(), recipe.clone());
        }

        if let Some(previous) = previous {
            for stale in index_keys(&previous).difference(&keys) {
                if let Some(mut entry) = self.by_key.get_mut(stale) {
                    entry.remove(&recipe.id);
                }
                self.by_key.remove_if(stale, |_, ids| ids.is_empty());
            }
        }
        Ok(())
    }

    /// Case-insensitive exact lookup of a title or alias.
    pub fn try_get_exact_matches(&self, key: &str) -> Option<HashMap<String, Recipe>> {
        self.by_key
            .get(&normalize_query(key))
            .map(|entry| entry.value().clone())
    }

    /// Snapshot of every key and the recipes registered under it.
    pub fn get_all_recipes(&self) -> Vec<(String, HashMap<String, Recipe>)> {
        self.by_key
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// True if any key maps to a recipe with this id.
    pub fn contains_recipe(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Latest copy of the recipe with this id.
    pub fn get(&self, id: &str) -> Option<Recipe> {
        self.by_id.get(id).map(|entry| entry.value().clone())
    }

    /// One copy of every distinct recipe.
    pub fn recipes(&self) -> Vec<Recipe> {
        self.by_id.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of distinct recipes.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Normalized title plus aliases, skipping blanks.
fn index_keys(recipe: &Recipe) -> BTreeSet<String> {
    std::iter::once(&recipe.title)
        .chain(recipe.aliases.iter())
        .map(|k| normalize_query(k))
        .filter(|k| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(id: &str, title: &str, aliases: &[&str]) -> Recipe {
        Recipe {
            id: id.into(),
            title: title.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn add_recipe_rejects_empty_id() {
        let index = RecipeIndex::new();
        let err = index.add_recipe(&recipe("  ", "Soup", &[])).unwrap_err();
        assert!(matches!(err, RecipeForgeError::Validation { .. }));
        assert!(index.is_empty());
    }

    #[test]
    fn add_recipe_is_idempotent() {
        let index = RecipeIndex::new();
        let r = recipe("a1", "Carbonara", &[]);
        index.add_recipe(&r).unwrap();
        let keys_before = index.get_all_recipes().len();

        index.add_recipe(&r).unwrap();
        let all = index.get_all_recipes();
        assert_eq!(all.len(), keys_before);

        let matches = index.try_get_exact_matches("carbonara").unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches.contains_key("a1"));
    }

    #[test]
    fn registers_title_and_aliases() {
        let index = RecipeIndex::new();
        index
            .add_recipe(&recipe("a1", "Spaghetti Bolognese", &["Spag Bol", "ragu"]))
            .unwrap();

        for key in ["spaghetti bolognese", "SPAG BOL", " Ragu "] {
            let matches = index.try_get_exact_matches(key).expect(key);
            assert!(matches.contains_key("a1"));
        }
        assert_eq!(index.get_all_recipes().len(), 3);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn multiple_ids_share_a_key() {
        let index = RecipeIndex::new();
        index.add_recipe(&recipe("a1", "Pancakes", &[])).unwrap();
        index.add_recipe(&recipe("a2", "pancakes", &["flapjacks"])).unwrap();

        let matches = index.try_get_exact_matches("Pancakes").unwrap();
        assert_eq!(matches.len(), 2);
        assert!(index.try_get_exact_matches("waffles").is_none());
    }

    #[test]
    fn last_write_wins_per_id() {
        let index = RecipeIndex::new();
        let mut r = recipe("a1", "Chili", &[]);
        index.add_recipe(&r).unwrap();
        r.set_relevancy("chili", 95);
        index.add_recipe(&r).unwrap();

        let stored = index.try_get_exact_matches("chili").unwrap();
        assert_eq!(stored["a1"].relevancy_score("chili"), Some(95));
        assert_eq!(index.get("a1").unwrap().relevancy_score("chili"), Some(95));
    }

    #[test]
    fn retitled_recipe_leaves_its_old_key() {
        let index = RecipeIndex::new();
        index.add_recipe(&recipe("a1", "chkn soup", &["broth"])).unwrap();
        index.add_recipe(&recipe("a2", "Chkn Soup", &[])).unwrap();

        index
            .add_recipe(&recipe("a1", "Chicken Soup", &["broth"]))
            .unwrap();

        let old = index.try_get_exact_matches("chkn soup").unwrap();
        assert_eq!(old.len(), 1);
        assert!(old.contains_key("a2"));
        assert!(index.try_get_exact_matches("chicken soup").unwrap().contains_key("a1"));
        assert!(index.try_get_exact_matches("broth").unwrap().contains_key("a1"));

        index.add_recipe(&recipe("a2", "Noodle Soup", &[])).unwrap();
        assert!(index.try_get_exact_matches("chkn soup").is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn contains_recipe_tracks_ids() {
        let index = RecipeIndex::new();
        assert!(!index.contains_recipe("a1"));
        index.add_recipe(&recipe("a1", "Gumbo", &[])).unwrap();
        assert!(index.contains_recipe("a1"));
        assert!(!index.contains_recipe("a2"));
    }

    #[test]
    fn concurrent_adds_are_safe() {
        let index = std::sync::Arc::new(RecipeIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let index = index.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("{t}-{i}");
                        index.add_recipe(&recipe(&id, "Stew", &[])).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(index.len(), 400);
        assert_eq!(index.try_get_exact_matches("stew").unwrap().len(), 400);
    }
}
