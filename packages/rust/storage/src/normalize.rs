//! LLM-backed cleaning and naming of recipes before they are persisted.

use std::sync::Arc;

use tracing::{debug, instrument};

use recipeforge_llm::functions::{self, CleanedRecipe, RecipeNaming};
use recipeforge_llm::{FunctionCall, LlmService, call_function_as};
use recipeforge_shared::{Recipe, RecipeForgeError, Result, normalize_query};

/// Cleans scraped recipes and assigns their canonical index title.
#[derive(Clone)]
pub struct RecipeNormalizer {
    llm: Arc<dyn LlmService>,
}

impl RecipeNormalizer {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }

    /// Normalize `recipe` in place with a single model attempt.
    ///
    /// On success the returned fields are merged onto the recipe and it is
    /// marked cleaned. On error the recipe is left untouched.
    #[instrument(skip_all, fields(id = %recipe.id))]
    pub async fn clean(&self, recipe: &mut Recipe) -> Result<()> {
        let call = FunctionCall::new(
            functions::CLEAN_RECIPE_PROMPT,
            recipe_prompt(recipe),
            functions::clean_recipe(),
        )
        .with_max_retries(1);

        let cleaned: CleanedRecipe = call_function_as(self.llm.as_ref(), call).await?;
        apply_cleaned(recipe, cleaned);
        recipe.cleaned = true;
        debug!("recipe cleaned");
        Ok(())
    }

    /// Assign `index_title` and merge in the suggested aliases.
    #[instrument(skip_all, fields(id = %recipe.id))]
    pub async fn name(&self, recipe: &mut Recipe) -> Result<()> {
        let call = FunctionCall::new(
            functions::NAME_RECIPE_PROMPT,
            recipe_prompt(recipe),
            functions::name_recipe(),
        );

        let naming: RecipeNaming = call_function_as(self.llm.as_ref(), call).await?;
        let index_title = normalize_query(&naming.index_title);
        if index_title.is_empty() {
            return Err(RecipeForgeError::Llm(
                "name_recipe returned an empty index title".into(),
            ));
        }

        recipe.aliases.extend(
            naming
                .aliases
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
        );
        debug!(index_title = %index_title, "recipe named");
        recipe.index_title = Some(index_title);
        Ok(())
    }
}

/// Overwrite fields the cleaner returned; keep existing values for the rest.
fn apply_cleaned(recipe: &mut Recipe, cleaned: CleanedRecipe) {
    fn set(target: &mut Option<String>, value: Option<String>) {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            *target = Some(v);
        }
    }

    if let Some(title) = cleaned.title.filter(|t| !t.trim().is_empty()) {
        recipe.title = title;
    }
    set(&mut recipe.description, cleaned.description);
    set(&mut recipe.servings, cleaned.servings);
    set(&mut recipe.prep_time, cleaned.prep_time);
    set(&mut recipe.cook_time, cleaned.cook_time);
    set(&mut recipe.total_time, cleaned.total_time);
    set(&mut recipe.notes, cleaned.notes);
    if !cleaned.ingredients.is_empty() {
        recipe.ingredients = cleaned.ingredients;
    }
    if !cleaned.directions.is_empty() {
        recipe.directions = cleaned.directions;
    }
}

/// Plain-text rendering of a recipe for model prompts.
pub fn recipe_prompt(recipe: &Recipe) -> String {
    let mut out = format!("Title: {}\n", recipe.title);
    for (label, value) in [
        ("Description", &recipe.description),
        ("Servings", &recipe.servings),
        ("Prep time", &recipe.prep_time),
        ("Cook time", &recipe.cook_time),
        ("Total time", &recipe.total_time),
    ] {
        if let Some(v) = value {
            out.push_str(&format!("{label}: {v}\n"));
        }
    }
    out.push_str("\nIngredients:\n");
    for i in &recipe.ingredients {
        out.push_str(&format!("- {i}\n"));
    }
    out.push_str("\nDirections:\n");
    for (n, d) in recipe.directions.iter().enumerate() {
        out.push_str(&format!("{}. {d}\n", n + 1));
    }
    if let Some(notes) = &recipe.notes {
        out.push_str(&format!("\nNotes: {notes}\n"));
    }
    out
}
