//! Recipe retrieval and synthesis workflows.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use recipeforge_discovery::RecipeDiscovery;
use recipeforge_llm::functions::{self, AlternateName, RankResult};
use recipeforge_llm::{FunctionCall, LlmService, call_function_as};
use recipeforge_shared::{
    AppConfig, CookbookOrder, Recipe, RecipeForgeError, Result, RetrievalConfig, SynthesisConfig,
    SynthesizedRecipe, bounded_map, normalize_query,
};
use recipeforge_storage::{RecipeStore, recipe_prompt};

use crate::agents::{CritiqueAgent, DraftingAgent, LlmCritiqueAgent, LlmDraftingAgent};
use crate::progress::{ProgressReporter, SilentProgress};
use crate::synthesis::{order_prompt, run_synthesis, synthesis_prompt};

/// Steps of a by-name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupState {
    /// Full retrieval, web discovery included.
    Search,
    /// Lower the threshold and retry against the store only.
    Relax,
    /// Try a different query string.
    Reformulate,
}

/// Entry point for finding, ranking and synthesizing recipes.
pub struct RecipeOrchestrator {
    store: RecipeStore,
    llm: Arc<dyn LlmService>,
    discovery: Arc<dyn RecipeDiscovery>,
    retrieval: RetrievalConfig,
    synthesis: SynthesisConfig,
    poll_interval: Duration,
    progress: Arc<dyn ProgressReporter>,
}

impl RecipeOrchestrator {
    pub fn new(
        store: RecipeStore,
        llm: Arc<dyn LlmService>,
        discovery: Arc<dyn RecipeDiscovery>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            llm,
            discovery,
            retrieval: config.retrieval.clone(),
            synthesis: config.synthesis.clone(),
            poll_interval: Duration::from_millis(config.llm.poll_interval_ms),
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &RecipeStore {
        &self.store
    }

    /// Recipes for a dish name, relaxing and reformulating until something
    /// qualifies.
    ///
    /// Each round searches with web discovery, then retries locally at a
    /// threshold lowered by `relax_step`, then asks for another query
    /// string. With a `conversation_id` the alternative comes from that
    /// model conversation; without one the original name is retried. Fails
    /// with [`RecipeForgeError::NoRecipesFound`] once
    /// `max_new_recipe_name_attempts` query strings came back empty.
    #[instrument(skip_all, fields(name = %name))]
    pub async fn get_recipes_by_name(
        &self,
        name: &str,
        acceptable_score: Option<u8>,
        conversation_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Recipe>> {
        let original = normalize_query(name);
        if original.is_empty() {
            return Err(RecipeForgeError::validation("recipe name must not be empty"));
        }

        let mut score = acceptable_score.unwrap_or(self.retrieval.acceptable_score);
        let mut attempts = vec![original.clone()];
        let mut state = LookupState::Search;

        loop {
            let query = attempts.last().cloned().unwrap_or_else(|| original.clone());
            state = match state {
                LookupState::Search => {
                    let found = self
                        .get_recipes(&query, true, Some(score), None, Some(name), cancel)
                        .await?;
                    if !found.is_empty() {
                        return Ok(found);
                    }
                    LookupState::Relax
                }
                LookupState::Relax => {
                    score = score.saturating_sub(self.retrieval.relax_step);
                    debug!(query = %query, score, "relaxing threshold");
                    let found = self
                        .get_recipes(&query, false, Some(score), None, Some(name), cancel)
                        .await?;
                    if !found.is_empty() {
                        return Ok(found);
                    }
                    if attempts.len() >= self.retrieval.max_new_recipe_name_attempts {
                        info!(attempts = attempts.len(), "no recipes found");
                        return Err(RecipeForgeError::NoRecipesFound { attempts });
                    }
                    LookupState::Reformulate
                }
                LookupState::Reformulate => {
                    let next = self
                        .alternate_name(&original, &attempts, conversation_id)
                        .await;
                    debug!(query = %next, "reformulated query");
                    attempts.push(next);
                    LookupState::Search
                }
            };
        }
    }

    /// Next query string to try. Falls back to the original name.
    async fn alternate_name(
        &self,
        original: &str,
        attempts: &[String],
        conversation_id: Option<&str>,
    ) -> String {
        let Some(conversation_id) = conversation_id else {
            return original.to_string();
        };

        let prompt = format!(
            "Dish: {original}\nAlready tried: {}\nSuggest another name for this dish.",
            attempts.join(", ")
        );
        let call = FunctionCall::new(
            functions::ALTERNATE_NAME_PROMPT,
            prompt,
            functions::alternate_recipe_name(),
        )
        .with_conversation(Some(conversation_id.to_string()));

        match call_function_as::<AlternateName>(self.llm.as_ref(), call).await {
            Ok(alt) => {
                let name = normalize_query(&alt.name);
                if name.is_empty() {
                    warn!("model suggested an empty name; retrying the original");
                    original.to_string()
                } else {
                    name
                }
            }
            Err(e) => {
                warn!(error = %e, "reformulation failed; retrying the original");
                original.to_string()
            }
        }
    }

    /// Up to `count_needed` recipes scoring at least `acceptable_score` for
    /// `query`, best first.
    ///
    /// Stored candidates already qualifying for the query are returned
    /// without further work. Otherwise unqualified candidates are ranked,
    /// and with `scrape` set any remaining shortfall is sourced from web
    /// discovery and ranked too. Every recipe touched is persisted in the
    /// background. Ranking errors are fatal.
    #[instrument(skip_all, fields(query = %query, scrape))]
    pub async fn get_recipes(
        &self,
        query: &str,
        scrape: bool,
        acceptable_score: Option<u8>,
        count_needed: Option<usize>,
        requested_recipe_name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Recipe>> {
        let query = normalize_query(query);
        if query.is_empty() {
            return Err(RecipeForgeError::validation("query must not be empty"));
        }
        let threshold = acceptable_score.unwrap_or(self.retrieval.acceptable_score);
        let count_needed =
            count_needed.unwrap_or(self.retrieval.recipes_to_return_per_retrieval);
        if count_needed == 0 {
            return Ok(Vec::new());
        }

        self.progress.phase("Searching stored recipes");
        let limit = count_needed.max(self.retrieval.max_search_results);
        let mut candidates = self.store.search(&query, None, Some(limit)).await?;
        sort_by_score(&mut candidates, &query);

        let cached = qualifying(&candidates, &query, threshold);
        if cached >= count_needed {
            debug!(cached, "answered from stored rankings");
            return Ok(top_qualifying(candidates, &query, threshold, count_needed));
        }

        self.progress.phase("Ranking candidates");
        let ranked = self
            .rank(&query, requested_recipe_name, threshold, &mut candidates, 0, cancel)
            .await?;
        let mut touched: HashSet<String> = ranked
            .into_iter()
            .map(|i| candidates[i].id.clone())
            .collect();
        sort_by_score(&mut candidates, &query);

        let have = qualifying(&candidates, &query, threshold);
        self.progress.ranked(&query, have, count_needed);

        if scrape && have < count_needed {
            let shortfall = count_needed - have;
            self.progress.phase("Discovering recipes on the web");
            let fresh = self
                .discover(&query, threshold, shortfall, &candidates, cancel)
                .await?;

            if !fresh.is_empty() {
                let start = candidates.len();
                touched.extend(fresh.iter().map(|r| r.id.clone()));
                candidates.extend(fresh);

                self.progress.phase("Ranking new recipes");
                self.rank(&query, requested_recipe_name, threshold, &mut candidates, start, cancel)
                    .await?;
                sort_by_score(&mut candidates, &query);
                self.progress
                    .ranked(&query, qualifying(&candidates, &query, threshold), count_needed);
            }
        }

        let to_persist: Vec<Recipe> = candidates
            .iter()
            .filter(|r| touched.contains(&r.id))
            .cloned()
            .collect();
        self.store.add_update_recipes(to_persist);

        let results = top_qualifying(candidates, &query, threshold, count_needed);
        info!(count = results.len(), needed = count_needed, "retrieval complete");
        Ok(results)
    }

    /// Fresh recipes from the web that are not already stored or among
    /// `known`.
    async fn discover(
        &self,
        query: &str,
        threshold: u8,
        shortfall: usize,
        known: &[Recipe],
        cancel: &CancellationToken,
    ) -> Result<Vec<Recipe>> {
        let scraped = match self
            .discovery
            .discover(query, Some(threshold), shortfall, None, cancel)
            .await
        {
            Ok(scraped) => scraped,
            Err(RecipeForgeError::Cancelled) => return Err(RecipeForgeError::Cancelled),
            Err(e) => {
                warn!(error = %e, "web discovery failed; continuing with stored recipes");
                return Ok(Vec::new());
            }
        };

        let mut seen: HashSet<String> = known.iter().map(|r| r.id.clone()).collect();
        let mut fresh = Vec::with_capacity(scraped.len());
        for recipe in scraped {
            if self.store.contains_recipe_url(&recipe.url).await? {
                debug!(url = %recipe.url, "skipping already stored recipe");
                continue;
            }
            if seen.insert(recipe.id.clone()) {
                fresh.push(Recipe::from(recipe));
            }
        }
        debug!(count = fresh.len(), "new recipes discovered");
        Ok(fresh)
    }

    /// Score `recipes[start..]` that do not yet qualify for `query`.
    ///
    /// Stops early once `recipes_to_return_per_retrieval` of them newly
    /// qualify; which ones make it first is a race. Returns the indices
    /// that were scored.
    async fn rank(
        &self,
        query: &str,
        requested_recipe_name: Option<&str>,
        threshold: u8,
        recipes: &mut [Recipe],
        start: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<usize>> {
        let pending: Vec<(usize, Recipe)> = recipes
            .iter()
            .enumerate()
            .skip(start)
            .filter(|(_, r)| !r.qualifies(query, threshold))
            .map(|(i, r)| (i, r.clone()))
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = pending.len(), "ranking candidates");

        let enough = cancel.child_token();
        let newly_qualified = AtomicUsize::new(0);
        let target = self.retrieval.recipes_to_return_per_retrieval.max(1);
        let llm = self.llm.as_ref();
        let (enough_ref, counter) = (&enough, &newly_qualified);

        let results = bounded_map(
            pending,
            self.retrieval.max_parallelism,
            &enough,
            |(i, recipe)| async move {
                match rank_recipe(llm, query, requested_recipe_name, &recipe).await {
                    Ok(score) => {
                        if score >= threshold && counter.fetch_add(1, Ordering::SeqCst) + 1 >= target {
                            enough_ref.cancel();
                        }
                        Ok((i, score))
                    }
                    Err(e) => {
                        enough_ref.cancel();
                        Err(e)
                    }
                }
            },
        )
        .await;

        if cancel.is_cancelled() {
            return Err(RecipeForgeError::Cancelled);
        }

        let mut ranked = Vec::new();
        for result in results.into_iter().flatten() {
            let (i, score) = result?;
            recipes[i].set_relevancy(query, score);
            ranked.push(i);
        }
        debug!(
            ranked = ranked.len(),
            qualified = newly_qualified.load(Ordering::SeqCst),
            "ranking complete"
        );
        Ok(ranked)
    }

    /// Synthesize a new recipe called `name` from `recipes`.
    ///
    /// Opens a drafting and a critique agent, runs the convergence loop and
    /// closes both agents whether or not the loop succeeded.
    #[instrument(skip_all, fields(name = %name, sources = recipes.len()))]
    pub async fn synthesize(
        &self,
        recipes: &[Recipe],
        order: &CookbookOrder,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedRecipe> {
        if recipes.is_empty() {
            return Err(RecipeForgeError::validation(
                "synthesis needs at least one source recipe",
            ));
        }

        self.progress.phase("Opening synthesis agents");
        let mut drafter = LlmDraftingAgent::open(self.llm.clone(), self.poll_interval).await?;
        let preferences = format!("Dish: {name}\n{}", order_prompt(order));
        let mut critic =
            match LlmCritiqueAgent::open(self.llm.clone(), self.poll_interval, preferences).await {
                Ok(critic) => critic,
                Err(e) => {
                    drafter.close().await;
                    return Err(e);
                }
            };

        self.progress.phase("Synthesizing");
        let request = synthesis_prompt(name, order, recipes);
        let outcome =
            run_synthesis(&mut drafter, &mut critic, request, &self.synthesis, cancel).await;

        drafter.close().await;
        critic.close().await;

        let mut recipe = outcome?;
        recipe.inspired_by = recipes.iter().map(|r| r.id.clone()).collect();
        info!(
            attempts = recipe.attempt_count,
            score = recipe.quality_score.unwrap_or_default(),
            "recipe synthesized"
        );
        Ok(recipe)
    }
}

async fn rank_recipe(
    llm: &dyn LlmService,
    query: &str,
    requested_recipe_name: Option<&str>,
    recipe: &Recipe,
) -> Result<u8> {
    let mut prompt = format!("Query: {query}\n");
    if let Some(name) = requested_recipe_name.filter(|n| normalize_query(n) != query) {
        prompt.push_str(&format!("Requested recipe: {name}\n"));
    }
    prompt.push('\n');
    prompt.push_str(&recipe_prompt(recipe));

    let call = FunctionCall::new(functions::RANK_RECIPE_PROMPT, prompt, functions::rank_recipe());
    let result: RankResult = call_function_as(llm, call).await?;
    Ok(result.score.min(100))
}

fn qualifying(recipes: &[Recipe], query: &str, threshold: u8) -> usize {
    recipes.iter().filter(|r| r.qualifies(query, threshold)).count()
}

/// Highest score for `query` first; unranked last.
fn sort_by_score(recipes: &mut [Recipe], query: &str) {
    recipes.sort_by(|a, b| b.relevancy_score(query).cmp(&a.relevancy_score(query)));
}

fn top_qualifying(recipes: Vec<Recipe>, query: &str, threshold: u8, count: usize) -> Vec<Recipe> {
    recipes
        .into_iter()
        .filter(|r| r.qualifies(query, threshold))
        .take(count)
        .collect()
}
