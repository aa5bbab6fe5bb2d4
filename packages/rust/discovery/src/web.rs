//! Web discovery: search sites, narrow candidates, extract recipes.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use recipeforge_llm::LlmService;
use recipeforge_shared::{AppConfig, RecipeForgeError, Result, ScrapedRecipe, bounded_map};
use recipeforge_storage::RecipeStore;

use crate::extract::extract_recipe;
use crate::fetch::{build_client, fetch_html};
use crate::search::{BrowserContent, search_site};
use crate::select::select_candidates;
use crate::selectors::{SiteSelectorConfig, SiteSelectors};

/// Finds recipes that are not stored yet.
#[async_trait]
pub trait RecipeDiscovery: Send + Sync {
    /// Up to `count_needed` freshly scraped recipes for `query`, in relevance
    /// order. `target_source` restricts the search to one configured site.
    async fn discover(
        &self,
        query: &str,
        acceptable_score: Option<u8>,
        count_needed: usize,
        target_source: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScrapedRecipe>>;
}

/// Membership check against already-stored recipes.
#[async_trait]
pub trait RecipeLookup: Send + Sync {
    async fn contains_recipe_url(&self, url: &str) -> Result<bool>;
}

#[async_trait]
impl RecipeLookup for RecipeStore {
    async fn contains_recipe_url(&self, url: &str) -> Result<bool> {
        RecipeStore::contains_recipe_url(self, url).await
    }
}

/// Where the selector document comes from.
#[derive(Debug, Clone)]
pub enum SelectorSource {
    File(PathBuf),
    Inline(SiteSelectorConfig),
}

/// [`RecipeDiscovery`] over the sites in the selector document.
pub struct WebDiscovery {
    client: Client,
    llm: Arc<dyn LlmService>,
    lookup: Arc<dyn RecipeLookup>,
    browser: Option<Arc<dyn BrowserContent>>,
    source: SelectorSource,
    sites: OnceCell<BTreeMap<String, SiteSelectors>>,
    max_parallelism: usize,
    error_buffer: usize,
}

impl WebDiscovery {
    /// Discovery reading selectors from `storage.selectors_path`.
    pub fn new(
        config: &AppConfig,
        llm: Arc<dyn LlmService>,
        lookup: Arc<dyn RecipeLookup>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(&config.http)?,
            llm,
            lookup,
            browser: None,
            source: SelectorSource::File(config.storage.selectors_file()),
            sites: OnceCell::new(),
            max_parallelism: config.retrieval.max_parallelism,
            error_buffer: config.retrieval.error_buffer,
        })
    }

    /// Use an in-memory selector document instead of the configured file.
    pub fn with_selectors(mut self, selectors: SiteSelectorConfig) -> Self {
        self.source = SelectorSource::Inline(selectors);
        self.sites = OnceCell::new();
        self
    }

    /// Enable sites whose search results need a rendering browser.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserContent>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Resolved site rules, loaded on first use.
    pub async fn sites(&self) -> Result<&BTreeMap<String, SiteSelectors>> {
        self.sites
            .get_or_try_init(|| async {
                let config = match &self.source {
                    SelectorSource::File(path) => SiteSelectorConfig::load(path).await?,
                    SelectorSource::Inline(config) => config.clone(),
                };
                let sites = config.resolve();
                info!(sites = sites.len(), "site selectors loaded");
                Ok(sites)
            })
            .await
    }

    /// Candidate URLs from every target site, deduplicated, minus stored ones.
    async fn collect_candidates(
        &self,
        targets: Vec<(&String, &SiteSelectors)>,
        query: &str,
        cancel: &CancellationToken,
    ) -> Vec<(String, String)> {
        let browser = self.browser.as_deref();
        let per_site = bounded_map(targets, self.max_parallelism, cancel, |(key, rules)| async move {
            match search_site(&self.client, browser, rules, query, cancel).await {
                Ok(links) => links
                    .into_iter()
                    .map(|url| (url, key.clone()))
                    .collect::<Vec<_>>(),
                Err(e) => {
                    warn!(site = %key, error = %e, "site search failed");
                    Vec::new()
                }
            }
        })
        .await;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (url, site) in per_site.into_iter().flatten().flatten() {
            if !seen.insert(url.clone()) {
                continue;
            }
            match self.lookup.contains_recipe_url(&url).await {
                Ok(true) => {
                    debug!(url = %url, "already stored");
                    continue;
                }
                Ok(false) => {}
                Err(e) => warn!(url = %url, error = %e, "stored-recipe check failed"),
            }
            candidates.push((url, site));
        }
        candidates
    }
}

#[async_trait]
impl RecipeDiscovery for WebDiscovery {
    #[instrument(skip_all, fields(query = %query, count_needed))]
    async fn discover(
        &self,
        query: &str,
        acceptable_score: Option<u8>,
        count_needed: usize,
        target_source: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScrapedRecipe>> {
        if count_needed == 0 {
            return Ok(Vec::new());
        }

        let sites = self.sites().await?;
        let targets: Vec<(&String, &SiteSelectors)> = match target_source {
            Some(key) => {
                let entry = sites.get_key_value(key).ok_or_else(|| {
                    RecipeForgeError::validation(format!("unknown recipe source {key:?}"))
                })?;
                vec![entry]
            }
            None => sites.iter().collect(),
        };

        let candidates = self.collect_candidates(targets, query, cancel).await;
        if cancel.is_cancelled() {
            return Err(RecipeForgeError::Cancelled);
        }
        if candidates.is_empty() {
            info!("no new candidate URLs");
            return Ok(Vec::new());
        }

        let selected = select_candidates(
            self.llm.as_ref(),
            query,
            acceptable_score,
            &candidates,
            count_needed,
            self.error_buffer,
        )
        .await;
        info!(candidates = candidates.len(), selected = selected.len(), "extracting recipes");

        // Fires once enough pages parse; also fires with the caller's token.
        let enough = cancel.child_token();
        let parsed = AtomicUsize::new(0);
        let (enough_ref, parsed_ref) = (&enough, &parsed);

        let results = bounded_map(selected, self.max_parallelism, &enough, |(url, site)| async move {
            let rules = sites.get(&site)?;
            let html = match fetch_html(&self.client, &url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(url = %url, error = %e, "recipe page fetch failed");
                    return None;
                }
            };
            match extract_recipe(&html, &url, Some(&site), rules) {
                Ok(recipe) => {
                    if parsed_ref.fetch_add(1, Ordering::SeqCst) + 1 >= count_needed {
                        enough_ref.cancel();
                    }
                    Some(recipe)
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "recipe page did not parse");
                    None
                }
            }
        })
        .await;

        if cancel.is_cancelled() {
            return Err(RecipeForgeError::Cancelled);
        }

        let recipes: Vec<ScrapedRecipe> = results
            .into_iter()
            .flatten()
            .flatten()
            .take(count_needed)
            .collect();
        info!(count = recipes.len(), "discovery complete");
        Ok(recipes)
    }
}
