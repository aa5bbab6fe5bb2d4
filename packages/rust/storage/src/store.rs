//! The recipe repository: lazy load, search, and background persistence.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use recipeforge_llm::LlmService;
use recipeforge_shared::{AppConfig, Recipe, Result, bounded_map, fingerprint};

use crate::background::BackgroundQueue;
use crate::batches::{BatchFiles, JsonBatchFiles, batch_file_name};
use crate::index::RecipeIndex;
use crate::merge::merge_recipes;
use crate::normalize::RecipeNormalizer;
use crate::search::{KeywordSearcher, Searcher};

/// Recipe repository shared by every retrieval.
///
/// Cheap to clone; clones share the index, the batch files, and the
/// persistence queue.
#[derive(Clone)]
pub struct RecipeStore {
    inner: Arc<StoreInner>,
    queue: BackgroundQueue,
}

struct StoreInner {
    index: RecipeIndex,
    files: Arc<dyn BatchFiles>,
    searcher: Arc<dyn Searcher>,
    normalizer: RecipeNormalizer,
    max_parallelism: usize,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
}

impl RecipeStore {
    pub fn new(
        files: Arc<dyn BatchFiles>,
        searcher: Arc<dyn Searcher>,
        llm: Arc<dyn LlmService>,
        max_parallelism: usize,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                index: RecipeIndex::new(),
                files,
                searcher,
                normalizer: RecipeNormalizer::new(llm),
                max_parallelism,
                initialized: AtomicBool::new(false),
                init_lock: Mutex::new(()),
            }),
            queue: BackgroundQueue::new(),
        }
    }

    /// Store over JSON batches in the configured output directory, searched
    /// with [`KeywordSearcher`].
    pub fn from_config(config: &AppConfig, llm: Arc<dyn LlmService>) -> Self {
        Self::new(
            Arc::new(JsonBatchFiles::new(config.storage.output_path())),
            Arc::new(KeywordSearcher::new()),
            llm,
            config.retrieval.max_parallelism,
        )
    }

    /// Load every persisted batch into the index, once.
    ///
    /// Concurrent callers wait for the first load instead of repeating it.
    /// Unreadable batches are skipped; failing to list batches is an error.
    #[instrument(skip_all)]
    pub async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = inner.init_lock.lock().await;
        if inner.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let names = inner.files.list().await?;
        let mut loaded = 0usize;
        for name in &names {
            match inner.files.read(name).await {
                Ok(recipes) => {
                    for recipe in &recipes {
                        match inner.index.add_recipe(recipe) {
                            Ok(()) => loaded += 1,
                            Err(e) => warn!(batch = %name, error = %e, "skipping stored recipe"),
                        }
                    }
                }
                Err(e) => warn!(batch = %name, error = %e, "skipping unreadable recipe batch"),
            }
        }

        inner.initialized.store(true, Ordering::Release);
        info!(batches = names.len(), recipes = loaded, "recipe store loaded");
        Ok(())
    }

    /// Local candidates for `query`, best match first.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn search(
        &self,
        query: &str,
        min_score: Option<u8>,
        count: Option<usize>,
    ) -> Result<Vec<Recipe>> {
        self.initialize().await?;
        let results = self
            .inner
            .searcher
            .search(&self.inner.index, query, min_score, count);
        debug!(count = results.len(), "local search complete");
        Ok(results)
    }

    /// True if a recipe scraped from `url` is already stored.
    pub async fn contains_recipe_url(&self, url: &str) -> Result<bool> {
        self.initialize().await?;
        Ok(self.inner.index.contains_recipe(&fingerprint(url)))
    }

    /// Stored recipe by id.
    pub async fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        self.initialize().await?;
        Ok(self.inner.index.get(id))
    }

    /// Clean, name, index, merge and persist `recipes` in the background.
    ///
    /// Returns immediately; use [`wait_idle`](Self::wait_idle) to await the
    /// write.
    pub fn add_update_recipes(&self, recipes: Vec<Recipe>) {
        if recipes.is_empty() {
            return;
        }
        let inner = self.inner.clone();
        debug!(count = recipes.len(), "queueing recipe persistence");
        self.queue
            .queue(move |cancel| async move { inner.persist(recipes, cancel).await });
    }

    /// Resolves once every queued persistence job has finished.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Cancel queued persistence work.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}

impl StoreInner {
    #[instrument(skip_all, fields(count = recipes.len()))]
    async fn persist(&self, recipes: Vec<Recipe>, cancel: CancellationToken) {
        let normalizer = &self.normalizer;

        let cleaned: Vec<Recipe> = bounded_map(recipes, self.max_parallelism, &cancel, |mut recipe| {
            async move {
                if !recipe.cleaned {
                    match normalizer.clean(&mut recipe).await {
                        Ok(()) => {}
                        Err(e) if e.is_content_filtered() => {
                            warn!(id = %recipe.id, "cleaning rejected by content filter; keeping raw recipe")
                        }
                        Err(e) => warn!(id = %recipe.id, error = %e, "cleaning failed; keeping raw recipe"),
                    }
                }
                recipe
            }
        })
        .await
        .into_iter()
        .flatten()
        .collect();

        let named: Vec<Recipe> = bounded_map(cleaned, self.max_parallelism, &cancel, |mut recipe| {
            async move {
                if recipe.index_title.is_none() {
                    if let Err(e) = normalizer.name(&mut recipe).await {
                        warn!(id = %recipe.id, error = %e, "naming failed; recipe left unfiled");
                    }
                }
                recipe
            }
        })
        .await
        .into_iter()
        .flatten()
        .collect();

        // Keyed by batch file so titles sharing a slug are merged in one write.
        let mut groups: BTreeMap<String, Vec<Recipe>> = BTreeMap::new();
        for recipe in named {
            match recipe.index_title.as_deref().map(batch_file_name) {
                Some(batch) => groups.entry(batch).or_default().push(recipe),
                None => debug!(id = %recipe.id, "skipping recipe without index title"),
            }
        }

        let group_count = groups.len();
        bounded_map(
            groups.into_iter().collect(),
            self.max_parallelism,
            &cancel,
            |(batch, group)| self.write_group(batch, group),
        )
        .await;

        info!(groups = group_count, "recipe batches persisted");
    }

    async fn write_group(&self, batch: String, group: Vec<Recipe>) {
        for recipe in &group {
            if let Err(e) = self.index.add_recipe(recipe) {
                warn!(batch = %batch, error = %e, "recipe not indexed");
            }
        }

        let existing = match self.files.read(&batch).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(batch = %batch, error = %e, "cannot read batch; not overwriting it");
                return;
            }
        };

        let merged = merge_recipes(existing, &group);
        for recipe in merged.iter().filter(|m| group.iter().any(|g| g.id == m.id)) {
            // Index the merged copy so it carries every stored relevancy entry.
            if let Err(e) = self.index.add_recipe(recipe) {
                warn!(batch = %batch, error = %e, "merged recipe not indexed");
            }
        }

        if let Err(e) = self.files.write(&batch, &merged).await {
            warn!(batch = %batch, error = %e, "failed to write recipe batch");
        }
    }
}
