//! Core domain types for RecipeForge.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Identity helpers
// ---------------------------------------------------------------------------

/// SHA-256 of the URL's UTF-8 bytes as lowercase hex.
///
/// Used both as a recipe's id and as the dedup key for already-scraped pages.
pub fn fingerprint(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical form of a search query: trimmed and lowercased.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// RelevancyResult
// ---------------------------------------------------------------------------

/// A relevance score (0–100) of one recipe against one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevancyResult {
    /// The normalized query that was scored.
    pub query: String,
    /// Score from the ranking call.
    pub score: u8,
}

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// A stored recipe.
///
/// `relevancy` is keyed by normalized query and only ever grows, except when a
/// freshly reloaded copy replaces it during a batch merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Fingerprint of the source URL.
    pub id: String,
    /// Display title.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub directions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Alternate titles this recipe is known by.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,
    /// Canonical grouping key, assigned once by the namer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_title: Option<String>,
    /// Whether the recipe has passed normalization.
    #[serde(default)]
    pub cleaned: bool,
    /// Scores per normalized query.
    #[serde(default)]
    pub relevancy: BTreeMap<String, RelevancyResult>,
}

impl Recipe {
    /// Score recorded for `query`, if this recipe was ever ranked against it.
    pub fn relevancy_score(&self, query: &str) -> Option<u8> {
        self.relevancy.get(query).map(|r| r.score)
    }

    /// True if the recipe has a score of at least `threshold` for `query`.
    pub fn qualifies(&self, query: &str, threshold: u8) -> bool {
        self.relevancy_score(query).is_some_and(|s| s >= threshold)
    }

    /// Record (or overwrite) the score for `query`.
    pub fn set_relevancy(&mut self, query: &str, score: u8) {
        self.relevancy.insert(
            query.to_string(),
            RelevancyResult {
                query: query.to_string(),
                score: score.min(100),
            },
        );
    }

    /// Copy every content field (not identity, naming, or relevancy) from `other`.
    pub fn copy_content_from(&mut self, other: &Recipe) {
        self.title = other.title.clone();
        self.description = other.description.clone();
        self.servings = other.servings.clone();
        self.prep_time = other.prep_time.clone();
        self.cook_time = other.cook_time.clone();
        self.total_time = other.total_time.clone();
        self.ingredients = other.ingredients.clone();
        self.directions = other.directions.clone();
        self.notes = other.notes.clone();
    }
}

// ---------------------------------------------------------------------------
// ScrapedRecipe
// ---------------------------------------------------------------------------

/// Raw extraction result from a recipe page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRecipe {
    /// Fingerprint of `url`.
    pub id: String,
    /// Page the recipe was read from.
    pub url: String,
    /// Source site key from the selector config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<String>,
    pub ingredients: Vec<String>,
    pub directions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl From<ScrapedRecipe> for Recipe {
    fn from(scraped: ScrapedRecipe) -> Self {
        Self {
            id: scraped.id,
            title: scraped.title.unwrap_or_default(),
            description: scraped.description,
            source_url: Some(scraped.url),
            image_url: scraped.image_url,
            servings: scraped.servings,
            prep_time: scraped.prep_time,
            cook_time: scraped.cook_time,
            total_time: scraped.total_time,
            ingredients: scraped.ingredients,
            directions: scraped.directions,
            notes: scraped.notes,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Critique of a synthesized draft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 0–100 quality score.
    pub quality_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<String>,
}

/// A generated recipe built from several source recipes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedRecipe {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub directions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Ids of the recipes this draft was built from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inspired_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<String>,
    /// Drafting pass that produced this draft (1-based).
    #[serde(default)]
    pub attempt_count: u32,
    /// Earlier drafts, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub revisions: Vec<SynthesizedRecipe>,
}

impl SynthesizedRecipe {
    /// Attach a critique to this draft.
    pub fn add_analysis_result(&mut self, result: &AnalysisResult) {
        self.quality_score = Some(result.quality_score);
        self.analysis = result.analysis.clone();
        self.suggestions = result.suggestions.clone();
    }
}

/// Customer preferences a synthesized recipe must respect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CookbookOrder {
    /// Cookbook this recipe belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookbook_title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dietary_restrictions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    /// Free-form notes from the customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
