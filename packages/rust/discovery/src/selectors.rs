//! Per-site search and extraction rules.
//!
//! The selector document has two maps: `templates` holds shared rule sets and
//! `sites` holds one entry per source. A site either spells out its rules or
//! names a `template` and overrides individual keys.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use recipeforge_shared::{RecipeForgeError, Result};

/// Key a site uses to inherit a template.
const TEMPLATE_KEY: &str = "template";

/// Placeholder in `search_url` replaced by the encoded query.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// The raw selector document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteSelectorConfig {
    #[serde(default)]
    pub sites: BTreeMap<String, Value>,
    #[serde(default)]
    pub templates: BTreeMap<String, Value>,
}

/// Fully resolved rules for one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteSelectors {
    /// Search page URL containing `{query}`.
    pub search_url: String,
    /// CSS selector matching result links on the search page.
    pub result_selector: String,
    /// Attribute holding the link target.
    #[serde(default = "default_result_attribute")]
    pub result_attribute: String,
    /// Results are rendered client-side and need the browser collaborator.
    #[serde(default)]
    pub stream_search: bool,
    /// Regex a result URL must match to count as a recipe page.
    #[serde(default)]
    pub recipe_url_pattern: Option<String>,

    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub servings: Option<String>,
    #[serde(default)]
    pub prep_time: Option<String>,
    #[serde(default)]
    pub cook_time: Option<String>,
    #[serde(default)]
    pub total_time: Option<String>,
    #[serde(default)]
    pub ingredients: Option<String>,
    #[serde(default)]
    pub directions: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_result_attribute() -> String {
    "href".into()
}

impl SiteSelectorConfig {
    /// Read the selector document from disk.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RecipeForgeError::io(path, e))?;
        Self::from_json(&content)
            .map_err(|e| RecipeForgeError::config(format!("{}: {e}", path.display())))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RecipeForgeError::config(format!("invalid selector config: {e}")))
    }

    /// Resolve every site against its template.
    ///
    /// Sites that name a missing template or fail to deserialize are logged
    /// and left out.
    pub fn resolve(&self) -> BTreeMap<String, SiteSelectors> {
        let mut resolved = BTreeMap::new();
        for (key, raw) in &self.sites {
            match self.resolve_site(raw) {
                Ok(site) => {
                    resolved.insert(key.clone(), site);
                }
                Err(e) => warn!(site = %key, error = %e, "skipping site selector"),
            }
        }
        resolved
    }

    fn resolve_site(&self, raw: &Value) -> Result<SiteSelectors> {
        let overrides = raw
            .as_object()
            .ok_or_else(|| RecipeForgeError::config("site entry must be an object"))?;

        let mut merged = match overrides.get(TEMPLATE_KEY).and_then(Value::as_str) {
            Some(name) => self
                .templates
                .get(name)
                .and_then(Value::as_object)
                .cloned()
                .ok_or_else(|| RecipeForgeError::config(format!("unknown template {name:?}")))?,
            None => Map::new(),
        };

        for (k, v) in overrides {
            if k != TEMPLATE_KEY {
                merged.insert(k.clone(), v.clone());
            }
        }

        let site: SiteSelectors = serde_json::from_value(Value::Object(merged))
            .map_err(|e| RecipeForgeError::config(e.to_string()))?;
        if !site.search_url.contains(QUERY_PLACEHOLDER) {
            return Err(RecipeForgeError::config(format!(
                "search_url must contain {QUERY_PLACEHOLDER}"
            )));
        }
        Ok(site)
    }
}
