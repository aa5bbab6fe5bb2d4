//! Application configuration for RecipeForge.
//!
//! User config lives at `~/.recipeforge/recipeforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RecipeForgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "recipeforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".recipeforge";

// ---------------------------------------------------------------------------
// Config structs (matching recipeforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where recipe batches and selector rules live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Language model provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval thresholds and fan-out limits.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Synthesis/critique loop settings.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Outbound HTTP settings for site search and page fetches.
    #[serde(default)]
    pub http: HttpConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON batch per index title.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Site selector configuration document.
    #[serde(default = "default_selectors_path")]
    pub selectors_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            selectors_path: default_selectors_path(),
        }
    }
}

fn default_output_dir() -> String {
    "~/.recipeforge/recipes".into()
}
fn default_selectors_path() -> String {
    "~/.recipeforge/site-selectors.json".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for function calls and assistants.
    #[serde(default = "default_model")]
    pub model: String,

    /// Attempts per function call before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between run status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_retries() -> u32 {
    3
}
fn default_poll_interval_ms() -> u64 {
    1_000
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Minimum relevancy score (0–100) for a recipe to qualify.
    #[serde(default = "default_acceptable_score")]
    pub acceptable_score: u8,

    /// How far the threshold drops on each relax step.
    #[serde(default = "default_relax_step")]
    pub relax_step: u8,

    /// Upper bound on local search candidates per query.
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,

    /// Recipes returned per retrieval; also the early-exit target for ranking.
    #[serde(default = "default_recipes_per_retrieval")]
    pub recipes_to_return_per_retrieval: usize,

    /// Query strings tried by `find` before giving up.
    #[serde(default = "default_max_name_attempts")]
    pub max_new_recipe_name_attempts: usize,

    /// Concurrency bound for every fan-out (search, extraction, ranking, cleaning).
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Extra URLs requested from the selector to absorb parse failures.
    #[serde(default = "default_error_buffer")]
    pub error_buffer: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            acceptable_score: default_acceptable_score(),
            relax_step: default_relax_step(),
            max_search_results: default_max_search_results(),
            recipes_to_return_per_retrieval: default_recipes_per_retrieval(),
            max_new_recipe_name_attempts: default_max_name_attempts(),
            max_parallelism: default_max_parallelism(),
            error_buffer: default_error_buffer(),
        }
    }
}

fn default_acceptable_score() -> u8 {
    70
}
fn default_relax_step() -> u8 {
    5
}
fn default_max_search_results() -> usize {
    20
}
fn default_recipes_per_retrieval() -> usize {
    3
}
fn default_max_name_attempts() -> usize {
    3
}
fn default_max_parallelism() -> usize {
    5
}
fn default_error_buffer() -> usize {
    2
}

/// `[synthesis]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Critique score a draft must reach to be accepted.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: u8,

    /// Hard cap on drafting passes.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_quality_threshold() -> u8 {
    80
}
fn default_max_attempts() -> u32 {
    8
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Browser User-Agent sent with site requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .into()
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

impl StorageConfig {
    /// Resolved recipe batch directory.
    pub fn output_path(&self) -> PathBuf {
        expand_home(&self.output_dir)
    }

    /// Resolved selector document path.
    pub fn selectors_file(&self) -> PathBuf {
        expand_home(&self.selectors_path)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.recipeforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RecipeForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.recipeforge/recipeforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RecipeForgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        RecipeForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RecipeForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RecipeForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RecipeForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the LLM API key env var is set and non-empty, returning the key.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(RecipeForgeError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("acceptable_score = 70"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[retrieval]
acceptable_score = 60
max_parallelism = 8

[synthesis]
quality_threshold = 90
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.retrieval.acceptable_score, 60);
        assert_eq!(config.retrieval.max_parallelism, 8);
        assert_eq!(config.retrieval.relax_step, 5);
        assert_eq!(config.retrieval.max_new_recipe_name_attempts, 3);
        assert_eq!(config.synthesis.quality_threshold, 90);
        assert_eq!(config.synthesis.max_attempts, 8);
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/var/recipes"), PathBuf::from("/var/recipes"));
        let expanded = expand_home("~/recipes");
        assert!(expanded.ends_with("recipes"));
        assert!(!expanded.to_string_lossy().starts_with('~') || dirs::home_dir().is_none());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "RF_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
