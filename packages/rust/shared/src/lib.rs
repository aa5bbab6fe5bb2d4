//! Shared types, error model, and configuration for RecipeForge.
//!
//! This crate is the foundation depended on by all other RecipeForge crates.
//! It provides:
//! - [`RecipeForgeError`]: the unified error type
//! - Domain types ([`Recipe`], [`ScrapedRecipe`], [`SynthesizedRecipe`], [`RelevancyResult`])
//! - Configuration ([`AppConfig`], config loading)
//! - [`parallel`]: bounded fan-out with cooperative cancellation

pub mod config;
pub mod error;
pub mod parallel;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, HttpConfig, LlmConfig, RetrievalConfig, StorageConfig, SynthesisConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    validate_api_key,
};
pub use error::{RecipeForgeError, Result};
pub use parallel::bounded_map;
pub use types::{
    AnalysisResult, CookbookOrder, Recipe, RelevancyResult, ScrapedRecipe, SynthesizedRecipe,
    fingerprint, normalize_query,
};
