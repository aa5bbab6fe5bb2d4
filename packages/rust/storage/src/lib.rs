//! Recipe storage: the in-memory index and the JSON batch files behind it.
//!
//! The [`RecipeStore`] lazily loads every persisted batch into a
//! [`RecipeIndex`], answers searches through a [`Searcher`], and persists
//! new or re-scored recipes on a [`BackgroundQueue`].
//!
//! **Persistence layout:** one JSON file per index title under the configured
//! output directory, each holding a list of recipes.

mod background;
mod batches;
mod index;
mod merge;
mod normalize;
mod search;
mod store;

pub use background::BackgroundQueue;
pub use batches::{BatchFiles, JsonBatchFiles, batch_file_name};
pub use index::RecipeIndex;
pub use merge::{merge_into, merge_recipes};
pub use normalize::{RecipeNormalizer, recipe_prompt};
pub use search::{KeywordSearcher, Searcher};
pub use store::RecipeStore;
