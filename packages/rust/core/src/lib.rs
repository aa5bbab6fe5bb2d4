//! Retrieval and synthesis workflows for RecipeForge.
//!
//! [`RecipeOrchestrator`] ties the recipe store, web discovery and the
//! language model together: it finds recipes by name (relaxing and
//! reformulating the query when nothing qualifies), ranks candidates per
//! query, and drives the drafting/critique loop that synthesizes a new
//! recipe from several sources.

pub mod agents;
pub mod orchestrator;
pub mod progress;
pub mod synthesis;

#[cfg(test)]
mod fakes;

pub use agents::{CritiqueAgent, DraftInput, DraftingAgent, LlmCritiqueAgent, LlmDraftingAgent};
pub use orchestrator::RecipeOrchestrator;
pub use progress::{ProgressReporter, SilentProgress};
pub use synthesis::{SynthesisState, run_synthesis, synthesis_prompt};
