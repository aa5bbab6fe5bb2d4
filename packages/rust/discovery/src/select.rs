//! One model call that narrows the combined candidate list.

use std::collections::HashSet;

use tracing::{debug, warn};

use recipeforge_llm::functions::{self, UrlSelection};
use recipeforge_llm::{FunctionCall, LlmService, call_function_as};

/// When there are more candidates than `count_needed`, ask the model for the
/// `count_needed + error_buffer` most likely to be `query`, best first.
///
/// Fails open: a model error, an empty pick, or picks that do not map to
/// candidates all return the full list unchanged.
pub async fn select_candidates<T: Clone>(
    llm: &dyn LlmService,
    query: &str,
    acceptable_score: Option<u8>,
    candidates: &[(String, T)],
    count_needed: usize,
    error_buffer: usize,
) -> Vec<(String, T)> {
    if candidates.len() <= count_needed {
        return candidates.to_vec();
    }
    let limit = count_needed + error_buffer;

    let mut prompt = format!("Dish: {query}\nPick at most {limit} of these URLs.\n");
    if let Some(score) = acceptable_score {
        prompt.push_str(&format!(
            "Only pick pages likely to score {score} or more out of 100 for relevance.\n"
        ));
    }
    prompt.push('\n');
    for (i, (url, _)) in candidates.iter().enumerate() {
        prompt.push_str(&format!("{i}. {url}\n"));
    }

    let call = FunctionCall::new(
        functions::SELECT_URLS_PROMPT,
        prompt,
        functions::select_recipe_urls(),
    );
    let selection: UrlSelection = match call_function_as(llm, call).await {
        Ok(selection) => selection,
        Err(e) => {
            warn!(error = %e, "URL selection failed; using every candidate");
            return candidates.to_vec();
        }
    };

    let mut seen = HashSet::new();
    let picked: Vec<(String, T)> = selection
        .indices
        .iter()
        .filter(|&&i| i < candidates.len() && seen.insert(i))
        .take(limit)
        .map(|&i| candidates[i].clone())
        .collect();

    let invalid = selection
        .indices
        .iter()
        .filter(|&&i| i >= candidates.len())
        .count();
    if invalid > 0 {
        warn!(invalid, total = candidates.len(), "model picked out-of-range URL indices");
    }

    if picked.is_empty() {
        warn!(
            returned = selection.indices.len(),
            "model picked no usable URLs; using every candidate"
        );
        return candidates.to_vec();
    }

    debug!(picked = picked.len(), of = candidates.len(), "candidates narrowed");
    picked
}
