//! Batch merge rule applied before writing a recipe batch back to disk.

use std::collections::HashMap;

use recipeforge_shared::Recipe;

/// Merge `incoming` into `existing`, keyed by id. Existing order is kept and
/// recipes only present in `incoming` are appended.
pub fn merge_recipes(existing: Vec<Recipe>, incoming: &[Recipe]) -> Vec<Recipe> {
    let mut merged = existing;
    let mut positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.clone(), i))
        .collect();

    for recipe in incoming {
        match positions.get(&recipe.id) {
            Some(&i) => merge_into(&mut merged[i], recipe),
            None => {
                positions.insert(recipe.id.clone(), merged.len());
                merged.push(recipe.clone());
            }
        }
    }

    merged
}

/// Fold one incoming copy of a recipe into the stored copy.
///
/// A single relevancy entry is an incremental score and is spliced in; more
/// than one means a freshly reloaded recipe whose map replaces the stored one.
/// Cleaned content overwrites uncleaned content, never the reverse.
pub fn merge_into(existing: &mut Recipe, incoming: &Recipe) {
    match incoming.relevancy.len() {
        0 => {}
        1 => existing.relevancy.extend(
            incoming
                .relevancy
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        ),
        _ => existing.relevancy = incoming.relevancy.clone(),
    }

    if !existing.cleaned && incoming.cleaned {
        existing.copy_content_from(incoming);
        existing.cleaned = true;
    }

    if existing.index_title.is_none() {
        existing.index_title = incoming.index_title.clone();
    }
    existing.aliases.extend(incoming.aliases.iter().cloned());

    if existing.source_url.is_none() {
        existing.source_url = incoming.source_url.clone();
    }
    if existing.image_url.is_none() {
        existing.image_url = incoming.image_url.clone();
    }
}
