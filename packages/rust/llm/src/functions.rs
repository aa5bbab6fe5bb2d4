//! Named model functions: schemas, system prompts, and decoded results.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::service::FunctionSchema;

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

pub const RANK_RECIPE_PROMPT: &str = "You judge how well a recipe matches what a cook asked for. \
Score 100 when the recipe is exactly the requested dish, around 70 when it is a reasonable \
variation, and below 40 when it is a different dish. Respond only through the function call.";

/// Relevance score for one recipe against one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankResult {
    pub score: u8,
}

pub fn rank_recipe() -> FunctionSchema {
    FunctionSchema {
        name: "rank_recipe".into(),
        description: "Report how relevant the recipe is to the query.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "score": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 100,
                    "description": "Relevance from 0 (unrelated) to 100 (exact match)."
                }
            },
            "required": ["score"]
        }),
    }
}

// ---------------------------------------------------------------------------
// Cleaning and naming
// ---------------------------------------------------------------------------

pub const CLEAN_RECIPE_PROMPT: &str = "You normalize scraped recipes. Fix spelling and \
formatting, remove advertising and personal anecdotes, keep one ingredient per line with \
quantities first, and keep one action per direction. Never invent ingredients.";

/// Normalized recipe fields returned by the cleaner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecipe {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub servings: Option<String>,
    #[serde(default)]
    pub prep_time: Option<String>,
    #[serde(default)]
    pub cook_time: Option<String>,
    #[serde(default)]
    pub total_time: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub directions: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn recipe_fields_schema() -> serde_json::Value {
    json!({
        "title": {"type": "string"},
        "description": {"type": "string"},
        "servings": {"type": "string"},
        "prep_time": {"type": "string"},
        "cook_time": {"type": "string"},
        "total_time": {"type": "string"},
        "ingredients": {"type": "array", "items": {"type": "string"}},
        "directions": {"type": "array", "items": {"type": "string"}},
        "notes": {"type": "string"}
    })
}

pub fn clean_recipe() -> FunctionSchema {
    FunctionSchema {
        name: "clean_recipe".into(),
        description: "Return the normalized recipe.".into(),
        parameters: json!({
            "type": "object",
            "properties": recipe_fields_schema(),
            "required": ["title", "ingredients", "directions"]
        }),
    }
}

pub const NAME_RECIPE_PROMPT: &str = "You file recipes into a cookbook index. Give the \
canonical, generic dish name a cook would look it up under (for example 'chicken tikka \
masala', not 'Grandma's Best Tikka Masala'), plus other common names for the same dish.";

/// Canonical index title and alternate names for a recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeNaming {
    pub index_title: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

pub fn name_recipe() -> FunctionSchema {
    FunctionSchema {
        name: "name_recipe".into(),
        description: "Return the canonical index title and aliases.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "index_title": {"type": "string"},
                "aliases": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["index_title", "aliases"]
        }),
    }
}

// ---------------------------------------------------------------------------
// Web discovery
// ---------------------------------------------------------------------------

pub const SELECT_URLS_PROMPT: &str = "You pick which search results are most likely to be a \
recipe for the requested dish. Judge from the URL slug. Prefer exact dish matches over \
roundups, listicles, and category pages.";

/// Indices (into the numbered candidate list) picked by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlSelection {
    #[serde(default)]
    pub indices: Vec<usize>,
}

pub fn select_recipe_urls() -> FunctionSchema {
    FunctionSchema {
        name: "select_recipe_urls".into(),
        description: "Return the indices of the most relevant candidate URLs, best first."
            .into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "indices": {"type": "array", "items": {"type": "integer", "minimum": 0}}
            },
            "required": ["indices"]
        }),
    }
}

// ---------------------------------------------------------------------------
// Query reformulation
// ---------------------------------------------------------------------------

pub const ALTERNATE_NAME_PROMPT: &str = "A recipe search came back empty. Suggest one \
different, more common name for the same dish that is likely to find recipes. Do not repeat \
any name that was already tried.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternateName {
    pub name: String,
}

pub fn alternate_recipe_name() -> FunctionSchema {
    FunctionSchema {
        name: "alternate_recipe_name".into(),
        description: "Return an alternative search name for the dish.".into(),
        parameters: json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        }),
    }
}

// ---------------------------------------------------------------------------
// Synthesis and critique
// ---------------------------------------------------------------------------

pub const SYNTHESIZE_INSTRUCTIONS: &str = "You are a recipe developer. Combine the source \
recipes you are given into one new, coherent recipe that honors the customer's preferences. \
Always deliver the recipe by calling submit_recipe. When you receive critique as the tool \
output, revise the recipe and call submit_recipe again.";

pub const ANALYZE_INSTRUCTIONS: &str = "You are a demanding test-kitchen editor. Review each \
recipe you are given for correctness, clarity, balance, and fit with the customer's \
preferences. Always respond by calling submit_analysis with a quality score from 0 to 100, \
your analysis, and concrete suggestions. When a revised recipe arrives as the tool output, \
review it again from scratch.";

pub fn submit_recipe() -> FunctionSchema {
    let mut properties = recipe_fields_schema();
    if let Some(map) = properties.as_object_mut() {
        map.insert(
            "inspired_by".into(),
            json!({"type": "array", "items": {"type": "string"}}),
        );
    }
    FunctionSchema {
        name: "submit_recipe".into(),
        description: "Deliver the synthesized recipe.".into(),
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": ["title", "ingredients", "directions"]
        }),
    }
}

pub fn submit_analysis() -> FunctionSchema {
    FunctionSchema {
        name: "submit_analysis".into(),
        description: "Deliver the critique of the recipe.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "quality_score": {"type": "integer", "minimum": 0, "maximum": 100},
                "analysis": {"type": "string"},
                "suggestions": {"type": "string"}
            },
            "required": ["quality_score", "analysis", "suggestions"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_have_unique_names() {
        let names: std::collections::HashSet<String> = [
            rank_recipe(),
            clean_recipe(),
            name_recipe(),
            select_recipe_urls(),
            alternate_recipe_name(),
            submit_recipe(),
            submit_analysis(),
        ]
        .into_iter()
        .map(|s| s.name)
        .collect();
        assert_eq!(names.len(), 7);
    }

    #[test]
    fn submit_recipe_extends_recipe_fields() {
        let schema = submit_recipe();
        let props = schema.parameters["properties"].as_object().unwrap();
        assert!(props.contains_key("ingredients"));
        assert!(props.contains_key("inspired_by"));
    }

    #[test]
    fn cleaned_recipe_tolerates_partial_payload() {
        let json = r#"{"title":"Shakshuka","ingredients":["6 eggs"]}"#;
        let cleaned: CleanedRecipe = serde_json::from_str(json).unwrap();
        assert_eq!(cleaned.title.as_deref(), Some("Shakshuka"));
        assert!(cleaned.directions.is_empty());
    }
}
