//! Recipe extraction from a fetched page.
//!
//! Site CSS rules are tried first. Anything they miss is filled from the
//! page's schema.org `Recipe` JSON-LD block when one exists.

use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use recipeforge_shared::{RecipeForgeError, Result, ScrapedRecipe, fingerprint};

use crate::selectors::SiteSelectors;

/// Parse `html` fetched from `url` into a [`ScrapedRecipe`].
///
/// Fails with a parse error when neither the site rules nor JSON-LD yield
/// both ingredients and directions.
pub fn extract_recipe(
    html: &str,
    url: &str,
    site: Option<&str>,
    rules: &SiteSelectors,
) -> Result<ScrapedRecipe> {
    let doc = Html::parse_document(html);

    let mut recipe = ScrapedRecipe {
        id: fingerprint(url),
        url: url.to_string(),
        site: site.map(str::to_string),
        title: first_text(&doc, rules.title.as_deref()),
        description: first_text(&doc, rules.description.as_deref()),
        image_url: first_attr(&doc, rules.image.as_deref(), &["src", "data-src", "content"]),
        servings: first_text(&doc, rules.servings.as_deref()),
        prep_time: first_text(&doc, rules.prep_time.as_deref()),
        cook_time: first_text(&doc, rules.cook_time.as_deref()),
        total_time: first_text(&doc, rules.total_time.as_deref()),
        ingredients: all_text(&doc, rules.ingredients.as_deref()),
        directions: all_text(&doc, rules.directions.as_deref()),
        notes: first_text(&doc, rules.notes.as_deref()),
    };

    if let Some(ld) = json_ld_recipe(&doc) {
        debug!(url, "filling gaps from JSON-LD");
        fill_from_json_ld(&mut recipe, &ld);
    }

    if recipe.title.is_none() {
        recipe.title = first_text(&doc, Some("h1"));
    }

    if recipe.ingredients.is_empty() || recipe.directions.is_empty() {
        return Err(RecipeForgeError::parse(format!(
            "{url}: no ingredients or directions found"
        )));
    }

    Ok(recipe)
}

// ---------------------------------------------------------------------------
// CSS helpers
// ---------------------------------------------------------------------------

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!(selector = css, error = ?e, "invalid CSS selector");
            None
        }
    }
}

/// Whitespace-collapsed text of an element; `<meta>` yields its `content`.
fn element_text(el: ElementRef<'_>) -> Option<String> {
    let raw = if el.value().name() == "meta" {
        el.value().attr("content").unwrap_or_default().to_string()
    } else {
        el.text().collect::<String>()
    };
    let text = collapse_whitespace(&raw);
    (!text.is_empty()).then_some(text)
}

fn first_text(doc: &Html, css: Option<&str>) -> Option<String> {
    let sel = selector(css?)?;
    doc.select(&sel).find_map(element_text)
}

fn all_text(doc: &Html, css: Option<&str>) -> Vec<String> {
    let Some(sel) = css.and_then(selector) else {
        return Vec::new();
    };
    doc.select(&sel).filter_map(element_text).collect()
}

fn first_attr(doc: &Html, css: Option<&str>, attrs: &[&str]) -> Option<String> {
    let sel = selector(css?)?;
    doc.select(&sel).find_map(|el| {
        attrs
            .iter()
            .find_map(|a| el.value().attr(a))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// JSON-LD
// ---------------------------------------------------------------------------

/// First schema.org `Recipe` object on the page, searching arrays and `@graph`.
fn json_ld_recipe(doc: &Html) -> Option<Map<String, Value>> {
    let sel = selector(r#"script[type="application/ld+json"]"#)?;
    doc.select(&sel).find_map(|script| {
        let body = script.text().collect::<String>();
        let value: Value = serde_json::from_str(body.trim()).ok()?;
        find_recipe(&value).cloned()
    })
}

fn find_recipe(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Array(items) => items.iter().find_map(find_recipe),
        Value::Object(obj) if is_recipe_type(obj) => Some(obj),
        Value::Object(obj) => obj.get("@graph").and_then(find_recipe),
        _ => None,
    }
}

fn is_recipe_type(obj: &Map<String, Value>) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => t == "Recipe",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Recipe")),
        _ => false,
    }
}

fn fill_from_json_ld(recipe: &mut ScrapedRecipe, ld: &Map<String, Value>) {
    fn fill(target: &mut Option<String>, value: Option<String>) {
        if target.is_none() {
            *target = value;
        }
    }

    fill(&mut recipe.title, ld_string(ld.get("name")));
    fill(&mut recipe.description, ld_string(ld.get("description")));
    fill(&mut recipe.image_url, ld_image(ld.get("image")));
    fill(&mut recipe.servings, ld_string(ld.get("recipeYield")));
    fill(&mut recipe.prep_time, ld_string(ld.get("prepTime")));
    fill(&mut recipe.cook_time, ld_string(ld.get("cookTime")));
    fill(&mut recipe.total_time, ld_string(ld.get("totalTime")));

    if recipe.ingredients.is_empty() {
        recipe.ingredients = ld
            .get("recipeIngredient")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|i| ld_string(Some(i))).collect())
            .unwrap_or_default();
    }
    if recipe.directions.is_empty() {
        recipe.directions = ld
            .get("recipeInstructions")
            .map(ld_instructions)
            .unwrap_or_default();
    }
}

/// Text of a scalar, or of the first element of an array.
fn ld_string(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => collapse_whitespace(s),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => return items.iter().find_map(|i| ld_string(Some(i))),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn ld_image(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(obj) => ld_string(obj.get("url")),
        Value::Array(items) => items.iter().find_map(|i| ld_image(Some(i))),
        other => ld_string(Some(other)),
    }
}

/// Flatten `recipeInstructions`: plain text, `HowToStep`s, or nested `HowToSection`s.
fn ld_instructions(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .lines()
            .map(collapse_whitespace)
            .filter(|l| !l.is_empty())
            .collect(),
        Value::Array(items) => items.iter().flat_map(ld_instructions).collect(),
        Value::Object(obj) => {
            if let Some(children) = obj.get("itemListElement") {
                ld_instructions(children)
            } else {
                ld_string(obj.get("text"))
                    .or_else(|| ld_string(obj.get("name")))
                    .into_iter()
                    .collect()
            }
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wprm_rules() -> SiteSelectors {
        SiteSelectors {
            search_url: "https://bakery.test/?s={query}".into(),
            result_selector: "h2 a".into(),
            title: Some("h2.wprm-recipe-name".into()),
            description: Some(".wprm-recipe-summary".into()),
            image: Some(".wprm-recipe-image img".into()),
            servings: Some(".wprm-recipe-servings".into()),
            ingredients: Some(".wprm-recipe-ingredient".into()),
            directions: Some(".wprm-recipe-instruction-text".into()),
            notes: Some(".wprm-recipe-notes".into()),
            ..Default::default()
        }
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("../../../fixtures/recipes/{name}"))
            .expect("read recipe fixture")
    }

    #[test]
    fn extracts_with_css_rules() {
        let url = "https://bakery.test/banana-bread/";
        let recipe =
            extract_recipe(&fixture("css-recipe.html"), url, Some("bakery"), &wprm_rules()).unwrap();

        assert_eq!(recipe.id, fingerprint(url));
        assert_eq!(recipe.site.as_deref(), Some("bakery"));
        assert_eq!(recipe.title.as_deref(), Some("Easy Banana Bread"));
        assert_eq!(recipe.servings.as_deref(), Some("8"));
        assert_eq!(
            recipe.image_url.as_deref(),
            Some("https://bakery.test/img/banana-bread.jpg")
        );
        assert_eq!(recipe.ingredients.len(), 4);
        assert_eq!(recipe.ingredients[0], "3 ripe bananas, mashed");
        assert_eq!(recipe.directions.len(), 3);
        assert!(recipe.notes.is_some());
    }

    #[test]
    fn falls_back_to_json_ld_graph() {
        let url = "https://stew.test/recipes/beef-stew";
        let recipe =
            extract_recipe(&fixture("jsonld-recipe.html"), url, None, &wprm_rules()).unwrap();

        assert_eq!(recipe.title.as_deref(), Some("Hearty Beef Stew"));
        assert_eq!(recipe.servings.as_deref(), Some("6 servings"));
        assert_eq!(recipe.prep_time.as_deref(), Some("PT20M"));
        assert_eq!(recipe.image_url.as_deref(), Some("https://stew.test/stew.jpg"));
        assert_eq!(recipe.ingredients.len(), 5);
        // Two sections: two steps, then one.
        assert_eq!(
            recipe.directions,
            vec![
                "Brown the beef in batches.",
                "Add onions and carrots.",
                "Simmer for two hours."
            ]
        );
    }

    #[test]
    fn page_without_recipe_is_a_parse_error() {
        let html = "<html><body><h1>About us</h1><p>We love food.</p></body></html>";
        let err = extract_recipe(html, "https://x.test/about", None, &wprm_rules()).unwrap_err();
        assert!(matches!(err, RecipeForgeError::Parse { .. }));
    }

    #[test]
    fn invalid_selector_is_ignored() {
        let mut rules = wprm_rules();
        rules.title = Some("h2[[".into());
        let recipe = extract_recipe(
            &fixture("css-recipe.html"),
            "https://bakery.test/banana-bread/",
            None,
            &rules,
        )
        .unwrap();
        // Falls through to the page's <h1>.
        assert_eq!(recipe.title.as_deref(), Some("Banana Bread (The Best!)"));
    }

    #[test]
    fn instructions_accept_plain_text_and_steps() {
        let text = serde_json::json!("Mix.\n\n  Bake at 350F.  ");
        assert_eq!(ld_instructions(&text), vec!["Mix.", "Bake at 350F."]);

        let steps = serde_json::json!([
            {"@type": "HowToStep", "text": "Whisk eggs."},
            {"@type": "HowToStep", "name": "Fold in flour."},
            "Rest 10 minutes."
        ]);
        assert_eq!(
            ld_instructions(&steps),
            vec!["Whisk eggs.", "Fold in flour.", "Rest 10 minutes."]
        );
    }

    #[test]
    fn recipe_type_may_be_a_list() {
        let value = serde_json::json!([
            {"@type": "WebPage"},
            {"@type": ["Recipe", "NewsArticle"], "name": "Flan"}
        ]);
        let found = find_recipe(&value).unwrap();
        assert_eq!(found["name"], "Flan");
    }
}
