//! Per-site search for candidate recipe URLs.

use std::collections::HashSet;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use recipeforge_shared::{RecipeForgeError, Result};

use crate::fetch::fetch_html;
use crate::selectors::{QUERY_PLACEHOLDER, SiteSelectors};

/// Renders a JavaScript-driven page and returns the values matched by a
/// selector. Used for sites whose search results are streamed client-side.
#[async_trait]
pub trait BrowserContent: Send + Sync {
    async fn get_content(
        &self,
        url: &str,
        selector: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>>;
}

/// The site's search URL for `query`.
pub fn search_page_url(rules: &SiteSelectors, query: &str) -> Result<Url> {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    let raw = rules.search_url.replace(QUERY_PLACEHOLDER, &encoded);
    Url::parse(&raw).map_err(|e| RecipeForgeError::config(format!("bad search_url {raw:?}: {e}")))
}

/// Candidate recipe URLs for `query` on one site, in page order.
#[instrument(skip_all, fields(query = %query))]
pub async fn search_site(
    client: &Client,
    browser: Option<&dyn BrowserContent>,
    rules: &SiteSelectors,
    query: &str,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let page_url = search_page_url(rules, query)?;

    let raw = if rules.stream_search {
        let browser = browser.ok_or_else(|| {
            RecipeForgeError::config("site needs a browser for streamed search results")
        })?;
        browser
            .get_content(page_url.as_str(), &rules.result_selector, cancel)
            .await?
    } else {
        let html = fetch_html(client, page_url.as_str()).await?;
        result_links(&html, rules)?
    };

    let pattern = rules
        .recipe_url_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| RecipeForgeError::config(format!("bad recipe_url_pattern: {e}")))?;

    let links = filter_links(raw, &page_url, pattern.as_ref());
    debug!(url = %page_url, count = links.len(), "site search complete");
    Ok(links)
}

/// Raw attribute values of every result element on a search page.
fn result_links(html: &str, rules: &SiteSelectors) -> Result<Vec<String>> {
    let selector = Selector::parse(&rules.result_selector).map_err(|e| {
        RecipeForgeError::config(format!(
            "invalid result_selector {:?}: {e:?}",
            rules.result_selector
        ))
    })?;

    let doc = Html::parse_document(html);
    Ok(doc
        .select(&selector)
        .filter_map(|el| el.value().attr(&rules.result_attribute))
        .map(str::to_string)
        .collect())
}

/// Resolve against `base`, keep http(s) links matching `pattern`, drop
/// fragments and duplicates.
fn filter_links(raw: Vec<String>, base: &Url, pattern: Option<&Regex>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|link| base.join(link.trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|mut u| {
            u.set_fragment(None);
            u.to_string()
        })
        .filter(|u| pattern.is_none_or(|p| p.is_match(u)))
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipeforge_shared::HttpConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::fetch::build_client;

    fn rules(search_url: String) -> SiteSelectors {
        SiteSelectors {
            search_url,
            result_selector: "h2 a".into(),
            result_attribute: "href".into(),
            ..Default::default()
        }
    }

    #[test]
    fn search_url_encodes_query() {
        let r = rules("https://site.test/search?q={query}".into());
        let url = search_page_url(&r, "mac & cheese").unwrap();
        assert_eq!(url.as_str(), "https://site.test/search?q=mac+%26+cheese");
    }

    #[test]
    fn links_are_resolved_filtered_and_deduplicated() {
        let base = Url::parse("https://site.test/search?q=pho").unwrap();
        let pattern = Regex::new(r"/recipe/").unwrap();
        let raw = vec![
            "/recipe/pho".to_string(),
            "https://site.test/recipe/pho#comments".to_string(),
            "/category/soups".to_string(),
            "mailto:chef@site.test".to_string(),
            "https://other.test/recipe/bun-bo-hue".to_string(),
        ];

        let links = filter_links(raw, &base, Some(&pattern));
        assert_eq!(
            links,
            vec![
                "https://site.test/recipe/pho".to_string(),
                "https://other.test/recipe/bun-bo-hue".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn scrapes_result_links_from_search_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "beef stew"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body>
                    <h2><a href="/beef-stew/">Beef Stew</a></h2>
                    <h2><a href="/irish-stew/">Irish Stew</a></h2>
                    <p><a href="/about/">About</a></p>
                </body></html>"#,
            ))
            .mount(&server)
            .await;

        let client = build_client(&HttpConfig::default()).unwrap();
        let r = rules(format!("{}/search?q={{query}}", server.uri()));
        let links = search_site(&client, None, &r, "beef stew", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            links,
            vec![
                format!("{}/beef-stew/", server.uri()),
                format!("{}/irish-stew/", server.uri()),
            ]
        );
    }

    struct FixedBrowser(Vec<String>);

    #[async_trait]
    impl BrowserContent for FixedBrowser {
        async fn get_content(
            &self,
            _url: &str,
            selector: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<String>> {
            assert_eq!(selector, "h2 a");
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn streamed_search_uses_browser() {
        let client = build_client(&HttpConfig::default()).unwrap();
        let mut r = rules("https://stream.test/find?term={query}".into());
        r.stream_search = true;

        let browser = FixedBrowser(vec!["/r/1".into(), "/r/2".into(), "/r/1".into()]);
        let links = search_site(&client, Some(&browser), &r, "tacos", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            links,
            vec!["https://stream.test/r/1".to_string(), "https://stream.test/r/2".to_string()]
        );

        let err = search_site(&client, None, &r, "tacos", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RecipeForgeError::Config { .. }));
    }
}
