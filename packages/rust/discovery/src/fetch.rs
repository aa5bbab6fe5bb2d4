//! HTTP client for site search pages and recipe pages.

use std::time::Duration;

use reqwest::{Client, Response};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};

use recipeforge_shared::{HttpConfig, RecipeForgeError, Result};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Maximum page size we are willing to parse (5 MB).
const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024;

/// Client that presents itself as a regular browser. Responses are
/// transparently decompressed.
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| RecipeForgeError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET `url` and return the body as text.
pub async fn fetch_html(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| RecipeForgeError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RecipeForgeError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_PAGE_SIZE as u64 {
            return Err(too_large(url, MAX_PAGE_SIZE));
        }
    }

    read_capped(response, url, MAX_PAGE_SIZE).await
}

/// Read the body chunk by chunk, giving up once it passes `max` bytes.
/// Covers responses sent without a `Content-Length`.
async fn read_capped(mut response: Response, url: &str, max: usize) -> Result<String> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| RecipeForgeError::Network(format!("{url}: failed to read body: {e}")))?
    {
        if body.len() + chunk.len() > max {
            return Err(too_large(url, max));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn too_large(url: &str, max: usize) -> RecipeForgeError {
    RecipeForgeError::validation(format!("{url}: page larger than {max} bytes"))
}
