//! Recipe discovery on the open web.
//!
//! Each configured site is searched for candidate recipe URLs (bounded
//! fan-out), URLs already in the store are dropped, one model call narrows
//! the combined list, and the chosen pages are fetched and parsed until
//! enough recipes have been collected.

mod extract;
mod fetch;
mod search;
mod select;
mod selectors;
mod web;

pub use extract::extract_recipe;
pub use fetch::{build_client, fetch_html};
pub use search::{BrowserContent, search_page_url, search_site};
pub use select::select_candidates;
pub use selectors::{QUERY_PLACEHOLDER, SiteSelectorConfig, SiteSelectors};
pub use web::{RecipeDiscovery, RecipeLookup, SelectorSource, WebDiscovery};
