//! HTML link extraction
//!
//! Pulls followable links out of a fetched page body so they can be fed
//! through the frontier policy.

use scraper::{Html, Selector};
use url::Url;

/// Extracts all followable links from HTML content, resolved against
/// `base_url`.
///
/// **Include:** `<a href="...">` anchors.
///
/// **Exclude:** `javascript:`, `mailto:`, `tel:` and `data:` links,
/// fragment-only anchors, `<a ... download>` links, and anything that is
/// not HTTP(S) after resolution.
pub fn extract_links(html: &str, base_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(url) = resolve_link(href, base_url) {
                    links.push(url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL, or `None` when the link
/// should be excluded.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    // Same-page anchors
    if href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(mut url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                return None;
            }
            // The fragment never reaches the server; stripping it here
            // keeps dedup keyed on the fetchable URL.
            url.set_fragment(None);
            Some(url)
        }
        Err(_) => None,
    }
}
