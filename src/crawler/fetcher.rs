//! HTTP fetch collaborator
//!
//! The orchestration layer depends only on the [`Fetcher`] trait; the
//! worker pool calls it and forwards whatever pages come back.
//! [`HttpFetcher`] is the reqwest-backed implementation: it follows
//! redirects manually up to the configured limit, recording every
//! intermediate hop as its own page, and turns transport failures into
//! error-carrying pages instead of raising them across the queue
//! boundary.

use crate::config::Config;
use crate::crawler::parser::extract_links;
use crate::page::Page;
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// The fetch operation consumed by the worker pool.
///
/// Returns zero or more pages: zero when the URL is dropped entirely,
/// more than one when redirects are followed and the intermediate hops
/// are recorded too. Implementations own their timeout handling and must
/// always return rather than block indefinitely.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, referer: Option<&str>, depth: u32) -> Vec<Page>;
}

/// Builds the HTTP client used for fetching and robots.txt consultation.
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

pub struct HttpFetcher {
    client: Client,
    redirect_limit: u32,
}

impl HttpFetcher {
    pub fn new(client: Client, redirect_limit: u32) -> Self {
        Self {
            client,
            redirect_limit,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            build_http_client(&config.user_agent.header_value())?,
            config.crawler.redirect_limit,
        ))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, referer: Option<&str>, depth: u32) -> Vec<Page> {
        let Ok(mut current) = Url::parse(url) else {
            tracing::debug!("dropping unparseable URL {}", url);
            return Vec::new();
        };

        let mut referer = referer.map(str::to_string);
        let mut pages = Vec::new();

        // One request per hop; the limit bounds redirect chains and
        // therefore loops.
        for _ in 0..=self.redirect_limit {
            let response = match self.client.get(current.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    pages.push(Page::failed(current, referer, depth, e.to_string()));
                    return pages;
                }
            };

            let status = response.status();
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            let is_html = headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
                .map(|(_, value)| value.contains("text/html") || value.contains("xhtml"))
                .unwrap_or(false);

            // Only textual bodies are kept; a non-HTML resource is still
            // recorded with its status and headers.
            let body = if is_html {
                response.text().await.ok()
            } else {
                None
            };

            let links = match (&body, status.is_success()) {
                (Some(body), true) => extract_links(body, &current),
                _ => Vec::new(),
            };

            let page = Page::from_response(
                current.clone(),
                referer.clone(),
                depth,
                status.as_u16(),
                headers,
                body,
                links,
            );
            let follow = page.is_redirect();
            pages.push(page);

            if follow {
                if let Some(next) = location.and_then(|loc| current.join(&loc).ok()) {
                    referer = Some(current.to_string());
                    current = next;
                    continue;
                }
            }

            return pages;
        }

        tracing::debug!("redirect limit reached starting from {}", url);
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_fetcher() -> HttpFetcher {
        HttpFetcher::new(build_http_client("testbot/1.0").unwrap(), 5)
    }

    #[tokio::test]
    async fn test_fetch_html_page_with_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<html><body><a href="/next">Next</a></body></html>"#)
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let fetcher = create_test_fetcher();
        let pages = fetcher
            .fetch(&format!("{}/", server.uri()), None, 0)
            .await;

        assert_eq!(pages.len(), 1);
        let page = &pages[0];
        assert!(page.fetched);
        assert_eq!(page.code, Some(200));
        assert_eq!(page.links.len(), 1);
        assert!(page.links[0].as_str().ends_with("/next"));
        assert_eq!(page.header("content-type"), Some("text/html"));
    }

    #[tokio::test]
    async fn test_fetch_records_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = create_test_fetcher();
        let pages = fetcher
            .fetch(&format!("{}/missing", server.uri()), None, 1)
            .await;

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].code, Some(404));
        assert!(pages[0].links.is_empty());
    }

    #[tokio::test]
    async fn test_redirect_records_intermediate_hop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body>moved</body></html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let fetcher = create_test_fetcher();
        let pages = fetcher
            .fetch(&format!("{}/old", server.uri()), None, 0)
            .await;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].code, Some(301));
        assert!(pages[0].is_redirect());
        assert_eq!(pages[1].code, Some(200));
        // The hop becomes the referer of the final page.
        assert!(pages[1].referer.as_deref().unwrap().ends_with("/old"));
    }

    #[tokio::test]
    async fn test_redirect_limit_bounds_chain() {
        let server = MockServer::start().await;
        // /loop redirects to itself forever.
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(build_http_client("testbot/1.0").unwrap(), 2);
        let pages = fetcher
            .fetch(&format!("{}/loop", server.uri()), None, 0)
            .await;

        // limit + 1 hops recorded, then the chain is abandoned.
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(Page::is_redirect));
    }

    #[tokio::test]
    async fn test_connection_failure_yields_error_page() {
        let fetcher = HttpFetcher::new(
            Client::builder()
                .timeout(Duration::from_millis(500))
                .redirect(Policy::none())
                .build()
                .unwrap(),
            5,
        );

        let pages = fetcher.fetch("http://127.0.0.1:9/page", None, 3).await;
        assert_eq!(pages.len(), 1);
        assert!(!pages[0].fetched);
        assert!(pages[0].error.is_some());
        assert_eq!(pages[0].depth, 3);
    }

    #[tokio::test]
    async fn test_unparseable_url_dropped() {
        let fetcher = create_test_fetcher();
        assert!(fetcher.fetch("not a url", None, 0).await.is_empty());
    }
}
