//! Robots.txt gate
//!
//! The orchestrator consults a [`RobotsGate`] before enqueueing any link
//! when `obey-robots-txt` is set. The contract is fail-closed: a gate
//! error rejects the link, it is never surfaced to the caller as an
//! allow.

use async_trait::async_trait;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use url::Url;

/// Errors from robots.txt consultation
#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("robots.txt fetch failed for {origin}: {source}")]
    Fetch {
        origin: String,
        source: reqwest::Error,
    },

    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Decides whether a URL may be crawled.
///
/// Callers must treat `Err` as "deny"; the frontier policy fails closed.
#[async_trait]
pub trait RobotsGate: Send + Sync {
    async fn allowed(&self, url: &Url) -> Result<bool, RobotsError>;
}

/// Gate backed by live `/robots.txt` fetches with a per-origin cache.
///
/// A missing robots.txt (any non-2xx status) means no rules, i.e. allow;
/// a transport failure is an error and therefore a deny at the policy
/// layer.
pub struct HttpRobotsGate {
    client: Client,
    user_agent: String,
    cache: Mutex<HashMap<String, String>>,
}

impl HttpRobotsGate {
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn robots_body(&self, url: &Url) -> Result<String, RobotsError> {
        if url.host_str().is_none() {
            return Err(RobotsError::MissingHost(url.to_string()));
        }
        let origin = url.origin().ascii_serialization();

        if let Some(body) = self.cache.lock().unwrap().get(&origin) {
            return Ok(body.clone());
        }

        let robots_url = format!("{}/robots.txt", origin);
        tracing::debug!("fetching {}", robots_url);

        let response = self
            .client
            .get(&robots_url)
            .send()
            .await
            .map_err(|source| RobotsError::Fetch {
                origin: origin.clone(),
                source,
            })?;
        let body = if response.status().is_success() {
            response
                .text()
                .await
                .map_err(|source| RobotsError::Fetch {
                    origin: origin.clone(),
                    source,
                })?
        } else {
            // No robots.txt means no rules.
            String::new()
        };

        self.cache.lock().unwrap().insert(origin, body.clone());
        Ok(body)
    }
}

#[async_trait]
impl RobotsGate for HttpRobotsGate {
    async fn allowed(&self, url: &Url) -> Result<bool, RobotsError> {
        let body = self.robots_body(url).await?;
        if body.is_empty() {
            return Ok(true);
        }

        let mut matcher = DefaultMatcher::default();
        Ok(matcher.one_agent_allowed_by_robots(&body, &self.user_agent, url.as_str()))
    }
}
