//! Crawler module: orchestration, workers, fetching, link extraction

mod fetcher;
mod orchestrator;
mod parser;
mod worker;

pub use fetcher::{build_http_client, Fetcher, HttpFetcher};
pub use orchestrator::Crawler;
pub use parser::extract_links;

use crate::config::Config;
use crate::storage::PageStore;
use crate::Result;

/// Runs a complete crawl with the default collaborators and returns the
/// final page store.
pub async fn crawl(seeds: &[&str], config: Config) -> Result<PageStore> {
    Crawler::new(config)?.run(seeds).await
}
