//! Fetch worker
//!
//! Each worker loops: block on the frontier, fetch, forward the
//! resulting pages, optionally sleep the configured delay. The
//! termination sentinel ends the loop.

use crate::crawler::fetcher::Fetcher;
use crate::page::Page;
use crate::queue::{Frontier, FrontierMessage};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct Worker {
    pub frontier: Frontier,
    pub pages: flume::Sender<Page>,
    pub fetcher: Arc<dyn Fetcher>,
    pub delay: Duration,
}

impl Worker {
    pub(crate) async fn run(self) {
        loop {
            let message = match self.frontier.recv_parked().await {
                Some(message) => message,
                None => break,
            };

            let job = match message {
                FrontierMessage::Job(job) => job,
                FrontierMessage::Shutdown => break,
            };

            tracing::debug!("fetching {} (depth {})", job.url, job.depth);
            let pages = self
                .fetcher
                .fetch(&job.url, job.referer.as_deref(), job.depth)
                .await;

            for page in pages {
                if self.pages.send(page).is_err() {
                    // Orchestrator is gone; nothing left to do.
                    return;
                }
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::LinkJob;
    use async_trait::async_trait;
    use url::Url;

    /// Fetcher returning one canned page per URL.
    struct EchoFetcher;

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, url: &str, referer: Option<&str>, depth: u32) -> Vec<Page> {
            vec![Page::from_response(
                Url::parse(url).unwrap(),
                referer.map(str::to_string),
                depth,
                200,
                vec![],
                None,
                vec![],
            )]
        }
    }

    #[tokio::test]
    async fn test_worker_fetches_until_sentinel() {
        let frontier = Frontier::new();
        let (page_tx, page_rx) = flume::unbounded();

        frontier.push(LinkJob::seed("http://x.test/a"));
        frontier.push(LinkJob::new(
            "http://x.test/b",
            Some("http://x.test/a".to_string()),
            1,
        ));
        frontier.push_shutdown();

        let worker = Worker {
            frontier: frontier.clone(),
            pages: page_tx,
            fetcher: Arc::new(EchoFetcher),
            delay: Duration::ZERO,
        };
        worker.run().await;

        let received: Vec<Page> = page_rx.drain().collect();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].url.as_str(), "http://x.test/a");
        assert_eq!(received[1].depth, 1);
        assert!(frontier.is_empty());
    }
}
