//! Crawl orchestrator
//!
//! Owns the frontier, applies the link-filtering policy, drives the
//! fetch → discover → enqueue loop as the sole page-queue consumer, and
//! detects quiescence before terminating the worker pool. Page-side
//! callbacks and all page-store writes happen on this task, so they need
//! no locking of their own.

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, Fetcher, HttpFetcher};
use crate::crawler::worker::Worker;
use crate::page::{LinkJob, Page};
use crate::queue::{DurableQueue, Frontier};
use crate::robots::{HttpRobotsGate, RobotsGate};
use crate::storage::{MemoryStore, PageStore, ShardedStore, Storage};
use crate::{CrawlError, Result};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// How long the page-queue receive waits before re-checking for
/// quiescence. Bounds termination latency when a fetch yields zero pages
/// and, in endless mode, sets the bridge re-poll cadence.
const IDLE_POLL: Duration = Duration::from_millis(250);

type PageCallback = Box<dyn FnMut(&Page) + Send>;
type StoreCallback = Box<dyn FnMut(&PageStore) + Send>;
type FocusCallback = Box<dyn Fn(&Page) -> Vec<Url> + Send>;

/// The crawl orchestrator
///
/// Configure with the registration methods, then consume with
/// [`Crawler::run`], which returns the final page store once the crawl
/// reaches quiescence (or runs forever in endless distributed mode).
pub struct Crawler {
    config: Arc<Config>,
    store: PageStore,
    fetcher: Arc<dyn Fetcher>,
    robots: Option<Arc<dyn RobotsGate>>,
    skip_patterns: Vec<Regex>,
    on_every_page: Vec<PageCallback>,
    on_pages_like: Vec<(Regex, PageCallback)>,
    after_crawl: Vec<StoreCallback>,
    focus: Option<FocusCallback>,
}

impl Crawler {
    /// Builds a crawler from configuration alone: sharded filesystem
    /// storage when a root is configured (in-memory otherwise), the
    /// reqwest fetcher, and a live robots gate when `obey-robots-txt` is
    /// set.
    pub fn new(config: Config) -> Result<Self> {
        let storage: Arc<dyn Storage> = match &config.storage.root {
            Some(root) => Arc::new(ShardedStore::open(
                root,
                config.storage.links_batch_size,
                &config.storage.buckets,
            )?),
            None => Arc::new(MemoryStore::new()),
        };
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::from_config(&config)?);
        Self::with_collaborators(config, storage, fetcher)
    }

    /// Builds a crawler around caller-supplied collaborators. This is
    /// the seam tests and alternative backends use.
    pub fn with_collaborators(
        config: Config,
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let robots: Option<Arc<dyn RobotsGate>> = if config.crawler.obey_robots_txt {
            let agent = config.user_agent.header_value();
            Some(Arc::new(HttpRobotsGate::new(
                build_http_client(&agent)?,
                agent,
            )))
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            store: PageStore::new(storage),
            fetcher,
            robots,
            skip_patterns: Vec::new(),
            on_every_page: Vec::new(),
            on_pages_like: Vec::new(),
            after_crawl: Vec::new(),
            focus: None,
        })
    }

    /// Replaces the robots gate. The gate is consulted for every
    /// candidate link regardless of `obey-robots-txt` once installed.
    pub fn with_robots_gate(mut self, gate: Arc<dyn RobotsGate>) -> Self {
        self.robots = Some(gate);
        self
    }

    /// Adds patterns for URL paths that should never be followed.
    pub fn skip_links_like(&mut self, patterns: impl IntoIterator<Item = Regex>) -> &mut Self {
        self.skip_patterns.extend(patterns);
        self
    }

    /// Registers a callback run on every page as it is processed.
    pub fn on_every_page(&mut self, callback: impl FnMut(&Page) + Send + 'static) -> &mut Self {
        self.on_every_page.push(Box::new(callback));
        self
    }

    /// Registers a callback run on pages whose URL matches `pattern`.
    pub fn on_pages_like(
        &mut self,
        pattern: Regex,
        callback: impl FnMut(&Page) + Send + 'static,
    ) -> &mut Self {
        self.on_pages_like.push((pattern, Box::new(callback)));
        self
    }

    /// Installs a callback that selects which links to follow from each
    /// page, overriding the extracted link list.
    pub fn focus_crawl(
        &mut self,
        callback: impl Fn(&Page) -> Vec<Url> + Send + 'static,
    ) -> &mut Self {
        self.focus = Some(Box::new(callback));
        self
    }

    /// Registers a hook run over the final page store after the crawl.
    pub fn after_crawl(
        &mut self,
        callback: impl FnMut(&PageStore) + Send + 'static,
    ) -> &mut Self {
        self.after_crawl.push(Box::new(callback));
        self
    }

    /// Performs the crawl and returns the final page store.
    pub async fn run(mut self, seeds: &[&str]) -> Result<PageStore> {
        let mut seed_jobs = Vec::new();
        for seed in seeds {
            // Url::parse normalizes an empty path to "/".
            let url = Url::parse(seed)?;
            if self.visit_link(&url, None).await? && self.store.mark_pending(url.as_str())? {
                seed_jobs.push(LinkJob::seed(url.to_string()));
            }
        }

        if seed_jobs.is_empty() {
            tracing::info!("no seeds survived the frontier policy, nothing to crawl");
            return Ok(self.store);
        }

        let workers = self.config.effective_threads();
        let frontier = Frontier::new();
        let (page_tx, page_rx) = flume::unbounded::<Page>();

        let bridge = if self.config.queue.distributed {
            Some(DurableQueue::connect(&self.config.queue, Some(self.store.storage())).await?)
        } else {
            None
        };

        tracing::info!(
            "starting crawl: {} seeds, {} workers{}",
            seed_jobs.len(),
            workers,
            if bridge.is_some() { ", distributed" } else { "" }
        );

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let worker = Worker {
                frontier: frontier.clone(),
                pages: page_tx.clone(),
                fetcher: Arc::clone(&self.fetcher),
                delay: Duration::from_secs_f64(self.config.crawler.delay),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        // Workers hold the only senders now; a closed page queue means
        // the pool died.
        drop(page_tx);

        for job in seed_jobs {
            frontier.push(job);
        }

        if let Some(bridge) = &bridge {
            self.refill_local(bridge, &frontier, self.config.crawler.links_local_buffer)
                .await?;
        }

        loop {
            let page = match tokio::time::timeout(IDLE_POLL, page_rx.recv_async()).await {
                Ok(Ok(page)) => Some(page),
                Ok(Err(_)) => return Err(CrawlError::PageQueueClosed),
                Err(_) => None,
            };

            if let Some(mut page) = page {
                self.process_page(&mut page, &frontier, bridge.as_ref())
                    .await?;
            }

            if frontier.is_empty() && page_rx.is_empty() {
                match &bridge {
                    Some(bridge) if self.config.crawler.endless_crawling => {
                        // Never terminate; keep pulling small batches so
                        // concurrent crawl processes are not starved.
                        self.refill_local(bridge, &frontier, 3 * workers).await?;
                    }
                    Some(bridge) => {
                        if !bridge.is_empty().await? {
                            self.refill_local(
                                bridge,
                                &frontier,
                                self.config.crawler.links_local_buffer,
                            )
                            .await?;
                        }
                        if frontier.is_empty()
                            && page_rx.is_empty()
                            && self.quiesce(&frontier, &page_rx, workers).await
                        {
                            break;
                        }
                    }
                    None => {
                        if self.quiesce(&frontier, &page_rx, workers).await {
                            break;
                        }
                    }
                }
            }
        }

        for handle in handles {
            let _ = handle.await;
        }

        tracing::info!("crawl finished");
        for hook in &mut self.after_crawl {
            hook(&self.store);
        }
        self.store.close()?;
        Ok(self.store)
    }

    /// Processes one fetched page: callbacks, link discovery, store
    /// write, re-enqueue of accepted links.
    async fn process_page(
        &mut self,
        page: &mut Page,
        frontier: &Frontier,
        bridge: Option<&DurableQueue>,
    ) -> Result<()> {
        self.store.mark_pending(page.url.as_str())?;

        tracing::debug!(
            "processing {} [frontier: {}, depth: {}]",
            page.url,
            frontier.len(),
            page.depth
        );

        for callback in &mut self.on_every_page {
            callback(page);
        }
        for (pattern, callback) in &mut self.on_pages_like {
            if pattern.is_match(page.url.as_str()) {
                callback(page);
            }
        }

        if self.config.crawler.discard_page_bodies {
            page.discard_body();
        }

        for link in self.links_to_follow(page).await? {
            // The losing side of a duplicate discovery stops here, which
            // is what keeps each URL visited at most once.
            if !self.store.mark_pending(link.as_str())? {
                continue;
            }

            let job = LinkJob::new(
                link.to_string(),
                Some(page.url.to_string()),
                page.depth + 1,
            );
            match bridge {
                Some(bridge) => bridge.push(&job).await?,
                None => frontier.push(job),
            }
        }

        self.store.put(page)?;
        Ok(())
    }

    /// Links on `page` that pass the frontier policy.
    async fn links_to_follow(&self, page: &Page) -> Result<Vec<Url>> {
        let candidates = match &self.focus {
            Some(focus) => focus(page),
            None => page.links.clone(),
        };

        let mut accepted = Vec::new();
        for link in candidates {
            if self.visit_link(&link, Some(page.depth)).await? {
                accepted.push(link);
            }
        }
        Ok(accepted)
    }

    /// The frontier policy. Applied to every candidate link including
    /// seeds; the checks are independent, the order is short-circuit
    /// performance only.
    async fn visit_link(&self, link: &Url, from_depth: Option<u32>) -> Result<bool> {
        if self.store.has(link.as_str())? {
            return Ok(false);
        }

        if self
            .skip_patterns
            .iter()
            .any(|pattern| pattern.is_match(link.path()))
        {
            return Ok(false);
        }

        if self.config.crawler.skip_query_strings && link.query().is_some() {
            return Ok(false);
        }

        if let Some(gate) = &self.robots {
            match gate.allowed(link).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("robots.txt disallows {}", link);
                    return Ok(false);
                }
                Err(e) => {
                    // Fail-closed: an unanswerable gate rejects the link.
                    tracing::warn!("robots consultation failed for {}: {}", link, e);
                    return Ok(false);
                }
            }
        }

        if let (Some(depth), Some(limit)) = (from_depth, self.config.crawler.depth_limit) {
            if depth >= limit {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Quiescence detection. A worker may still be mid-fetch when the
    /// frontier empties, so spin until every worker is parked on the
    /// frontier, then re-check the page queue; only if it is still empty
    /// are the termination sentinels pushed. Returns false when pages
    /// arrived during the wait.
    async fn quiesce(
        &self,
        frontier: &Frontier,
        page_rx: &flume::Receiver<Page>,
        workers: usize,
    ) -> bool {
        while frontier.parked() != workers {
            tokio::task::yield_now().await;
        }

        if page_rx.is_empty() {
            for _ in 0..workers {
                frontier.push_shutdown();
            }
            return true;
        }

        false
    }

    /// Moves up to `limit` jobs from the durable bridge into the local
    /// frontier, stopping early when the bridge reports no data.
    async fn refill_local(
        &self,
        bridge: &DurableQueue,
        frontier: &Frontier,
        limit: usize,
    ) -> Result<()> {
        for _ in 0..limit {
            match bridge.pop().await? {
                Some(job) => {
                    self.store.mark_pending(&job.url)?;
                    frontier.push(job);
                }
                None => break,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robots::RobotsError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fetcher serving a scripted site graph: URL -> outbound hrefs.
    struct ScriptedFetcher {
        site: HashMap<String, Vec<String>>,
        fetches: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(site: &[(&str, &[&str])]) -> Self {
            Self {
                site: site
                    .iter()
                    .map(|(url, links)| {
                        (
                            url.to_string(),
                            links.iter().map(|l| l.to_string()).collect(),
                        )
                    })
                    .collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str, referer: Option<&str>, depth: u32) -> Vec<Page> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let parsed = Url::parse(url).unwrap();
            match self.site.get(url) {
                Some(links) => vec![Page::from_response(
                    parsed,
                    referer.map(str::to_string),
                    depth,
                    200,
                    vec![],
                    Some(String::new()),
                    links.iter().map(|l| Url::parse(l).unwrap()).collect(),
                )],
                None => vec![Page::failed(
                    parsed,
                    referer.map(str::to_string),
                    depth,
                    "not scripted".to_string(),
                )],
            }
        }
    }

    /// Gate that always errors, for the fail-closed path.
    struct BrokenGate;

    #[async_trait]
    impl RobotsGate for BrokenGate {
        async fn allowed(&self, url: &Url) -> std::result::Result<bool, RobotsError> {
            Err(RobotsError::MissingHost(url.to_string()))
        }
    }

    fn create_test_crawler(config: Config, site: &[(&str, &[&str])]) -> Crawler {
        Crawler::with_collaborators(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedFetcher::new(site)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_seed_set_terminates_immediately() {
        let crawler = create_test_crawler(Config::default(), &[]);
        let store = crawler.run(&[]).await.unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_visit_link_rejects_seen_urls() {
        let crawler = create_test_crawler(Config::default(), &[]);
        let url = Url::parse("http://x.test/a").unwrap();

        assert!(crawler.visit_link(&url, None).await.unwrap());
        crawler.store.mark_pending(url.as_str()).unwrap();
        assert!(!crawler.visit_link(&url, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_visit_link_skip_patterns() {
        let mut crawler = create_test_crawler(Config::default(), &[]);
        crawler.skip_links_like([Regex::new(r"^/private").unwrap()]);

        let blocked = Url::parse("http://x.test/private/page").unwrap();
        let open = Url::parse("http://x.test/public").unwrap();
        assert!(!crawler.visit_link(&blocked, None).await.unwrap());
        assert!(crawler.visit_link(&open, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_visit_link_query_strings() {
        let mut config = Config::default();
        config.crawler.skip_query_strings = true;
        let crawler = create_test_crawler(config, &[]);

        let with_query = Url::parse("http://x.test/page?u=1").unwrap();
        let without = Url::parse("http://x.test/page").unwrap();
        assert!(!crawler.visit_link(&with_query, None).await.unwrap());
        assert!(crawler.visit_link(&without, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_visit_link_depth_boundary() {
        let mut config = Config::default();
        config.crawler.depth_limit = Some(2);
        let crawler = create_test_crawler(config, &[]);
        let url = Url::parse("http://x.test/deep").unwrap();

        // At the limit the source page's links are rejected; one short
        // of it they are accepted.
        assert!(crawler.visit_link(&url, Some(1)).await.unwrap());
        assert!(!crawler.visit_link(&url, Some(2)).await.unwrap());
        assert!(!crawler.visit_link(&url, Some(3)).await.unwrap());
        // Seeds carry no source depth.
        assert!(crawler.visit_link(&url, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_visit_link_robots_fail_closed() {
        let crawler = create_test_crawler(Config::default(), &[])
            .with_robots_gate(Arc::new(BrokenGate));
        let url = Url::parse("http://x.test/a").unwrap();
        assert!(!crawler.visit_link(&url, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_crawl_terminates_and_stores_pages() {
        let site: &[(&str, &[&str])] = &[
            ("http://x.test/", &["http://x.test/a", "http://x.test/b"]),
            ("http://x.test/a", &["http://x.test/b"]),
            ("http://x.test/b", &[]),
        ];
        let crawler = create_test_crawler(Config::default(), site);
        let store = crawler.run(&["http://x.test/"]).await.unwrap();

        assert_eq!(store.len().unwrap(), 3);
        for url in ["http://x.test/", "http://x.test/a", "http://x.test/b"] {
            assert!(store.get(url).unwrap().unwrap().fetched, "{} missing", url);
        }
    }

    #[tokio::test]
    async fn test_depth_limit_scenario() {
        // Seed "/" links to "/a"; "/a/b" is reachable only through "/a".
        // With depth-limit 1 the final store is exactly {"/", "/a"}.
        let site: &[(&str, &[&str])] = &[
            ("http://x.test/", &["http://x.test/a"]),
            ("http://x.test/a", &["http://x.test/a/b"]),
            ("http://x.test/a/b", &[]),
        ];
        let mut config = Config::default();
        config.crawler.depth_limit = Some(1);
        let crawler = create_test_crawler(config, site);

        let store = crawler.run(&["http://x.test/"]).await.unwrap();

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["http://x.test/", "http://x.test/a"]);
    }

    #[tokio::test]
    async fn test_duplicate_discoveries_fetch_once() {
        // Both "/" children link to "/shared".
        let site: &[(&str, &[&str])] = &[
            ("http://x.test/", &["http://x.test/a", "http://x.test/b"]),
            ("http://x.test/a", &["http://x.test/shared"]),
            ("http://x.test/b", &["http://x.test/shared"]),
            ("http://x.test/shared", &[]),
        ];
        let fetcher = Arc::new(ScriptedFetcher::new(site));
        let crawler = Crawler::with_collaborators(
            Config::default(),
            Arc::new(MemoryStore::new()),
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        )
        .unwrap();
        let store = crawler.run(&["http://x.test/"]).await.unwrap();

        assert_eq!(store.len().unwrap(), 4);
        assert!(store.get("http://x.test/shared").unwrap().unwrap().fetched);
        // "/shared" was discovered twice but fetched once.
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failed_fetches_do_not_hang_crawl() {
        // "/gone" is not scripted: the fetcher returns an error page.
        let site: &[(&str, &[&str])] = &[("http://x.test/", &["http://x.test/gone"])];
        let crawler = create_test_crawler(Config::default(), site);
        let store = crawler.run(&["http://x.test/"]).await.unwrap();

        let errored = store.get("http://x.test/gone").unwrap().unwrap();
        assert!(!errored.fetched);
        assert!(errored.error.is_some());
    }

    #[tokio::test]
    async fn test_callbacks_and_discard_bodies() {
        let site: &[(&str, &[&str])] = &[
            ("http://x.test/", &["http://x.test/a"]),
            ("http://x.test/a", &[]),
        ];
        let mut config = Config::default();
        config.crawler.discard_page_bodies = true;

        let every = Arc::new(AtomicUsize::new(0));
        let matched = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let mut crawler = create_test_crawler(config, site);
        {
            let every = Arc::clone(&every);
            crawler.on_every_page(move |page| {
                // Bodies are still present while callbacks run.
                assert!(page.body.is_some() || !page.fetched);
                every.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let matched = Arc::clone(&matched);
            crawler.on_pages_like(Regex::new(r"/a$").unwrap(), move |_| {
                matched.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let finished = Arc::clone(&finished);
            crawler.after_crawl(move |store| {
                finished.store(store.len().unwrap(), Ordering::SeqCst);
            });
        }

        let store = crawler.run(&["http://x.test/"]).await.unwrap();

        assert_eq!(every.load(Ordering::SeqCst), 2);
        assert_eq!(matched.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 2);
        // Bodies were discarded before storage.
        assert!(store.get("http://x.test/").unwrap().unwrap().body.is_none());
    }

    #[tokio::test]
    async fn test_focus_crawl_overrides_links() {
        let site: &[(&str, &[&str])] = &[
            ("http://x.test/", &["http://x.test/a", "http://x.test/b"]),
            ("http://x.test/a", &[]),
            ("http://x.test/b", &[]),
        ];
        let mut crawler = create_test_crawler(Config::default(), site);
        crawler.focus_crawl(|page| {
            page.links
                .iter()
                .filter(|link| link.path() != "/b")
                .cloned()
                .collect()
        });

        let store = crawler.run(&["http://x.test/"]).await.unwrap();
        assert!(store.get("http://x.test/b").unwrap().is_none());
        assert!(store.get("http://x.test/a").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_seed_rejected_by_policy_is_not_crawled() {
        let mut config = Config::default();
        config.crawler.skip_query_strings = true;
        let crawler = create_test_crawler(config, &[]);

        let store = crawler.run(&["http://x.test/?session=1"]).await.unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_seed_is_an_error() {
        let crawler = create_test_crawler(Config::default(), &[]);
        assert!(crawler.run(&["not a url"]).await.is_err());
    }
}
