use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for driftnet
///
/// Every recognized option has a typed default, so an empty TOML file (or
/// no file at all) yields a runnable configuration. The loaded value is
/// validated once, wrapped in `Arc`, and never mutated after the crawl
/// starts.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
}

impl Config {
    /// Worker pool size after the rate-limit collapse: a positive delay
    /// without `force-threading` drops the pool to one worker, since a
    /// per-worker delay would not achieve a global rate limit.
    pub fn effective_threads(&self) -> usize {
        if self.crawler.delay > 0.0 && !self.crawler.force_threading {
            1
        } else {
            self.crawler.threads
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of fetch workers
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Seconds a worker sleeps between fetches
    #[serde(default)]
    pub delay: f64,

    /// Keep the configured pool size even when delay is positive
    #[serde(rename = "force-threading", default)]
    pub force_threading: bool,

    /// Maximum source depth at which outbound links are still followed
    #[serde(rename = "depth-limit", default)]
    pub depth_limit: Option<u32>,

    /// Maximum redirect hops recorded per fetch
    #[serde(rename = "redirect-limit", default = "default_redirect_limit")]
    pub redirect_limit: u32,

    /// Consult robots.txt before enqueueing a link (fail-closed)
    #[serde(rename = "obey-robots-txt", default)]
    pub obey_robots_txt: bool,

    /// Drop page bodies once the page callbacks have run
    #[serde(rename = "discard-page-bodies", default)]
    pub discard_page_bodies: bool,

    /// Reject links carrying a query string
    #[serde(rename = "skip-query-strings", default)]
    pub skip_query_strings: bool,

    /// Jobs pulled from the durable bridge into the local frontier per
    /// refill
    #[serde(rename = "links-local-buffer", default = "default_links_local_buffer")]
    pub links_local_buffer: usize,

    /// Never terminate a distributed crawl; keep polling the bridge
    #[serde(rename = "endless-crawling", default)]
    pub endless_crawling: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            delay: 0.0,
            force_threading: false,
            depth_limit: None,
            redirect_limit: default_redirect_limit(),
            obey_robots_txt: false,
            discard_page_bodies: false,
            skip_query_strings: false,
            links_local_buffer: default_links_local_buffer(),
            endless_crawling: false,
        }
    }
}

/// Durable queue bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Activate the durable bridge instead of the pure in-memory frontier
    #[serde(default)]
    pub distributed: bool,

    /// Redis endpoint backing the durable lists
    #[serde(default = "default_queue_url")]
    pub url: String,

    /// Pending-list key; the in-flight list is `<name>:inflight`
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Bounded wait for a pop, in seconds; expiry means "no data"
    #[serde(rename = "pop-timeout", default = "default_pop_timeout")]
    pub pop_timeout: u64,

    /// Pending-list length beyond which pushes are shed
    #[serde(rename = "max-pending", default = "default_max_pending")]
    pub max_pending: usize,

    /// Links imported from the storage checkpoint per refill attempt
    #[serde(rename = "refill-batch", default = "default_refill_batch")]
    pub refill_batch: usize,

    /// Keep any existing lists when connecting instead of clearing them
    #[serde(rename = "preserve-on-start", default)]
    pub preserve_on_start: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            distributed: false,
            url: default_queue_url(),
            name: default_queue_name(),
            pop_timeout: default_pop_timeout(),
            max_pending: default_max_pending(),
            refill_batch: default_refill_batch(),
            preserve_on_start: false,
        }
    }
}

/// Storage engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the sharded store; absent means the in-memory
    /// backend
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Pending-link set size at which a checkpoint batch file is flushed
    #[serde(rename = "links-batch-size", default = "default_links_batch_size")]
    pub links_batch_size: usize,

    /// Path-regex to storage-prefix routing for physically segregated
    /// sub-crawls
    #[serde(default)]
    pub buckets: Vec<BucketEntry>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            links_batch_size: default_links_batch_size(),
            buckets: Vec::new(),
        }
    }
}

/// One bucket routing rule: URL paths matching `pattern` are stored under
/// `<root>/<prefix>` instead of directly under the root.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketEntry {
    pub pattern: String,
    pub prefix: String,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_agent_version")]
    pub version: String,
}

impl UserAgentConfig {
    pub fn header_value(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            version: default_agent_version(),
        }
    }
}

fn default_threads() -> usize {
    4
}

fn default_redirect_limit() -> u32 {
    5
}

fn default_links_local_buffer() -> usize {
    50
}

fn default_queue_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_queue_name() -> String {
    "driftnet".to_string()
}

fn default_pop_timeout() -> u64 {
    5
}

fn default_max_pending() -> usize {
    2500
}

fn default_refill_batch() -> usize {
    200
}

fn default_links_batch_size() -> usize {
    5000
}

fn default_agent_name() -> String {
    "driftnet".to_string()
}

fn default_agent_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
