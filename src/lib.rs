//! Driftnet: a concurrent web-crawling engine
//!
//! This crate implements a crawl orchestrator feeding a pool of fetch
//! workers from a frontier of link jobs, with deduplicated page storage
//! and an optional Redis-backed distributed frontier for multi-process
//! crawls.

pub mod config;
pub mod crawler;
pub mod page;
pub mod queue;
pub mod robots;
pub mod storage;

use thiserror::Error;

/// Main error type for driftnet operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Robots error: {0}")]
    Robots(#[from] robots::RobotsError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page queue closed: all workers exited unexpectedly")]
    PageQueueClosed,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid bucket pattern: {0}")]
    InvalidPattern(String),
}

/// Result type alias for driftnet operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{crawl, Crawler, Fetcher, HttpFetcher};
pub use page::{LinkJob, Page};
pub use queue::{DurableQueue, Frontier};
pub use robots::{HttpRobotsGate, RobotsGate};
pub use storage::{MemoryStore, PageStore, ShardedStore, Storage};
