//! Configuration module for driftnet
//!
//! Handles loading, parsing, and validating TOML configuration files.
//! Every recognized option carries a typed default; the loaded `Config`
//! is frozen behind an `Arc` before the crawl starts and never mutated
//! afterwards.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{BucketEntry, Config, CrawlerConfig, QueueConfig, StorageConfig, UserAgentConfig};
