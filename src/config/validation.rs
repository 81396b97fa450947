use crate::config::types::{Config, CrawlerConfig, QueueConfig, StorageConfig};
use crate::ConfigError;
use regex::Regex;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_queue_config(&config.queue)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.threads < 1 {
        return Err(ConfigError::Validation(format!(
            "threads must be >= 1, got {}",
            config.threads
        )));
    }

    if !config.delay.is_finite() || config.delay < 0.0 {
        return Err(ConfigError::Validation(format!(
            "delay must be a non-negative number of seconds, got {}",
            config.delay
        )));
    }

    if config.links_local_buffer < 1 {
        return Err(ConfigError::Validation(format!(
            "links-local-buffer must be >= 1, got {}",
            config.links_local_buffer
        )));
    }

    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation(
            "queue name cannot be empty".to_string(),
        ));
    }

    if config.max_pending < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pending must be >= 1, got {}",
            config.max_pending
        )));
    }

    if config.refill_batch < 1 {
        return Err(ConfigError::Validation(format!(
            "refill-batch must be >= 1, got {}",
            config.refill_batch
        )));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.links_batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "links-batch-size must be >= 1, got {}",
            config.links_batch_size
        )));
    }

    for bucket in &config.buckets {
        Regex::new(&bucket.pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("bucket pattern '{}': {}", bucket.pattern, e))
        })?;

        if bucket.prefix.is_empty() || bucket.prefix.contains("..") || bucket.prefix.starts_with('/')
        {
            return Err(ConfigError::Validation(format!(
                "bucket prefix '{}' must be a relative path without '..'",
                bucket.prefix
            )));
        }
    }

    Ok(())
}
