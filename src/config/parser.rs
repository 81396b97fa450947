use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// The file is parsed as TOML and validated before being returned; a
/// missing or unreadable file is an error, but every option inside it is
/// optional.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Used to detect configuration drift between crawl runs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let config_content = r#"
[crawler]
threads = 8
delay = 0.5
depth-limit = 3
obey-robots-txt = true
skip-query-strings = true
links-local-buffer = 25

[queue]
distributed = true
url = "redis://queue.internal:6379"
name = "crawl-test"
max-pending = 1000

[storage]
root = "/var/crawl"
links-batch-size = 100

[[storage.buckets]]
pattern = "^/news/"
prefix = "news"

[user-agent]
name = "testbot"
version = "0.1"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.threads, 8);
        assert_eq!(config.crawler.depth_limit, Some(3));
        assert!(config.crawler.obey_robots_txt);
        assert!(config.queue.distributed);
        assert_eq!(config.queue.max_pending, 1000);
        assert_eq!(config.storage.buckets.len(), 1);
        assert_eq!(config.user_agent.header_value(), "testbot/0.1");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.threads, 4);
        assert_eq!(config.crawler.delay, 0.0);
        assert_eq!(config.crawler.depth_limit, None);
        assert_eq!(config.crawler.redirect_limit, 5);
        assert!(!config.queue.distributed);
        assert_eq!(config.queue.max_pending, 2500);
        assert_eq!(config.queue.refill_batch, 200);
        assert_eq!(config.storage.root, None);
        assert_eq!(config.storage.links_batch_size, 5000);
    }

    #[test]
    fn test_effective_threads_collapses_with_delay() {
        let file = create_temp_config("[crawler]\nthreads = 4\ndelay = 1.5\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.effective_threads(), 1);
    }

    #[test]
    fn test_effective_threads_forced() {
        let file =
            create_temp_config("[crawler]\nthreads = 4\ndelay = 1.5\nforce-threading = true\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.effective_threads(), 4);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config("[crawler]\nthreads = 0\n");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }
}
