//! Storage contract and error types

use crate::page::Page;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid bucket pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Corrupt record for {url}: {message}")]
    Corrupt { url: String, message: String },

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Contract for page storage backends
///
/// Implementations must be safe for concurrent use; in particular
/// `mark_pending` is called from link-discovery producers and must keep
/// the "at most one entry per URL" invariant under arbitrary
/// interleaving. Reads for a missing key return `Ok(None)`, never an
/// error.
pub trait Storage: Send + Sync {
    /// Loads the page stored under `url`, or `None` when absent.
    fn get(&self, url: &str) -> StorageResult<Option<Page>>;

    /// Stores `page` under `url`, replacing any previous entry.
    fn put(&self, url: &str, page: &Page) -> StorageResult<()>;

    /// Removes and returns the entry under `url`.
    fn delete(&self, url: &str) -> StorageResult<Option<Page>>;

    /// True when any entry (pending or fetched) exists for `url`.
    fn has(&self, url: &str) -> StorageResult<bool>;

    /// Records a pending placeholder for `url` unless an entry already
    /// exists. Returns true when the URL was newly recorded.
    fn mark_pending(&self, url: &str) -> StorageResult<bool>;

    /// Hands back up to `limit` checkpointed pending links, draining the
    /// in-memory set before consuming persisted batches. `None` means no
    /// links are available anywhere.
    fn load_links(&self, limit: usize) -> StorageResult<Option<Vec<String>>>;

    /// Flushes any buffered state; called once when the crawl ends.
    fn close(&self) -> StorageResult<()>;

    /// Number of stored entries. Backends without cheap enumeration
    /// refuse with `Unsupported`.
    fn len(&self) -> StorageResult<usize> {
        Err(StorageError::Unsupported("len"))
    }

    /// All stored URLs. Backends without cheap enumeration refuse with
    /// `Unsupported`.
    fn keys(&self) -> StorageResult<Vec<String>> {
        Err(StorageError::Unsupported("keys"))
    }
}
