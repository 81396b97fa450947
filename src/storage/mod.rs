//! Storage module: page persistence and the deduplicating page store
//!
//! Two backends implement the [`Storage`] contract: [`ShardedStore`]
//! (content-addressed filesystem layout, survives restarts, feeds the
//! durable queue's refill) and [`MemoryStore`] (the default when no
//! storage root is configured). [`PageStore`] is the thin deduplicating
//! facade the orchestrator works through.

mod memory;
mod sharded;
mod traits;

pub use memory::MemoryStore;
pub use sharded::ShardedStore;
pub use traits::{Storage, StorageError, StorageResult};

use crate::page::Page;
use std::sync::Arc;

/// Deduplicating map from URL to page record
///
/// Presence of any entry — a pending placeholder or a fetched page —
/// means "do not re-enqueue this URL". `mark_pending` is safe to call
/// from concurrent link-discovery producers; the check-and-set runs
/// inside the backend, so each URL is recorded exactly once no matter
/// how the calls interleave.
#[derive(Clone)]
pub struct PageStore {
    storage: Arc<dyn Storage>,
}

impl PageStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Direct access to the backing engine (the queue bridge uses its
    /// checkpoint interface).
    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    /// True when the URL has been seen, fetched or not.
    pub fn has(&self, url: &str) -> StorageResult<bool> {
        self.storage.has(url)
    }

    /// Records a pending placeholder; no effect if the URL is already
    /// present. Returns whether the URL was newly recorded.
    pub fn mark_pending(&self, url: &str) -> StorageResult<bool> {
        self.storage.mark_pending(url)
    }

    /// Stores a fetched page under its own URL.
    pub fn put(&self, page: &Page) -> StorageResult<()> {
        self.storage.put(page.url.as_str(), page)
    }

    pub fn get(&self, url: &str) -> StorageResult<Option<Page>> {
        self.storage.get(url)
    }

    /// Entry count; `Unsupported` for backends without enumeration.
    pub fn len(&self) -> StorageResult<usize> {
        self.storage.len()
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Stored URLs; `Unsupported` for backends without enumeration.
    pub fn keys(&self) -> StorageResult<Vec<String>> {
        self.storage.keys()
    }

    /// Flushes the backing engine's buffered checkpoints.
    pub fn close(&self) -> StorageResult<()> {
        self.storage.close()
    }
}
