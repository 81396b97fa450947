//! Durable queue bridge
//!
//! Bridges the in-memory frontier to a shared Redis-backed queue so a
//! crawl can scale past one process and survive restarts. Two lists back
//! it: a pending list and an in-flight list. A pop atomically moves the
//! payload from pending to in-flight (`BRPOPLPUSH`) and removes it from
//! in-flight only after it has been read — a crash between the two steps
//! redelivers the job on restart, giving at-least-once semantics.
//!
//! The bridge favors availability over strict ordering: pushes beyond
//! the configured maximum are shed silently, and when the pending list
//! runs low it refills itself from the storage engine's checkpointed
//! link batches.

use crate::config::QueueConfig;
use crate::page::LinkJob;
use crate::storage::{Storage, StorageError};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the durable queue bridge
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Storage error during refill: {0}")]
    Storage(#[from] StorageError),
}

pub struct DurableQueue {
    conn: ConnectionManager,
    pending_key: String,
    inflight_key: String,
    pop_timeout: u64,
    max_pending: usize,
    refill_batch: usize,
    store: Option<Arc<dyn Storage>>,
}

impl DurableQueue {
    /// Connects to the configured Redis endpoint. Unless
    /// `preserve-on-start` is set, both lists are cleared so a fresh
    /// crawl does not consume a previous run's leftovers. `store`, when
    /// given, is the checkpoint source for refills.
    pub async fn connect(
        config: &QueueConfig,
        store: Option<Arc<dyn Storage>>,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;

        let queue = Self {
            conn,
            pending_key: config.name.clone(),
            inflight_key: format!("{}:inflight", config.name),
            pop_timeout: config.pop_timeout,
            max_pending: config.max_pending,
            refill_batch: config.refill_batch,
            store,
        };

        if !config.preserve_on_start {
            queue.clear().await?;
        }

        Ok(queue)
    }

    /// Appends a job to the pending list, shedding it silently when the
    /// list already holds `max-pending` entries.
    pub async fn push(&self, job: &LinkJob) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();

        let len: usize = conn.llen(&self.pending_key).await?;
        if len >= self.max_pending {
            tracing::debug!(
                "durable queue at capacity ({} entries), shedding {}",
                len,
                job.url
            );
            return Ok(());
        }

        let _: () = conn.lpush(&self.pending_key, job.encode()).await?;
        Ok(())
    }

    /// Pops one job with a bounded wait.
    ///
    /// When the pending list has dropped below a quarter of its maximum,
    /// checkpointed links are imported from the storage engine first.
    /// The pop reserves the payload on the in-flight list and deletes it
    /// after reading. Expiry of the wait returns `Ok(None)` ("no data"),
    /// and malformed payloads are skipped without surfacing an error.
    pub async fn pop(&self) -> Result<Option<LinkJob>, QueueError> {
        if self.len().await? < self.max_pending / 4 {
            self.refill().await?;
        }

        let mut conn = self.conn.clone();
        loop {
            let raw: Option<String> = redis::cmd("BRPOPLPUSH")
                .arg(&self.pending_key)
                .arg(&self.inflight_key)
                .arg(self.pop_timeout)
                .query_async(&mut conn)
                .await?;

            let Some(raw) = raw else {
                return Ok(None);
            };

            let _: () = conn.lrem(&self.inflight_key, 1, &raw).await?;

            match LinkJob::decode(&raw) {
                Some(job) => return Ok(Some(job)),
                None => {
                    tracing::debug!("skipping malformed queue payload: {}", raw);
                    continue;
                }
            }
        }
    }

    /// Imports up to `refill-batch` links from the storage engine's
    /// checkpoint into the pending list. Recovered links re-enter as
    /// depth-0 jobs because checkpoint batches store bare URLs.
    async fn refill(&self) -> Result<(), QueueError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        if let Some(links) = store.load_links(self.refill_batch)? {
            tracing::debug!("refilling durable queue with {} checkpointed links", links.len());
            for url in links {
                self.push(&LinkJob::seed(url)).await?;
            }
        }

        Ok(())
    }

    /// Pending-list length. In-flight entries are in progress, not
    /// available, and are deliberately not counted.
    pub async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(&self.pending_key).await?)
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Deletes both lists.
    pub async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(&self.pending_key).await?;
        let _: () = conn.del(&self.inflight_key).await?;
        Ok(())
    }
}
