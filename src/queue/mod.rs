//! Frontier queues
//!
//! The in-process frontier is an MPMC channel shared by the orchestrator
//! (producer) and the worker pool (consumers). It tracks how many workers
//! are parked waiting on it, which is the signal the orchestrator's
//! quiescence detection spins on. The optional [`DurableQueue`] bridges
//! this frontier to a shared Redis-backed queue for distributed crawls.

mod durable;

pub use durable::{DurableQueue, QueueError};

use crate::page::LinkJob;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Message carried on the in-process frontier channel.
#[derive(Debug)]
pub enum FrontierMessage {
    Job(LinkJob),
    /// Termination sentinel; each worker exits on receiving one.
    Shutdown,
}

/// In-process frontier: unbounded MPMC channel plus a parked-worker
/// count.
#[derive(Clone)]
pub struct Frontier {
    tx: flume::Sender<FrontierMessage>,
    rx: flume::Receiver<FrontierMessage>,
    parked: Arc<AtomicUsize>,
}

impl Frontier {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            parked: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn push(&self, job: LinkJob) {
        // Send only fails when every receiver is gone, i.e. the pool
        // already shut down; the job is moot at that point.
        let _ = self.tx.send(FrontierMessage::Job(job));
    }

    /// Pushes one termination sentinel; the orchestrator sends one per
    /// worker once quiescence is established.
    pub fn push_shutdown(&self) {
        let _ = self.tx.send(FrontierMessage::Shutdown);
    }

    /// Worker-side receive. The parked count is raised for the duration
    /// of the wait so the orchestrator can observe "all workers are
    /// simultaneously blocked on the frontier".
    pub async fn recv_parked(&self) -> Option<FrontierMessage> {
        self.parked.fetch_add(1, Ordering::SeqCst);
        let message = self.rx.recv_async().await.ok();
        self.parked.fetch_sub(1, Ordering::SeqCst);
        message
    }

    /// Number of workers currently blocked waiting on the frontier.
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_and_receive() {
        let frontier = Frontier::new();
        frontier.push(LinkJob::seed("http://x.test/"));
        assert_eq!(frontier.len(), 1);

        let message = frontier.recv_parked().await.unwrap();
        assert!(matches!(message, FrontierMessage::Job(job) if job.url == "http://x.test/"));
        assert!(frontier.is_empty());
    }

    #[tokio::test]
    async fn test_parked_count_tracks_blocked_receivers() {
        let frontier = Frontier::new();
        assert_eq!(frontier.parked(), 0);

        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.recv_parked().await })
        };

        // The receiver parks once it reaches the empty channel.
        while frontier.parked() != 1 {
            tokio::task::yield_now().await;
        }

        frontier.push_shutdown();
        let message = waiter.await.unwrap().unwrap();
        assert!(matches!(message, FrontierMessage::Shutdown));
        assert_eq!(frontier.parked(), 0);
    }
}
