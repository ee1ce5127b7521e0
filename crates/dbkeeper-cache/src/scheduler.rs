//! Warmup scheduling
//!
//! A bounded queue feeds one consumer task that builds mirrors one at a time.
//! Enqueueing never waits: when the queue is full the request is dropped and
//! counted, since the reader that asked already has its answer from the store.

use std::sync::Arc;

use dbkeeper_store::ResourceKind;
use parking_lot::Mutex;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{CacheError, Result},
    metrics::CacheMetrics,
    registry::CacheRegistry,
};

/// Bounded, non-blocking queue of warmup requests
pub struct WarmupScheduler {
    sender: mpsc::Sender<ResourceKind>,
    receiver: Mutex<Option<mpsc::Receiver<ResourceKind>>>,
    capacity: usize,
    metrics: CacheMetrics,
}

impl WarmupScheduler {
    pub fn new(capacity: usize, metrics: CacheMetrics) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            capacity,
            metrics,
        }
    }

    /// Ask for `kind` to be warmed; `false` if the request was not queued
    pub fn request(&self, kind: ResourceKind) -> bool {
        match self.sender.try_send(kind) {
            Ok(()) => {
                self.metrics.record_warmup_enqueued();
                true
            }
            Err(TrySendError::Full(kind)) => {
                self.metrics.record_warmup_dropped();
                warn!(
                    %kind,
                    capacity = self.capacity,
                    dropped = self.metrics.warmups_dropped(),
                    "Warmup queue full, dropping request"
                );
                false
            }
            Err(TrySendError::Closed(kind)) => {
                debug!(%kind, "Warmup queue closed, ignoring request");
                false
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Requests waiting for the consumer
    pub fn pending(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    /// Spawn the consumer; fails if it was spawned before
    pub(crate) fn spawn_worker(
        &self,
        registry: Arc<CacheRegistry>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let mut receiver = self.receiver.lock().take().ok_or(CacheError::AlreadyStarted)?;

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = receiver.recv() => match next {
                        Some(kind) => {
                            // Failures are logged and counted by the registry
                            let _ = registry.warmup(&kind).await;
                        }
                        None => break,
                    },
                }
            }
            receiver.close();
            info!("Warmup scheduler shutting down");
        }))
    }
}

#[cfg(test)]
mod tests {
    use dbkeeper_store::kinds::{BACKUP, CLUSTER};

    use super::*;

    #[test]
    fn test_overflow_is_dropped_and_counted() {
        let metrics = CacheMetrics::new();
        let scheduler = WarmupScheduler::new(4, metrics.clone());

        let accepted = (0..10).filter(|_| scheduler.request(CLUSTER)).count();

        assert_eq!(accepted, 4);
        assert_eq!(scheduler.pending(), 4);
        let stats = metrics.snapshot();
        assert_eq!(stats.warmups_enqueued, 4);
        assert_eq!(stats.warmups_dropped, 6);
    }

    #[test]
    fn test_closed_queue_is_not_counted_as_drop() {
        let metrics = CacheMetrics::new();
        let scheduler = WarmupScheduler::new(4, metrics.clone());
        drop(scheduler.receiver.lock().take());

        assert!(!scheduler.request(BACKUP));
        assert_eq!(metrics.snapshot().warmups_dropped, 0);
    }
}
