//! Poller: the single long-lived retrieval loop.
//!
//! Requests batches from the [`UpdateSource`] starting at `offset`, pushes every update with
//! `id >= offset` onto the bounded queue and advances `offset` to `id + 1` once the queue has
//! accepted it. A full queue blocks the poller, throttling retrieval to consumption. Retrieval
//! errors are reported and retried after a fixed pause; only cancellation ends the loop.
//!
//! The offset is owned by the poller (single writer). The runtime reads a mirror of it through
//! [`OffsetHandle`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dbot_core::{GetUpdates, Update, UpdateSource};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::RuntimeConfig;
use crate::error::DispatchError;
use crate::handler::ErrorHandler;

/// Read-only view of the poller's offset.
#[derive(Clone, Debug, Default)]
pub struct OffsetHandle(Arc<AtomicI64>);

impl OffsetHandle {
    pub fn new(offset: i64) -> Self {
        Self(Arc::new(AtomicI64::new(offset)))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, offset: i64) {
        self.0.store(offset, Ordering::Release);
    }
}

/// Retrieval loop feeding the bounded queue.
pub struct Poller {
    source: Arc<dyn UpdateSource>,
    queue: mpsc::Sender<Update>,
    root: CancellationToken,
    errors: Arc<dyn ErrorHandler>,
    offset: i64,
    mirror: OffsetHandle,
    limit: u8,
    timeout_secs: u32,
    allowed_updates: Vec<String>,
    retry_delay: Duration,
}

impl Poller {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        queue: mpsc::Sender<Update>,
        root: CancellationToken,
        errors: Arc<dyn ErrorHandler>,
        config: &RuntimeConfig,
    ) -> Self {
        let mirror = OffsetHandle::new(config.initial_offset);
        Self {
            source,
            queue,
            root,
            errors,
            offset: config.initial_offset,
            mirror,
            limit: config.poll_limit,
            timeout_secs: config.poll_timeout_secs,
            allowed_updates: config.allowed_updates.clone(),
            retry_delay: config.poll_retry_delay,
        }
    }

    /// Shares an existing mirror so callers can read the offset after the poller moves into its task.
    pub fn with_offset_handle(mut self, mirror: OffsetHandle) -> Self {
        mirror.set(self.offset);
        self.mirror = mirror;
        self
    }

    pub fn offset_handle(&self) -> OffsetHandle {
        self.mirror.clone()
    }

    /// Runs until the root token is canceled; returns the final offset.
    #[instrument(skip(self), fields(offset = self.offset))]
    pub async fn run(mut self) -> i64 {
        info!("poller started");
        while !self.root.is_cancelled() {
            let request = GetUpdates {
                offset: self.offset,
                limit: self.limit,
                timeout_secs: self.timeout_secs,
                allowed_updates: self.allowed_updates.clone(),
            };

            let batch = tokio::select! {
                biased;
                _ = self.root.cancelled() => break,
                batch = self.source.get_updates(&request) => batch,
            };

            match batch {
                Ok(updates) => {
                    if !self.enqueue(updates).await {
                        break;
                    }
                }
                Err(e) if e.is_canceled() => break,
                Err(e) => {
                    warn!(error = %e, offset = self.offset, "get updates failed, retrying");
                    self.errors.handle_error(DispatchError::Poll(e));
                    tokio::select! {
                        biased;
                        _ = self.root.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
        info!(offset = self.offset, "poller stopped");
        self.offset
    }

    /// Pushes a batch onto the queue. Returns false when the loop must stop (canceled or queue closed).
    async fn enqueue(&mut self, updates: Vec<Update>) -> bool {
        for update in updates {
            let id = update.id;
            if id < self.offset {
                debug!(update_id = id, offset = self.offset, "skipping already acknowledged update");
                continue;
            }

            let accepted = tokio::select! {
                biased;
                _ = self.root.cancelled() => return false,
                sent = self.queue.send(update) => sent.is_ok(),
            };
            if !accepted {
                warn!(update_id = id, "update queue closed, stopping poller");
                return false;
            }

            self.offset = id + 1;
            self.mirror.set(self.offset);
            debug!(update_id = id, offset = self.offset, "update enqueued");
        }
        true
    }
}
