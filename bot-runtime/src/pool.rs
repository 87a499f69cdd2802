//! External task pools for dispatch.
//!
//! [`TaskPool`] is the seam for submit-and-forget execution; [`BoundedTaskPool`] is a
//! capacity-limited implementation on tokio. A rejected submission is reported and the update is
//! dropped, so nothing is buffered beyond the queue and the pool's own capacity.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::task::TaskTracker;

use crate::error::SubmitError;

/// Pool that accepts dispatch tasks.
pub trait TaskPool: Send + Sync {
    fn is_closed(&self) -> bool;

    /// Starts `task` or rejects it immediately; never waits for capacity.
    fn submit(&self, task: BoxFuture<'static, ()>) -> Result<(), SubmitError>;
}

/// Runs at most `capacity` tasks at once; submissions beyond that are rejected as saturated.
pub struct BoundedTaskPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    capacity: usize,
}

impl BoundedTaskPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            tracker: TaskTracker::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks currently running.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Rejects further submissions; running tasks continue.
    pub fn close(&self) {
        self.permits.close();
        self.tracker.close();
    }

    /// Waits until the pool is closed and every task has finished.
    pub async fn wait(&self) {
        self.tracker.wait().await
    }
}

impl TaskPool for BoundedTaskPool {
    fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    fn submit(&self, task: BoxFuture<'static, ()>) -> Result<(), SubmitError> {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(SubmitError::Closed),
            Err(TryAcquireError::NoPermits) => return Err(SubmitError::Saturated),
        };
        self.tracker.spawn(async move {
            let _permit = permit;
            task.await;
        });
        Ok(())
    }
}
