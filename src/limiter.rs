//! Admission gate bounding how many remote calls are in flight.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::BatchError;

/// Counting semaphore shared by every retrying task of a run.
///
/// Backed by `tokio::sync::Semaphore`, which hands out permits in FIFO order,
/// so a waiting task cannot starve under sustained load.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// A slot in the limiter. The slot is returned when the token is dropped.
#[derive(Debug)]
pub struct ConcurrencyToken {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits until a slot is free. Fails only after [`close`](Self::close).
    pub async fn acquire(&self) -> Result<ConcurrencyToken, BatchError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| BatchError::Dispatch("concurrency limiter closed".into()))?;
        Ok(ConcurrencyToken { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wakes all waiters with an error and rejects future acquisitions.
    /// Tokens already handed out stay valid until dropped.
    pub fn close(&self) {
        self.permits.close();
    }
}
