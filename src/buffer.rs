//! Shared staging area between completing tasks and durable storage.

use std::mem;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::sink::{OutputRecord, RecordSink};

/// Arrival-ordered records plus the sink they drain into.
///
/// A single mutex guards append, the threshold check and flush-and-clear, so
/// no record can slip between a flush and the clear that follows it.
pub struct ResultBuffer<S> {
    state: Mutex<BufferState<S>>,
    flush_threshold: usize,
}

struct BufferState<S> {
    pending: Vec<OutputRecord>,
    sink: S,
    flushed_records: usize,
    flushed_batches: usize,
}

impl<S: RecordSink> BufferState<S> {
    fn flush(&mut self) -> Result<usize, StorageError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let batch = mem::take(&mut self.pending);
        let sink = &mut self.sink;
        if let Err(err) = blocking(|| sink.write_batch(&batch)) {
            // Keep the records; the caller decides what to do with a failed flush.
            self.pending = batch;
            return Err(err);
        }
        self.flushed_records += batch.len();
        self.flushed_batches += 1;
        debug!(
            records = batch.len(),
            total = self.flushed_records,
            "flushed batch"
        );
        Ok(batch.len())
    }
}

/// Sink writes are synchronous file I/O. On a multi-thread runtime the worker
/// hands its other tasks off while the write runs; a current-thread runtime
/// has nowhere to hand them, so the write runs inline.
fn blocking<T>(write: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(write),
        _ => write(),
    }
}

impl<S: RecordSink> ResultBuffer<S> {
    /// A threshold of 0 is treated as 1 (flush on every append).
    pub fn new(sink: S, flush_threshold: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                pending: Vec::new(),
                sink,
                flushed_records: 0,
                flushed_batches: 0,
            }),
            flush_threshold: flush_threshold.max(1),
        }
    }

    /// Appends a record and flushes if the buffer reached the threshold.
    pub async fn append(&self, record: OutputRecord) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.pending.push(record);
        self.flush_if_full(&mut state)
    }

    fn flush_if_full(&self, state: &mut BufferState<S>) -> Result<(), StorageError> {
        if state.pending.len() >= self.flush_threshold {
            state.flush()?;
        }
        Ok(())
    }

    /// Writes whatever is still buffered, regardless of the threshold.
    /// Returns the number of records written.
    pub async fn flush_remaining(&self) -> Result<usize, StorageError> {
        self.state.lock().await.flush()
    }

    #[cfg(test)]
    pub async fn pending(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// `(records, batches)` written to the sink so far.
    pub async fn flushed(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.flushed_records, state.flushed_batches)
    }
}
