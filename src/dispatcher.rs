//! Fans a batch of work items out over retrying tasks and collects their
//! completions in arrival order.
//!
//! Every task is spawned up front into a [`JoinSet`]; the
//! [`ConcurrencyLimiter`] alone decides how many remote calls run at once.
//! Completions are drained with `join_next`, so whichever task finishes first
//! is recorded first. Per-item problems never abort the batch: exhausted
//! retries arrive as `Outcome::Failure`, and dispatch faults (closed limiter,
//! panicking task) are logged and the item is skipped. A storage error from
//! the result buffer is the one thing that stops the run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::backoff::Backoff;
use crate::buffer::ResultBuffer;
use crate::error::BatchError;
use crate::limiter::ConcurrencyLimiter;
use crate::openai::CompletionClient;
use crate::sink::{OutputRecord, RecordSink};
use crate::task::{Completion, Outcome, RetryingTask, WorkItem};
use crate::ui::BatchProgress;

/// Per-run knobs the dispatcher hands to every retrying task.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub model: String,
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff: Backoff,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items dropped because of a dispatch fault.
    pub skipped: usize,
    /// Items abandoned because the run was interrupted.
    pub cancelled: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    fn new(run_id: String, total: usize) -> Self {
        Self {
            run_id,
            total,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            cancelled: 0,
            interrupted: false,
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, outcome: &Outcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Every item succeeded and the run was not cut short.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && !self.interrupted
    }
}

type TaskResult = Result<Completion, BatchError>;

enum Event {
    Joined(Option<Result<(Id, TaskResult), JoinError>>),
    Shutdown,
}

pub struct Dispatcher<C> {
    task: Arc<RetryingTask<C>>,
    limiter: ConcurrencyLimiter,
    run_id: String,
}

impl<C> Dispatcher<C>
where
    C: CompletionClient + Send + Sync + 'static,
{
    pub fn new(client: Arc<C>, settings: &DispatchSettings) -> Self {
        let limiter = ConcurrencyLimiter::new(settings.concurrency.max(1));
        let task = RetryingTask::new(
            client,
            limiter.clone(),
            settings.backoff,
            settings.model.clone(),
            settings.max_retries,
        );
        Self {
            task: Arc::new(task),
            limiter,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Runs every item to completion, streaming records into `buffer`.
    ///
    /// When `shutdown` resolves, outstanding tasks are cancelled, results
    /// already finished are still collected and the buffer is flushed.
    #[tracing::instrument(name = "batch", skip_all, fields(run_id = %self.run_id))]
    pub async fn run<S, F>(
        &self,
        items: Vec<WorkItem>,
        buffer: &ResultBuffer<S>,
        progress: &mut BatchProgress,
        shutdown: F,
    ) -> Result<RunSummary, BatchError>
    where
        S: RecordSink,
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut summary = RunSummary::new(self.run_id.clone(), items.len());
        let mut in_flight: HashMap<Id, (usize, String)> = HashMap::with_capacity(items.len());
        let mut join_set = JoinSet::new();

        for item in items {
            let context = (item.id, item.prompt_preview());
            let span = info_span!("item", id = item.id);
            let task = Arc::clone(&self.task);
            let handle = join_set.spawn(async move { task.run(item).await }.instrument(span));
            in_flight.insert(handle.id(), context);
        }
        info!(
            items = summary.total,
            concurrency = self.limiter.capacity(),
            "dispatching"
        );

        tokio::pin!(shutdown);
        loop {
            let event = tokio::select! {
                joined = join_set.join_next_with_id() => Event::Joined(joined),
                () = &mut shutdown, if !summary.interrupted => Event::Shutdown,
            };

            match event {
                Event::Shutdown => {
                    warn!(
                        outstanding = join_set.len(),
                        "interrupted, cancelling outstanding tasks"
                    );
                    summary.interrupted = true;
                    self.limiter.close();
                    join_set.abort_all();
                }
                Event::Joined(None) => break,
                Event::Joined(Some(joined)) => {
                    self.collect(joined, &mut in_flight, &mut summary, buffer, progress)
                        .await?;
                }
            }
        }

        buffer.flush_remaining().await?;
        let (records, batches) = buffer.flushed().await;
        summary.elapsed = started.elapsed();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            records,
            batches,
            "Elapsed time: {:.2} seconds",
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    async fn collect<S: RecordSink>(
        &self,
        joined: Result<(Id, TaskResult), JoinError>,
        in_flight: &mut HashMap<Id, (usize, String)>,
        summary: &mut RunSummary,
        buffer: &ResultBuffer<S>,
        progress: &mut BatchProgress,
    ) -> Result<(), BatchError> {
        match joined {
            Ok((id, Ok(completion))) => {
                in_flight.remove(&id);
                summary.record(&completion.outcome);
                progress.record(&completion.outcome);
                buffer
                    .append(OutputRecord::from_completion(completion, &self.run_id))
                    .await?;
            }
            Ok((id, Err(fault))) => {
                let (item, prompt) = in_flight.remove(&id).unzip();
                if summary.interrupted {
                    debug!(item = ?item, "task stopped by shutdown");
                    summary.cancelled += 1;
                } else {
                    error!(
                        item = ?item,
                        prompt = ?prompt,
                        error = %fault,
                        "dispatch fault, item skipped"
                    );
                    summary.skipped += 1;
                    progress.skip();
                }
            }
            Err(join_err) => {
                let (item, prompt) = in_flight.remove(&join_err.id()).unzip();
                if join_err.is_cancelled() {
                    debug!(item = ?item, "task cancelled");
                    summary.cancelled += 1;
                } else {
                    error!(
                        item = ?item,
                        prompt = ?prompt,
                        error = %join_err,
                        "task panicked, item skipped"
                    );
                    summary.skipped += 1;
                    progress.skip();
                }
            }
        }
        Ok(())
    }
}
