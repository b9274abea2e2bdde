use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::backoff::{self, Backoff};
use crate::error::BatchError;
use crate::limiter::ConcurrencyLimiter;
use crate::openai::CompletionClient;

use super::item::{Completion, Outcome, WorkItem};
use super::state::{RetryState, TaskState};

/// Turns one work item into an outcome with bounded retries.
///
/// One instance is shared (behind an `Arc`) by every task of a run; all
/// per-item state lives in the [`RetryState`] local to [`run`](Self::run).
pub struct RetryingTask<C> {
    client: Arc<C>,
    limiter: ConcurrencyLimiter,
    backoff: Backoff,
    model: String,
    max_retries: u32,
}

impl<C: CompletionClient> RetryingTask<C> {
    pub fn new(
        client: Arc<C>,
        limiter: ConcurrencyLimiter,
        backoff: Backoff,
        model: String,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            limiter,
            backoff,
            model,
            max_retries,
        }
    }

    /// Runs the item to a terminal outcome.
    ///
    /// A concurrency token is held only around the remote call, never across
    /// the backoff sleep. Exhausting retries yields `Outcome::Failure`; the
    /// only `Err` is a dispatch fault (the limiter was closed). A
    /// `max_retries` of 0 still makes one attempt.
    pub async fn run(&self, item: WorkItem) -> Result<Completion, BatchError> {
        let mut retry = RetryState::new(self.max_retries);

        loop {
            retry.enter(TaskState::Acquiring);
            let result = {
                let _token = self.limiter.acquire().await?;
                retry.enter(TaskState::Calling);
                self.client.complete(&item.prompt, &self.model).await
            };

            match result {
                Ok(text) => {
                    retry.enter(TaskState::Succeeded);
                    debug!(item = item.id, attempts = retry.attempts, "completed");
                    return Ok(Completion {
                        item,
                        outcome: Outcome::Success { text },
                        attempts: retry.attempts,
                    });
                }
                Err(err) if retry.is_last_attempt() => {
                    retry.enter(TaskState::Failed);
                    error!(
                        item = item.id,
                        prompt = %item.prompt_preview(),
                        attempts = retry.attempts,
                        error = %err,
                        "giving up after {} attempts",
                        retry.attempts
                    );
                    return Ok(Completion {
                        item,
                        outcome: Outcome::Failure {
                            reason: err.to_string(),
                        },
                        attempts: retry.attempts,
                    });
                }
                Err(err) => {
                    let delay = self.backoff.delay(retry.attempts - 1);
                    retry.enter(TaskState::RetryWaiting);
                    warn!(
                        item = item.id,
                        attempt = retry.attempts,
                        max = self.max_retries,
                        delay_ms = backoff::millis(delay),
                        error = %err,
                        "remote call failed, backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::error::OpenAiError;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Fails every call for prompts listed in `flaky` until `fail_times`
    /// calls for that prompt have happened; `None` fails forever.
    struct ScriptedClient {
        fail_times: Option<u32>,
        flaky: Vec<&'static str>,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedClient {
        fn new(fail_times: Option<u32>, flaky: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                fail_times,
                flaky,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self, prompt: &str) -> Vec<Instant> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p == prompt)
                .map(|(_, t)| *t)
                .collect()
        }
    }

    impl CompletionClient for ScriptedClient {
        async fn complete(&self, prompt: &str, _model: &str) -> Result<String, OpenAiError> {
            let seen = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((prompt.to_string(), Instant::now()));
                calls.iter().filter(|(p, _)| p == prompt).count() as u32
            };
            let failing = self.flaky.iter().any(|p| *p == prompt)
                && self.fail_times.is_none_or(|limit| seen <= limit);
            if failing {
                Err(OpenAiError::Api {
                    status: 500,
                    message: "boom".into(),
                })
            } else {
                Ok(format!("answer to {prompt}"))
            }
        }
    }

    fn task(
        client: Arc<ScriptedClient>,
        concurrency: usize,
        max_retries: u32,
    ) -> RetryingTask<ScriptedClient> {
        RetryingTask::new(
            client,
            ConcurrencyLimiter::new(concurrency),
            Backoff::default(),
            "test-model".into(),
            max_retries,
        )
    }

    fn gaps(times: &[Instant]) -> Vec<Duration> {
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_item_uses_every_attempt_with_doubling_waits() {
        let client = ScriptedClient::new(None, vec!["q"]);
        let start = Instant::now();

        let completion = task(Arc::clone(&client), 4, 4)
            .run(WorkItem::new(0, "q"))
            .await
            .unwrap();

        assert_eq!(completion.attempts, 4);
        assert!(matches!(completion.outcome, Outcome::Failure { .. }));
        assert_eq!(
            gaps(&client.call_times("q")),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        // No wait after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_third_attempt_stops_retrying() {
        let client = ScriptedClient::new(Some(2), vec!["q"]);
        let start = Instant::now();

        let completion = task(Arc::clone(&client), 4, 5)
            .run(WorkItem::new(0, "q"))
            .await
            .unwrap();

        assert_eq!(completion.attempts, 3);
        assert_eq!(
            completion.outcome,
            Outcome::Success {
                text: "answer to q".into()
            }
        );
        assert_eq!(client.call_times("q").len(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_never_sleeps() {
        let client = ScriptedClient::new(None, vec![]);
        let start = Instant::now();

        let completion = task(client, 1, 5).run(WorkItem::new(7, "q")).await.unwrap();

        assert_eq!(completion.attempts, 1);
        assert_eq!(completion.item.id, 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleep_does_not_hold_a_slot() {
        let client = ScriptedClient::new(Some(1), vec!["flaky"]);
        let task = task(Arc::clone(&client), 1, 3);

        let (flaky, steady) = tokio::join!(
            task.run(WorkItem::new(0, "flaky")),
            task.run(WorkItem::new(1, "steady"))
        );
        assert!(flaky.unwrap().outcome.is_success());
        assert!(steady.unwrap().outcome.is_success());

        let flaky_calls = client.call_times("flaky");
        let steady_calls = client.call_times("steady");
        assert_eq!(flaky_calls.len(), 2);
        // With a single slot, the steady item ran while the flaky one was backing off.
        assert!(steady_calls[0] < flaky_calls[1]);
    }

    #[tokio::test]
    async fn closed_limiter_is_a_dispatch_fault() {
        let client = ScriptedClient::new(None, vec![]);
        let task = task(client, 1, 3);
        task.limiter.close();

        let result = task.run(WorkItem::new(0, "q")).await;
        assert!(matches!(result, Err(BatchError::Dispatch(_))));
    }
}
