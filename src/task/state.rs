use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one retrying task.
///
/// Pending → Acquiring → Calling → Succeeded
///                          └→ RetryWaiting → Acquiring
///                          └→ Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Acquiring,
    Calling,
    RetryWaiting,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "PENDING"),
            TaskState::Acquiring => write!(f, "ACQUIRING"),
            TaskState::Calling => write!(f, "CALLING"),
            TaskState::RetryWaiting => write!(f, "RETRY_WAITING"),
            TaskState::Succeeded => write!(f, "SUCCEEDED"),
            TaskState::Failed => write!(f, "FAILED"),
        }
    }
}

impl TaskState {
    /// Whether `next` is a legal successor of `self`.
    pub fn allows(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Acquiring)
                | (Acquiring, Calling)
                | (Calling, Succeeded)
                | (Calling, RetryWaiting)
                | (Calling, Failed)
                | (RetryWaiting, Acquiring)
        )
    }
}

/// Per-task retry bookkeeping. Lives only for one task execution.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempts: u32,
    pub max_retries: u32,
    pub state: TaskState,
}

impl RetryState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempts: 0,
            max_retries,
            state: TaskState::Pending,
        }
    }

    /// Move to `next`, counting an attempt on every entry into `Calling`.
    pub fn enter(&mut self, next: TaskState) {
        debug_assert!(
            self.state.allows(next),
            "illegal task transition {} -> {next}",
            self.state
        );
        tracing::trace!(from = %self.state, to = %next, "task transition");
        self.state = next;
        if next == TaskState::Calling {
            self.attempts += 1;
        }
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempts >= self.max_retries
    }
}
