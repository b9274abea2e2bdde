mod item;
mod retry;
mod state;

pub use item::{Completion, Outcome, WorkItem};
pub use retry::RetryingTask;
