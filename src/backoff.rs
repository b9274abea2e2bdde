use std::time::Duration;

/// Exponential backoff between attempts of a retrying task.
///
/// delay(attempt) = unit * base^attempt, with attempt 0 being the wait after
/// the first failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: u32,
    pub unit: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: 2,
            unit: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    pub fn new(base: u32, unit: Duration) -> Self {
        Self { base, unit }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(self.base.saturating_pow(attempt))
    }
}

/// Whole milliseconds in `delay`, clamped to `u64::MAX`.
pub fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
