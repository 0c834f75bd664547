//! Conflict-triggered retry

use crate::Error;
use tracing::info;

/// Retry budget used when neither caller nor configuration supplies one
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 10;

/// Remaining retry attempts for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    /// Create budget
    pub fn new(remaining: u32) -> Self {
        Self { remaining }
    }

    /// Attempts left
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// No attempts left
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Take one attempt from the budget
    fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS)
    }
}

/// Decides whether a failed attempt is run again
#[derive(Debug, Clone)]
pub struct RetryController {
    budget: RetryBudget,
}

impl RetryController {
    /// Create controller
    pub fn new(budget: RetryBudget) -> Self {
        Self { budget }
    }

    /// Current budget
    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    /// Only MVCC read conflicts are retried, and only while budget remains.
    /// A granted retry consumes one attempt.
    pub fn should_retry(&mut self, error: &Error) -> bool {
        if !error.is_retryable() {
            return false;
        }

        info!("Invoke retry {} times", self.budget.remaining());

        self.budget.consume()
    }
}
