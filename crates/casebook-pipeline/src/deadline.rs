//! Run-wide deadline

use std::future::Future;
use std::time::Duration;

use tokio::time::{error::Elapsed, Instant};

/// One wall-clock instant every awaited call of a run races against
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Total budget the run was given
    #[inline]
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left, zero once passed
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Await `fut` unless the deadline passes first
    ///
    /// # Errors
    /// [`Elapsed`] when the deadline is reached before `fut` completes.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Elapsed> {
        tokio::time::timeout_at(self.at, fut).await
    }

    /// Message used when a run is cut off
    #[must_use]
    pub fn exceeded_message(&self) -> String {
        format!("deadline of {}s exceeded", self.budget.as_secs())
    }
}
