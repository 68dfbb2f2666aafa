//! Wall-clock budget polled cooperatively by the walk.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

/// Tracks elapsed time against an optional budget.
///
/// Purely observational: `expired()` is one monotonic clock read and one
/// comparison, so it can be polled before every entry.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    started: Instant,
    budget: Option<Duration>,
}

impl TimeoutGuard {
    /// Start the clock. `None` means unbounded.
    #[must_use]
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Budget in whole seconds; zero means unbounded.
    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self::new((secs > 0).then(|| Duration::from_secs(secs)))
    }

    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    #[must_use]
    pub fn expired(&self) -> bool {
        self.budget
            .is_some_and(|budget| self.started.elapsed() >= budget)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before expiry; `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.budget
            .map(|budget| budget.saturating_sub(self.started.elapsed()))
    }

    #[must_use]
    pub const fn budget(&self) -> Option<Duration> {
        self.budget
    }
}
