//! Per-artifact time budget, checked cooperatively by long-running stages.

use std::time::{Duration, Instant};

use thiserror::Error;

/// Raised when a stage notices its budget has run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("time budget of {budget_ms} ms exceeded")]
pub struct TimedOut {
    pub budget_ms: u64,
}

/// A point in time after which work on the current artifact must stop.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn unbounded() -> Self {
        Self { started: Instant::now(), budget: None }
    }

    pub fn after(budget: Duration) -> Self {
        Self { started: Instant::now(), budget: Some(budget) }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self) -> Result<(), TimedOut> {
        match self.budget {
            Some(budget) if self.started.elapsed() >= budget => {
                Err(TimedOut { budget_ms: budget.as_millis() as u64 })
            }
            _ => Ok(()),
        }
    }

    /// Check only every `stride` calls; `counter` is owned by the caller's loop.
    pub fn check_every(&self, counter: &mut usize, stride: usize) -> Result<(), TimedOut> {
        *counter += 1;
        if *counter % stride.max(1) == 0 {
            self.check()
        } else {
            Ok(())
        }
    }
}
