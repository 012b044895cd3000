//! Bounded spin-then-yield retry for CAS based operations.
//!
//! Every table operation is written as a single attempt that either finishes
//! with [`Attempt::Done`] or reports that it lost a race with
//! [`Attempt::Retry`]. [`RetryPolicy::run`] re-runs the attempt with
//! exponential backoff between tries, and gives up with
//! [`TableError::Again`] once the budget is spent. No operation in this crate
//! loops without a bound.

use crossbeam_utils::Backoff;
use tracing::trace;

use crate::error::TableError;

/// The outcome of one attempt at a CAS based operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The operation reached a definitive result.
    Done(T),
    /// A transient conflict was observed, the attempt should be repeated.
    Retry,
}

impl<T> Attempt<T> {
    /// Map the result of a finished attempt.
    #[inline]
    pub fn map<U, F>(self, f: F) -> Attempt<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Attempt::Done(t) => Attempt::Done(f(t)),
            Attempt::Retry => Attempt::Retry,
        }
    }
}

/// How many attempts an operation is allowed before it reports
/// [`TableError::Again`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    budget: u32,
}

impl RetryPolicy {
    /// Create a policy allowing `budget` attempts. A budget of zero is
    /// rejected by the table builder, but here it is raised to one so that
    /// every operation is tried at least once.
    pub const fn new(budget: u32) -> Self {
        RetryPolicy {
            budget: if budget == 0 { 1 } else { budget },
        }
    }

    /// The number of attempts allowed.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Run `op` until it is done or the budget is exhausted.
    ///
    /// Between attempts the calling thread spins with an increasing number
    /// of pause hints, and starts yielding to the scheduler once spinning
    /// stops being useful.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, TableError>
    where
        F: FnMut() -> Attempt<T>,
    {
        let backoff = Backoff::new();
        for attempt in 0..self.budget {
            match op() {
                Attempt::Done(r) => return Ok(r),
                Attempt::Retry => {
                    // Don't pause after the final attempt.
                    if attempt + 1 < self.budget {
                        backoff.snooze();
                    }
                }
            }
        }
        trace!(budget = self.budget, "retry budget exhausted");
        Err(TableError::Again)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(crate::config::DEFAULT_RETRY_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::{Attempt, RetryPolicy};
    use crate::error::TableError;

    #[test]
    fn test_done_first_try() {
        let p = RetryPolicy::new(4);
        let mut calls = 0;
        let r = p.run(|| {
            calls += 1;
            Attempt::Done(7)
        });
        assert_eq!(r, Ok(7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_done_after_retries() {
        let p = RetryPolicy::new(8);
        let mut calls = 0;
        let r = p.run(|| {
            calls += 1;
            if calls < 5 {
                Attempt::Retry
            } else {
                Attempt::Done(calls)
            }
        });
        assert_eq!(r, Ok(5));
    }

    #[test]
    fn test_budget_exhausted() {
        let p = RetryPolicy::new(3);
        let mut calls = 0;
        let r: Result<(), _> = p.run(|| {
            calls += 1;
            Attempt::Retry
        });
        assert_eq!(r, Err(TableError::Again));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_zero_budget_raised() {
        let p = RetryPolicy::new(0);
        assert_eq!(p.budget(), 1);
        let mut calls = 0;
        let r: Result<(), _> = p.run(|| {
            calls += 1;
            Attempt::Retry
        });
        assert_eq!(r, Err(TableError::Again));
        assert_eq!(calls, 1);
    }
}
