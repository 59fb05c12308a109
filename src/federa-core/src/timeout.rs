//! Timeout budgets.
//!
//! Every query carries a budget. Combinators start a [`TimeoutBudget`] on
//! entry and hand each sub-call whatever is left, so a call chain never
//! spends more than the caller granted.

use std::time::{Duration, Instant};

use common_error::{FederaError, FederaResult};

/// Remaining-time tracker for one call.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutBudget {
    started: Instant,
    total: Duration,
}

impl TimeoutBudget {
    /// Start tracking a budget now.
    pub fn start(total: Duration) -> Self {
        Self {
            started: Instant::now(),
            total,
        }
    }

    /// Time left, or `Timeout` once the budget is used up.
    pub fn remaining(&self) -> FederaResult<Duration> {
        match self.total.checked_sub(self.started.elapsed()) {
            Some(left) if !left.is_zero() => Ok(left),
            _ => Err(FederaError::timeout(format!(
                "budget of {} ms exhausted",
                self.total.as_millis()
            ))),
        }
    }

    /// Time left, saturating at zero.
    pub fn remaining_or_zero(&self) -> Duration {
        self.total.saturating_sub(self.started.elapsed())
    }

    /// Time spent so far.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The budget granted at start.
    pub fn total(&self) -> Duration {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_times_out() {
        let budget = TimeoutBudget::start(Duration::ZERO);
        assert!(budget.remaining().unwrap_err().is_timeout());
        assert_eq!(budget.remaining_or_zero(), Duration::ZERO);
    }

    #[test]
    fn test_remaining_shrinks() {
        let budget = TimeoutBudget::start(Duration::from_secs(60));
        let first = budget.remaining().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = budget.remaining().unwrap();
        assert!(second < first);
        assert!(first <= budget.total());
    }

    #[test]
    fn test_expired_budget() {
        let budget = TimeoutBudget::start(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(budget.remaining().is_err());
    }
}
