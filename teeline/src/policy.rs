//! Retry and failure-classification policy.

use crate::agent::BookingFailure;

/// Bounded-retry configuration for booking attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of claims before a transient failure becomes terminal.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// What to do with a locked reservation after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Back to pending; the surviving lock throttles the next attempt.
    Requeue,
    /// Terminal failure.
    Fail,
}

impl RetryPolicy {
    /// Classify a failure given how many claims the entity has consumed.
    /// `retry_count` is the count *including* the attempt that just failed.
    pub fn classify(&self, failure: &BookingFailure, retry_count: u32) -> Disposition {
        match failure {
            // No slot in the window: retrying cannot help.
            BookingFailure::NoSlotInWindow => Disposition::Fail,
            BookingFailure::Transient(_) if retry_count < self.max_retries => Disposition::Requeue,
            BookingFailure::Transient(_) => Disposition::Fail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> BookingFailure {
        BookingFailure::Transient("element not found: .teetime_button".into())
    }

    #[test]
    fn transient_failures_requeue_while_budget_remains() {
        let policy = RetryPolicy { max_retries: 3 };
        assert_eq!(policy.classify(&transient(), 1), Disposition::Requeue);
        assert_eq!(policy.classify(&transient(), 2), Disposition::Requeue);
    }

    #[test]
    fn transient_failure_on_final_attempt_is_terminal() {
        let policy = RetryPolicy { max_retries: 3 };
        assert_eq!(policy.classify(&transient(), 3), Disposition::Fail);
        assert_eq!(policy.classify(&transient(), 4), Disposition::Fail);
    }

    #[test]
    fn no_slot_short_circuits_regardless_of_budget() {
        let policy = RetryPolicy { max_retries: 3 };
        assert_eq!(
            policy.classify(&BookingFailure::NoSlotInWindow, 1),
            Disposition::Fail
        );
    }
}
