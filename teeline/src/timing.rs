//! Precise scheduled wake.
//!
//! Claiming can happen slightly ahead of a reservation's activation
//! instant (the early-claim horizon); the runner then sleeps until exactly
//! that instant before letting the agent act. A plain sleep computed once
//! can wake early under timer coarsening, so the deadline is re-checked
//! against the wall clock until it has actually passed.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Sleep until `target`, with sub-second precision. Returns immediately if
/// the instant is already past. Cancellable by dropping the future (wrap in
/// `tokio::select!` or `tokio::time::timeout` for a supervised wait).
pub async fn wake_at(target: DateTime<Utc>) {
    loop {
        let now = Utc::now();
        if now >= target {
            return;
        }
        let remaining = (target - now)
            .to_std()
            .unwrap_or(Duration::from_millis(1));
        tokio::time::sleep(remaining).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn returns_immediately_for_past_instants() {
        let started = std::time::Instant::now();
        wake_at(Utc::now() - ChronoDuration::seconds(5)).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn wakes_at_or_after_the_target() {
        let target = Utc::now() + ChronoDuration::milliseconds(80);
        wake_at(target).await;
        assert!(Utc::now() >= target);
    }

    #[tokio::test]
    async fn is_cancellable_by_a_supervising_timeout() {
        let far_future = Utc::now() + ChronoDuration::hours(1);
        let result = tokio::time::timeout(Duration::from_millis(30), wake_at(far_future)).await;
        assert!(result.is_err());
    }
}
