//! Backoff schedule for provider rate-limit responses.
//!
//! The policy only selects a duration; callers decide how (and whether) to
//! realize the wait, which keeps the policy pure and testable.

use std::time::Duration;

use crate::config::Mode;

/// Escalating wait schedule indexed by consecutive-failure count, plateauing
/// at the final entry.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    schedule: Vec<Duration>,
}

impl BackoffPolicy {
    /// Escalating schedule: 10 min, 30 min, 1 h, 2 h.
    pub fn escalating() -> Self {
        Self {
            schedule: vec![
                Duration::from_secs(10 * 60),
                Duration::from_secs(30 * 60),
                Duration::from_secs(60 * 60),
                Duration::from_secs(2 * 60 * 60),
            ],
        }
    }

    /// Flat one-hour schedule used outside of production.
    pub fn flat() -> Self {
        Self {
            schedule: vec![Duration::from_secs(60 * 60)],
        }
    }

    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Production => Self::escalating(),
            Mode::Development => Self::flat(),
        }
    }

    /// Wait duration for the given consecutive-failure attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        debug_assert!(!self.schedule.is_empty());
        let index = (attempt.saturating_sub(1) as usize).min(self.schedule.len() - 1);
        self.schedule[index]
    }

    pub fn max_delay(&self) -> Duration {
        *self
            .schedule
            .last()
            .unwrap_or(&Duration::from_secs(60 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalates_then_plateaus() {
        let policy = BackoffPolicy::escalating();

        assert_eq!(policy.delay_for(1), Duration::from_secs(600));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1800));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3600));
        assert_eq!(policy.delay_for(4), Duration::from_secs(7200));
        // Past the end: still the maximum, not an index error
        assert_eq!(policy.delay_for(5), Duration::from_secs(7200));
        assert_eq!(policy.delay_for(100), policy.max_delay());
    }

    #[test]
    fn test_monotone_non_decreasing() {
        let policy = BackoffPolicy::escalating();
        let mut previous = Duration::ZERO;
        for attempt in 1..10 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_flat_schedule() {
        let policy = BackoffPolicy::flat();
        assert_eq!(policy.delay_for(1), Duration::from_secs(3600));
        assert_eq!(policy.delay_for(7), Duration::from_secs(3600));
    }

    #[test]
    fn test_attempt_zero_clamps_to_first() {
        let policy = BackoffPolicy::escalating();
        assert_eq!(policy.delay_for(0), Duration::from_secs(600));
    }
}
