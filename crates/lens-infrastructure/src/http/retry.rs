use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Network attempts per fetch call.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
    /// Network attempts per fingerprint across every run sharing the cache.
    pub max_total_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(6),
            max_total_attempts: 6,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Attempts allowed for the next fetch given what the fingerprint has
    /// already spent.
    pub fn attempts_allowed(&self, spent: u32) -> u32 {
        self.max_attempts
            .min(self.max_total_attempts.saturating_sub(spent))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    /// Waiting to issue retry `n` (1-based).
    Retrying(u32),
    Succeeded(u32),
    Failed(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    Backoff(Duration),
    GiveUp,
}

/// Bounded-attempt state machine: Pending -> Retrying(n) -> Succeeded | Failed.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    policy: RetryPolicy,
    limit: u32,
    attempts: u32,
    state: RetryState,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy, limit: u32) -> Self {
        Self {
            policy,
            limit,
            attempts: 0,
            state: RetryState::Pending,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Claims the next attempt, or `None` once the tracker is finished or the
    /// limit is spent.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        match self.state {
            RetryState::Pending | RetryState::Retrying(_) if self.attempts < self.limit => {
                self.attempts += 1;
                Some(self.attempts)
            }
            RetryState::Pending | RetryState::Retrying(_) => {
                self.state = RetryState::Failed(self.attempts);
                None
            }
            RetryState::Succeeded(_) | RetryState::Failed(_) => None,
        }
    }

    pub fn succeed(&mut self) {
        self.state = RetryState::Succeeded(self.attempts);
    }

    pub fn fail(&mut self, transient: bool) -> RetryStep {
        if transient && self.attempts < self.limit {
            self.state = RetryState::Retrying(self.attempts);
            RetryStep::Backoff(self.policy.backoff(self.attempts))
        } else {
            self.state = RetryState::Failed(self.attempts);
            RetryStep::GiveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RetryPolicy, RetryState, RetryStep, RetryTracker};
    use std::time::Duration;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(6));
        assert_eq!(policy.backoff(40), Duration::from_secs(6));
    }

    #[test]
    fn transient_failures_retry_until_limit() {
        let mut tracker = RetryTracker::new(RetryPolicy::default(), 3);
        assert_eq!(tracker.state(), RetryState::Pending);
        assert_eq!(tracker.begin_attempt(), Some(1));
        assert_eq!(tracker.fail(true), RetryStep::Backoff(Duration::from_secs(1)));
        assert_eq!(tracker.state(), RetryState::Retrying(1));
        assert_eq!(tracker.begin_attempt(), Some(2));
        assert!(matches!(tracker.fail(true), RetryStep::Backoff(_)));
        assert_eq!(tracker.begin_attempt(), Some(3));
        assert_eq!(tracker.fail(true), RetryStep::GiveUp);
        assert_eq!(tracker.state(), RetryState::Failed(3));
        assert_eq!(tracker.begin_attempt(), None);
    }

    #[test]
    fn non_transient_failure_stops_immediately() {
        let mut tracker = RetryTracker::new(RetryPolicy::default(), 3);
        tracker.begin_attempt();
        assert_eq!(tracker.fail(false), RetryStep::GiveUp);
        assert_eq!(tracker.state(), RetryState::Failed(1));
    }

    #[test]
    fn success_is_terminal() {
        let mut tracker = RetryTracker::new(RetryPolicy::default(), 3);
        tracker.begin_attempt();
        tracker.succeed();
        assert_eq!(tracker.state(), RetryState::Succeeded(1));
        assert_eq!(tracker.begin_attempt(), None);
    }

    #[test]
    fn lifetime_budget_limits_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            max_total_attempts: 4,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.attempts_allowed(0), 3);
        assert_eq!(policy.attempts_allowed(3), 1);
        assert_eq!(policy.attempts_allowed(4), 0);
        assert_eq!(policy.attempts_allowed(9), 0);

        let mut exhausted = RetryTracker::new(policy, 0);
        assert_eq!(exhausted.begin_attempt(), None);
        assert_eq!(exhausted.state(), RetryState::Failed(0));
    }
}
