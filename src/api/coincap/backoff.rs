use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    /// Attempt number after which the delay stops growing.
    pub cap_attempt: u32,
    /// Retries on the growing schedule before falling back to `long_interval`.
    pub max_attempts: u32,
    pub long_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            cap_attempt: 5,
            max_attempts: 10,
            long_interval: Duration::from_millis(60_000),
        }
    }
}

/// Reconnect delay schedule: `base_delay * min(attempt, cap_attempt)` for the
/// first `max_attempts` retries, then `long_interval` until `reset`.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn next_delay(&mut self) -> Duration {
        if self.is_exhausted() {
            return self.policy.long_interval;
        }
        self.attempts += 1;
        let factor = self.attempts.min(self.policy.cap_attempt).max(1);
        self.policy.base_delay * factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(delays: &[Duration]) -> Vec<u128> {
        delays.iter().map(Duration::as_millis).collect()
    }

    #[test]
    fn linear_growth_capped_then_long_interval() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        let delays: Vec<Duration> = (0..13).map(|_| backoff.next_delay()).collect();

        assert_eq!(
            millis(&delays),
            vec![
                3000, 6000, 9000, 12000, 15000, 15000, 15000, 15000, 15000, 15000, 60000, 60000,
                60000
            ]
        );
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.attempts(), 10);
    }

    #[test]
    fn reset_restarts_schedule() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        for _ in 0..12 {
            backoff.next_delay();
        }
        backoff.reset();

        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn custom_policy() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            base_delay: Duration::from_millis(100),
            cap_attempt: 2,
            max_attempts: 3,
            long_interval: Duration::from_secs(1),
        });
        let delays: Vec<Duration> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(millis(&delays), vec![100, 200, 200, 1000, 1000]);
    }
}
