use std::time::Duration;

pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(500);

/// When to restart listening after a session ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    delay: Duration,
    max_restarts: Option<u64>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RESTART_DELAY)
    }
}

impl RestartPolicy {
    /// Same delay every time, no cap.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_restarts: None,
        }
    }

    /// Cap consecutive restarts; the counter resets once text is recognized.
    pub fn with_max_restarts(mut self, max_restarts: u64) -> Self {
        self.max_restarts = Some(max_restarts);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_restarts(&self) -> Option<u64> {
        self.max_restarts
    }

    /// Delay before restart number `attempt` (1-based), or `None` to give up.
    pub fn delay_for(&self, attempt: u64) -> Option<Duration> {
        match self.max_restarts {
            Some(max) if attempt > max => None,
            _ => Some(self.delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_policy_always_restarts() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.delay_for(1), Some(DEFAULT_RESTART_DELAY));
        assert_eq!(policy.delay_for(u64::MAX), Some(DEFAULT_RESTART_DELAY));
    }

    #[test]
    fn capped_policy_gives_up_after_limit() {
        let policy = RestartPolicy::fixed(Duration::from_millis(10)).with_max_restarts(1);
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(10)));
        assert_eq!(policy.delay_for(2), None);
    }
}
