//! Fixed-delay reconnect policy

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};

/// Waits a constant delay between connection attempts, forever
#[derive(Debug)]
pub struct ReconnectPolicy {
    delay: Duration,
    backoff: Constant,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay, backoff: Constant::new(delay), attempts: 0 }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        self.backoff.next_backoff().unwrap_or(self.delay)
    }

    /// Forget previous failures after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }

    /// Reconnects attempted since the last success
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_constant() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(5));
        for _ in 0..10 {
            assert_eq!(policy.next_delay(), Duration::from_secs(5));
        }
        assert_eq!(policy.attempts(), 10);

        policy.reset();
        assert_eq!(policy.attempts(), 0);
    }
}
