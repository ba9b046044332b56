//! Exponential reconnect backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the reconnect backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt (the floor).
    pub initial: Duration,
    /// Maximum delay (caps exponential growth).
    pub max: Duration,
    /// Multiplier applied after each unclean close.
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

/// Stateful reconnect interval.
///
/// `next_delay` returns the current interval and then grows it; `reset`
/// drops it back to the floor after a successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial;
        Self { config, current }
    }

    /// The interval the next reconnect will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the current interval and advance to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .saturating_mul(self.config.multiplier)
            .min(self.config.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(initial_ms: u64, max_ms: u64) -> Backoff {
        Backoff::new(BackoffConfig {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms),
            multiplier: 2,
        })
    }

    #[test]
    fn doubles_each_attempt() {
        let mut b = backoff(100, 10_000);
        assert_eq!(b.next_delay().as_millis(), 100);
        assert_eq!(b.next_delay().as_millis(), 200);
        assert_eq!(b.next_delay().as_millis(), 400);
        assert_eq!(b.current().as_millis(), 800);
    }

    #[test]
    fn capped_at_max() {
        let mut b = backoff(100, 500);
        for _ in 0..10 {
            b.next_delay();
        }
        assert_eq!(b.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn reset_returns_to_floor() {
        let mut b = backoff(100, 500);
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.current(), Duration::from_millis(100));
    }
}
