//! Linear reconnect backoff: attempt `n` waits `n * base`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts, attempt: 0 }
    }

    /// Advance to the next attempt. Returns `(attempt, delay)`, or `None`
    /// once `max_attempts` have been used.
    pub fn next_delay(&mut self) -> Option<(u32, Duration)> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some((self.attempt, self.base.saturating_mul(self.attempt)))
    }

    /// Attempts used since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
#[path = "backoff_test.rs"]
mod tests;
