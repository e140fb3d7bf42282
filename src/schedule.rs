//! Cancelable scheduled tasks for the session loop.
//!
//! Both types are polled from a `tokio::select!` branch. While inactive they
//! return a future that never resolves, so a stopped ticker or an unarmed
//! deadline simply never wins the select. Stopping or re-arming drops the old
//! schedule; nothing from a previous arm can fire afterwards.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// A repeating task (countdown refresh, animation frames).
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    interval: Option<Interval>,
}

impl Ticker {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self { period, interval: None }
    }

    /// Start ticking, first tick one period from now. No-op while running.
    pub fn start(&mut self) {
        if self.interval.is_none() {
            self.interval = Some(self.build(Instant::now() + self.period));
        }
    }

    /// Start (or restart) with an immediate first tick.
    pub fn restart_now(&mut self) {
        self.interval = Some(self.build(Instant::now()));
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolves at the next tick; pending forever while stopped.
    pub async fn tick(&mut self) -> Instant {
        match self.interval.as_mut() {
            Some(interval) => interval.tick().await,
            None => std::future::pending().await,
        }
    }

    fn build(&self, start: Instant) -> Interval {
        let mut interval = tokio::time::interval_at(start, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }
}

/// A one-shot task that can be replaced or canceled (font settle,
/// auto-disconnect, trailing scroll flush).
#[derive(Debug, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm for `at`, replacing any previous arm.
    pub fn set(&mut self, at: Instant) {
        self.at = Some(at);
    }

    pub fn set_after(&mut self, delay: Duration) {
        self.set(Instant::now() + delay);
    }

    pub fn cancel(&mut self) {
        self.at = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    #[must_use]
    pub fn at(&self) -> Option<Instant> {
        self.at
    }

    /// Resolves once the armed instant passes, then disarms.
    pub async fn wait(&mut self) -> Instant {
        match self.at {
            Some(at) => {
                tokio::time::sleep_until(at).await;
                self.at = None;
                at
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
#[path = "schedule_test.rs"]
mod tests;
