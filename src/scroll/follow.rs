//! Viewer side: exponential smoothing toward the latest scroll target.

use std::time::Duration;

use tokio::time::Instant;

use super::ScrollMessage;

/// Result of one animation frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    /// Moved to this position; keep animating.
    Moved(f64),
    /// Landed exactly on the target; the loop is done.
    Landed(f64),
    /// Holding for a font reflow; position unchanged.
    Settling,
    /// Nothing to animate.
    Idle,
}

#[derive(Debug)]
pub struct ScrollFollower {
    factor: f64,
    threshold: f64,
    settle: Duration,
    current: f64,
    target: Option<f64>,
    font_size: Option<f64>,
    hold_until: Option<Instant>,
}

impl ScrollFollower {
    #[must_use]
    pub fn new(factor: f64, threshold: f64, settle: Duration) -> Self {
        Self {
            factor,
            threshold,
            settle,
            current: 0.0,
            target: None,
            font_size: None,
            hold_until: None,
        }
    }

    #[must_use]
    pub fn current(&self) -> f64 {
        self.current
    }

    #[must_use]
    pub fn target(&self) -> Option<f64> {
        self.target
    }

    #[must_use]
    pub fn font_size(&self) -> Option<f64> {
        self.font_size
    }

    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.target.is_some()
    }

    /// When a font-size hold ends, if one is active.
    #[must_use]
    pub fn settle_until(&self) -> Option<Instant> {
        self.hold_until
    }

    /// Take a new target. A font-size change is applied first and holds the
    /// animation for the settle delay. Returns `true` when the font changed.
    pub fn retarget(&mut self, message: &ScrollMessage, now: Instant) -> bool {
        let font_changed = message.font_size > 0.0
            && self.font_size.is_none_or(|current| (current - message.font_size).abs() > f64::EPSILON);
        if font_changed {
            self.font_size = Some(message.font_size);
            self.hold_until = Some(now + self.settle);
        }
        if message.scroll_position.is_finite() {
            self.target = Some(message.scroll_position.max(0.0));
        }
        font_changed
    }

    /// Advance one frame at `now`.
    pub fn step(&mut self, now: Instant) -> Step {
        let Some(target) = self.target else {
            return Step::Idle;
        };
        if let Some(until) = self.hold_until {
            if now < until {
                return Step::Settling;
            }
            self.hold_until = None;
        }

        let next = self.current + (target - self.current) * self.factor;
        if (target - next).abs() < self.threshold {
            self.current = target;
            self.target = None;
            Step::Landed(target)
        } else {
            self.current = next;
            Step::Moved(next)
        }
    }

    /// Font size already applied locally; no settle hold.
    pub fn set_font_size(&mut self, font_size: f64) {
        if font_size > 0.0 {
            self.font_size = Some(font_size);
        }
    }

    /// The host scrolled the view itself (resize, manual scroll).
    pub fn set_current(&mut self, position: f64) {
        if position.is_finite() {
            self.current = position;
        }
    }

    /// Drop the target and any settle hold.
    pub fn cancel(&mut self) {
        self.target = None;
        self.hold_until = None;
    }
}

#[cfg(test)]
#[path = "follow_test.rs"]
mod tests;
