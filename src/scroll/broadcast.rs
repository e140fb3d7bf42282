//! Scroller side: line geometry and throttled broadcast.

use std::time::Duration;

use tokio::time::Instant;

use super::ScrollMessage;

/// Rendered lines sampled for line-height averaging.
const LINE_SAMPLE: usize = 5;

/// Rendered geometry of the script view, as reported by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct LineGeometry {
    /// Heights (px) of the first rendered line elements, top down.
    pub sampled_heights: Vec<f64>,
    pub font_size: f64,
    pub viewport_height: f64,
}

impl LineGeometry {
    #[must_use]
    pub fn new(font_size: f64) -> Self {
        Self { sampled_heights: Vec::new(), font_size, viewport_height: 0.0 }
    }

    /// Average of the first few rendered line heights; `font_size * 2` until
    /// something has rendered.
    #[must_use]
    pub fn line_height(&self) -> f64 {
        let sample: Vec<f64> = self
            .sampled_heights
            .iter()
            .copied()
            .filter(|h| h.is_finite() && *h > 0.0)
            .take(LINE_SAMPLE)
            .collect();
        if sample.is_empty() {
            return (self.font_size * 2.0).max(1.0);
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = sample.iter().sum::<f64>() / sample.len() as f64;
        avg
    }

    /// Topmost visible line at `scroll_position`.
    #[must_use]
    pub fn top_line(&self, scroll_position: f64) -> usize {
        to_line(scroll_position / self.line_height())
    }

    /// `(start, end)` visible line range at `scroll_position`.
    #[must_use]
    pub fn visible_range(&self, scroll_position: f64) -> (usize, usize) {
        let height = self.line_height();
        let start = to_line(scroll_position / height);
        let visible = to_line((self.viewport_height / height).ceil());
        (start, start.saturating_add(visible))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_line(value: f64) -> usize {
    if value.is_finite() && value > 0.0 { value.floor() as usize } else { 0 }
}

/// At most one broadcast per `throttle`, with the latest suppressed value held
/// back and released when the window reopens.
#[derive(Debug)]
pub struct ScrollBroadcaster {
    throttle: Duration,
    last_sent: Option<Instant>,
    trailing: Option<ScrollMessage>,
}

impl ScrollBroadcaster {
    #[must_use]
    pub fn new(throttle: Duration) -> Self {
        Self { throttle, last_sent: None, trailing: None }
    }

    /// Offer a fresh local scroll. Returns the message to send now, or holds
    /// it as the trailing value when inside the throttle window.
    pub fn offer(&mut self, message: ScrollMessage, now: Instant) -> Option<ScrollMessage> {
        if self.window_open(now) {
            self.last_sent = Some(now);
            self.trailing = None;
            Some(message)
        } else {
            self.trailing = Some(message);
            None
        }
    }

    /// When the held trailing value may go out.
    #[must_use]
    pub fn flush_at(&self) -> Option<Instant> {
        match (&self.trailing, self.last_sent) {
            (Some(_), Some(last)) => Some(last + self.throttle),
            (Some(_), None) => Some(Instant::now()),
            (None, _) => None,
        }
    }

    /// Release the trailing value if its window has reopened.
    pub fn flush(&mut self, now: Instant) -> Option<ScrollMessage> {
        if self.trailing.is_none() || !self.window_open(now) {
            return None;
        }
        self.last_sent = Some(now);
        self.trailing.take()
    }

    /// Drop anything held back.
    pub fn cancel(&mut self) {
        self.trailing = None;
    }

    fn window_open(&self, now: Instant) -> bool {
        self.last_sent.is_none_or(|last| now.saturating_duration_since(last) >= self.throttle)
    }
}

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod tests;
