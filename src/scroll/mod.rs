//! Scroller → viewer scroll synchronization.
//!
//! DESIGN
//! ======
//! Roles are local and never synchronized. A Scroller turns local scroll
//! events into throttled [`ScrollMessage`] broadcasts; a Viewer turns
//! received messages into targets and eases toward them one animation frame
//! at a time. [`ScrollSync`] owns both halves and enforces that only the
//! active role's half does anything. Switching roles wipes the other half.

pub mod broadcast;
pub mod follow;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::SyncConfig;

pub use broadcast::{LineGeometry, ScrollBroadcaster};
pub use follow::{ScrollFollower, Step};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollRole {
    Scroller,
    #[default]
    Viewer,
}

/// `scroll:update` / `scroll:sync` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMessage {
    pub scroll_position: f64,
    #[serde(default)]
    pub line_number: usize,
    #[serde(default)]
    pub font_size: f64,
    #[serde(default)]
    pub timestamp: i64,
}

/// What the host view should apply after feeding the viewer side.
#[derive(Clone, Debug, PartialEq)]
pub enum ScrollOutput {
    /// Apply this font size before the next position.
    FontSize(f64),
    /// Scroll the view to this position.
    Position(f64),
}

#[derive(Debug)]
pub struct ScrollSync {
    role: ScrollRole,
    geometry: LineGeometry,
    broadcaster: ScrollBroadcaster,
    follower: ScrollFollower,
    position: f64,
}

impl ScrollSync {
    #[must_use]
    pub fn new(config: &SyncConfig, font_size: f64) -> Self {
        let mut follower = ScrollFollower::new(config.smoothing_factor, config.snap_threshold_px, config.font_settle_delay);
        follower.set_font_size(font_size);
        Self {
            role: ScrollRole::default(),
            geometry: LineGeometry::new(font_size),
            broadcaster: ScrollBroadcaster::new(config.scroll_throttle),
            follower,
            position: 0.0,
        }
    }

    #[must_use]
    pub fn role(&self) -> ScrollRole {
        self.role
    }

    /// Switch roles. Any in-flight animation, pending target and held
    /// broadcast is dropped.
    pub fn set_role(&mut self, role: ScrollRole) {
        if role != self.role {
            tracing::info!(from = ?self.role, to = ?role, "scroll: role changed");
        }
        self.role = role;
        self.follower.cancel();
        self.broadcaster.cancel();
        self.follower.set_current(self.position);
    }

    /// Host reports fresh line geometry (after render or resize).
    pub fn set_geometry(&mut self, geometry: LineGeometry) {
        self.geometry = geometry;
    }

    /// Local font-size change (Scroller zoom or viewer preference).
    pub fn set_font_size(&mut self, font_size: f64) {
        if font_size > 0.0 {
            self.geometry.font_size = font_size;
            self.follower.set_font_size(font_size);
        }
    }

    #[must_use]
    pub fn geometry(&self) -> &LineGeometry {
        &self.geometry
    }

    #[must_use]
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Current visible line range.
    #[must_use]
    pub fn visible_range(&self) -> (usize, usize) {
        self.geometry.visible_range(self.position)
    }

    /// A local scroll happened. Scrollers may get a message to broadcast.
    pub fn local_scroll(&mut self, scroll_position: f64, now: Instant) -> Option<ScrollMessage> {
        self.position = scroll_position.max(0.0);
        match self.role {
            ScrollRole::Scroller => {
                let message = ScrollMessage {
                    scroll_position: self.position,
                    line_number: self.geometry.top_line(self.position),
                    font_size: self.geometry.font_size,
                    timestamp: frames::now_ms(),
                };
                self.broadcaster.offer(message, now)
            }
            ScrollRole::Viewer => {
                self.follower.set_current(self.position);
                None
            }
        }
    }

    /// A peer's scroll arrived. Ignored while this client is the Scroller.
    pub fn remote(&mut self, message: &ScrollMessage, now: Instant) -> Option<ScrollOutput> {
        if self.role == ScrollRole::Scroller {
            tracing::debug!("scroll: ignoring peer scroll while scroller");
            return None;
        }
        if self.follower.retarget(message, now) {
            self.geometry.font_size = message.font_size;
            return Some(ScrollOutput::FontSize(message.font_size));
        }
        None
    }

    /// Advance the viewer animation one frame.
    pub fn frame(&mut self, now: Instant) -> Option<ScrollOutput> {
        match self.follower.step(now) {
            Step::Moved(pos) | Step::Landed(pos) => {
                self.position = pos;
                Some(ScrollOutput::Position(pos))
            }
            Step::Settling | Step::Idle => None,
        }
    }

    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.role == ScrollRole::Viewer && self.follower.is_animating()
    }

    /// End of the current font reflow hold, if any.
    #[must_use]
    pub fn settle_until(&self) -> Option<Instant> {
        self.follower.settle_until()
    }

    /// When a held trailing broadcast is due.
    #[must_use]
    pub fn flush_at(&self) -> Option<Instant> {
        match self.role {
            ScrollRole::Scroller => self.broadcaster.flush_at(),
            ScrollRole::Viewer => None,
        }
    }

    /// Release a due trailing broadcast.
    pub fn flush(&mut self, now: Instant) -> Option<ScrollMessage> {
        match self.role {
            ScrollRole::Scroller => self.broadcaster.flush(now),
            ScrollRole::Viewer => None,
        }
    }

    /// Stop everything in flight (disconnect).
    pub fn halt(&mut self) {
        self.follower.cancel();
        self.broadcaster.cancel();
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
