//! Runtime configuration for a sync session.
//!
//! DESIGN
//! ======
//! Every knob has a typed default and may be overridden from the
//! environment (`SHOWSYNC_*`) or programmatically through the `with_*`
//! builders. Durations are read as integer milliseconds.

use std::time::Duration;

const DEFAULT_WS_URL: &str = "ws://127.0.0.1:3001/api/ws";
const DEFAULT_API_URL: &str = "http://127.0.0.1:3001";

const DEFAULT_RECONNECT_BASE_MS: u64 = 2000;
const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_JOIN_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

const DEFAULT_SCROLL_THROTTLE_MS: u64 = 50;
const DEFAULT_SMOOTHING_FACTOR: f64 = 0.6;
const DEFAULT_SNAP_THRESHOLD_PX: f64 = 0.5;
const DEFAULT_FONT_SETTLE_MS: u64 = 100;
const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Transport and engine tuning for one session.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncConfig {
    /// WebSocket endpoint of the relay (e.g. `"ws://host:3001/api/ws"`).
    pub ws_url: String,
    /// HTTP base URL of the persistence API.
    pub api_url: String,
    /// Unit of the linear reconnect backoff (`attempt * base`).
    pub reconnect_base_delay: Duration,
    /// Reconnect attempts before giving up until a manual connect.
    pub reconnect_max_attempts: u32,
    /// Upper bound on waiting for the `event:join` acknowledgement.
    pub join_timeout: Duration,
    /// Request timeout for persistence calls.
    pub http_timeout: Duration,
    /// Minimum spacing between two scroll broadcasts.
    pub scroll_throttle: Duration,
    /// Fraction of the remaining gap a viewer covers per animation frame.
    pub smoothing_factor: f64,
    /// Gap (px) under which a viewer lands on its target and stops animating.
    pub snap_threshold_px: f64,
    /// Pause after a font-size change before scroll targets are honored.
    pub font_settle_delay: Duration,
    /// Animation frame period.
    pub frame_interval: Duration,
    /// Countdown recomputation period.
    pub tick_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_owned(),
            api_url: DEFAULT_API_URL.to_owned(),
            reconnect_base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_MS),
            reconnect_max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
            scroll_throttle: Duration::from_millis(DEFAULT_SCROLL_THROTTLE_MS),
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            snap_threshold_px: DEFAULT_SNAP_THRESHOLD_PX,
            font_settle_delay: Duration::from_millis(DEFAULT_FONT_SETTLE_MS),
            frame_interval: Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
        }
    }
}

impl SyncConfig {
    /// Load config from the environment with defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable is set but does not
    /// parse, or when the smoothing factor falls outside `(0, 1]`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (testing seam for `from_env`).
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let cfg = Self {
            ws_url: lookup("SHOWSYNC_WS_URL").unwrap_or(d.ws_url),
            api_url: lookup("SHOWSYNC_API_URL").unwrap_or(d.api_url),
            reconnect_base_delay: millis(&lookup, "SHOWSYNC_RECONNECT_BASE_MS", d.reconnect_base_delay)?,
            reconnect_max_attempts: parse(&lookup, "SHOWSYNC_RECONNECT_MAX_ATTEMPTS", d.reconnect_max_attempts)?,
            join_timeout: millis(&lookup, "SHOWSYNC_JOIN_TIMEOUT_MS", d.join_timeout)?,
            http_timeout: millis(&lookup, "SHOWSYNC_HTTP_TIMEOUT_MS", d.http_timeout)?,
            scroll_throttle: millis(&lookup, "SHOWSYNC_SCROLL_THROTTLE_MS", d.scroll_throttle)?,
            smoothing_factor: parse(&lookup, "SHOWSYNC_SMOOTHING_FACTOR", d.smoothing_factor)?,
            snap_threshold_px: parse(&lookup, "SHOWSYNC_SNAP_THRESHOLD_PX", d.snap_threshold_px)?,
            font_settle_delay: millis(&lookup, "SHOWSYNC_FONT_SETTLE_MS", d.font_settle_delay)?,
            frame_interval: millis(&lookup, "SHOWSYNC_FRAME_INTERVAL_MS", d.frame_interval)?,
            tick_interval: millis(&lookup, "SHOWSYNC_TICK_INTERVAL_MS", d.tick_interval)?,
        };

        if !(cfg.smoothing_factor > 0.0 && cfg.smoothing_factor <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "SHOWSYNC_SMOOTHING_FACTOR",
                value: cfg.smoothing_factor.to_string(),
            });
        }
        Ok(cfg)
    }

    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, base_delay: Duration, max_attempts: u32) -> Self {
        self.reconnect_base_delay = base_delay;
        self.reconnect_max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_scroll_throttle(mut self, throttle: Duration) -> Self {
        self.scroll_throttle = throttle;
        self
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
