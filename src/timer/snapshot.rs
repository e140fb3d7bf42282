//! Timer facts as the sync layer sees them.
//!
//! Wire payloads come from database rows and hand-built broadcasts, so
//! parsing is lenient: ids may be numbers or numeric strings, the label may
//! arrive as `cue_label`, `cue_is` or `cue_display`, and "not started" may be
//! encoded as a far-future `started_at`. Everything is normalized here so the
//! engine only ever sees one shape.

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// `started_at` values at or beyond this year mean "loaded, not started".
const NOT_STARTED_SENTINEL_YEAR: i32 = 2099;

/// Lifecycle of one timer: `none → loaded → running → stopped → none`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    #[default]
    None,
    Loaded,
    Running,
    Stopped,
}

impl TimerState {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Some(Self::None),
            "loaded" => Some(Self::Loaded),
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// One main or sub-cue timer.
///
/// Invariant: `is_running ⇒ is_active ∧ started_at.is_some()`. Only
/// [`TimerSnapshot::from_value`] and [`TimerSnapshot::normalized`] build
/// snapshots from outside data, and both enforce it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimerSnapshot {
    pub event_id: String,
    pub item_id: i64,
    pub timer_state: TimerState,
    pub is_active: bool,
    pub is_running: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub duration_seconds: i64,
    pub cue_label: String,
}

impl TimerSnapshot {
    /// Parse a timer row. Returns `None` when the payload has no usable
    /// `item_id` (the only field a timer cannot exist without).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let item_id = obj.get("item_id").or_else(|| obj.get("itemId")).and_then(as_i64)?;

        let event_id = obj
            .get("event_id")
            .or_else(|| obj.get("eventId"))
            .and_then(as_id_string)
            .unwrap_or_default();

        let started_at = obj
            .get("started_at")
            .or_else(|| obj.get("startedAt"))
            .and_then(parse_timestamp)
            .filter(|ts| ts.year() < NOT_STARTED_SENTINEL_YEAR);

        let duration_seconds = obj
            .get("duration_seconds")
            .or_else(|| obj.get("duration"))
            .and_then(as_i64)
            .unwrap_or(0)
            .max(0);

        let cue_label = ["cue_label", "cue_is", "cue_display", "cue"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map_or_else(|| format!("CUE {item_id}"), ToOwned::to_owned);

        let explicit_state = obj
            .get("timer_state")
            .and_then(Value::as_str)
            .and_then(TimerState::parse);

        let snapshot = Self {
            event_id,
            item_id,
            timer_state: explicit_state.unwrap_or_default(),
            is_active: obj.get("is_active").and_then(Value::as_bool).unwrap_or(false),
            is_running: obj.get("is_running").and_then(Value::as_bool).unwrap_or(false),
            started_at,
            duration_seconds,
            cue_label,
        };
        Some(snapshot.normalized(explicit_state.is_some()))
    }

    /// Create a loaded (not started) timer.
    #[must_use]
    pub fn loaded(event_id: impl Into<String>, item_id: i64, duration_seconds: i64, cue_label: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            item_id,
            timer_state: TimerState::Loaded,
            is_active: true,
            is_running: false,
            started_at: None,
            duration_seconds: duration_seconds.max(0),
            cue_label: cue_label.into(),
        }
    }

    /// Mark this timer as running from `started_at`.
    #[must_use]
    pub fn started(mut self, started_at: OffsetDateTime) -> Self {
        self.started_at = Some(started_at);
        self.timer_state = TimerState::Running;
        self.is_running = true;
        self.is_active = true;
        self
    }

    /// Reconcile the state tag with the flags so the invariant holds.
    ///
    /// With `trust_state` the explicit `timer_state` wins over the flags,
    /// otherwise the state is derived from `is_running`/`is_active`.
    #[must_use]
    pub fn normalized(mut self, trust_state: bool) -> Self {
        let stated = if trust_state { Some(self.timer_state) } else { None };

        let wants_running = match stated {
            Some(TimerState::Running) => true,
            Some(TimerState::Stopped | TimerState::None) => false,
            Some(TimerState::Loaded) | None => self.is_running,
        };
        let running = wants_running && self.started_at.is_some();
        if wants_running && !running {
            tracing::warn!(item_id = self.item_id, "timer: running without started_at, treating as loaded");
        }

        self.timer_state = if running {
            TimerState::Running
        } else {
            match stated {
                Some(TimerState::Running) => TimerState::Loaded,
                Some(state) => state,
                None if self.is_active || wants_running => TimerState::Loaded,
                None => TimerState::None,
            }
        };
        self.is_running = running;
        self.is_active = matches!(self.timer_state, TimerState::Loaded | TimerState::Running);
        self
    }

    /// True when the timer is stopped or carries no timer at all; both
    /// render identically.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.timer_state, TimerState::Stopped | TimerState::None)
    }
}

/// The per-second rendered state of a timer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub item_id: Option<i64>,
    pub cue_label: String,
    pub duration_seconds: i64,
    pub elapsed_seconds: i64,
    /// Negative once the timer runs past its duration.
    pub remaining_seconds: i64,
    pub running: bool,
}

impl Countdown {
    /// A non-running countdown showing its full duration.
    #[must_use]
    pub fn idle(item_id: Option<i64>, cue_label: impl Into<String>, duration_seconds: i64) -> Self {
        Self {
            item_id,
            cue_label: cue_label.into(),
            duration_seconds,
            elapsed_seconds: 0,
            remaining_seconds: duration_seconds,
            running: false,
        }
    }

    /// Derive the countdown from the stored start timestamp and local `now`.
    #[must_use]
    pub fn for_snapshot(snapshot: &TimerSnapshot, now: OffsetDateTime) -> Self {
        match (snapshot.is_running, snapshot.started_at) {
            (true, Some(started_at)) => {
                // A start stamped slightly in the future (clock skew) reads as zero.
                let elapsed = (now - started_at).whole_seconds().max(0);
                Self {
                    item_id: Some(snapshot.item_id),
                    cue_label: snapshot.cue_label.clone(),
                    duration_seconds: snapshot.duration_seconds,
                    elapsed_seconds: elapsed,
                    remaining_seconds: snapshot.duration_seconds - elapsed,
                    running: true,
                }
            }
            _ => Self::idle(Some(snapshot.item_id), snapshot.cue_label.clone(), snapshot.duration_seconds),
        }
    }

    #[must_use]
    pub fn is_overtime(&self) -> bool {
        self.remaining_seconds < 0
    }

    /// `MM:SS`, or `-MM:SS` in overtime. Hours fold into minutes.
    #[must_use]
    pub fn display(&self) -> String {
        let sign = if self.remaining_seconds < 0 { "-" } else { "" };
        let total = self.remaining_seconds.unsigned_abs();
        format!("{sign}{:02}:{:02}", total / 60, total % 60)
    }
}

/// The event's on-screen message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimerMessage {
    pub id: Option<i64>,
    pub event_id: String,
    pub message: String,
    pub enabled: bool,
}

impl TimerMessage {
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let message = obj
            .get("message")
            .or_else(|| obj.get("text"))
            .and_then(Value::as_str)?
            .to_owned();
        Some(Self {
            id: obj.get("id").and_then(as_i64),
            event_id: obj
                .get("event_id")
                .or_else(|| obj.get("eventId"))
                .and_then(as_id_string)
                .unwrap_or_default(),
            message,
            enabled: obj.get("enabled").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

// =============================================================================
// FIELD HELPERS
// =============================================================================

/// Integer from a JSON number (rounded) or a numeric string.
pub(crate) fn as_i64(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        #[allow(clippy::cast_possible_truncation)]
        return f.is_finite().then(|| f.round() as i64);
    }
    value.as_str().and_then(|s| s.trim().parse::<i64>().ok())
}

/// Identifier as a string, accepting numeric ids.
pub(crate) fn as_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// RFC 3339 string or epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339).ok(),
        Value::Number(_) => {
            let millis = as_i64(value)?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
