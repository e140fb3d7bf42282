//! Timer store: the system of record for main timers, sub-cues and
//! messages, kept in memory per event.
//!
//! DESIGN
//! ======
//! Every mutation validates, applies, and returns the delta the room must
//! see (`DeltaKind` plus payload). Callers broadcast it; the store never
//! touches sockets. Rows are serialized from the shared `TimerSnapshot`
//! type, so clients parse exactly what the store holds.
//!
//! Any change of the main cue (load, start, stop) clears the event's
//! sub-cues, matching the invalidation every client applies on its side.

use frames::DeltaKind;
use serde_json::{Value, json};
use showsync::timer::{TimerMessage, TimerSnapshot};
use time::OffsetDateTime;
use tracing::info;

use crate::frame::ErrorCode;
use crate::state::{AppState, EventTimers};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TimerStoreError {
    #[error("no active timer for event {0}")]
    NoActiveTimer(String),
    #[error("cue {item_id} is not loaded for event {event_id}")]
    NotLoaded { event_id: String, item_id: i64 },
    #[error("sub-cue {item_id} is not running for event {event_id}")]
    SubCueNotFound { event_id: String, item_id: i64 },
    #[error("duration must be positive, got {0}")]
    InvalidDuration(i64),
    #[error("event_id required")]
    MissingEvent,
}

impl ErrorCode for TimerStoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NoActiveTimer(_) => "E_NO_ACTIVE_TIMER",
            Self::NotLoaded { .. } => "E_CUE_NOT_LOADED",
            Self::SubCueNotFound { .. } => "E_SUB_CUE_NOT_FOUND",
            Self::InvalidDuration(_) => "E_INVALID_DURATION",
            Self::MissingEvent => "E_MISSING_EVENT",
        }
    }
}

/// A delta to broadcast to the event room after a successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub kind: DeltaKind,
    pub data: Value,
}

impl Mutation {
    fn new(kind: DeltaKind, data: Value) -> Self {
        Self { kind, data }
    }
}

fn require_event(event_id: &str) -> Result<(), TimerStoreError> {
    if event_id.trim().is_empty() {
        return Err(TimerStoreError::MissingEvent);
    }
    Ok(())
}

fn require_duration(duration_seconds: i64) -> Result<(), TimerStoreError> {
    if duration_seconds <= 0 {
        return Err(TimerStoreError::InvalidDuration(duration_seconds));
    }
    Ok(())
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// =============================================================================
// READS
// =============================================================================

/// Main timer row, or null.
pub async fn active_timer(state: &AppState, event_id: &str) -> Value {
    let timers = state.timers.read().await;
    timers
        .get(event_id)
        .and_then(|t| t.active.as_ref())
        .map_or(Value::Null, to_value)
}

/// Running sub-cue rows, ordered by item id.
pub async fn sub_cue_timers(state: &AppState, event_id: &str) -> Value {
    let timers = state.timers.read().await;
    let rows: Vec<Value> = timers
        .get(event_id)
        .map(|t| t.sub_cues.values().map(to_value).collect())
        .unwrap_or_default();
    Value::Array(rows)
}

/// Every message of the event. Clients display the enabled one.
pub async fn timer_messages(state: &AppState, event_id: &str) -> Value {
    let timers = state.timers.read().await;
    let rows: Vec<Value> = timers
        .get(event_id)
        .map(|t| t.messages.iter().map(to_value).collect())
        .unwrap_or_default();
    Value::Array(rows)
}

/// Active timers as the array `state:sync` broadcasts: the main timer, or
/// empty.
pub async fn active_timers_array(state: &AppState, event_id: &str) -> Value {
    match active_timer(state, event_id).await {
        Value::Null => json!([]),
        row => json!([row]),
    }
}

// =============================================================================
// MAIN TIMER
// =============================================================================

/// Load a cue as the main timer (not started).
///
/// # Errors
///
/// Missing event or non-positive duration.
pub async fn load_cue(
    state: &AppState,
    event_id: &str,
    item_id: i64,
    duration_seconds: i64,
    cue_label: &str,
) -> Result<Mutation, TimerStoreError> {
    require_event(event_id)?;
    require_duration(duration_seconds)?;

    let mut timers = state.timers.write().await;
    let event = timers.entry(event_id.to_owned()).or_default();
    let snapshot = TimerSnapshot::loaded(event_id, item_id, duration_seconds, cue_label);
    replace_main(event, Some(snapshot.clone()));

    info!(%event_id, item_id, duration_seconds, "timers: cue loaded");
    Ok(Mutation::new(DeltaKind::TimerUpdated, to_value(&snapshot)))
}

/// Start the loaded cue `item_id` now.
///
/// # Errors
///
/// The cue is not the loaded main timer.
pub async fn start(state: &AppState, event_id: &str, item_id: i64) -> Result<Mutation, TimerStoreError> {
    require_event(event_id)?;

    let mut timers = state.timers.write().await;
    let event = timers.entry(event_id.to_owned()).or_default();
    let Some(loaded) = event.active.clone().filter(|t| t.item_id == item_id) else {
        return Err(TimerStoreError::NotLoaded { event_id: event_id.to_owned(), item_id });
    };

    let running = loaded.started(OffsetDateTime::now_utc());
    replace_main(event, Some(running.clone()));

    info!(%event_id, item_id, "timers: started");
    Ok(Mutation::new(DeltaKind::TimerUpdated, to_value(&running)))
}

/// Stop the main timer. Its sub-cues stop with it.
///
/// # Errors
///
/// No main timer exists.
pub async fn stop(state: &AppState, event_id: &str) -> Result<Mutation, TimerStoreError> {
    require_event(event_id)?;

    let mut timers = state.timers.write().await;
    let Some(event) = timers.get_mut(event_id) else {
        return Err(TimerStoreError::NoActiveTimer(event_id.to_owned()));
    };
    let Some(item_id) = event.active.as_ref().map(|t| t.item_id) else {
        return Err(TimerStoreError::NoActiveTimer(event_id.to_owned()));
    };
    replace_main(event, None);

    info!(%event_id, item_id, "timers: stopped");
    Ok(Mutation::new(DeltaKind::TimerStopped, json!({"event_id": event_id, "item_id": item_id})))
}

/// Clear the main timer and every sub-cue. Messages are kept.
///
/// # Errors
///
/// Missing event.
pub async fn reset(state: &AppState, event_id: &str) -> Result<Mutation, TimerStoreError> {
    require_event(event_id)?;

    let mut timers = state.timers.write().await;
    if let Some(event) = timers.get_mut(event_id) {
        event.active = None;
        event.sub_cues.clear();
    }

    info!(%event_id, "timers: reset");
    Ok(Mutation::new(DeltaKind::TimersStopped, json!({"event_id": event_id})))
}

/// Install a new main timer (or none), dropping sub-cues whenever the
/// `(item_id, started_at)` key changes.
fn replace_main(event: &mut EventTimers, next: Option<TimerSnapshot>) {
    let key = |t: &TimerSnapshot| (t.item_id, t.started_at);
    if event.active.as_ref().map(key) != next.as_ref().map(key) {
        event.sub_cues.clear();
    }
    event.active = next;
}

// =============================================================================
// SUB-CUES
// =============================================================================

/// Start (or restart) a sub-cue timer.
///
/// # Errors
///
/// Missing event or non-positive duration.
pub async fn start_sub_cue(
    state: &AppState,
    event_id: &str,
    item_id: i64,
    duration_seconds: i64,
    cue_label: &str,
) -> Result<Mutation, TimerStoreError> {
    require_event(event_id)?;
    require_duration(duration_seconds)?;

    let row = TimerSnapshot::loaded(event_id, item_id, duration_seconds, cue_label)
        .started(OffsetDateTime::now_utc());
    let mut timers = state.timers.write().await;
    timers
        .entry(event_id.to_owned())
        .or_default()
        .sub_cues
        .insert(item_id, row.clone());

    info!(%event_id, item_id, duration_seconds, "timers: sub-cue started");
    Ok(Mutation::new(DeltaKind::SubCueTimerStarted, to_value(&row)))
}

/// Stop one sub-cue, or all of them when `item_id` is `None`.
///
/// # Errors
///
/// The named sub-cue is not running.
pub async fn stop_sub_cue(state: &AppState, event_id: &str, item_id: Option<i64>) -> Result<Mutation, TimerStoreError> {
    require_event(event_id)?;

    let mut timers = state.timers.write().await;
    let event = timers.entry(event_id.to_owned()).or_default();
    match item_id {
        Some(item_id) => {
            if event.sub_cues.remove(&item_id).is_none() {
                return Err(TimerStoreError::SubCueNotFound { event_id: event_id.to_owned(), item_id });
            }
        }
        None => event.sub_cues.clear(),
    }

    info!(%event_id, ?item_id, "timers: sub-cue stopped");
    Ok(Mutation::new(
        DeltaKind::SubCueTimerStopped,
        json!({"event_id": event_id, "item_id": item_id}),
    ))
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Set a message's enabled flag. Enabling one disables every other; an
/// unknown text is added. Disabling with an empty text disables all.
///
/// # Errors
///
/// Missing event.
pub async fn set_message(
    state: &AppState,
    event_id: &str,
    message: &str,
    enabled: bool,
) -> Result<Mutation, TimerStoreError> {
    require_event(event_id)?;

    let mut timers = state.timers.write().await;
    let event = timers.entry(event_id.to_owned()).or_default();
    let messages = &mut event.messages;

    if enabled {
        for existing in messages.iter_mut() {
            existing.enabled = false;
        }
    }
    match messages.iter().position(|m| m.message == message) {
        Some(index) => messages[index].enabled = enabled,
        None if !message.is_empty() => {
            let next_id = messages.iter().filter_map(|m| m.id).max().unwrap_or(0) + 1;
            messages.push(TimerMessage {
                id: Some(next_id),
                event_id: event_id.to_owned(),
                message: message.to_owned(),
                enabled,
            });
        }
        None => {
            for existing in messages.iter_mut() {
                existing.enabled = false;
            }
        }
    }

    info!(%event_id, message, enabled, "timers: message updated");
    let rows: Vec<Value> = messages.iter().map(to_value).collect();
    Ok(Mutation::new(DeltaKind::TimerMessageUpdated, Value::Array(rows)))
}

#[cfg(test)]
#[path = "timers_test.rs"]
mod tests;
