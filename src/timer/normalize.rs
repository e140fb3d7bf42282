//! One boundary for every shape a timer fact arrives in.
//!
//! The same logical "active timer" reaches a client as a resync fetch, as a
//! `timerUpdated` delta, or as an `activeTimersUpdated` broadcast that is
//! sometimes an array (newest first) and sometimes a single object. Engines
//! downstream of this module only ever see [`ActiveTimer`].

use serde_json::Value;

use super::snapshot::{TimerMessage, TimerSnapshot, as_id_string};

/// Normalized main-timer fact.
#[derive(Clone, Debug, PartialEq)]
pub enum ActiveTimer {
    Present(TimerSnapshot),
    /// The source says there is no active timer.
    Absent,
}

/// Resolve an active-timer payload of any shape.
///
/// Returns `None` for payloads that are neither a timer nor an explicit
/// absence; callers drop those with a warning.
#[must_use]
pub fn active_timer(value: &Value) -> Option<ActiveTimer> {
    match value {
        Value::Null => Some(ActiveTimer::Absent),
        Value::Array(items) => match items.first() {
            None => Some(ActiveTimer::Absent),
            Some(first) => active_timer_object(first),
        },
        Value::Object(_) => active_timer_object(value),
        _ => None,
    }
}

fn active_timer_object(value: &Value) -> Option<ActiveTimer> {
    let obj = value.as_object()?;
    // Some fetches wrap the row as `{ "timer": {...} }` or `{ "data": {...} }`.
    for key in ["timer", "data"] {
        if let Some(inner) = obj.get(key).filter(|v| v.is_object() || v.is_array() || v.is_null()) {
            if !obj.contains_key("item_id") {
                return active_timer(inner);
            }
        }
    }
    if obj.is_empty() {
        return Some(ActiveTimer::Absent);
    }
    TimerSnapshot::from_value(value).map(ActiveTimer::Present)
}

/// Sub-cue rows from an array, a single object, or null. Rows without an
/// `item_id` are dropped.
#[must_use]
pub fn sub_cue_timers(value: &Value) -> Vec<TimerSnapshot> {
    let rows: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(obj) => match obj.get("timers").or_else(|| obj.get("data")) {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![value],
        },
        _ => Vec::new(),
    };

    rows.into_iter()
        .filter_map(|row| {
            let parsed = TimerSnapshot::from_value(row);
            if parsed.is_none() {
                tracing::warn!(%row, "timer: dropping malformed sub-cue row");
            }
            parsed
        })
        .collect()
}

/// The message to reflect: the enabled entry of a list, or the single
/// object as given. `None` clears the message.
#[must_use]
pub fn timer_message(value: &Value) -> Option<TimerMessage> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(TimerMessage::from_value)
            .find(|msg| msg.enabled),
        Value::Object(obj) => match obj.get("message") {
            Some(inner @ Value::Object(_)) => TimerMessage::from_value(inner),
            _ => TimerMessage::from_value(value),
        },
        _ => None,
    }
}

/// The event a delta payload names, if any (`event_id` or `eventId`, looked
/// up on the first element of arrays).
#[must_use]
pub fn payload_event_id(value: &Value) -> Option<String> {
    let obj = match value {
        Value::Array(items) => items.first()?.as_object()?,
        Value::Object(obj) => obj,
        _ => return None,
    };
    obj.get("event_id")
        .or_else(|| obj.get("eventId"))
        .and_then(as_id_string)
}

/// Item id named by a stop payload, if any.
#[must_use]
pub fn payload_item_id(value: &Value) -> Option<i64> {
    let obj = value.as_object()?;
    obj.get("item_id")
        .or_else(|| obj.get("itemId"))
        .and_then(super::snapshot::as_i64)
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
