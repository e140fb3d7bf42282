//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the live event rooms (connected clients and their presence),
//! the in-memory timer store, and saved scripts. Nothing here is durable:
//! a restart drops every room and timer, and clients resync against the
//! empty store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use frames::Frame;
use serde_json::Value;
use showsync::ScriptDocument;
use showsync::timer::{TimerMessage, TimerSnapshot};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

// =============================================================================
// EVENT ROOM
// =============================================================================

/// Per-event live state. Exists while at least one client is joined.
pub struct EventRoom {
    /// Connected clients: `client_id` -> sender for outgoing frames.
    pub clients: HashMap<Uuid, mpsc::Sender<Frame>>,
    /// Presence identity announced by each client, if any.
    pub presence: HashMap<Uuid, Value>,
}

impl EventRoom {
    #[must_use]
    pub fn new() -> Self {
        Self { clients: HashMap::new(), presence: HashMap::new() }
    }

    /// Presence entries in a stable order (by user id).
    #[must_use]
    pub fn roster(&self) -> Vec<Value> {
        let mut entries: Vec<&Value> = self.presence.values().collect();
        entries.sort_by(|a, b| user_id(a).cmp(user_id(b)));
        entries.into_iter().cloned().collect()
    }
}

impl Default for EventRoom {
    fn default() -> Self {
        Self::new()
    }
}

fn user_id(entry: &Value) -> &str {
    entry.get("userId").and_then(Value::as_str).unwrap_or_default()
}

// =============================================================================
// EVENT TIMERS
// =============================================================================

/// Timer facts for one event: the system of record clients resync from.
#[derive(Debug, Default, Clone)]
pub struct EventTimers {
    /// Main timer. `None` once stopped or reset.
    pub active: Option<TimerSnapshot>,
    /// Running sub-cue timers keyed by item id.
    pub sub_cues: BTreeMap<i64, TimerSnapshot>,
    /// Every message set for the event; at most one enabled.
    pub messages: Vec<TimerMessage>,
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone, Default)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<String, EventRoom>>>,
    pub timers: Arc<RwLock<HashMap<String, EventTimers>>>,
    pub scripts: Arc<RwLock<HashMap<String, ScriptDocument>>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
