//! Room service: join/part, presence roster, and fan-out.
//!
//! DESIGN
//! ======
//! A room is created on first join and evicted when its last client parts.
//! Broadcasts are best-effort: a client whose outbound channel is full
//! misses that frame and recovers on its next resync.

use frames::{DeltaKind, Frame};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::state::{AppState, EventRoom};

// =============================================================================
// MEMBERSHIP
// =============================================================================

/// Add a client to an event room, creating the room if needed.
pub async fn join_event(state: &AppState, event_id: &str, client_id: Uuid, tx: mpsc::Sender<Frame>) {
    let mut rooms = state.rooms.write().await;
    let room = rooms.entry(event_id.to_owned()).or_insert_with(EventRoom::new);
    room.clients.insert(client_id, tx);
    info!(%event_id, %client_id, clients = room.clients.len(), "room: client joined");
}

/// Remove a client from a room. Returns the new roster when the client had
/// announced presence, so callers can broadcast the change.
pub async fn part_event(state: &AppState, event_id: &str, client_id: Uuid) -> Option<Vec<Value>> {
    let mut rooms = state.rooms.write().await;
    let room = rooms.get_mut(event_id)?;

    room.clients.remove(&client_id);
    let had_presence = room.presence.remove(&client_id).is_some();
    info!(%event_id, %client_id, remaining = room.clients.len(), "room: client left");

    if room.clients.is_empty() {
        rooms.remove(event_id);
        info!(%event_id, "room: evicted");
        return None;
    }
    had_presence.then(|| room.roster())
}

/// Record a client's presence identity and return the updated roster.
/// `None` when the client is not in the room.
pub async fn set_presence(state: &AppState, event_id: &str, client_id: Uuid, entry: Value) -> Option<Vec<Value>> {
    let mut rooms = state.rooms.write().await;
    let room = rooms.get_mut(event_id)?;
    if !room.clients.contains_key(&client_id) {
        return None;
    }
    room.presence.insert(client_id, entry);
    Some(room.roster())
}

/// Number of clients currently joined to an event.
pub async fn client_count(state: &AppState, event_id: &str) -> usize {
    state.rooms.read().await.get(event_id).map_or(0, |room| room.clients.len())
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Send a frame to every client in the room except `exclude`.
pub async fn broadcast(state: &AppState, event_id: &str, frame: &Frame, exclude: Option<Uuid>) {
    let rooms = state.rooms.read().await;
    let Some(room) = rooms.get(event_id) else {
        return;
    };

    for (client_id, tx) in &room.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: if a client's channel is full, skip it.
        let _ = tx.try_send(frame.clone());
    }
}

/// Broadcast one `update` delta to the whole room.
pub async fn broadcast_update(state: &AppState, event_id: &str, kind: DeltaKind, data: Value) {
    let frame = Frame::update(event_id, kind, data);
    broadcast(state, event_id, &frame, None).await;
}

/// Tell every client in the room to disconnect and not come back on its own.
/// Returns how many clients were told.
pub async fn kick(state: &AppState, event_id: &str, reason: Option<&str>) -> usize {
    let mut data = serde_json::Map::new();
    if let Some(reason) = reason {
        data.insert("reason".into(), Value::String(reason.to_owned()));
    }
    let frame = Frame::request(frames::syscall::SESSION_KICK, Value::Object(data)).with_event_id(event_id);

    let count = client_count(state, event_id).await;
    broadcast(state, event_id, &frame, None).await;
    info!(%event_id, count, ?reason, "room: kicked clients");
    count
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
