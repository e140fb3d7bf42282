//! WebSocket handler: bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client frames → decode + dispatch by syscall prefix
//! - Broadcast frames from event peers → forward to client
//!
//! Handler functions validate, mutate room or timer state, and return an
//! `Outcome`. The dispatch layer owns all outbound concerns: reply to sender
//! and broadcast to the room.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `client_id` and `server_time`
//! 2. Client sends `event:join` → room membership → `done`
//! 3. Client frames → dispatch → handler returns Outcome → applied
//! 4. Close or kick → leave room (roster broadcast if presence changed)

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use frames::{DeltaKind, Frame, Status, syscall};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{FrameExt, gateway_error};
use crate::services::{room, timers};
use crate::state::AppState;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what; handlers never send frames directly.
#[derive(Debug)]
enum Outcome {
    /// Send empty done to sender only.
    Done,
    /// Relay `syscall` to every room peer EXCLUDING sender. No reply.
    /// Used for scroll positions (ephemeral, high rate).
    BroadcastExcludeSender { syscall: &'static str, data: Value },
    /// Relay `syscall` to the whole room INCLUDING sender. No reply; the
    /// sender sees its own copy arrive like everyone else's.
    BroadcastAll { syscall: &'static str, data: Value },
    /// Done to sender, then one `update` delta to the whole room.
    Update { kind: DeltaKind, data: Value },
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for receiving broadcast frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(256);

    let welcome = Frame::request(
        syscall::SESSION_CONNECTED,
        json!({"client_id": client_id.to_string(), "server_time": frames::now_ms()}),
    );
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    info!(%client_id, "ws: client connected");

    // Event this client has joined.
    let mut current_event: Option<String> = None;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let bytes = match msg {
                    Message::Binary(bytes) => bytes,
                    Message::Close(_) => break,
                    Message::Text(_) => {
                        let err = gateway_error("E_TEXT_FRAME", "binary frames only");
                        if send_frame(&mut socket, &err).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    _ => continue,
                };
                let replies = process_inbound_bytes(&state, &mut current_event, client_id, &client_tx, &bytes).await;
                for frame in replies {
                    let _ = send_frame(&mut socket, &frame).await;
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
                if frame.syscall == syscall::SESSION_KICK {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    if let Some(event_id) = current_event.take() {
        leave_event(&state, &event_id, client_id).await;
    }
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Decode one inbound binary message and process it. Returns frames for the
/// sender.
async fn process_inbound_bytes(
    state: &AppState,
    current_event: &mut Option<String>,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    bytes: &[u8],
) -> Vec<Frame> {
    match frames::decode_frame(bytes) {
        Ok(req) => process_inbound(state, current_event, client_id, client_tx, req).await,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            vec![gateway_error("E_DECODE", format!("invalid frame: {e}"))]
        }
    }
}

/// Dispatch one request frame and apply its outcome.
///
/// Kept separate from the socket so tests can drive dispatch with plain
/// channels.
async fn process_inbound(
    state: &AppState,
    current_event: &mut Option<String>,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    mut req: Frame,
) -> Vec<Frame> {
    if req.status != Status::Request {
        return vec![];
    }

    // Stamp the connection as `from`.
    req.from = Some(client_id.to_string());

    let is_scroll = req.prefix() == "scroll";
    if !is_scroll {
        info!(%client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");
    }

    let result = match req.prefix() {
        "event" => handle_event(state, current_event, client_id, client_tx, &req).await,
        "scroll" | "comment" | "presence" | "state" => match current_event.clone() {
            Some(event_id) => handle_room(state, &event_id, client_id, &req).await,
            None => Err(req.error("E_NOT_JOINED", "must join an event first")),
        },
        _ => Err(req.error("E_UNKNOWN_SYSCALL", format!("unknown syscall: {}", req.syscall))),
    };

    // Apply outcome; the dispatch layer owns all outbound logic.
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err_frame) => return vec![err_frame],
    };
    let event_id = current_event.as_deref().unwrap_or_default();
    match outcome {
        Outcome::Done => vec![req.done()],
        Outcome::BroadcastExcludeSender { syscall, data } => {
            let frame = relay_frame(syscall, data, event_id, client_id);
            room::broadcast(state, event_id, &frame, Some(client_id)).await;
            vec![]
        }
        Outcome::BroadcastAll { syscall, data } => {
            let frame = relay_frame(syscall, data, event_id, client_id);
            room::broadcast(state, event_id, &frame, None).await;
            vec![]
        }
        Outcome::Update { kind, data } => {
            room::broadcast_update(state, event_id, kind, data).await;
            vec![req.done()]
        }
    }
}

fn relay_frame(syscall: &str, data: Value, event_id: &str, client_id: Uuid) -> Frame {
    Frame::request(syscall, data)
        .with_event_id(event_id)
        .with_from(client_id.to_string())
}

// =============================================================================
// EVENT HANDLERS
// =============================================================================

async fn handle_event(
    state: &AppState,
    current_event: &mut Option<String>,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    req: &Frame,
) -> Result<Outcome, Frame> {
    let op = req.syscall.split_once(':').map_or("", |(_, op)| op);

    match op {
        "join" => {
            let Some(event_id) = requested_event(req) else {
                return Err(req.error("E_MISSING_EVENT", "event_id required"));
            };
            if current_event.as_deref() == Some(event_id.as_str()) {
                return Ok(Outcome::Done);
            }

            // Part current event if already joined.
            if let Some(old_event) = current_event.take() {
                leave_event(state, &old_event, client_id).await;
            }
            room::join_event(state, &event_id, client_id, client_tx.clone()).await;
            *current_event = Some(event_id);
            Ok(Outcome::Done)
        }
        "leave" => {
            if let Some(old_event) = current_event.take() {
                leave_event(state, &old_event, client_id).await;
            }
            Ok(Outcome::Done)
        }
        _ => Err(req.error("E_UNKNOWN_SYSCALL", format!("unknown event op: {op}"))),
    }
}

fn requested_event(req: &Frame) -> Option<String> {
    req.data
        .get("event_id")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .or_else(|| req.event_id.clone())
        .filter(|id| !id.trim().is_empty())
}

/// Leave a room and tell the remaining clients if the roster changed.
async fn leave_event(state: &AppState, event_id: &str, client_id: Uuid) {
    if let Some(roster) = room::part_event(state, event_id, client_id).await {
        room::broadcast_update(state, event_id, DeltaKind::PresenceUpdated, Value::Array(roster)).await;
    }
}

// =============================================================================
// ROOM HANDLERS
// =============================================================================

async fn handle_room(state: &AppState, event_id: &str, client_id: Uuid, req: &Frame) -> Result<Outcome, Frame> {
    match req.syscall.as_str() {
        syscall::SCROLL_UPDATE => {
            if !req.data.get("scrollPosition").is_some_and(Value::is_number) {
                return Err(req.error("E_INVALID_PAYLOAD", "scrollPosition required"));
            }
            Ok(Outcome::BroadcastExcludeSender { syscall: syscall::SCROLL_SYNC, data: req.data.clone() })
        }
        syscall::COMMENT_UPDATE => {
            if !req.data.get("action").is_some_and(Value::is_string) {
                return Err(req.error("E_INVALID_PAYLOAD", "action required"));
            }
            Ok(Outcome::BroadcastAll { syscall: syscall::COMMENT_SYNC, data: req.data.clone() })
        }
        syscall::PRESENCE_JOIN => {
            if !req.data.get("userId").is_some_and(Value::is_string) {
                return Err(req.error("E_INVALID_PAYLOAD", "userId required"));
            }
            match room::set_presence(state, event_id, client_id, req.data.clone()).await {
                Some(roster) => Ok(Outcome::Update { kind: DeltaKind::PresenceUpdated, data: Value::Array(roster) }),
                None => Err(req.error("E_NOT_JOINED", "must join an event first")),
            }
        }
        syscall::STATE_RESET => match timers::reset(state, event_id).await {
            Ok(_) => Ok(Outcome::Update { kind: DeltaKind::ResetAllStates, data: json!({"event_id": event_id}) }),
            Err(e) => Err(req.error_from(&e)),
        },
        syscall::STATE_SYNC => Ok(Outcome::Update {
            kind: DeltaKind::ActiveTimersUpdated,
            data: timers::active_timers_array(state, event_id).await,
        }),
        other => Err(req.error("E_UNKNOWN_SYSCALL", format!("unknown syscall: {other}"))),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let is_scroll = frame.syscall == syscall::SCROLL_SYNC;
    if !is_scroll {
        if frame.status == Status::Error {
            let code = frame.data.get("code").and_then(Value::as_str).unwrap_or("-");
            let message = frame.error_message().unwrap_or("-");
            warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
        } else {
            info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
        }
    }
    socket
        .send(Message::Binary(frames::encode_frame(frame).into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
