//! Timer persistence routes. Every mutation is broadcast to the event room
//! as the matching delta before the response is returned.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::frame::ErrorCode;
use crate::services::room;
use crate::services::timers::{self, Mutation, TimerStoreError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CueBody {
    pub event_id: String,
    pub item_id: i64,
    pub duration_seconds: i64,
    #[serde(default)]
    pub cue_label: String,
}

#[derive(Deserialize)]
pub struct StartBody {
    pub event_id: String,
    pub item_id: i64,
}

#[derive(Deserialize)]
pub struct EventBody {
    pub event_id: String,
}

#[derive(Deserialize)]
pub struct SubCueStopBody {
    pub event_id: String,
    #[serde(default)]
    pub item_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct MessageBody {
    pub event_id: String,
    #[serde(default)]
    pub message: String,
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct KickBody {
    #[serde(default)]
    pub reason: Option<String>,
}

// =============================================================================
// READS
// =============================================================================

/// `GET /api/active-timers/:event`: main timer row or null.
pub async fn active_timer(State(state): State<AppState>, Path(event_id): Path<String>) -> Json<Value> {
    Json(timers::active_timer(&state, &event_id).await)
}

/// `GET /api/sub-cue-timers/:event`: running sub-cue rows.
pub async fn sub_cue_timers(State(state): State<AppState>, Path(event_id): Path<String>) -> Json<Value> {
    Json(timers::sub_cue_timers(&state, &event_id).await)
}

/// `GET /api/timer-messages/:event`: every message of the event.
pub async fn timer_messages(State(state): State<AppState>, Path(event_id): Path<String>) -> Json<Value> {
    Json(timers::timer_messages(&state, &event_id).await)
}

// =============================================================================
// COMMANDS
// =============================================================================

/// `POST /api/cues/load`: load a cue as the main timer.
pub async fn load_cue(State(state): State<AppState>, Json(body): Json<CueBody>) -> Result<Json<Value>, StatusCode> {
    let result = timers::load_cue(&state, &body.event_id, body.item_id, body.duration_seconds, &body.cue_label).await;
    publish(&state, &body.event_id, result).await
}

/// `POST /api/timers/start`: start the loaded cue.
pub async fn start(State(state): State<AppState>, Json(body): Json<StartBody>) -> Result<Json<Value>, StatusCode> {
    let result = timers::start(&state, &body.event_id, body.item_id).await;
    publish(&state, &body.event_id, result).await
}

/// `POST /api/timers/stop`: stop the main timer.
pub async fn stop(State(state): State<AppState>, Json(body): Json<EventBody>) -> Result<Json<Value>, StatusCode> {
    let result = timers::stop(&state, &body.event_id).await;
    publish(&state, &body.event_id, result).await
}

/// `POST /api/timers/reset`: clear the main timer and sub-cues.
pub async fn reset(State(state): State<AppState>, Json(body): Json<EventBody>) -> Result<Json<Value>, StatusCode> {
    let result = timers::reset(&state, &body.event_id).await;
    publish(&state, &body.event_id, result).await
}

/// `POST /api/sub-cue-timers/start`
pub async fn start_sub_cue(State(state): State<AppState>, Json(body): Json<CueBody>) -> Result<Json<Value>, StatusCode> {
    let result =
        timers::start_sub_cue(&state, &body.event_id, body.item_id, body.duration_seconds, &body.cue_label).await;
    publish(&state, &body.event_id, result).await
}

/// `POST /api/sub-cue-timers/stop`
pub async fn stop_sub_cue(
    State(state): State<AppState>,
    Json(body): Json<SubCueStopBody>,
) -> Result<Json<Value>, StatusCode> {
    let result = timers::stop_sub_cue(&state, &body.event_id, body.item_id).await;
    publish(&state, &body.event_id, result).await
}

/// `POST /api/timer-messages`: enable or disable a message.
pub async fn set_message(
    State(state): State<AppState>,
    Json(body): Json<MessageBody>,
) -> Result<Json<Value>, StatusCode> {
    let result = timers::set_message(&state, &body.event_id, &body.message, body.enabled).await;
    publish(&state, &body.event_id, result).await
}

/// `POST /api/events/:event/kick`: force every client of the event off.
pub async fn kick(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    body: Option<Json<KickBody>>,
) -> Json<Value> {
    let reason = body.and_then(|Json(body)| body.reason);
    let kicked = room::kick(&state, &event_id, reason.as_deref()).await;
    Json(json!({"kicked": kicked}))
}

/// Broadcast a successful mutation and answer with its payload.
async fn publish(
    state: &AppState,
    event_id: &str,
    result: Result<Mutation, TimerStoreError>,
) -> Result<Json<Value>, StatusCode> {
    let mutation = result.map_err(timer_error_to_status)?;
    room::broadcast_update(state, event_id, mutation.kind, mutation.data.clone()).await;
    Ok(Json(mutation.data))
}

pub(crate) fn timer_error_to_status(err: TimerStoreError) -> StatusCode {
    warn!(code = err.error_code(), error = %err, "timers: command rejected");
    match err {
        TimerStoreError::NoActiveTimer(_) | TimerStoreError::SubCueNotFound { .. } => StatusCode::NOT_FOUND,
        TimerStoreError::NotLoaded { .. } => StatusCode::CONFLICT,
        TimerStoreError::InvalidDuration(_) | TimerStoreError::MissingEvent => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
#[path = "timers_test.rs"]
mod tests;
