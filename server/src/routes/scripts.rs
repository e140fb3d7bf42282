//! Script storage routes: the script text of an event plus its comments.

use axum::extract::{Path, State};
use axum::response::Json;
use serde_json::{Value, json};
use showsync::ScriptDocument;
use tracing::info;

use crate::state::AppState;

/// `GET /api/scripts/:event`: saved document, or null when none exists.
pub async fn load(State(state): State<AppState>, Path(event_id): Path<String>) -> Json<Value> {
    let scripts = state.scripts.read().await;
    Json(
        scripts
            .get(&event_id)
            .and_then(|doc| serde_json::to_value(doc).ok())
            .unwrap_or(Value::Null),
    )
}

/// `PUT /api/scripts/:event`: replace the saved document. The path names
/// the event; a body `event_id` is overwritten.
pub async fn save(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(mut document): Json<ScriptDocument>,
) -> Json<Value> {
    document.event_id.clone_from(&event_id);
    let comments = document.comments.len();
    state.scripts.write().await.insert(event_id.clone(), document);
    info!(%event_id, comments, "scripts: saved");
    Json(json!({"ok": true}))
}
