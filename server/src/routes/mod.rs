//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the realtime relay (`/api/ws`), the timer and
//! script persistence API that clients resync from, and a health check.

pub mod scripts;
pub mod timers;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ws", get(ws::handle_ws))
        .route("/api/active-timers/{event}", get(timers::active_timer))
        .route("/api/sub-cue-timers/{event}", get(timers::sub_cue_timers))
        .route("/api/timer-messages/{event}", get(timers::timer_messages))
        .route("/api/cues/load", post(timers::load_cue))
        .route("/api/timers/start", post(timers::start))
        .route("/api/timers/stop", post(timers::stop))
        .route("/api/timers/reset", post(timers::reset))
        .route("/api/sub-cue-timers/start", post(timers::start_sub_cue))
        .route("/api/sub-cue-timers/stop", post(timers::stop_sub_cue))
        .route("/api/timer-messages", post(timers::set_message))
        .route("/api/events/{event}/kick", post(timers::kick))
        .route("/api/scripts/{event}", get(scripts::load).put(scripts::save))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
