//! Client for the persistence API (system of record for timers, messages
//! and scripts).
//!
//! Reads feed resync; commands are issued by operators. Neither is retried
//! here: read failures degrade to "no data yet" in the caller, command
//! failures go back to whoever issued the command.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::comments::Comment;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not build http client: {0}")]
    ClientBuild(String),
    #[error("session stopped before the script was handed over")]
    SessionClosed,
}

/// Operator commands against the timer store.
#[derive(Clone, Debug, PartialEq)]
pub enum TimerCommand {
    LoadCue { event_id: String, item_id: i64, duration_seconds: i64, cue_label: String },
    Start { event_id: String, item_id: i64 },
    Stop { event_id: String },
    Reset { event_id: String },
    StartSubCue { event_id: String, item_id: i64, duration_seconds: i64, cue_label: String },
    StopSubCue { event_id: String, item_id: Option<i64> },
    SetMessage { event_id: String, message: String, enabled: bool },
    Kick { event_id: String, reason: Option<String> },
}

impl TimerCommand {
    #[must_use]
    pub fn event_id(&self) -> &str {
        match self {
            Self::LoadCue { event_id, .. }
            | Self::Start { event_id, .. }
            | Self::Stop { event_id }
            | Self::Reset { event_id }
            | Self::StartSubCue { event_id, .. }
            | Self::StopSubCue { event_id, .. }
            | Self::SetMessage { event_id, .. }
            | Self::Kick { event_id, .. } => event_id,
        }
    }

    /// API path this command posts to.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::LoadCue { .. } => "/api/cues/load".to_owned(),
            Self::Start { .. } => "/api/timers/start".to_owned(),
            Self::Stop { .. } => "/api/timers/stop".to_owned(),
            Self::Reset { .. } => "/api/timers/reset".to_owned(),
            Self::StartSubCue { .. } => "/api/sub-cue-timers/start".to_owned(),
            Self::StopSubCue { .. } => "/api/sub-cue-timers/stop".to_owned(),
            Self::SetMessage { .. } => "/api/timer-messages".to_owned(),
            Self::Kick { event_id, .. } => format!("/api/events/{event_id}/kick"),
        }
    }

    /// JSON request body.
    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::LoadCue { event_id, item_id, duration_seconds, cue_label }
            | Self::StartSubCue { event_id, item_id, duration_seconds, cue_label } => json!({
                "event_id": event_id,
                "item_id": item_id,
                "duration_seconds": duration_seconds,
                "cue_label": cue_label,
            }),
            Self::Start { event_id, item_id } => json!({"event_id": event_id, "item_id": item_id}),
            Self::Stop { event_id } | Self::Reset { event_id } => json!({"event_id": event_id}),
            Self::StopSubCue { event_id, item_id } => json!({"event_id": event_id, "item_id": item_id}),
            Self::SetMessage { event_id, message, enabled } => {
                json!({"event_id": event_id, "message": message, "enabled": enabled})
            }
            Self::Kick { reason, .. } => json!({"reason": reason}),
        }
    }
}

/// A saved script with its comments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptDocument {
    pub event_id: String,
    pub script_text: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Read and command surface of the persistence API. Trait object so the
/// sync layer can run against an in-memory fake in tests.
#[async_trait::async_trait]
pub trait Persistence: Send + Sync {
    /// Active main timer: an object, an array (newest first), or null.
    ///
    /// # Errors
    ///
    /// Transport failure or non-success status.
    async fn active_timer(&self, event_id: &str) -> Result<Value, PersistenceError>;

    /// Running sub-cue timers.
    ///
    /// # Errors
    ///
    /// Transport failure or non-success status.
    async fn sub_cue_timers(&self, event_id: &str) -> Result<Value, PersistenceError>;

    /// Timer messages for the event.
    ///
    /// # Errors
    ///
    /// Transport failure or non-success status.
    async fn timer_message(&self, event_id: &str) -> Result<Value, PersistenceError>;

    /// Issue an operator command. Never retried.
    ///
    /// # Errors
    ///
    /// Transport failure or non-success status.
    async fn send(&self, command: &TimerCommand) -> Result<Value, PersistenceError>;

    /// Saved script for the event, if any.
    ///
    /// # Errors
    ///
    /// Transport failure or non-success status.
    async fn load_script(&self, event_id: &str) -> Result<Option<ScriptDocument>, PersistenceError>;

    /// Save the script text and its comments.
    ///
    /// # Errors
    ///
    /// Transport failure or non-success status.
    async fn save_script(&self, document: &ScriptDocument) -> Result<(), PersistenceError>;
}

/// `reqwest` implementation against the relay server's HTTP API.
#[derive(Clone, Debug)]
pub struct HttpPersistence {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPersistence {
    /// # Errors
    ///
    /// Returns [`PersistenceError::ClientBuild`] if the TLS backend cannot
    /// be initialized.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PersistenceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| PersistenceError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    async fn get_json(&self, path: &str) -> Result<Value, PersistenceError> {
        let response = self.http.get(format!("{}{path}", self.base_url)).send().await?;
        read_json(response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, PersistenceError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, PersistenceError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(PersistenceError::Status { status: status.as_u16(), body: text });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[async_trait::async_trait]
impl Persistence for HttpPersistence {
    async fn active_timer(&self, event_id: &str) -> Result<Value, PersistenceError> {
        self.get_json(&format!("/api/active-timers/{event_id}")).await
    }

    async fn sub_cue_timers(&self, event_id: &str) -> Result<Value, PersistenceError> {
        self.get_json(&format!("/api/sub-cue-timers/{event_id}")).await
    }

    async fn timer_message(&self, event_id: &str) -> Result<Value, PersistenceError> {
        self.get_json(&format!("/api/timer-messages/{event_id}")).await
    }

    async fn send(&self, command: &TimerCommand) -> Result<Value, PersistenceError> {
        tracing::info!(event_id = command.event_id(), path = %command.path(), "persistence: command");
        self.post_json(&command.path(), &command.body()).await
    }

    async fn load_script(&self, event_id: &str) -> Result<Option<ScriptDocument>, PersistenceError> {
        let value = self.get_json(&format!("/api/scripts/{event_id}")).await?;
        if value.is_null() {
            return Ok(None);
        }
        match serde_json::from_value(value) {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                tracing::warn!(%event_id, error = %e, "persistence: malformed script document");
                Ok(None)
            }
        }
    }

    async fn save_script(&self, document: &ScriptDocument) -> Result<(), PersistenceError> {
        let response = self
            .http
            .put(format!("{}/api/scripts/{}", self.base_url, document.event_id))
            .json(document)
            .send()
            .await?;
        read_json(response).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
