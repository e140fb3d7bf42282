//! Typed view of the frames a joined client receives.

use frames::{DeltaKind, Frame, Status, syscall};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::comments::CommentMessage;
use crate::scroll::ScrollMessage;

/// One `update` envelope: `{ type, data }`.
#[derive(Clone, Debug, PartialEq)]
pub struct Delta {
    pub kind: DeltaKind,
    pub data: Value,
}

/// Someone viewing the event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default = "default_role")]
    pub user_role: String,
}

fn default_role() -> String {
    "VIEWER".to_owned()
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Delta(Delta),
    Presence(Vec<PresenceEntry>),
    Scroll(ScrollMessage),
    Comment(CommentMessage),
    ServerError { code: Option<String>, message: String },
}

/// Classify a post-join frame. Unknown or malformed frames are logged and
/// return `None`.
#[must_use]
pub fn parse_inbound(frame: &Frame) -> Option<Inbound> {
    if frame.status == Status::Error {
        return Some(server_error(frame));
    }

    match frame.syscall.as_str() {
        syscall::UPDATE => parse_update(&frame.data),
        syscall::SCROLL_SYNC => decode(&frame.data, "scroll").map(Inbound::Scroll),
        syscall::COMMENT_SYNC => decode(&frame.data, "comment").map(Inbound::Comment),
        syscall::GATEWAY_ERROR => Some(server_error(frame)),
        // Replies to our own requests carry nothing to apply.
        _ if frame.parent_id.is_some() => None,
        other => {
            tracing::debug!(syscall = other, "wire: ignoring frame");
            None
        }
    }
}

fn parse_update(data: &Value) -> Option<Inbound> {
    let Some(kind_name) = data.get("type").and_then(Value::as_str) else {
        tracing::warn!(%data, "wire: update without type");
        return None;
    };
    let Some(kind) = DeltaKind::parse(kind_name) else {
        tracing::warn!(kind = kind_name, "wire: unknown update type ignored");
        return None;
    };
    let payload = data.get("data").cloned().unwrap_or(Value::Null);

    if kind == DeltaKind::PresenceUpdated {
        let entries = match payload {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value::<PresenceEntry>(item).ok())
                .collect(),
            _ => Vec::new(),
        };
        return Some(Inbound::Presence(entries));
    }

    Some(Inbound::Delta(Delta { kind, data: payload }))
}

fn decode<T: serde::de::DeserializeOwned>(data: &Value, what: &'static str) -> Option<T> {
    match serde_json::from_value(data.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(what, error = %e, "wire: malformed payload dropped");
            None
        }
    }
}

fn server_error(frame: &Frame) -> Inbound {
    Inbound::ServerError {
        code: frame.data.get("code").and_then(Value::as_str).map(ToOwned::to_owned),
        message: frame
            .error_message()
            .or_else(|| frame.data.get("message").and_then(Value::as_str))
            .unwrap_or("unknown error")
            .to_owned(),
    }
}

/// Server clock reading from a `session:connected` welcome, in epoch ms.
/// Accepts a number or an RFC 3339 string.
#[must_use]
pub fn server_time_ms(data: &Value) -> Option<i64> {
    let raw = data.get("server_time").or_else(|| data.get("serverTime"))?;
    if let Some(ms) = raw.as_i64() {
        return Some(ms);
    }
    let parsed = time::OffsetDateTime::parse(raw.as_str()?, &time::format_description::well_known::Rfc3339).ok()?;
    i64::try_from(parsed.unix_timestamp_nanos() / 1_000_000).ok()
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod tests;
