//! Shared frame model and protobuf codec for the event-room WS transport.
//!
//! This crate owns the wire representation used by the `server` relay, the
//! `showsync` client core, and the `cli`. Payloads stay flexible
//! (`serde_json::Value`) while the envelope is encoded over protobuf for
//! compact binary transport.
//!
//! SYSCALLS
//! ========
//! Every frame names its operation with a namespaced `syscall`
//! (`"event:join"`, `"scroll:update"`, ...). The full vocabulary lives in
//! [`syscall`]; the relay routes on the prefix and never inspects `data`
//! except where it must rewrite it for broadcast.

use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Namespaced operation names carried in [`Frame::syscall`].
pub mod syscall {
    /// Server → client welcome. `data.server_time` is epoch millis.
    pub const SESSION_CONNECTED: &str = "session:connected";
    /// Server → client administrative disconnect. Clients must not reconnect.
    pub const SESSION_KICK: &str = "session:kick";
    /// Client → server room join. Answered with a `done` frame (the join ack).
    pub const EVENT_JOIN: &str = "event:join";
    /// Client → server room leave.
    pub const EVENT_LEAVE: &str = "event:leave";
    /// Server → client delta envelope `{ type, data }`.
    pub const UPDATE: &str = "update";
    /// Scroller → server scroll position.
    pub const SCROLL_UPDATE: &str = "scroll:update";
    /// Server → viewers scroll position (sender excluded).
    pub const SCROLL_SYNC: &str = "scroll:sync";
    /// Client → server comment mutation.
    pub const COMMENT_UPDATE: &str = "comment:update";
    /// Server → room comment mutation (sender included).
    pub const COMMENT_SYNC: &str = "comment:sync";
    /// Client → server presence identity.
    pub const PRESENCE_JOIN: &str = "presence:join";
    /// Client → server request to broadcast `resetAllStates`.
    pub const STATE_RESET: &str = "state:reset";
    /// Client → server request to rebroadcast the active timers.
    pub const STATE_SYNC: &str = "state:sync";
    /// Server → client protocol-level error not tied to a request.
    pub const GATEWAY_ERROR: &str = "gateway:error";
}

/// The `type` tag of an `update` delta envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    RunOfShowDataUpdated,
    TimerUpdated,
    TimerStopped,
    TimersStopped,
    SubCueTimerStarted,
    SubCueTimerStopped,
    ActiveTimersUpdated,
    TimerMessageUpdated,
    ResetAllStates,
    PresenceUpdated,
}

impl DeltaKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunOfShowDataUpdated => "runOfShowDataUpdated",
            Self::TimerUpdated => "timerUpdated",
            Self::TimerStopped => "timerStopped",
            Self::TimersStopped => "timersStopped",
            Self::SubCueTimerStarted => "subCueTimerStarted",
            Self::SubCueTimerStopped => "subCueTimerStopped",
            Self::ActiveTimersUpdated => "activeTimersUpdated",
            Self::TimerMessageUpdated => "timerMessageUpdated",
            Self::ResetAllStates => "resetAllStates",
            Self::PresenceUpdated => "presenceUpdated",
        }
    }

    /// Parse an envelope `type`. Unknown names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name {
            "runOfShowDataUpdated" => Self::RunOfShowDataUpdated,
            "timerUpdated" => Self::TimerUpdated,
            "timerStopped" => Self::TimerStopped,
            "timersStopped" => Self::TimersStopped,
            "subCueTimerStarted" => Self::SubCueTimerStarted,
            "subCueTimerStopped" => Self::SubCueTimerStopped,
            "activeTimersUpdated" => Self::ActiveTimersUpdated,
            "timerMessageUpdated" => Self::TimerMessageUpdated,
            "resetAllStates" => Self::ResetAllStates,
            "presenceUpdated" => Self::PresenceUpdated,
            _ => return None,
        };
        Some(kind)
    }
}

/// Error returned by [`decode_frame`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireFrame`.
    #[error("failed to decode protobuf frame: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The `status` integer on the wire does not map to a known [`Status`] variant.
    #[error("invalid frame status: {0}")]
    InvalidStatus(i32),
}

/// Lifecycle status of a frame in a request/response exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Initial request frame, or an unsolicited broadcast.
    Request,
    /// Successful terminal response.
    Done,
    /// Error terminal response.
    Error,
}

impl Status {
    /// Convert status into wire enum integer value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Request => WireFrameStatus::Request as i32,
            Self::Done => WireFrameStatus::Done as i32,
            Self::Error => WireFrameStatus::Error as i32,
        }
    }

    /// Parse a status from wire enum integer value.
    fn from_i32(value: i32) -> Result<Self, CodecError> {
        match WireFrameStatus::try_from(value) {
            Ok(WireFrameStatus::Request) => Ok(Self::Request),
            Ok(WireFrameStatus::Done) => Ok(Self::Done),
            Ok(WireFrameStatus::Error) => Ok(Self::Error),
            Err(_) => Err(CodecError::InvalidStatus(value)),
        }
    }
}

/// A single message on the realtime wire protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Unique identifier for this frame (UUID string).
    pub id: String,
    /// ID of the request frame this is responding to, if any.
    pub parent_id: Option<String>,
    /// Milliseconds since the Unix epoch when the frame was created.
    pub ts: i64,
    /// Event (room) context for this frame, if any.
    pub event_id: Option<String>,
    /// Sender identifier (client ID or system label).
    pub from: Option<String>,
    /// Namespaced operation name, e.g. `"scroll:update"`.
    pub syscall: String,
    /// Lifecycle position of the frame.
    pub status: Status,
    /// Arbitrary JSON payload.
    pub data: Value,
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Create a request frame. Entry point for every syscall and broadcast.
    pub fn request(syscall: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: None,
            ts: now_ms(),
            event_id: None,
            from: None,
            syscall: syscall.into(),
            status: Status::Request,
            data,
        }
    }

    /// Create an `update` broadcast wrapping a delta envelope `{ type, data }`.
    pub fn update(event_id: impl Into<String>, kind: DeltaKind, data: Value) -> Self {
        let mut envelope = Map::new();
        envelope.insert("type".into(), Value::String(kind.as_str().to_owned()));
        envelope.insert("data".into(), data);
        Self::request(syscall::UPDATE, Value::Object(envelope)).with_event_id(event_id)
    }

    /// Create a done response carrying `data`. Terminal.
    #[must_use]
    pub fn done_with(&self, data: Value) -> Self {
        self.reply(Status::Done, data)
    }

    /// Create an empty done response. Terminal.
    #[must_use]
    pub fn done(&self) -> Self {
        self.reply(Status::Done, Value::Object(Map::new()))
    }

    /// Create an error response with a grepable code. Terminal.
    #[must_use]
    pub fn error(&self, code: &str, message: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("code".into(), Value::String(code.to_owned()));
        data.insert("message".into(), Value::String(message.into()));
        self.reply(Status::Error, Value::Object(data))
    }

    /// Build a reply frame. Inherits `parent_id`, `event_id`, and `syscall`.
    fn reply(&self, status: Status, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: Some(self.id.clone()),
            ts: now_ms(),
            event_id: self.event_id.clone(),
            from: None,
            syscall: self.syscall.clone(),
            status,
            data,
        }
    }

    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// The namespace part of the syscall (`"scroll"` for `"scroll:update"`).
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.syscall.split_once(':').map_or(self.syscall.as_str(), |(p, _)| p)
    }

    /// True when this frame answers the request with id `request_id`.
    #[must_use]
    pub fn answers(&self, request_id: &str) -> bool {
        self.parent_id.as_deref() == Some(request_id)
    }

    /// Error message of an error frame, if present.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        if self.status != Status::Error {
            return None;
        }
        self.data
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| self.data.get("error").and_then(Value::as_str))
    }
}

/// Encode a frame into protobuf bytes.
#[must_use]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let wire = frame_to_wire(frame);

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec cannot fail; prost only reports
    // `BufferTooSmall`.
    wire.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into a frame.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes and
/// [`CodecError::InvalidStatus`] for out-of-range status values.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CodecError> {
    let wire = WireFrame::decode(bytes)?;
    wire_to_frame(wire)
}

fn frame_to_wire(frame: &Frame) -> WireFrame {
    WireFrame {
        id: frame.id.clone(),
        parent_id: frame.parent_id.clone(),
        ts: frame.ts,
        event_id: frame.event_id.clone(),
        from: frame.from.clone(),
        syscall: frame.syscall.clone(),
        status: frame.status.as_i32(),
        data: Some(json_to_proto_value(&frame.data)),
    }
}

fn wire_to_frame(wire: WireFrame) -> Result<Frame, CodecError> {
    Ok(Frame {
        id: wire.id,
        parent_id: wire.parent_id,
        ts: wire.ts,
        event_id: wire.event_id,
        from: wire.from,
        syscall: wire.syscall,
        status: Status::from_i32(wire.status)?,
        data: wire
            .data
            .map_or(Value::Object(Map::new()), |v| proto_to_json_value(&v)),
    })
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => {
            prost_types::value::Kind::NullValue(prost_types::NullValue::NullValue as i32)
        }
        Value::Bool(v) => prost_types::value::Kind::BoolValue(*v),
        Value::Number(v) => prost_types::value::Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => prost_types::value::Kind::StringValue(v.clone()),
        Value::Array(v) => prost_types::value::Kind::ListValue(prost_types::ListValue {
            values: v.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(v) => prost_types::value::Kind::StructValue(prost_types::Struct {
            fields: v
                .iter()
                .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
                .collect(),
        }),
    };

    prost_types::Value { kind: Some(kind) }
}

/// Protobuf `Value` carries every number as `f64`; whole numbers come back as
/// integers so ids and second counts survive the round trip as JSON integers.
fn proto_to_json_value(value: &prost_types::Value) -> Value {
    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        prost_types::value::Kind::NullValue(_) => Value::Null,
        prost_types::value::Kind::NumberValue(v) => number_to_json(*v),
        prost_types::value::Kind::StringValue(v) => Value::String(v.clone()),
        prost_types::value::Kind::BoolValue(v) => Value::Bool(*v),
        prost_types::value::Kind::StructValue(v) => Value::Object(
            v.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect(),
        ),
        prost_types::value::Kind::ListValue(v) => {
            Value::Array(v.values.iter().map(proto_to_json_value).collect())
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number_to_json(v: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if v.fract() == 0.0 && v.abs() <= MAX_EXACT {
        return Value::from(v as i64);
    }
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

#[derive(Clone, PartialEq, Message)]
struct WireFrame {
    #[prost(string, tag = "1")]
    id: String,
    #[prost(string, optional, tag = "2")]
    parent_id: Option<String>,
    #[prost(int64, tag = "3")]
    ts: i64,
    #[prost(string, optional, tag = "4")]
    event_id: Option<String>,
    #[prost(string, optional, tag = "5")]
    from: Option<String>,
    #[prost(string, tag = "6")]
    syscall: String,
    #[prost(enumeration = "WireFrameStatus", tag = "7")]
    status: i32,
    #[prost(message, optional, tag = "8")]
    data: Option<prost_types::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WireFrameStatus {
    Request = 0,
    Done = 1,
    Error = 2,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
