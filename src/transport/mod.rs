//! Event-scoped realtime transport.
//!
//! DESIGN
//! ======
//! One [`TransportAdapter`] per session owns at most one connection, bound to
//! one event (room). The adapter is an actor: public methods push commands
//! over a channel and never block, the actor task owns the link, the join
//! handshake and the reconnect backoff.
//!
//! Consumers observe the connection through independent [`Subscription`]s.
//! Every subscriber sees the same ordered stream of [`TransportEvent`]s;
//! `Connected` for a generation is always published before any frame
//! received on that connection.
//!
//! The wire itself sits behind [`Connector`] / [`Link`] so the actor can be
//! driven by the WebSocket implementation in [`ws`] or an in-memory fake.

mod adapter;
pub mod backoff;
pub mod ws;

use std::time::Duration;

use frames::{CodecError, Frame};

pub use adapter::{Subscription, TransportAdapter};
pub use ws::WsConnector;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connection closed")]
    Closed,
    #[error("timed out waiting for join acknowledgement")]
    JoinTimeout,
    #[error("join rejected: {0}")]
    JoinRejected(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("frame codec error: {0}")]
    Codec(String),
    #[error("transport shut down")]
    Shutdown,
}

impl From<CodecError> for TransportError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e.to_string())
    }
}

/// Opens links to the relay.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the handshake fails.
    async fn open(&self, url: &str) -> Result<Box<dyn Link>, TransportError>;
}

/// One open, bidirectional frame link.
#[async_trait::async_trait]
pub trait Link: Send {
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] when the link cannot accept the frame.
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Next inbound frame. `None` once the peer has closed the link.
    /// Must be cancel safe: it is polled inside `select!`.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    async fn close(&mut self);
}

/// Why a joined connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Local `disconnect` or shutdown.
    Requested,
    /// Local `connect` to a different event.
    Switched,
    /// The link failed; a reconnect follows unless attempts are exhausted.
    Dropped,
    /// Administrative force-disconnect; no reconnect.
    Kicked { reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Join acknowledged. `generation` increases with every successful join.
    Connected { event_id: String, generation: u64, server_time_ms: Option<i64> },
    /// A frame received after the join acknowledgement.
    Frame(Frame),
    Disconnected { event_id: String, reason: DisconnectReason },
    Reconnecting { event_id: String, attempt: u32, delay: Duration },
    /// Reconnect attempts exhausted; stays down until the next `connect`.
    GaveUp { event_id: String, attempts: u32 },
}

/// Current link state, readable synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting { event_id: String, attempt: u32 },
    Connected { event_id: String, generation: u64 },
}

impl ConnectionStatus {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Disconnected => None,
            Self::Connecting { event_id, .. } | Self::Connected { event_id, .. } => Some(event_id),
        }
    }
}

#[cfg(test)]
pub(crate) mod fake;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
