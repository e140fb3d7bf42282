//! Event-scoped realtime synchronization for a live production console.
//!
//! Keeps every client of an event (control room, talent displays, remote
//! viewers) consistent with one authoritative timer state and one scroller,
//! across jitter, reconnects and concurrent sub-states.
//!
//! The pieces, leaf first:
//!
//! - [`transport`]: one owned connection per event with join gating,
//!   linear reconnect backoff and observer subscriptions.
//! - [`timer`]: normalized timer snapshots and the per-event timer engine.
//! - [`scroll`]: throttled scroller broadcasts and smoothed viewer following.
//! - [`remap`]: moves line-anchored comments across script edits.
//! - [`resync`]: one baseline pull per connection, deltas held meanwhile.
//! - [`session`]: the task that wires all of the above for a host UI.

pub mod comments;
pub mod config;
pub mod persistence;
pub mod remap;
pub mod resync;
pub mod schedule;
pub mod scroll;
pub mod session;
pub mod timer;
pub mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::{ConfigError, SyncConfig};
pub use persistence::{HttpPersistence, Persistence, PersistenceError, ScriptDocument, TimerCommand};
pub use session::{SessionEvent, SessionHandle, SessionView};
pub use transport::{ConnectionStatus, TransportAdapter, TransportError, TransportEvent, WsConnector};
