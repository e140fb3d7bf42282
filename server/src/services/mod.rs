//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own room membership and timer state so route handlers
//! can stay focused on protocol translation.

pub mod room;
pub mod timers;
