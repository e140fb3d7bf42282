//! Timer state: snapshots, payload normalization, and the per-event engine.

pub mod engine;
pub mod normalize;
pub mod snapshot;

pub use engine::{Applied, TimerEngine};
pub use normalize::ActiveTimer;
pub use snapshot::{Countdown, TimerMessage, TimerSnapshot, TimerState};
