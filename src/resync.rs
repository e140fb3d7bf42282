//! Baseline pull on every (re)connect.
//!
//! DESIGN
//! ======
//! Each successful join carries a connection generation. The controller
//! starts exactly one baseline fetch per generation and, while that fetch is
//! in flight, holds back every delta that arrives. When the baseline lands
//! the caller applies it first and then replays the held deltas in arrival
//! order. A newer generation (or a disconnect) aborts the stale fetch and
//! throws its held deltas away: the next baseline supersedes them.
//!
//! The three reads run concurrently and fail independently. A failed read
//! yields `None` for that slice, which the timer engine treats as "keep
//! what you have".

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::persistence::{Persistence, PersistenceError};
use crate::wire::Delta;

/// Result of one baseline pull. `None` marks a slice whose fetch failed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Baseline {
    pub active_timer: Option<Value>,
    pub sub_cue_timers: Option<Value>,
    pub timer_message: Option<Value>,
}

/// A finished baseline pull, tagged with the generation that asked for it.
#[derive(Debug)]
pub struct Completed {
    pub generation: u64,
    pub baseline: Baseline,
}

/// Fetch all three slices concurrently.
pub async fn fetch_baseline(persistence: &dyn Persistence, event_id: &str) -> Baseline {
    let (active, sub_cues, message) = tokio::join!(
        persistence.active_timer(event_id),
        persistence.sub_cue_timers(event_id),
        persistence.timer_message(event_id),
    );

    Baseline {
        active_timer: keep(event_id, "active_timer", active),
        sub_cue_timers: keep(event_id, "sub_cue_timers", sub_cues),
        timer_message: keep(event_id, "timer_message", message),
    }
}

fn keep(event_id: &str, slice: &'static str, result: Result<Value, PersistenceError>) -> Option<Value> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(%event_id, slice, error = %e, "resync: fetch failed, keeping previous state");
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct ResyncController {
    last_generation: Option<u64>,
    in_flight: Option<u64>,
    held: Vec<Delta>,
    task: Option<JoinHandle<()>>,
}

impl ResyncController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection generation became live. Returns `true` when a baseline
    /// fetch should start (first sighting of this generation).
    pub fn on_connected(&mut self, generation: u64) -> bool {
        if self.last_generation.is_some_and(|last| last >= generation) {
            debug!(generation, "resync: generation already synced");
            return false;
        }
        if !self.held.is_empty() {
            debug!(dropped = self.held.len(), "resync: discarding deltas held for stale generation");
        }
        self.abort_task();
        self.held.clear();
        self.last_generation = Some(generation);
        self.in_flight = Some(generation);
        true
    }

    /// Spawn the fetch for `generation`; the result arrives on `done`.
    pub fn start(
        &mut self,
        persistence: Arc<dyn Persistence>,
        event_id: String,
        generation: u64,
        done: mpsc::UnboundedSender<Completed>,
    ) {
        info!(%event_id, generation, "resync: fetching baseline");
        self.abort_task();
        self.task = Some(tokio::spawn(async move {
            let baseline = fetch_baseline(persistence.as_ref(), &event_id).await;
            let _ = done.send(Completed { generation, baseline });
        }));
    }

    /// Pass a delta through, or hold it while a baseline is in flight.
    pub fn gate(&mut self, delta: Delta) -> Option<Delta> {
        if self.in_flight.is_some() {
            self.held.push(delta);
            None
        } else {
            Some(delta)
        }
    }

    /// A fetch finished. Returns the held deltas to replay after applying
    /// the baseline, or `None` when the result belongs to a stale generation.
    pub fn complete(&mut self, generation: u64) -> Option<Vec<Delta>> {
        if self.in_flight != Some(generation) {
            debug!(generation, "resync: ignoring stale baseline");
            return None;
        }
        self.in_flight = None;
        self.task = None;
        Some(std::mem::take(&mut self.held))
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Connection gone: abort the fetch and drop held deltas. The next
    /// connection gets a fresh baseline.
    pub fn cancel(&mut self) {
        self.abort_task();
        self.in_flight = None;
        self.held.clear();
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ResyncController {
    fn drop(&mut self) {
        self.abort_task();
    }
}

#[cfg(test)]
#[path = "resync_test.rs"]
mod tests;
