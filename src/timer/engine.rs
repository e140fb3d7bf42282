//! Locally observed timer state for one event.
//!
//! DESIGN
//! ======
//! The engine is a plain state holder: deltas and resync baselines go in
//! through [`TimerEngine::apply`] / [`TimerEngine::apply_baseline`], and the
//! session reads countdowns out once per tick with a local `now`. It never
//! touches the network and never looks at a wire "elapsed" field.
//!
//! CUE CHANGES
//! ===========
//! The main timer's identity is `(item_id, started_at)`. Whenever an update
//! changes that key, every sub-cue timer of the event is dropped in the same
//! call, whatever the update was about.

use std::collections::BTreeMap;

use frames::DeltaKind;
use serde_json::Value;
use time::OffsetDateTime;

use super::normalize::{self, ActiveTimer};
use super::snapshot::{Countdown, TimerMessage, TimerSnapshot};
use crate::resync::Baseline;

/// What a delta did to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Timer or message state changed.
    Timers,
    /// The run of show changed; the host should refetch its schedule.
    ScheduleChanged,
    /// Nothing to do (foreign event, malformed payload, unrelated kind).
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CueKey {
    item_id: i64,
    started_at: Option<OffsetDateTime>,
}

impl CueKey {
    fn of(snapshot: &TimerSnapshot) -> Self {
        Self { item_id: snapshot.item_id, started_at: snapshot.started_at }
    }
}

#[derive(Debug)]
pub struct TimerEngine {
    event_id: String,
    main: Option<TimerSnapshot>,
    /// Last loaded cue, kept after a stop so idle rendering shows its duration.
    retained: Option<TimerSnapshot>,
    sub_cues: BTreeMap<i64, TimerSnapshot>,
    message: Option<TimerMessage>,
    cue_key: Option<CueKey>,
}

impl TimerEngine {
    #[must_use]
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            main: None,
            retained: None,
            sub_cues: BTreeMap::new(),
            message: None,
            cue_key: None,
        }
    }

    #[must_use]
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Apply one `update` delta.
    pub fn apply(&mut self, kind: DeltaKind, data: &Value) -> Applied {
        if let Some(target) = normalize::payload_event_id(data) {
            if target != self.event_id {
                tracing::debug!(kind = kind.as_str(), %target, event_id = %self.event_id, "timer: ignoring delta for other event");
                return Applied::Ignored;
            }
        }

        match kind {
            DeltaKind::TimerUpdated | DeltaKind::ActiveTimersUpdated => match normalize::active_timer(data) {
                Some(active) => {
                    self.apply_active(active);
                    Applied::Timers
                }
                None => {
                    tracing::warn!(kind = kind.as_str(), %data, "timer: malformed active timer payload");
                    Applied::Ignored
                }
            },
            DeltaKind::TimerStopped => {
                self.set_main(None);
                Applied::Timers
            }
            DeltaKind::TimersStopped => {
                self.set_main(None);
                self.sub_cues.clear();
                Applied::Timers
            }
            DeltaKind::SubCueTimerStarted => {
                let rows = normalize::sub_cue_timers(data);
                if rows.is_empty() {
                    tracing::warn!(%data, "timer: sub-cue start without a timer row");
                    return Applied::Ignored;
                }
                for row in rows {
                    self.upsert_sub_cue(row);
                }
                Applied::Timers
            }
            DeltaKind::SubCueTimerStopped => {
                match normalize::payload_item_id(data) {
                    Some(item_id) => {
                        self.sub_cues.remove(&item_id);
                    }
                    None => self.sub_cues.clear(),
                }
                Applied::Timers
            }
            DeltaKind::TimerMessageUpdated => {
                self.message = normalize::timer_message(data);
                Applied::Timers
            }
            DeltaKind::ResetAllStates => {
                self.reset();
                Applied::Timers
            }
            DeltaKind::RunOfShowDataUpdated => Applied::ScheduleChanged,
            DeltaKind::PresenceUpdated => Applied::Ignored,
        }
    }

    /// Overwrite each fetched slice wholesale. Slices whose fetch failed
    /// (`None`) are left as they are.
    pub fn apply_baseline(&mut self, baseline: &Baseline) {
        if let Some(active) = &baseline.active_timer {
            match normalize::active_timer(active) {
                Some(active) => self.apply_active(active),
                None => tracing::warn!(%active, "resync: malformed active timer, keeping previous"),
            }
        }
        // Sub-cues after the main timer so a cue change cannot wipe the fresh rows.
        if let Some(rows) = &baseline.sub_cue_timers {
            self.sub_cues = normalize::sub_cue_timers(rows)
                .into_iter()
                .filter(|row| !row.is_idle())
                .map(|row| (row.item_id, row))
                .collect();
        }
        if let Some(message) = &baseline.timer_message {
            self.message = normalize::timer_message(message);
        }
    }

    fn apply_active(&mut self, active: ActiveTimer) {
        match active {
            ActiveTimer::Present(snapshot) if snapshot.is_idle() => {
                self.retained = Some(snapshot);
                self.set_main(None);
            }
            ActiveTimer::Present(snapshot) => self.set_main(Some(snapshot)),
            ActiveTimer::Absent => self.set_main(None),
        }
    }

    /// Replace the main timer, clearing sub-cues when the cue key changes.
    pub fn set_main(&mut self, main: Option<TimerSnapshot>) {
        let key = main.as_ref().map(CueKey::of);
        if key != self.cue_key {
            if !self.sub_cues.is_empty() {
                tracing::debug!(event_id = %self.event_id, cleared = self.sub_cues.len(), "timer: cue changed, clearing sub-cues");
            }
            self.sub_cues.clear();
            self.cue_key = key;
        }
        if let Some(snapshot) = &main {
            self.retained = Some(snapshot.clone());
        }
        self.main = main;
    }

    fn upsert_sub_cue(&mut self, row: TimerSnapshot) {
        if row.is_idle() {
            self.sub_cues.remove(&row.item_id);
        } else {
            self.sub_cues.insert(row.item_id, row);
        }
    }

    /// Drop every timer and the retained cue. The message survives.
    pub fn reset(&mut self) {
        self.main = None;
        self.retained = None;
        self.sub_cues.clear();
        self.cue_key = None;
    }

    #[must_use]
    pub fn main(&self) -> Option<&TimerSnapshot> {
        self.main.as_ref()
    }

    pub fn sub_cues(&self) -> impl Iterator<Item = &TimerSnapshot> {
        self.sub_cues.values()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.main.as_ref().is_some_and(|m| m.is_running) || self.sub_cues.values().any(|s| s.is_running)
    }

    /// Main countdown at `now`. Stopped and absent render the same: the full
    /// duration of the last loaded cue, not running.
    #[must_use]
    pub fn main_countdown(&self, now: OffsetDateTime) -> Countdown {
        match (&self.main, &self.retained) {
            (Some(main), _) => Countdown::for_snapshot(main, now),
            (None, Some(last)) => Countdown::idle(Some(last.item_id), last.cue_label.clone(), last.duration_seconds),
            (None, None) => Countdown::idle(None, String::new(), 0),
        }
    }

    /// Every sub-cue countdown, ordered by item id.
    #[must_use]
    pub fn sub_cue_countdowns(&self, now: OffsetDateTime) -> Vec<Countdown> {
        self.sub_cues.values().map(|s| Countdown::for_snapshot(s, now)).collect()
    }

    /// The secondary countdown: the most recently started running sub-cue.
    #[must_use]
    pub fn secondary_countdown(&self, now: OffsetDateTime) -> Option<Countdown> {
        self.sub_cues
            .values()
            .filter(|s| s.is_running)
            .max_by_key(|s| s.started_at)
            .map(|s| Countdown::for_snapshot(s, now))
    }

    /// The message to show, if one is enabled.
    #[must_use]
    pub fn active_message(&self) -> Option<&TimerMessage> {
        self.message.as_ref().filter(|m| m.enabled)
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
