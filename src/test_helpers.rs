//! In-memory persistence for exercising resync and the session.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde_json::{Value, json};
use tokio::sync::watch;

use crate::persistence::{Persistence, PersistenceError, ScriptDocument, TimerCommand};

pub(crate) struct FakePersistence {
    pub(crate) active_timer: Mutex<Value>,
    pub(crate) sub_cue_timers: Mutex<Value>,
    pub(crate) timer_message: Mutex<Value>,
    pub(crate) fail_sub_cues: AtomicBool,
    pub(crate) commands: Mutex<Vec<TimerCommand>>,
    pub(crate) scripts: Mutex<HashMap<String, ScriptDocument>>,
    fetches: AtomicU32,
    released: watch::Sender<bool>,
}

impl Default for FakePersistence {
    fn default() -> Self {
        Self {
            active_timer: Mutex::new(Value::Null),
            sub_cue_timers: Mutex::new(json!([])),
            timer_message: Mutex::new(json!([])),
            fail_sub_cues: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            fetches: AtomicU32::new(0),
            released: watch::channel(true).0,
        }
    }
}

impl FakePersistence {
    pub(crate) fn with_active_timer(self, value: Value) -> Self {
        *self.active_timer.lock().expect("lock") = value;
        self
    }

    /// Baseline reads block until [`Self::release`].
    pub(crate) fn hold(&self) {
        self.released.send_replace(false);
    }

    pub(crate) fn release(&self) {
        self.released.send_replace(true);
    }

    /// Number of baseline pulls started (counted on the active timer read).
    pub(crate) fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn gate(&self) {
        let mut rx = self.released.subscribe();
        let _ = rx.wait_for(|released| *released).await;
    }
}

#[async_trait::async_trait]
impl Persistence for FakePersistence {
    async fn active_timer(&self, _event_id: &str) -> Result<Value, PersistenceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.gate().await;
        Ok(self.active_timer.lock().expect("lock").clone())
    }

    async fn sub_cue_timers(&self, _event_id: &str) -> Result<Value, PersistenceError> {
        self.gate().await;
        if self.fail_sub_cues.load(Ordering::SeqCst) {
            return Err(PersistenceError::Status { status: 503, body: "unavailable".into() });
        }
        Ok(self.sub_cue_timers.lock().expect("lock").clone())
    }

    async fn timer_message(&self, _event_id: &str) -> Result<Value, PersistenceError> {
        self.gate().await;
        Ok(self.timer_message.lock().expect("lock").clone())
    }

    async fn send(&self, command: &TimerCommand) -> Result<Value, PersistenceError> {
        self.commands.lock().expect("lock").push(command.clone());
        Ok(json!({"ok": true}))
    }

    async fn load_script(&self, event_id: &str) -> Result<Option<ScriptDocument>, PersistenceError> {
        Ok(self.scripts.lock().expect("lock").get(event_id).cloned())
    }

    async fn save_script(&self, document: &ScriptDocument) -> Result<(), PersistenceError> {
        self.scripts
            .lock()
            .expect("lock")
            .insert(document.event_id.clone(), document.clone());
        Ok(())
    }
}
