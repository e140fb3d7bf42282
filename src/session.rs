//! One client's view of one event, kept in sync.
//!
//! DESIGN
//! ======
//! A session is a single task that owns every engine (timers, scroll,
//! comments, resync) plus the scheduled work around them, and multiplexes
//! all of it in one `tokio::select!` loop:
//!
//! - transport events (join, frames, drops)
//! - host commands from [`SessionHandle`]
//! - resync completions
//! - the countdown ticker (while a timer runs)
//! - the animation ticker (while a viewer eases toward a target)
//! - the font settle, trailing scroll flush and auto-disconnect deadlines
//!
//! Nothing in the loop blocks: baseline reads run as spawned tasks and come
//! back through a channel. The host reads state from a `watch` of
//! [`SessionView`] and discrete notifications from a [`SessionEvent`]
//! stream.
//!
//! ORDERING
//! ========
//! On every new connection generation the session starts one baseline pull
//! and holds timer deltas until it lands; the baseline is applied first,
//! then the held deltas in arrival order. Scroll, comment and presence
//! frames are not timer facts and are applied immediately.

use std::sync::Arc;
use std::time::Duration;

use frames::syscall;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::comments::{Comment, CommentBoard, CommentMessage};
use crate::config::SyncConfig;
use crate::persistence::{Persistence, PersistenceError, ScriptDocument, TimerCommand};
use crate::resync::{Completed, ResyncController};
use crate::schedule::{Deadline, Ticker};
use crate::scroll::{LineGeometry, ScrollMessage, ScrollOutput, ScrollRole, ScrollSync};
use crate::timer::{Applied, Countdown, TimerEngine, TimerMessage};
use crate::transport::{
    ConnectionStatus, DisconnectReason, Subscription, TransportAdapter, TransportError, TransportEvent,
};
use crate::wire::{self, Delta, Inbound, PresenceEntry};

const DEFAULT_FONT_SIZE: f64 = 16.0;

// =============================================================================
// PUBLIC SURFACE
// =============================================================================

/// Everything the host renders, refreshed after every change and every
/// countdown tick.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionView {
    pub connection: ConnectionStatus,
    pub role: ScrollRole,
    pub main: Countdown,
    pub secondary: Option<Countdown>,
    pub sub_cues: Vec<Countdown>,
    pub message: Option<TimerMessage>,
    pub presence: Vec<PresenceEntry>,
    pub scroll_position: f64,
    pub font_size: f64,
    pub comments: Vec<Comment>,
    /// Server clock minus local clock at the last join. Informational only.
    pub clock_offset_ms: Option<i64>,
    /// Bumped on every `runOfShowDataUpdated`.
    pub schedule_version: u64,
    pub resyncing: bool,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            connection: ConnectionStatus::Disconnected,
            role: ScrollRole::default(),
            main: Countdown::idle(None, String::new(), 0),
            secondary: None,
            sub_cues: Vec::new(),
            message: None,
            presence: Vec::new(),
            scroll_position: 0.0,
            font_size: DEFAULT_FONT_SIZE,
            comments: Vec::new(),
            clock_offset_ms: None,
            schedule_version: 0,
            resyncing: false,
        }
    }
}

/// Discrete things the host should react to.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Apply to the script view (viewer side of scroll sync).
    Scroll(ScrollOutput),
    /// The run of show changed; refetch the schedule.
    ScheduleChanged,
    ServerError { code: Option<String>, message: String },
    Kicked { reason: Option<String> },
    /// Reconnect attempts exhausted; a manual connect is needed.
    GaveUp { attempts: u32 },
    AutoDisconnected,
}

#[derive(Debug)]
enum SessionCommand {
    Connect(String),
    Disconnect,
    SetRole(ScrollRole),
    LocalScroll(f64),
    SetFontSize(f64),
    SetGeometry(LineGeometry),
    SetScript(CommentBoard),
    ReplaceScript(String),
    SaveScript { event_id: String, script: String, reply: oneshot::Sender<ScriptDocument> },
    Comment(CommentMessage),
    AutoDisconnect(Option<Duration>),
    Visible(bool),
    Presence(Option<PresenceEntry>),
    Shutdown,
}

/// Host-side handle. Cheap to clone; the session stops on
/// [`SessionHandle::shutdown`] or when every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    view: watch::Receiver<SessionView>,
    transport: Arc<TransportAdapter>,
    persistence: Arc<dyn Persistence>,
}

impl SessionHandle {
    /// Start a session over an already spawned transport.
    #[must_use]
    pub fn spawn(
        transport: TransportAdapter,
        persistence: Arc<dyn Persistence>,
        config: &SyncConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let transport = Arc::new(transport);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(SessionView::default());
        let (notify, events) = mpsc::unbounded_channel();
        let (resync_tx, resync_rx) = mpsc::unbounded_channel();

        let session = Session {
            transport: Arc::clone(&transport),
            persistence: Arc::clone(&persistence),
            inbound: transport.subscribe(),
            commands: command_rx,
            resync_tx,
            resync_rx,
            timers: TimerEngine::new(""),
            scroll: ScrollSync::new(config, DEFAULT_FONT_SIZE),
            board: CommentBoard::default(),
            comments_dirty: false,
            resync: ResyncController::new(),
            countdown: Ticker::new(config.tick_interval),
            animation: Ticker::new(config.frame_interval),
            font_settle: Deadline::new(),
            flush: Deadline::new(),
            auto_disconnect: Deadline::new(),
            auto_disconnect_after: None,
            event_id: None,
            hidden: false,
            presence_identity: None,
            presence: Vec::new(),
            connection: ConnectionStatus::Disconnected,
            clock_offset_ms: None,
            schedule_version: 0,
            view: view_tx,
            notify,
        };
        tokio::spawn(session.run());

        (Self { commands, view, transport, persistence }, events)
    }

    pub fn connect(&self, event_id: &str) {
        self.send(SessionCommand::Connect(event_id.to_owned()));
    }

    pub fn disconnect(&self) {
        self.send(SessionCommand::Disconnect);
    }

    pub fn set_role(&self, role: ScrollRole) {
        self.send(SessionCommand::SetRole(role));
    }

    /// The host view scrolled to `position` px.
    pub fn local_scroll(&self, position: f64) {
        self.send(SessionCommand::LocalScroll(position));
    }

    pub fn set_font_size(&self, font_size: f64) {
        self.send(SessionCommand::SetFontSize(font_size));
    }

    /// Rendered line heights changed (layout, resize).
    pub fn set_geometry(&self, geometry: LineGeometry) {
        self.send(SessionCommand::SetGeometry(geometry));
    }

    /// Load a script and its saved comments.
    pub fn set_script(&self, script: impl Into<String>, comments: Vec<Comment>) {
        self.send(SessionCommand::SetScript(CommentBoard::new(script, comments)));
    }

    /// The script was edited; comments follow their lines.
    pub fn replace_script(&self, script: impl Into<String>) {
        self.send(SessionCommand::ReplaceScript(script.into()));
    }

    /// Load the saved script and its comments. `false` when nothing is saved
    /// for the event yet.
    ///
    /// # Errors
    ///
    /// Whatever the persistence API reported.
    pub async fn open_script(&self, event_id: &str) -> Result<bool, PersistenceError> {
        let Some(document) = self.persistence.load_script(event_id).await? else {
            return Ok(false);
        };
        self.set_script(document.script_text, document.comments);
        Ok(true)
    }

    /// Apply an edited script, move the comments with it and save both.
    ///
    /// # Errors
    ///
    /// [`PersistenceError::SessionClosed`] after shutdown, otherwise whatever
    /// the persistence API reported. The local board keeps the edit either way.
    pub async fn save_script(&self, event_id: &str, script: impl Into<String>) -> Result<(), PersistenceError> {
        let (reply, document) = oneshot::channel();
        self.send(SessionCommand::SaveScript { event_id: event_id.to_owned(), script: script.into(), reply });
        let document = document.await.map_err(|_| PersistenceError::SessionClosed)?;
        info!(%event_id, comments = document.comments.len(), "session: saving script");
        self.persistence.save_script(&document).await
    }

    /// Add a comment locally and broadcast it.
    ///
    /// # Errors
    ///
    /// The local board is updated either way; the error says the peers were
    /// not told.
    pub fn add_comment(&self, comment: Comment) -> Result<(), TransportError> {
        self.comment(CommentMessage::add(comment))
    }

    /// # Errors
    ///
    /// See [`Self::add_comment`].
    pub fn edit_comment(&self, comment: Comment) -> Result<(), TransportError> {
        self.comment(CommentMessage::edit(comment))
    }

    /// # Errors
    ///
    /// See [`Self::add_comment`].
    pub fn delete_comment(&self, comment_id: &str) -> Result<(), TransportError> {
        self.comment(CommentMessage::delete(comment_id))
    }

    /// Disconnect after `after` of connected time; `None` disables.
    pub fn set_auto_disconnect(&self, after: Option<Duration>) {
        self.send(SessionCommand::AutoDisconnect(after));
    }

    /// Host window visibility. Hidden disconnects; visible rejoins.
    pub fn set_visible(&self, visible: bool) {
        self.send(SessionCommand::Visible(visible));
    }

    /// Identity announced with `presence:join` on every join.
    pub fn set_presence(&self, identity: Option<PresenceEntry>) {
        self.send(SessionCommand::Presence(identity));
    }

    /// Ask the relay to broadcast a reset of all timer state to the room.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] when not joined.
    pub fn reset_all(&self) -> Result<(), TransportError> {
        self.transport.emit(syscall::STATE_RESET, json!({}))
    }

    /// Ask the relay to rebroadcast the active timers to the room.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] when not joined.
    pub fn request_sync(&self) -> Result<(), TransportError> {
        self.transport.emit(syscall::STATE_SYNC, json!({}))
    }

    /// Issue a timer command through the persistence API. Not retried.
    ///
    /// # Errors
    ///
    /// Whatever the persistence API reported.
    pub async fn timer_command(&self, command: &TimerCommand) -> Result<Value, PersistenceError> {
        self.persistence.send(command).await
    }

    #[must_use]
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn shutdown(&self) {
        self.send(SessionCommand::Shutdown);
    }

    /// Resolves once the session task and its transport have both stopped.
    pub async fn closed(&self) {
        let mut view = self.view.clone();
        while view.changed().await.is_ok() {}
        self.transport.closed().await;
    }

    fn comment(&self, message: CommentMessage) -> Result<(), TransportError> {
        let payload = serde_json::to_value(&message).map_err(|e| TransportError::Send(e.to_string()))?;
        self.send(SessionCommand::Comment(message));
        self.transport.emit(syscall::COMMENT_UPDATE, payload)
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            debug!("session: command after shutdown ignored");
        }
    }
}

// =============================================================================
// SESSION TASK
// =============================================================================

enum Step {
    Command(Option<SessionCommand>),
    Transport(Option<TransportEvent>),
    Baseline(Option<Completed>),
    Tick,
    Frame(Instant),
    Settled,
    Flush(Instant),
    AutoDisconnect,
}

struct Session {
    transport: Arc<TransportAdapter>,
    persistence: Arc<dyn Persistence>,
    inbound: Subscription,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    resync_tx: mpsc::UnboundedSender<Completed>,
    resync_rx: mpsc::UnboundedReceiver<Completed>,

    timers: TimerEngine,
    scroll: ScrollSync,
    board: CommentBoard,
    /// The board changed since the last published view.
    comments_dirty: bool,
    resync: ResyncController,

    countdown: Ticker,
    animation: Ticker,
    font_settle: Deadline,
    flush: Deadline,
    auto_disconnect: Deadline,
    auto_disconnect_after: Option<Duration>,

    /// Event the host wants to be in (survives drops and hidden periods).
    event_id: Option<String>,
    hidden: bool,
    presence_identity: Option<PresenceEntry>,
    presence: Vec<PresenceEntry>,
    connection: ConnectionStatus,
    clock_offset_ms: Option<i64>,
    schedule_version: u64,

    view: watch::Sender<SessionView>,
    notify: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                event = self.inbound.recv() => Step::Transport(event),
                done = self.resync_rx.recv() => Step::Baseline(done),
                _ = self.countdown.tick() => Step::Tick,
                now = self.animation.tick() => Step::Frame(now),
                _ = self.font_settle.wait() => Step::Settled,
                now = self.flush.wait() => Step::Flush(now),
                _ = self.auto_disconnect.wait() => Step::AutoDisconnect,
            };

            match step {
                Step::Command(None | Some(SessionCommand::Shutdown)) | Step::Transport(None) => break,
                Step::Command(Some(command)) => self.on_command(command),
                Step::Transport(Some(event)) => self.on_transport(event),
                Step::Baseline(Some(done)) => self.on_baseline(done),
                Step::Baseline(None) => {}
                Step::Tick => {}
                Step::Frame(now) => self.on_frame(now),
                Step::Settled => {
                    if self.scroll.is_animating() {
                        self.animation.restart_now();
                    }
                }
                Step::Flush(now) => self.on_flush(now),
                Step::AutoDisconnect => {
                    info!(event_id = ?self.event_id, "session: auto-disconnect");
                    self.transport.disconnect(None);
                    self.emit_event(SessionEvent::AutoDisconnected);
                }
            }
            self.publish_view();
        }

        self.resync.cancel();
        self.transport.shutdown();
        info!("session: stopped");
    }

    // -------------------------------------------------------------------------
    // host commands
    // -------------------------------------------------------------------------

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect(event_id) => {
                self.hidden = false;
                self.transport.connect(&event_id);
                self.event_id = Some(event_id);
            }
            SessionCommand::Disconnect => {
                self.event_id = None;
                self.auto_disconnect.cancel();
                self.transport.disconnect(None);
            }
            SessionCommand::SetRole(role) => {
                self.scroll.set_role(role);
                self.animation.stop();
                self.font_settle.cancel();
                self.flush.cancel();
            }
            SessionCommand::LocalScroll(position) => {
                let now = Instant::now();
                if let Some(message) = self.scroll.local_scroll(position, now) {
                    self.broadcast_scroll(&message);
                }
                self.arm_flush();
            }
            SessionCommand::SetFontSize(font_size) => {
                self.scroll.set_font_size(font_size);
                if self.scroll.role() == ScrollRole::Scroller {
                    let position = self.scroll.position();
                    if let Some(message) = self.scroll.local_scroll(position, Instant::now()) {
                        self.broadcast_scroll(&message);
                    }
                    self.arm_flush();
                }
            }
            SessionCommand::SetGeometry(geometry) => self.scroll.set_geometry(geometry),
            SessionCommand::SetScript(board) => {
                self.board = board;
                self.comments_dirty = true;
            }
            SessionCommand::ReplaceScript(script) => {
                self.board.replace_script(script);
                self.comments_dirty = true;
            }
            SessionCommand::SaveScript { event_id, script, reply } => {
                self.board.replace_script(script);
                self.comments_dirty = true;
                let document = ScriptDocument {
                    event_id,
                    script_text: self.board.script().to_owned(),
                    comments: self.board.comments().into_iter().cloned().collect(),
                };
                if reply.send(document).is_err() {
                    debug!("session: script save abandoned by caller");
                }
            }
            SessionCommand::Comment(message) => {
                self.comments_dirty |= self.board.apply(&message);
            }
            SessionCommand::AutoDisconnect(after) => {
                self.auto_disconnect_after = after;
                match after {
                    Some(delay) if self.connection.is_connected() => self.auto_disconnect.set_after(delay),
                    _ => self.auto_disconnect.cancel(),
                }
            }
            SessionCommand::Visible(visible) => self.on_visibility(visible),
            SessionCommand::Presence(identity) => {
                self.presence_identity = identity;
                if self.connection.is_connected() {
                    self.announce_presence();
                }
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn on_visibility(&mut self, visible: bool) {
        match (visible, self.hidden) {
            (false, false) => {
                self.hidden = true;
                if self.event_id.is_some() {
                    debug!("session: hidden, disconnecting");
                    self.transport.disconnect(None);
                }
            }
            (true, true) => {
                self.hidden = false;
                if let Some(event_id) = &self.event_id {
                    debug!(%event_id, "session: visible, rejoining");
                    self.transport.connect(event_id);
                }
            }
            _ => {}
        }
    }

    // -------------------------------------------------------------------------
    // transport
    // -------------------------------------------------------------------------

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { event_id, generation, server_time_ms } => {
                self.on_connected(event_id, generation, server_time_ms);
            }
            TransportEvent::Frame(frame) => {
                if let Some(inbound) = wire::parse_inbound(&frame) {
                    self.on_inbound(inbound);
                }
            }
            TransportEvent::Disconnected { event_id, reason } => {
                self.connection = ConnectionStatus::Disconnected;
                self.halt();
                if let DisconnectReason::Kicked { reason } = reason {
                    info!(%event_id, ?reason, "session: kicked");
                    self.event_id = None;
                    self.emit_event(SessionEvent::Kicked { reason });
                }
            }
            TransportEvent::Reconnecting { event_id, attempt, .. } => {
                self.connection = ConnectionStatus::Connecting { event_id, attempt };
            }
            TransportEvent::GaveUp { attempts, .. } => {
                self.connection = ConnectionStatus::Disconnected;
                self.emit_event(SessionEvent::GaveUp { attempts });
            }
        }
    }

    fn on_connected(&mut self, event_id: String, generation: u64, server_time_ms: Option<i64>) {
        self.connection = ConnectionStatus::Connected { event_id: event_id.clone(), generation };
        self.clock_offset_ms = server_time_ms.map(|server| server - frames::now_ms());

        if self.timers.event_id() != event_id {
            self.timers = TimerEngine::new(event_id.clone());
        }
        if self.resync.on_connected(generation) {
            self.resync
                .start(Arc::clone(&self.persistence), event_id, generation, self.resync_tx.clone());
        }
        if self.presence_identity.is_some() {
            self.announce_presence();
        }
        if let Some(delay) = self.auto_disconnect_after {
            self.auto_disconnect.set_after(delay);
        }
    }

    fn on_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Delta(delta) => {
                if let Some(delta) = self.resync.gate(delta) {
                    self.apply_delta(&delta);
                }
            }
            Inbound::Presence(entries) => self.presence = entries,
            Inbound::Scroll(message) => {
                let now = Instant::now();
                match self.scroll.remote(&message, now) {
                    Some(output @ ScrollOutput::FontSize(_)) => {
                        self.emit_event(SessionEvent::Scroll(output));
                        self.animation.stop();
                        match self.scroll.settle_until() {
                            Some(at) => self.font_settle.set(at),
                            None => self.font_settle.cancel(),
                        }
                    }
                    Some(ScrollOutput::Position(_)) | None => {}
                }
                if self.scroll.is_animating() && !self.font_settle.is_armed() {
                    self.animation.start();
                }
            }
            Inbound::Comment(message) => {
                self.comments_dirty |= self.board.apply(&message);
            }
            Inbound::ServerError { code, message } => {
                warn!(?code, %message, "session: server error");
                self.emit_event(SessionEvent::ServerError { code, message });
            }
        }
    }

    fn on_baseline(&mut self, done: Completed) {
        let Some(held) = self.resync.complete(done.generation) else {
            return;
        };
        info!(generation = done.generation, replay = held.len(), "session: baseline applied");
        self.timers.apply_baseline(&done.baseline);
        for delta in &held {
            self.apply_delta(delta);
        }
        self.sync_countdown();
    }

    fn apply_delta(&mut self, delta: &Delta) {
        if self.timers.apply(delta.kind, &delta.data) == Applied::ScheduleChanged {
            self.schedule_version += 1;
            self.emit_event(SessionEvent::ScheduleChanged);
        }
        self.sync_countdown();
    }

    /// Tick once a second while anything runs; idle countdowns are static.
    fn sync_countdown(&mut self) {
        if self.timers.is_running() && self.connection.is_connected() {
            self.countdown.start();
        } else {
            self.countdown.stop();
        }
    }

    /// Connection gone: stop every scheduled task tied to it.
    fn halt(&mut self) {
        self.resync.cancel();
        self.countdown.stop();
        self.animation.stop();
        self.font_settle.cancel();
        self.flush.cancel();
        self.auto_disconnect.cancel();
        self.scroll.halt();
        self.presence.clear();
    }

    // -------------------------------------------------------------------------
    // scroll
    // -------------------------------------------------------------------------

    fn on_frame(&mut self, now: Instant) {
        if let Some(output) = self.scroll.frame(now) {
            self.emit_event(SessionEvent::Scroll(output));
        }
        if !self.scroll.is_animating() {
            self.animation.stop();
        }
    }

    fn on_flush(&mut self, now: Instant) {
        if let Some(message) = self.scroll.flush(now) {
            self.broadcast_scroll(&message);
        }
        self.arm_flush();
    }

    fn arm_flush(&mut self) {
        match self.scroll.flush_at() {
            Some(at) => self.flush.set(at),
            None => self.flush.cancel(),
        }
    }

    fn broadcast_scroll(&self, message: &ScrollMessage) {
        let payload = match serde_json::to_value(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "session: scroll message not serializable");
                return;
            }
        };
        if let Err(e) = self.transport.emit(syscall::SCROLL_UPDATE, payload) {
            debug!(error = %e, "session: scroll not broadcast");
        }
    }

    // -------------------------------------------------------------------------
    // output
    // -------------------------------------------------------------------------

    fn announce_presence(&self) {
        let Some(identity) = &self.presence_identity else {
            return;
        };
        let payload = match serde_json::to_value(identity) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "session: presence not serializable");
                return;
            }
        };
        if let Err(e) = self.transport.emit(syscall::PRESENCE_JOIN, payload) {
            debug!(error = %e, "session: presence not announced");
        }
    }

    fn emit_event(&self, event: SessionEvent) {
        let _ = self.notify.send(event);
    }

    fn publish_view(&mut self) {
        let fresh_comments = std::mem::take(&mut self.comments_dirty)
            .then(|| self.board.comments().into_iter().cloned().collect::<Vec<_>>());
        let now = OffsetDateTime::now_utc();
        let mut next = SessionView {
            connection: self.connection.clone(),
            role: self.scroll.role(),
            main: self.timers.main_countdown(now),
            secondary: self.timers.secondary_countdown(now),
            sub_cues: self.timers.sub_cue_countdowns(now),
            message: self.timers.active_message().cloned(),
            presence: self.presence.clone(),
            scroll_position: self.scroll.position(),
            font_size: self.scroll.geometry().font_size,
            comments: Vec::new(),
            clock_offset_ms: self.clock_offset_ms,
            schedule_version: self.schedule_version,
            resyncing: self.resync.is_in_flight(),
        };
        self.view.send_if_modified(|current| {
            let previous = std::mem::take(&mut current.comments);
            let mut changed = *current != next;
            next.comments = match fresh_comments {
                Some(comments) => {
                    changed |= comments != previous;
                    comments
                }
                None => previous,
            };
            *current = next;
            changed
        });
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
