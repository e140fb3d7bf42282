use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use frames::{Frame, Status, syscall};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::{ConnectionStatus, Connector, DisconnectReason, Link, TransportError, TransportEvent};
use crate::config::SyncConfig;
use crate::wire::server_time_ms;

// =============================================================================
// HANDLE
// =============================================================================

#[derive(Debug)]
enum Command {
    Connect(String),
    Disconnect(Option<String>),
    Emit(Frame),
    Shutdown,
}

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>>;

/// Owned transport instance. Created per session, shut down with it.
pub struct TransportAdapter {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    subscribers: Subscribers,
    task: JoinHandle<()>,
}

/// An independent observer of transport events. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Subscription {
    /// Next event. `None` after the adapter has shut down.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }
}

impl TransportAdapter {
    /// Start the transport actor. Nothing connects until [`Self::connect`].
    #[must_use]
    pub fn spawn(connector: Arc<dyn Connector>, config: &SyncConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ConnectionStatus::Disconnected);
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));

        let actor = Actor {
            connector,
            url: config.ws_url.clone(),
            join_timeout: config.join_timeout,
            reconnect_base: config.reconnect_base_delay,
            reconnect_max: config.reconnect_max_attempts,
            commands: command_rx,
            status: status_tx,
            subscribers: Arc::clone(&subscribers),
            generation: 0,
        };
        let task = tokio::spawn(actor.run());

        Self { commands, status, subscribers, task }
    }

    /// Join `event_id`. Idempotent for the current event; a different event
    /// leaves the current room first.
    pub fn connect(&self, event_id: &str) {
        self.command(Command::Connect(event_id.to_owned()));
    }

    /// Leave the room. With `Some(id)`, only if `id` is the current event.
    pub fn disconnect(&self, event_id: Option<&str>) {
        self.command(Command::Disconnect(event_id.map(ToOwned::to_owned)));
    }

    /// Send a request frame into the current room.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] unless a join has been acknowledged;
    /// [`TransportError::Shutdown`] after shutdown.
    pub fn emit(&self, syscall: &str, data: Value) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.commands
            .send(Command::Emit(Frame::request(syscall, data)))
            .map_err(|_| TransportError::Shutdown)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Watch connection status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
        Subscription { rx }
    }

    /// Leave the room and stop the actor. Subscriptions end afterwards.
    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    /// Resolves once the actor has stopped, leave frame sent.
    pub async fn closed(&self) {
        let mut status = self.status.clone();
        while status.changed().await.is_ok() {}
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("transport: command after shutdown ignored");
        }
    }
}

impl Drop for TransportAdapter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// ACTOR
// =============================================================================

/// Where the actor goes after leaving an event.
#[derive(Debug)]
enum Next {
    Idle,
    Connect(String),
    Shutdown,
}

/// How a command affects the connection in progress.
enum Control {
    Stay,
    Emit(Frame),
    Leave(Next, DisconnectReason),
}

fn control_for(command: Option<Command>, current: &str) -> Control {
    match command {
        None | Some(Command::Shutdown) => Control::Leave(Next::Shutdown, DisconnectReason::Requested),
        Some(Command::Connect(id)) if id == current => Control::Stay,
        Some(Command::Connect(id)) => Control::Leave(Next::Connect(id), DisconnectReason::Switched),
        Some(Command::Disconnect(None)) => Control::Leave(Next::Idle, DisconnectReason::Requested),
        Some(Command::Disconnect(Some(id))) if id == current => Control::Leave(Next::Idle, DisconnectReason::Requested),
        Some(Command::Disconnect(Some(id))) => {
            debug!(requested = %id, %current, "transport: disconnect for other event ignored");
            Control::Stay
        }
        Some(Command::Emit(frame)) => Control::Emit(frame),
    }
}

struct Joined {
    link: Box<dyn Link>,
    server_time_ms: Option<i64>,
}

enum JoinPhase {
    Joined(Joined),
    Failed(TransportError),
    Leave(Next),
}

enum LinkEnd {
    Leave(Next),
    Dropped,
}

struct Actor {
    connector: Arc<dyn Connector>,
    url: String,
    join_timeout: Duration,
    reconnect_base: Duration,
    reconnect_max: u32,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ConnectionStatus>,
    subscribers: Subscribers,
    generation: u64,
}

impl Actor {
    async fn run(mut self) {
        let mut target: Option<String> = None;
        loop {
            let Some(event_id) = target.take() else {
                match self.commands.recv().await {
                    None | Some(Command::Shutdown) => break,
                    Some(Command::Connect(id)) => target = Some(id),
                    Some(Command::Disconnect(_)) => {}
                    Some(Command::Emit(frame)) => {
                        debug!(syscall = %frame.syscall, "transport: emit while idle dropped");
                    }
                }
                continue;
            };

            match self.run_event(event_id).await {
                Next::Idle => {}
                Next::Connect(id) => target = Some(id),
                Next::Shutdown => break,
            }
        }
        self.status.send_replace(ConnectionStatus::Disconnected);
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).clear();
        info!("transport: shut down");
    }

    /// Stay in `event_id` until told to leave or reconnects run out.
    async fn run_event(&mut self, event_id: String) -> Next {
        let mut backoff = Backoff::new(self.reconnect_base, self.reconnect_max);
        loop {
            self.status.send_replace(ConnectionStatus::Connecting {
                event_id: event_id.clone(),
                attempt: backoff.attempt(),
            });

            match self.join_phase(&event_id).await {
                JoinPhase::Joined(joined) => {
                    backoff.reset();
                    self.generation += 1;
                    let generation = self.generation;
                    info!(%event_id, generation, "transport: joined");
                    self.status.send_replace(ConnectionStatus::Connected { event_id: event_id.clone(), generation });
                    self.publish(TransportEvent::Connected {
                        event_id: event_id.clone(),
                        generation,
                        server_time_ms: joined.server_time_ms,
                    });

                    if let LinkEnd::Leave(next) = self.connected_phase(&event_id, joined.link).await {
                        return next;
                    }
                }
                JoinPhase::Failed(e) => warn!(%event_id, error = %e, "transport: connect attempt failed"),
                JoinPhase::Leave(next) => {
                    self.status.send_replace(ConnectionStatus::Disconnected);
                    return next;
                }
            }

            let Some((attempt, delay)) = backoff.next_delay() else {
                warn!(%event_id, attempts = self.reconnect_max, "transport: giving up until next connect");
                self.status.send_replace(ConnectionStatus::Disconnected);
                self.publish(TransportEvent::GaveUp { event_id, attempts: self.reconnect_max });
                return Next::Idle;
            };

            info!(%event_id, attempt, ?delay, "transport: reconnecting");
            self.status.send_replace(ConnectionStatus::Connecting { event_id: event_id.clone(), attempt });
            self.publish(TransportEvent::Reconnecting { event_id: event_id.clone(), attempt, delay });
            if let Some(next) = self.wait_backoff(&event_id, delay).await {
                self.status.send_replace(ConnectionStatus::Disconnected);
                return next;
            }
        }
    }

    /// Open a link and complete the join handshake while still honoring
    /// commands.
    async fn join_phase(&mut self, event_id: &str) -> JoinPhase {
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let join = tokio::time::timeout(self.join_timeout, open_and_join(connector.as_ref(), &url, event_id));
        tokio::pin!(join);

        loop {
            let control = tokio::select! {
                result = &mut join => {
                    return match result {
                        Ok(Ok(joined)) => JoinPhase::Joined(joined),
                        Ok(Err(e)) => JoinPhase::Failed(e),
                        Err(_) => JoinPhase::Failed(TransportError::JoinTimeout),
                    };
                }
                command = self.commands.recv() => control_for(command, event_id),
            };
            match control {
                Control::Stay => {}
                Control::Emit(frame) => debug!(syscall = %frame.syscall, "transport: emit before join dropped"),
                Control::Leave(next, _) => return JoinPhase::Leave(next),
            }
        }
    }

    /// Pump a joined link until it drops or a command ends it.
    async fn connected_phase(&mut self, event_id: &str, mut link: Box<dyn Link>) -> LinkEnd {
        loop {
            let step = tokio::select! {
                inbound = link.recv() => Ok(inbound),
                command = self.commands.recv() => Err(control_for(command, event_id)),
            };

            match step {
                Ok(Some(Ok(frame))) => {
                    if frame.syscall == syscall::SESSION_KICK {
                        let reason = frame.data.get("reason").and_then(Value::as_str).map(ToOwned::to_owned);
                        warn!(%event_id, ?reason, "transport: kicked by server");
                        link.close().await;
                        self.end(event_id, DisconnectReason::Kicked { reason });
                        return LinkEnd::Leave(Next::Idle);
                    }
                    self.publish(TransportEvent::Frame(frame));
                }
                Ok(Some(Err(e))) => warn!(%event_id, error = %e, "transport: bad frame dropped"),
                Ok(None) => {
                    warn!(%event_id, "transport: connection lost");
                    self.end(event_id, DisconnectReason::Dropped);
                    return LinkEnd::Dropped;
                }
                Err(Control::Stay) => {}
                Err(Control::Emit(frame)) => {
                    let frame = frame.with_event_id(event_id);
                    if let Err(e) = link.send(&frame).await {
                        warn!(%event_id, syscall = %frame.syscall, error = %e, "transport: emit failed");
                    }
                }
                Err(Control::Leave(next, reason)) => {
                    let leave = Frame::request(syscall::EVENT_LEAVE, json!({})).with_event_id(event_id);
                    if let Err(e) = link.send(&leave).await {
                        debug!(%event_id, error = %e, "transport: leave not delivered");
                    }
                    link.close().await;
                    info!(%event_id, ?reason, "transport: left event");
                    self.end(event_id, reason);
                    return LinkEnd::Leave(next);
                }
            }
        }
    }

    /// Sleep out a backoff delay. Returns where to go if a command cut it
    /// short.
    async fn wait_backoff(&mut self, event_id: &str, delay: Duration) -> Option<Next> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            let control = tokio::select! {
                () = &mut sleep => return None,
                command = self.commands.recv() => control_for(command, event_id),
            };
            match control {
                Control::Stay => {}
                Control::Emit(frame) => debug!(syscall = %frame.syscall, "transport: emit while reconnecting dropped"),
                Control::Leave(next, _) => return Some(next),
            }
        }
    }

    fn end(&self, event_id: &str, reason: DisconnectReason) {
        self.status.send_replace(ConnectionStatus::Disconnected);
        self.publish(TransportEvent::Disconnected { event_id: event_id.to_owned(), reason });
    }

    fn publish(&self, event: TransportEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Open a link, send `event:join` and wait for its acknowledgement. Frames
/// before the acknowledgement are dropped; the welcome's server clock is
/// kept.
async fn open_and_join(connector: &dyn Connector, url: &str, event_id: &str) -> Result<Joined, TransportError> {
    let mut link = connector.open(url).await?;
    let join = Frame::request(syscall::EVENT_JOIN, json!({"event_id": event_id})).with_event_id(event_id);
    link.send(&join).await?;

    let mut server_time = None;
    loop {
        let frame = match link.recv().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                debug!(%event_id, error = %e, "transport: bad frame during join");
                continue;
            }
            None => return Err(TransportError::Closed),
        };

        if frame.syscall == syscall::SESSION_CONNECTED {
            server_time = server_time_ms(&frame.data).or(server_time);
            continue;
        }
        if !frame.answers(&join.id) {
            debug!(%event_id, syscall = %frame.syscall, "transport: frame before join ack dropped");
            continue;
        }
        match frame.status {
            Status::Done => return Ok(Joined { link, server_time_ms: server_time }),
            Status::Error => {
                let reason = frame.error_message().unwrap_or("rejected").to_owned();
                link.close().await;
                return Err(TransportError::JoinRejected(reason));
            }
            Status::Request => {}
        }
    }
}
