//! In-memory connector for driving the adapter in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use frames::{Frame, syscall};
use serde_json::json;
use tokio::sync::mpsc;

use super::{Connector, Link, TransportError};

const WAIT: Duration = Duration::from_secs(30);

/// Hands out one [`ServerEnd`] per successful `open`.
pub(crate) struct FakeConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    refuse: AtomicU32,
    opens: AtomicU32,
}

impl FakeConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { accepted, refuse: AtomicU32::new(0), opens: AtomicU32::new(0) }), rx)
    }

    /// Refuse the next `n` connection attempts.
    pub(crate) fn refuse_next(&self, n: u32) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    pub(crate) fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn open(&self, _url: &str) -> Result<Box<dyn Link>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let refused = self.refuse.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
        if refused {
            return Err(TransportError::Connect("refused".into()));
        }
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerEnd { to_client: Some(to_client), from_client });
        Ok(Box::new(FakeLink { rx: client_rx, tx: Some(client_tx) }))
    }
}

struct FakeLink {
    rx: mpsc::UnboundedReceiver<Frame>,
    tx: Option<mpsc::UnboundedSender<Frame>>,
}

#[async_trait::async_trait]
impl Link for FakeLink {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let Some(tx) = &self.tx else {
            return Err(TransportError::Send("closed".into()));
        };
        tx.send(frame.clone()).map_err(|_| TransportError::Send("peer gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

/// The relay's side of one fake connection.
pub(crate) struct ServerEnd {
    to_client: Option<mpsc::UnboundedSender<Frame>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl ServerEnd {
    pub(crate) fn push(&self, frame: Frame) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(frame);
        }
    }

    /// Next frame the client sent. `None` once the client closed the link.
    pub(crate) async fn next(&mut self) -> Option<Frame> {
        tokio::time::timeout(WAIT, self.from_client.recv()).await.expect("client frame within timeout")
    }

    /// Send the welcome, wait for `event:join` and acknowledge it.
    pub(crate) async fn accept_join(&mut self, server_time_ms: i64) -> Frame {
        self.push(Frame::request(syscall::SESSION_CONNECTED, json!({"server_time": server_time_ms})));
        let join = self.next().await.expect("join frame");
        assert_eq!(join.syscall, syscall::EVENT_JOIN);
        self.push(join.done());
        join
    }

    /// Drop the link from the relay side.
    pub(crate) fn hang_up(&mut self) {
        self.to_client = None;
    }
}

/// Wait for the next accepted connection.
pub(crate) async fn next_conn(rx: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("connection within timeout")
        .expect("connector alive")
}
