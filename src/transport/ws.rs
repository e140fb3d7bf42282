//! WebSocket links: binary protobuf frames over `tokio-tungstenite`.

use frames::Frame;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{Connector, Link, TransportError};

type Stream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn Link>, TransportError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WsLink { stream }))
    }
}

pub struct WsLink {
    stream: Stream,
}

#[async_trait::async_trait]
impl Link for WsLink {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let bytes = frames::encode_frame(frame);
        self.stream
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!(error = %e, "transport: websocket read failed");
                    return None;
                }
            };
            match msg {
                Message::Binary(bytes) => return Some(frames::decode_frame(&bytes).map_err(TransportError::from)),
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "transport: websocket close failed");
        }
    }
}
