//! Dealer websocket transport.
//!
//! The session never touches tungstenite directly.  A [`Connector`] yields a
//! split pair: the [`FrameSink`] is owned by the writer task, the
//! [`FrameStream`] by the read loop.  Tests substitute in-memory pairs.

use async_trait::async_trait;
use connect_proto::error::{ConnectError, ConnectResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    ProtocolError,
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, text: String) -> ConnectResult<()>;
    async fn close(&mut self, reason: CloseReason, detail: String) -> ConnectResult<()>;
}

#[async_trait]
pub trait FrameStream: Send {
    /// Next text frame.  `None` once the peer closed the connection.
    async fn recv(&mut self) -> Option<ConnectResult<String>>;
}

pub type FramePair = (Box<dyn FrameSink>, Box<dyn FrameStream>);

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> ConnectResult<FramePair>;
}

// ── tungstenite ───────────────────────────────────────────────────────────────

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> ConnectResult<FramePair> {
        let (ws, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(ConnectError::transport)?;
        debug!(status = %response.status(), "dealer websocket upgraded");
        let (tx, rx) = ws.split();
        Ok((Box::new(WsSink(tx)), Box::new(WsStream(rx))))
    }
}

struct WsSink(SplitSink<Ws, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, text: String) -> ConnectResult<()> {
        self.0
            .send(Message::Text(text))
            .await
            .map_err(ConnectError::transport)
    }

    async fn close(&mut self, reason: CloseReason, detail: String) -> ConnectResult<()> {
        let code = match reason {
            CloseReason::Normal => CloseCode::Normal,
            CloseReason::ProtocolError => CloseCode::Protocol,
        };
        let frame = CloseFrame {
            code,
            reason: Cow::Owned(detail),
        };
        self.0
            .send(Message::Close(Some(frame)))
            .await
            .map_err(ConnectError::transport)?;
        self.0.close().await.map_err(ConnectError::transport)
    }
}

struct WsStream(SplitStream<Ws>);

#[async_trait]
impl FrameStream for WsStream {
    async fn recv(&mut self) -> Option<ConnectResult<String>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => debug!("dropping non-utf8 binary frame: {}", e),
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "dealer closed the connection");
                    return None;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(ConnectError::transport(e))),
            }
        }
    }
}
