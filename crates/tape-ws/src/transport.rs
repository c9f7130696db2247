//! Transport seam between the supervisor and the WebSocket library.
//!
//! The supervisor only needs connect / send / receive / close on text
//! frames. Keeping that behind a trait lets the lifecycle run against an
//! in-memory transport in tests.

use crate::error::{WsError, WsResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};

/// One open text-frame connection.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> WsResult<()>;

    /// Wait for the next text frame. `Ok(None)` means the stream ended.
    ///
    /// Must be cancel-safe: it is raced against timers.
    async fn next_text(&mut self) -> WsResult<Option<String>>;

    /// Close the connection. Best effort.
    async fn close(&mut self) -> WsResult<()>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport + 'static;

    async fn connect(&self, url: &str) -> WsResult<Self::Transport>;
}

/// tokio-tungstenite connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    type Transport = TungsteniteTransport;

    async fn connect(&self, url: &str) -> WsResult<TungsteniteTransport> {
        // TCP_NODELAY for lower latency (disable Nagle's algorithm)
        let (stream, response) = connect_async_tls_with_config(url, None, true, None).await?;
        info!(status = ?response.status(), "WebSocket handshake complete");
        Ok(TungsteniteTransport { stream })
    }
}

/// tokio-tungstenite transport.
pub struct TungsteniteTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn send_text(&mut self, text: String) -> WsResult<()> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> WsResult<Option<String>> {
        // Only `next()` is awaited here, so dropping this future loses nothing.
        // Protocol pings are answered by tungstenite itself.
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (f.code.into(), f.reason.to_string()))
                        .unwrap_or((1000, "Normal close".to_string()));
                    return Err(WsError::ConnectionClosed { code, reason });
                }
                Message::Binary(data) => {
                    debug!(len = data.len(), "Ignoring binary frame");
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> WsResult<()> {
        self.stream.send(Message::Close(None)).await?;
        Ok(())
    }
}
