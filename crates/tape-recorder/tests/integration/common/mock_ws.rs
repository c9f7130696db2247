//! Mock WebSocket server for integration tests.
//!
//! Speaks enough of the Bybit public stream protocol to drive the recorder:
//! - Acknowledges subscribe requests
//! - Answers heartbeat pings (can be turned off)
//! - Pushes arbitrary frames to connected clients
//! - Records received messages

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone)]
enum Outbound {
    Frame(String),
    Close,
}

#[derive(Clone)]
struct Shared {
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
    answer_pings: Arc<AtomicBool>,
    outbound: broadcast::Sender<Outbound>,
}

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    shared: Shared,
}

impl MockWsServer {
    /// Start a new mock WebSocket server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (outbound, _) = broadcast::channel(64);
        let shared = Shared {
            messages: Arc::new(Mutex::new(VecDeque::new())),
            connections: Arc::new(Mutex::new(0)),
            answer_pings: Arc::new(AtomicBool::new(true)),
            outbound,
        };
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let shared_clone = shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, shared_clone.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            shared,
        }
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Get the number of connections received.
    pub async fn connection_count(&self) -> u32 {
        *self.shared.connections.lock().await
    }

    /// Get all received messages.
    pub async fn received_messages(&self) -> Vec<String> {
        self.shared.messages.lock().await.iter().cloned().collect()
    }

    /// Number of subscribe requests received across all connections.
    pub async fn subscribe_count(&self) -> usize {
        self.received_messages()
            .await
            .iter()
            .filter(|m| m.contains(r#""op":"subscribe""#))
            .count()
    }

    /// Stop (or resume) answering heartbeat pings.
    pub fn set_answer_pings(&self, answer: bool) {
        self.shared.answer_pings.store(answer, Ordering::SeqCst);
    }

    /// Send a text frame to every open connection.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.shared.outbound.send(Outbound::Frame(frame.into()));
    }

    /// Close every open connection.
    pub fn close_connections(&self) {
        let _ = self.shared.outbound.send(Outbound::Close);
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, shared: Shared) {
    // Increment connection count
    {
        let mut count = shared.connections.lock().await;
        *count += 1;
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let mut outbound = shared.outbound.subscribe();

    loop {
        tokio::select! {
            msg = read.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };

                shared.messages.lock().await.push_back(text.clone());

                if let Some(reply) = reply_to(&text, shared.answer_pings.load(Ordering::SeqCst)) {
                    let _ = write.send(Message::Text(reply)).await;
                }
            }
            cmd = outbound.recv() => match cmd {
                Ok(Outbound::Frame(frame)) => {
                    let _ = write.send(Message::Text(frame)).await;
                }
                Ok(Outbound::Close) | Err(broadcast::error::RecvError::Closed) => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
        }
    }
}

/// Bybit-style response to a control request.
fn reply_to(text: &str, answer_pings: bool) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(text).ok()?;
    let req_id = parsed.get("req_id").cloned().unwrap_or_default();

    match parsed.get("op").and_then(|op| op.as_str())? {
        "subscribe" => Some(
            serde_json::json!({
                "success": true,
                "ret_msg": "",
                "conn_id": "mock",
                "req_id": req_id,
                "op": "subscribe"
            })
            .to_string(),
        ),
        "ping" if answer_pings => Some(
            serde_json::json!({
                "success": true,
                "ret_msg": "pong",
                "conn_id": "mock",
                "req_id": req_id,
                "op": "ping"
            })
            .to_string(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }

    #[test]
    fn test_reply_to_ping_respects_flag() {
        let ping = r#"{"req_id":"100001","op":"ping"}"#;
        assert!(reply_to(ping, true).unwrap().contains("pong"));
        assert!(reply_to(ping, false).is_none());
    }
}
