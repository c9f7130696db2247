//! WebSocket connectivity for the bybit-tape recorder.
//!
//! Provides:
//! - Connection supervision with bounded reconnects
//! - Subscribe / ping control messages
//! - Application-level heartbeat (pong credit)
//! - Frame classification into trade, liquidation and control messages

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod transport;

pub use connection::{
    ConnectionState, ConnectionSupervisor, Phase, SupervisorConfig, SupervisorExit,
    BYBIT_LINEAR_WS_URL,
};
pub use error::{DecodeError, WsError, WsResult};
pub use heartbeat::{HeartbeatMonitor, HeartbeatStats, HeartbeatVerdict};
pub use message::{
    ClassifiedMessage, ControlRequest, ControlResponse, FeedEvent, MessageClassifier, Topics,
    PING_REQ_ID, SUBSCRIBE_REQ_ID,
};
pub use transport::{Connector, Transport, TungsteniteConnector, TungsteniteTransport};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
