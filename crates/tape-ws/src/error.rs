//! WebSocket and frame decoding error types.

use thiserror::Error;

/// Connection-level failures. Every variant ends the current session and
/// sends the supervisor down the reconnect path.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Stream ended")]
    StreamEnded,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Heartbeat timeout (pong_credit={pong_credit})")]
    HeartbeatTimeout { pong_credit: i32 },

    #[error("Subscription not confirmed within {timeout_ms}ms")]
    SubscribeTimeout { timeout_ms: u64 },

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Liveness failures as opposed to transport failures. Both are
    /// recovered the same way; the split only matters for logging.
    pub fn is_liveness_failure(&self) -> bool {
        matches!(
            self,
            Self::HeartbeatTimeout { .. } | Self::SubscribeTimeout { .. }
        )
    }
}

pub type WsResult<T> = Result<T, WsError>;

/// Frame-level failures. Logged and dropped; never end the session.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unrecognized frame (topic={topic:?})")]
    Unrecognized { topic: Option<String> },

    #[error("Unexpected payload shape for topic {topic}: {reason}")]
    InvalidShape { topic: String, reason: &'static str },
}
