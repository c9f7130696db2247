//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tape_ws::{SupervisorConfig, Topics, BYBIT_LINEAR_WS_URL};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// WebSocket endpoint URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// WebSocket configuration.
    #[serde(default)]
    pub websocket: WsConfig,
    /// Topic configuration.
    #[serde(default)]
    pub topics: TopicsConfig,
    /// Persistence configuration.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

fn default_ws_url() -> String {
    BYBIT_LINEAR_WS_URL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            websocket: WsConfig::default(),
            topics: TopicsConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

/// WebSocket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Consecutive restarts allowed without reaching live. Also the exit
    /// status when the bound is exceeded.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Heartbeat ping interval (ms).
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Time allowed between subscribe and the first confirmation (ms).
    #[serde(default = "default_subscribe_timeout_ms")]
    pub subscribe_timeout_ms: u64,
    /// Base delay for reconnection backoff (ms).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Cap for reconnection backoff (ms).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

fn default_max_restarts() -> u32 {
    3
}

fn default_ping_interval_ms() -> u64 {
    20_000
}

fn default_subscribe_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            ping_interval_ms: default_ping_interval_ms(),
            subscribe_timeout_ms: default_subscribe_timeout_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

impl From<WsConfig> for SupervisorConfig {
    fn from(cfg: WsConfig) -> Self {
        Self {
            url: String::new(),        // Set separately
            topics: Topics::default(), // Set separately
            ping_interval_ms: cfg.ping_interval_ms,
            max_restarts: cfg.max_restarts,
            subscribe_timeout_ms: cfg.subscribe_timeout_ms,
            reconnect_base_delay_ms: cfg.reconnect_base_delay_ms,
            reconnect_max_delay_ms: cfg.reconnect_max_delay_ms,
        }
    }
}

/// Topic configuration.
///
/// Topics are derived from `symbol` unless given explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default)]
    pub trade: Option<String>,
    #[serde(default)]
    pub liquidation: Option<String>,
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            trade: None,
            liquidation: None,
        }
    }
}

impl TopicsConfig {
    pub fn topics(&self) -> Topics {
        let derived = Topics::for_symbol(&self.symbol);
        Topics {
            trade: self.trade.clone().unwrap_or(derived.trade),
            liquidation: self.liquidation.clone().unwrap_or(derived.liquidation),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding `trade.csv` and `liquidation.csv`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Frames buffered between the supervisor and the writer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_channel_capacity() -> usize {
    1000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Reject values the supervisor cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(AppError::Config(format!(
                "ws_url must be a ws:// or wss:// URL: {}",
                self.ws_url
            )));
        }

        let ws = &self.websocket;
        // 0 would make the bound-exceeded exit status look like a clean exit
        if ws.max_restarts == 0 {
            return Err(AppError::Config("websocket.max_restarts must be >= 1".to_string()));
        }
        if ws.ping_interval_ms == 0 || ws.subscribe_timeout_ms == 0 {
            return Err(AppError::Config(
                "websocket intervals must be non-zero".to_string(),
            ));
        }
        if ws.reconnect_base_delay_ms > ws.reconnect_max_delay_ms {
            return Err(AppError::Config(
                "websocket.reconnect_base_delay_ms exceeds reconnect_max_delay_ms".to_string(),
            ));
        }

        if self.topics.symbol.is_empty() {
            return Err(AppError::Config("topics.symbol must not be empty".to_string()));
        }
        if self.persistence.channel_capacity == 0 {
            return Err(AppError::Config(
                "persistence.channel_capacity must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Supervisor configuration with URL and topics filled in.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        let mut config: SupervisorConfig = self.websocket.clone().into();
        config.url = self.ws_url.clone();
        config.topics = self.topics.topics();
        config
    }
}
