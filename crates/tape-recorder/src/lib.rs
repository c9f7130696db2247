//! Bybit trade and liquidation tape recorder.
//!
//! Wires the pieces together:
//! - Connection supervisor (subscribe, heartbeat, bounded reconnects)
//! - Payload decoding into normalized records
//! - Append-only CSV logs, one per topic

pub mod app;
pub mod config;
pub mod error;
pub mod stats;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use stats::{RecorderStats, StatsSnapshot};
