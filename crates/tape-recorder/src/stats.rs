//! Recorder counters.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Counters updated by the recording loop.
#[derive(Debug, Default)]
pub struct RecorderStats {
    events: AtomicU64,
    trades_written: AtomicU64,
    liquidations_written: AtomicU64,
    decode_errors: AtomicU64,
    write_errors: AtomicU64,
}

/// Point-in-time copy of [`RecorderStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub events: u64,
    pub trades_written: u64,
    pub liquidations_written: u64,
    pub decode_errors: u64,
    pub write_errors: u64,
}

impl RecorderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trade_written(&self) {
        self.trades_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_liquidation_written(&self) {
        self.liquidations_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            trades_written: self.trades_written.load(Ordering::Relaxed),
            liquidations_written: self.liquidations_written.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            events = s.events,
            trades_written = s.trades_written,
            liquidations_written = s.liquidations_written,
            decode_errors = s.decode_errors,
            write_errors = s.write_errors,
            "Recorder statistics"
        );
    }
}
