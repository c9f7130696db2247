//! Application-level heartbeat for stalled-connection detection.
//!
//! A transport can stay open while the exchange stops talking to us. The
//! monitor keeps a pong credit: each ping spends one, each successful pong
//! restores it to 1. When two consecutive pings go unanswered the credit
//! reaches the failure threshold and the next tick reports `Degraded`
//! instead of pinging again, so detection takes at most two intervals plus
//! one tick.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Default ping period.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 20_000;

/// Shortest ping period a timer will run with.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

/// Credit at or below which the connection is considered degraded.
pub const DEGRADED_CREDIT: i32 = -2;

/// Outcome of a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    /// Send a ping now (credit already spent).
    SendPing,
    /// Liveness failed; do not ping, reconnect.
    Degraded,
}

/// Pong-credit heartbeat state for one connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    pong_credit: i32,
    pings_sent: u64,
    last_ping: Option<DateTime<Utc>>,
    last_pong: Option<DateTime<Utc>>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self {
            pong_credit: 0,
            pings_sent: 0,
            last_ping: None,
            last_pong: None,
        }
    }

    /// Reset state (called when a connection becomes live).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Evaluate liveness on a timer tick.
    pub fn tick(&mut self) -> HeartbeatVerdict {
        if self.pong_credit <= DEGRADED_CREDIT {
            return HeartbeatVerdict::Degraded;
        }

        self.pong_credit -= 1;
        self.pings_sent += 1;
        self.last_ping = Some(Utc::now());
        HeartbeatVerdict::SendPing
    }

    /// Apply a pong response.
    pub fn record_pong(&mut self, success: bool) {
        let now = Utc::now();

        if success {
            self.pong_credit = 1;
            self.last_pong = Some(now);
        } else {
            self.pong_credit -= 1;
        }

        if let Some(ping_time) = self.last_ping {
            let rtt_ms = (now - ping_time).num_milliseconds();
            debug!(rtt_ms, success, pong_credit = self.pong_credit, "Received pong");
        }
    }

    pub fn pong_credit(&self) -> i32 {
        self.pong_credit
    }

    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            pong_credit: self.pong_credit,
            pings_sent: self.pings_sent,
            last_ping: self.last_ping,
            last_pong: self.last_pong,
        }
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub pong_credit: i32,
    pub pings_sent: u64,
    pub last_ping: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
}

/// Ping timer whose first tick fires one full period from now.
///
/// A zero period is raised to one millisecond.
pub fn ping_timer(period: Duration) -> Interval {
    let period = period.max(MIN_PING_INTERVAL);
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}
