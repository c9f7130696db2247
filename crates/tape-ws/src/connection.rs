//! Connection supervisor.
//!
//! Owns the connection lifecycle: connect, subscribe, heartbeat, teardown
//! and bounded reconnection. A single task drives one transport at a time,
//! so pong handling, ping ticks and phase changes never race each other.
//!
//! ```text
//! Disconnected -> Connecting -> Subscribing -> Live -> Degraded -> Connecting ...
//!                                     any phase -> Terminated
//! ```
//!
//! Stalled heartbeats, closes, read/send errors and failed connects all end
//! the session the same way: teardown, then reconnect or terminate.

use crate::error::{WsError, WsResult};
use crate::heartbeat::{ping_timer, HeartbeatMonitor, HeartbeatVerdict, DEFAULT_PING_INTERVAL_MS};
use crate::message::{ClassifiedMessage, ControlRequest, FeedEvent, MessageClassifier, Topics};
use crate::transport::{Connector, Transport};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bybit v5 public linear stream.
pub const BYBIT_LINEAR_WS_URL: &str = "wss://stream.bybit.com/v5/public/linear";

/// Longest raw frame excerpt included in decode-error logs.
const LOG_FRAME_LIMIT: usize = 256;

/// Upper bound on the close handshake during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// WebSocket URL.
    pub url: String,
    /// Topics to subscribe to and route on.
    pub topics: Topics,
    /// Heartbeat ping period.
    pub ping_interval_ms: u64,
    /// Consecutive restarts allowed without reaching Live.
    pub max_restarts: u32,
    /// How long Subscribing may last before the session is abandoned.
    pub subscribe_timeout_ms: u64,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            url: BYBIT_LINEAR_WS_URL.to_string(),
            topics: Topics::default(),
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            max_restarts: 3,
            subscribe_timeout_ms: 10_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

/// Connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Subscribing,
    Live,
    Degraded,
    /// Absorbing: no further sends or reconnects.
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Subscribing => write!(f, "SUBSCRIBING"),
            Self::Live => write!(f, "LIVE"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Snapshot of the supervisor's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: Phase,
    /// Reconnect attempts since the connection was last confirmed live.
    pub restart_count: u32,
    /// Heartbeat credit of the current connection.
    pub pong_credit: i32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: Phase::Disconnected,
            restart_count: 0,
            pong_credit: 0,
        }
    }
}

/// Why [`ConnectionSupervisor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Shutdown was requested.
    Shutdown,
    /// A failure happened with no restarts left.
    RestartBoundExceeded { restarts: u32 },
}

impl SupervisorExit {
    /// Process exit status for an external process manager.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Shutdown => 0,
            Self::RestartBoundExceeded { restarts } => (*restarts).min(u8::MAX as u32) as u8,
        }
    }
}

/// How a single connection session ended.
enum SessionEnd {
    Shutdown,
    Failed(WsError),
}

/// Supervises the feed connection.
pub struct ConnectionSupervisor<C: Connector> {
    config: SupervisorConfig,
    connector: C,
    classifier: MessageClassifier,
    state: Arc<RwLock<ConnectionState>>,
    feed_tx: mpsc::Sender<FeedEvent>,
    connect_attempts: AtomicU32,
    shutdown_token: CancellationToken,
}

impl<C: Connector> ConnectionSupervisor<C> {
    /// Create a new supervisor. Data frames are forwarded on `feed_tx` in
    /// arrival order.
    pub fn new(config: SupervisorConfig, connector: C, feed_tx: mpsc::Sender<FeedEvent>) -> Self {
        let classifier = MessageClassifier::new(config.topics.clone());
        Self {
            config,
            connector,
            classifier,
            state: Arc::new(RwLock::new(ConnectionState::default())),
            feed_tx,
            connect_attempts: AtomicU32::new(0),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn phase(&self) -> Phase {
        self.state.read().phase
    }

    /// Number of transport opens attempted so far.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!("Supervisor shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Token that triggers shutdown when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Run until shutdown or until the restart bound is exceeded.
    pub async fn run(&self) -> SupervisorExit {
        if self.phase() == Phase::Terminated {
            warn!("Supervisor already terminated");
            return SupervisorExit::Shutdown;
        }

        loop {
            if self.is_shutdown() {
                return self.terminate(SupervisorExit::Shutdown);
            }

            self.update(|s| s.phase = Phase::Connecting);
            self.connect_attempts.fetch_add(1, Ordering::Relaxed);
            info!(
                url = %self.config.url,
                restart_count = self.state().restart_count,
                "Connecting to WebSocket"
            );

            let end = tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => SessionEnd::Shutdown,
                result = self.connector.connect(&self.config.url) => match result {
                    Ok(transport) => self.run_session(transport).await,
                    Err(e) => SessionEnd::Failed(e),
                },
            };

            let failure = match end {
                SessionEnd::Shutdown => return self.terminate(SupervisorExit::Shutdown),
                SessionEnd::Failed(e) => e,
            };

            self.update(|s| s.phase = Phase::Degraded);
            if failure.is_liveness_failure() {
                warn!(error = %failure, "Liveness failure");
            } else {
                warn!(error = %failure, "Transport failure");
            }

            let restarts = self.state().restart_count;
            if restarts >= self.config.max_restarts {
                error!(
                    restarts,
                    max_restarts = self.config.max_restarts,
                    "Restart bound exceeded, terminating"
                );
                return self.terminate(SupervisorExit::RestartBoundExceeded { restarts });
            }

            let attempt = restarts + 1;
            self.update(|s| s.restart_count = attempt);

            let delay = self.calculate_backoff_delay(attempt);
            warn!(
                attempt,
                max_restarts = self.config.max_restarts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff");
                    return self.terminate(SupervisorExit::Shutdown);
                }
            }
        }
    }

    /// Drive one transport, then tear it down.
    ///
    /// The heartbeat timer lives inside `drive_session` and is gone before
    /// the transport is closed; the transport is dropped before the caller
    /// can open the next one. A close that does not finish within
    /// [`CLOSE_TIMEOUT`] is abandoned.
    async fn run_session(&self, mut transport: C::Transport) -> SessionEnd {
        let mut heartbeat = HeartbeatMonitor::new();
        let end = self.drive_session(&mut transport, &mut heartbeat).await;

        match tokio::time::timeout(CLOSE_TIMEOUT, transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Close during teardown failed"),
            Err(_) => warn!(
                timeout_ms = CLOSE_TIMEOUT.as_millis() as u64,
                "Close during teardown timed out, dropping transport"
            ),
        }

        let stats = heartbeat.stats();
        info!(
            pings_sent = stats.pings_sent,
            pong_credit = stats.pong_credit,
            last_ping = ?stats.last_ping,
            last_pong = ?stats.last_pong,
            "WebSocket connection torn down"
        );

        end
    }

    async fn drive_session(
        &self,
        transport: &mut C::Transport,
        heartbeat: &mut HeartbeatMonitor,
    ) -> SessionEnd {
        self.update(|s| {
            s.phase = Phase::Subscribing;
            s.pong_credit = 0;
        });
        info!("WebSocket connected");

        let topics = self.config.topics.all();
        if let Err(e) = send_request(transport, &ControlRequest::subscribe(topics.clone())).await {
            return SessionEnd::Failed(e);
        }
        info!(?topics, "Subscribe request sent");

        let mut timer: Option<Interval> = None;
        let subscribe_timeout = Duration::from_millis(self.config.subscribe_timeout_ms);
        let subscribe_deadline = tokio::time::sleep(subscribe_timeout);
        tokio::pin!(subscribe_deadline);

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    return SessionEnd::Shutdown;
                }

                () = next_tick(&mut timer), if timer.is_some() => {
                    match heartbeat.tick() {
                        HeartbeatVerdict::Degraded => {
                            let pong_credit = heartbeat.pong_credit();
                            error!(pong_credit, "Heartbeat timeout");
                            return SessionEnd::Failed(WsError::HeartbeatTimeout { pong_credit });
                        }
                        HeartbeatVerdict::SendPing => {
                            self.sync_credit(heartbeat);
                            if let Err(e) = send_request(transport, &ControlRequest::ping()).await {
                                return SessionEnd::Failed(e);
                            }
                            debug!(pong_credit = heartbeat.pong_credit(), "Sent heartbeat ping");
                        }
                    }
                }

                () = &mut subscribe_deadline, if timer.is_none() => {
                    return SessionEnd::Failed(WsError::SubscribeTimeout {
                        timeout_ms: self.config.subscribe_timeout_ms,
                    });
                }

                frame = transport.next_text() => {
                    match frame {
                        Ok(Some(text)) => self.handle_frame(&text, heartbeat, &mut timer).await,
                        Ok(None) => return SessionEnd::Failed(WsError::StreamEnded),
                        Err(e) => return SessionEnd::Failed(e),
                    }
                }
            }
        }
    }

    async fn handle_frame(
        &self,
        text: &str,
        heartbeat: &mut HeartbeatMonitor,
        timer: &mut Option<Interval>,
    ) {
        let message = match self.classifier.classify(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, frame = %excerpt(text), "Dropping frame");
                return;
            }
        };

        match message {
            ClassifiedMessage::TradeBatch(entries) => {
                self.confirm_live(heartbeat, timer);
                self.forward(FeedEvent::Trades(entries)).await;
            }
            ClassifiedMessage::LiquidationEvent(data) => {
                self.confirm_live(heartbeat, timer);
                self.forward(FeedEvent::Liquidation(data)).await;
            }
            ClassifiedMessage::ControlResponse(resp) if resp.is_pong() => {
                heartbeat.record_pong(resp.success);
                self.sync_credit(heartbeat);
                if resp.success {
                    self.confirm_live(heartbeat, timer);
                }
            }
            ClassifiedMessage::ControlResponse(resp) => {
                if resp.success {
                    if resp.is_subscribe_ack() {
                        info!(req_id = %resp.request_id, conn_id = ?resp.conn_id, "Subscribe acknowledged");
                    } else {
                        info!(op = ?resp.op, req_id = %resp.request_id, "Control request acknowledged");
                    }
                    self.confirm_live(heartbeat, timer);
                } else {
                    warn!(
                        op = ?resp.op,
                        req_id = %resp.request_id,
                        ret_msg = ?resp.ret_msg,
                        "Control request rejected"
                    );
                }
            }
        }
    }

    /// First proof of subscription moves Subscribing to Live and starts
    /// the heartbeat with fresh credit.
    fn confirm_live(&self, heartbeat: &mut HeartbeatMonitor, timer: &mut Option<Interval>) {
        if self.phase() != Phase::Subscribing {
            return;
        }

        heartbeat.reset();
        *timer = Some(ping_timer(Duration::from_millis(self.config.ping_interval_ms)));
        self.update(|s| {
            s.phase = Phase::Live;
            s.restart_count = 0;
            s.pong_credit = heartbeat.pong_credit();
        });
        info!("Subscription confirmed, connection live");
    }

    async fn forward(&self, event: FeedEvent) {
        if self.feed_tx.send(event).await.is_err() {
            warn!("Feed receiver dropped");
        }
    }

    fn sync_credit(&self, heartbeat: &HeartbeatMonitor) {
        let credit = heartbeat.pong_credit();
        self.update(|s| s.pong_credit = credit);
    }

    fn update(&self, f: impl FnOnce(&mut ConnectionState)) {
        let mut state = self.state.write();
        if state.phase != Phase::Terminated {
            f(&mut *state);
        }
    }

    fn terminate(&self, exit: SupervisorExit) -> SupervisorExit {
        self.update(|s| s.phase = Phase::Terminated);
        info!(?exit, "Supervisor terminated");
        exit
    }

    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        // base * 2^(attempt-1), capped
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(max))
    }
}

async fn send_request<T: Transport + ?Sized>(
    transport: &mut T,
    request: &ControlRequest,
) -> WsResult<()> {
    let text = request.to_text()?;
    transport
        .send_text(text)
        .await
        .map_err(|e| WsError::SendFailed(format!("{} request: {e}", request.op)))
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(LOG_FRAME_LIMIT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
