//! Main application orchestration.
//!
//! The supervisor task owns the connection and forwards data frames over a
//! bounded channel. This task decodes them and awaits each append before
//! taking the next one, so rows land in arrival order.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::stats::RecorderStats;
use std::sync::Arc;
use tape_feed::{decode_event, DecodedEvent};
use tape_persistence::RecordWriter;
use tape_ws::{
    ConnectionSupervisor, Connector, FeedEvent, SupervisorExit, TungsteniteConnector,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application.
pub struct Application<C: Connector = TungsteniteConnector> {
    config: AppConfig,
    connector: C,
    writer: RecordWriter,
    stats: Arc<RecorderStats>,
    shutdown: CancellationToken,
}

impl Application<TungsteniteConnector> {
    pub fn new(config: AppConfig) -> Self {
        Self::with_connector(config, TungsteniteConnector)
    }
}

impl<C: Connector + 'static> Application<C> {
    pub fn with_connector(config: AppConfig, connector: C) -> Self {
        let writer = RecordWriter::new(&config.persistence.output_dir);
        Self {
            config,
            connector,
            writer,
            stats: Arc::new(RecorderStats::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the recorder as Ctrl-C would.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> Arc<RecorderStats> {
        self.stats.clone()
    }

    /// Run until shutdown or until the supervisor gives up.
    pub async fn run(self) -> AppResult<SupervisorExit> {
        // Log trouble here is not fatal: appends retry the open, and failed
        // rows are counted as write errors.
        let output_dir = &self.config.persistence.output_dir;
        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            error!(error = %e, output_dir = %output_dir.display(), "Failed to create output directory");
        }
        match self.writer.ensure_all().await {
            0 => info!(output_dir = %output_dir.display(), "Record logs ready"),
            failed => warn!(failed, output_dir = %output_dir.display(), "Recording without all logs ready"),
        }

        let supervisor_config = self.config.supervisor_config();
        info!(
            url = %supervisor_config.url,
            topics = ?supervisor_config.topics.all(),
            max_restarts = supervisor_config.max_restarts,
            "Starting recorder"
        );

        let (feed_tx, mut feed_rx) =
            mpsc::channel::<FeedEvent>(self.config.persistence.channel_capacity);
        let supervisor = ConnectionSupervisor::new(supervisor_config, self.connector, feed_tx);
        let supervisor_shutdown = supervisor.shutdown_token();

        // Spawn the connection task. The feed sender lives inside the
        // supervisor, so the channel closes once `run` returns.
        let supervisor_handle = tokio::spawn(async move { supervisor.run().await });

        let app_shutdown = self.shutdown.clone();
        let signal_handle = tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => {
                        error!(?e, "Failed to listen for shutdown signal");
                        app_shutdown.cancelled().await;
                    }
                },
                () = app_shutdown.cancelled() => info!("Shutdown requested"),
            }
            supervisor_shutdown.cancel();
        });

        info!("Entering main event loop");
        while let Some(event) = feed_rx.recv().await {
            record_event(&self.writer, &self.stats, event).await;
        }

        let exit = supervisor_handle
            .await
            .map_err(|e| AppError::Task(e.to_string()))?;
        signal_handle.abort();

        // Cleanup
        info!(?exit, exit_code = exit.exit_code(), "Shutting down");
        self.writer.close().await;
        self.stats.log_summary();

        Ok(exit)
    }
}

/// Decode one event and append its records. Nothing here is fatal.
async fn record_event(writer: &RecordWriter, stats: &RecorderStats, event: FeedEvent) {
    stats.record_event();

    match decode_event(&event) {
        DecodedEvent::Trades(results) => {
            for result in results {
                match result {
                    Ok(trade) => match writer.write_trade(&trade).await {
                        Ok(()) => stats.record_trade_written(),
                        Err(e) => {
                            stats.record_write_error();
                            error!(error = %e, ts = trade.timestamp_ms, "Failed to write trade");
                        }
                    },
                    Err(e) => {
                        stats.record_decode_error();
                        warn!(error = %e, "Dropping trade entry");
                    }
                }
            }
        }
        DecodedEvent::Liquidation(result) => match result {
            Ok(liq) => match writer.write_liquidation(&liq).await {
                Ok(()) => stats.record_liquidation_written(),
                Err(e) => {
                    stats.record_write_error();
                    error!(error = %e, ts = liq.timestamp_ms, "Failed to write liquidation");
                }
            },
            Err(e) => {
                stats.record_decode_error();
                warn!(error = %e, "Dropping liquidation");
            }
        },
    }
}
