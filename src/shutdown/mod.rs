//! Graceful shutdown of the relay.
//!
//! Sequence:
//! 1. Stop accepting registrations and move every connection to `Closing`
//!    (writers flush their queue and send a close frame)
//! 2. Signal background tasks to stop
//! 3. Wait up to the drain timeout for connections to unregister
//! 4. Force-close whatever is left

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::ShutdownSettings;
use crate::connection_manager::ConnectionManager;

/// Poll interval while waiting for connections to drain
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for connections to close on their own (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ShutdownSettings> for ShutdownConfig {
    fn from(settings: &ShutdownSettings) -> Self {
        Self {
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
        }
    }
}

/// Handles graceful shutdown of the relay
pub struct GracefulShutdown {
    connection_manager: Arc<ConnectionManager>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            connection_manager,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.connection_manager.len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Closing connections");
        result.connections_signalled = self.connection_manager.begin_shutdown();

        tracing::info!("Phase 2: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 3: Waiting for connections to close");
        result.drained = self.wait_for_connections_to_close().await;

        tracing::info!("Phase 4: Force-closing remaining connections");
        result.force_closed = self.connection_manager.close_all();

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            connections_signalled = result.connections_signalled,
            drained = result.drained,
            force_closed = result.force_closed,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    /// Returns true if every connection unregistered before the timeout
    async fn wait_for_connections_to_close(&self) -> bool {
        if self.connection_manager.is_empty() {
            return true;
        }

        let wait_future = async {
            while !self.connection_manager.is_empty() {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        };

        match timeout(self.config.drain_timeout, wait_future).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    remaining_connections = self.connection_manager.len(),
                    "Some connections did not close gracefully"
                );
                false
            }
        }
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether shutdown completed successfully
    pub success: bool,
    /// Connections moved to `Closing`
    pub connections_signalled: usize,
    /// Whether every connection closed before the drain timeout
    pub drained: bool,
    /// Connections removed after the drain timeout
    pub force_closed: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}
