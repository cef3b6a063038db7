use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionManager;
use crate::metrics::{ConnectionMetrics, HeartbeatMetrics};
use crate::websocket::OutboundMessage;

/// Background task for heartbeat and connection cleanup
pub struct HeartbeatTask {
    config: WebSocketConfig,
    connection_manager: Arc<ConnectionManager>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        connection_manager: Arc<ConnectionManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            connection_manager,
            shutdown,
        }
    }

    /// Run the heartbeat and cleanup tasks
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval);
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval);
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats();
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup_stale_connections(connection_timeout);
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a ping on every connection. Connections that cannot take it are
    /// dropped, same as during a broadcast.
    fn send_heartbeats(&self) {
        let connections = self.connection_manager.snapshot();
        let total_count = connections.len();
        ConnectionMetrics::set_active(total_count);

        if total_count == 0 {
            return;
        }

        let start = Instant::now();
        let mut sent = 0usize;
        let mut failed = 0usize;

        for handle in &connections {
            match handle.try_enqueue(OutboundMessage::Ping) {
                Ok(()) => sent += 1,
                Err(e) => {
                    failed += 1;
                    tracing::debug!(
                        connection_id = %handle.id,
                        reason = e.as_str(),
                        "Failed to queue heartbeat, dropping connection"
                    );
                    self.connection_manager.unregister(handle.id);
                }
            }
        }

        HeartbeatMetrics::record_duration_ms(start.elapsed().as_secs_f64() * 1000.0);

        tracing::debug!(
            total = total_count,
            sent = sent,
            failed = failed,
            "Heartbeat round completed"
        );
    }

    /// Clean up stale connections
    fn cleanup_stale_connections(&self, timeout_secs: u64) {
        let removed = self.connection_manager.cleanup_stale_connections(timeout_secs);

        if removed > 0 {
            HeartbeatMetrics::record_stale_removed(removed as u64);
            tracing::info!(
                removed = removed,
                timeout_secs = timeout_secs,
                "Cleaned up stale connections"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let config = WebSocketConfig::default();
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(config, connection_manager, shutdown_rx);

        let handle = tokio::spawn(async move {
            task.run().await;
        });

        // Wait a bit then send shutdown
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_sends_to_connections() {
        let config = WebSocketConfig {
            heartbeat_interval: 1,
            connection_timeout: 60,
            cleanup_interval: 60,
            ..Default::default()
        };
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(10);
        let _handle = connection_manager.register(tx).unwrap();

        let task = HeartbeatTask::new(config, connection_manager, shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        let msg = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive heartbeat")
            .expect("Channel should not be closed");

        assert!(matches!(msg, OutboundMessage::Ping));

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[test]
    fn test_heartbeat_drops_dead_connections() {
        let connection_manager = Arc::new(ConnectionManager::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        drop(shutdown_tx);

        let (live_tx, _live_rx) = mpsc::channel::<OutboundMessage>(4);
        let (dead_tx, dead_rx) = mpsc::channel::<OutboundMessage>(4);
        let live = connection_manager.register(live_tx).unwrap();
        let dead = connection_manager.register(dead_tx).unwrap();
        drop(dead_rx);

        let task = HeartbeatTask::new(
            WebSocketConfig::default(),
            connection_manager.clone(),
            shutdown_rx,
        );
        task.send_heartbeats();

        assert!(connection_manager.contains(live.id));
        assert!(!connection_manager.contains(dead.id));
    }

    #[test]
    fn test_cleanup_removes_idle_connections() {
        let connection_manager = Arc::new(ConnectionManager::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, _rx) = mpsc::channel::<OutboundMessage>(4);
        let idle = connection_manager.register(tx.clone()).unwrap();
        let fresh = connection_manager.register(tx).unwrap();
        idle.set_last_activity(chrono::Utc::now() - chrono::Duration::seconds(600));

        let task = HeartbeatTask::new(
            WebSocketConfig::default(),
            connection_manager.clone(),
            shutdown_rx,
        );
        task.cleanup_stale_connections(120);

        assert!(!connection_manager.contains(idle.id));
        assert!(connection_manager.contains(fresh.id));
    }
}
