use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use crate::connection_manager::{ConnectionHandle, ConnectionManager};
use crate::metrics::MessageMetrics;
use crate::websocket::{ChatEvent, OutboundMessage};

use super::{ChatMessage, DeliveryResult};

/// Threshold for using pre-serialization (saves serialization overhead for larger sends)
const PRESERIALIZATION_THRESHOLD: usize = 4;

/// Statistics for the broadcast dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Total messages dispatched
    pub total_dispatched: AtomicU64,
    /// Total successful enqueues (connection count)
    pub total_delivered: AtomicU64,
    /// Total connections evicted on a failed enqueue
    pub total_evicted: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_dispatched: self.total_dispatched.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_dispatched: u64,
    pub total_delivered: u64,
    pub total_evicted: u64,
}

/// Fans chat messages out to every registered connection
pub struct BroadcastDispatcher {
    connection_manager: Arc<ConnectionManager>,
    echo_to_sender: bool,
    stats: DispatcherStats,
}

impl BroadcastDispatcher {
    /// Create a dispatcher that echoes messages back to their sender
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self {
            connection_manager,
            echo_to_sender: true,
            stats: DispatcherStats::default(),
        }
    }

    /// Whether the originating connection receives its own message
    pub fn with_echo_to_sender(mut self, echo_to_sender: bool) -> Self {
        self.echo_to_sender = echo_to_sender;
        self
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Broadcast a message to every connection registered right now.
    ///
    /// Enqueueing never waits: a target whose queue is full or closed is
    /// unregistered and the rest still get the message. Messages reach each
    /// connection's queue in the order `dispatch` was called.
    #[tracing::instrument(
        name = "dispatcher.dispatch",
        skip(self, message),
        fields(origin_id = %message.origin_id, payload_len = message.payload.len())
    )]
    pub fn dispatch(&self, message: ChatMessage) -> DeliveryResult {
        let ChatMessage { origin_id, payload } = message;

        let targets: Vec<Arc<ConnectionHandle>> = self
            .connection_manager
            .snapshot()
            .into_iter()
            .filter(|conn| self.echo_to_sender || conn.id != origin_id)
            .collect();

        let result = self.send_to_connections(&targets, ChatEvent::ChatMessage(payload));

        self.stats.total_dispatched.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(result.delivered as u64, Ordering::Relaxed);
        self.stats
            .total_evicted
            .fetch_add(result.evicted as u64, Ordering::Relaxed);

        MessageMetrics::record_dispatched();
        MessageMetrics::record_delivered(result.delivered as u64);
        MessageMetrics::record_evicted(result.evicted as u64);

        tracing::debug!(
            origin_id = %origin_id,
            delivered = result.delivered,
            evicted = result.evicted,
            "Broadcast chat message"
        );

        result
    }

    /// Enqueue onto each target, evicting the ones that cannot take it
    fn send_to_connections(
        &self,
        connections: &[Arc<ConnectionHandle>],
        event: ChatEvent,
    ) -> DeliveryResult {
        let mut result = DeliveryResult::default();
        if connections.is_empty() {
            return result;
        }

        // For larger sends, pre-serialize once and share across all connections
        let outbound = if connections.len() >= PRESERIALIZATION_THRESHOLD {
            match OutboundMessage::preserialized(&event) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pre-serialize message, falling back to per-connection serialization");
                    OutboundMessage::Event(event)
                }
            }
        } else {
            OutboundMessage::Event(event)
        };

        for conn in connections {
            match conn.try_enqueue(outbound.clone()) {
                Ok(()) => result.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %conn.id,
                        reason = e.as_str(),
                        "Dropping connection that cannot accept messages"
                    );
                    self.connection_manager.unregister(conn.id);
                    result.evicted += 1;
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn payload_of(msg: OutboundMessage) -> String {
        match msg {
            OutboundMessage::Event(event) => event.into_payload(),
            OutboundMessage::Preserialized(json) => serde_json::from_str::<ChatEvent>(&json)
                .unwrap()
                .into_payload(),
            OutboundMessage::Ping => panic!("unexpected ping"),
        }
    }

    #[test]
    fn test_dispatch_reaches_everyone_including_sender() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = BroadcastDispatcher::new(manager.clone());

        let mut receivers = Vec::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = mpsc::channel(4);
            handles.push(manager.register(tx).unwrap());
            receivers.push(rx);
        }

        let result = dispatcher.dispatch(ChatMessage::new(handles[0].id, "hello"));
        assert_eq!(result, DeliveryResult { delivered: 3, evicted: 0 });

        for rx in receivers.iter_mut() {
            assert_eq!(payload_of(rx.try_recv().unwrap()), "hello");
        }
    }

    #[test]
    fn test_sender_exclusion() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = BroadcastDispatcher::new(manager.clone()).with_echo_to_sender(false);

        let (tx_x, mut rx_x) = mpsc::channel(4);
        let (tx_y, mut rx_y) = mpsc::channel(4);
        let x = manager.register(tx_x).unwrap();
        manager.register(tx_y).unwrap();

        let result = dispatcher.dispatch(ChatMessage::new(x.id, "hi"));
        assert_eq!(result.delivered, 1);
        assert!(rx_x.try_recv().is_err());
        assert_eq!(payload_of(rx_y.try_recv().unwrap()), "hi");
    }

    #[test]
    fn test_full_queue_evicts_only_that_connection() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = BroadcastDispatcher::new(manager.clone());

        let (tx_fast, mut rx_fast) = mpsc::channel(8);
        let (tx_slow, _rx_slow) = mpsc::channel(1);
        let fast = manager.register(tx_fast).unwrap();
        let slow = manager.register(tx_slow).unwrap();

        let first = dispatcher.dispatch(ChatMessage::new(fast.id, "one"));
        assert_eq!(first.delivered, 2);

        let second = dispatcher.dispatch(ChatMessage::new(fast.id, "two"));
        assert_eq!(second, DeliveryResult { delivered: 1, evicted: 1 });
        assert!(!manager.contains(slow.id));
        assert!(manager.contains(fast.id));

        assert_eq!(payload_of(rx_fast.try_recv().unwrap()), "one");
        assert_eq!(payload_of(rx_fast.try_recv().unwrap()), "two");

        let stats = dispatcher.stats();
        assert_eq!(stats.total_dispatched, 2);
        assert_eq!(stats.total_delivered, 3);
        assert_eq!(stats.total_evicted, 1);
    }

    #[test]
    fn test_dispatch_over_empty_registry() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = BroadcastDispatcher::new(manager);

        let result = dispatcher.dispatch(ChatMessage::new(Uuid::new_v4(), "anyone?"));
        assert_eq!(result, DeliveryResult::default());
    }

    #[test]
    fn test_preserialized_fanout() {
        let manager = Arc::new(ConnectionManager::new());
        let dispatcher = BroadcastDispatcher::new(manager.clone());

        let mut receivers = Vec::new();
        for _ in 0..PRESERIALIZATION_THRESHOLD + 1 {
            let (tx, rx) = mpsc::channel(2);
            manager.register(tx).unwrap();
            receivers.push(rx);
        }

        dispatcher.dispatch(ChatMessage::new(Uuid::new_v4(), "bulk"));
        for rx in receivers.iter_mut() {
            let msg = rx.try_recv().unwrap();
            assert!(matches!(msg, OutboundMessage::Preserialized(_)));
            assert_eq!(payload_of(msg), "bulk");
        }
    }
}
