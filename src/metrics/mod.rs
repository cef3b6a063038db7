//! Prometheus metrics for the chat relay.
//!
//! - Connection metrics (active, opened, closed, rejected, duration)
//! - Message metrics (received, dispatched, delivered, evicted)
//! - Heartbeat metrics

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, HeartbeatMetrics, MessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "chat_relay";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Total number of active WebSocket connections
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Total number of active WebSocket connections"
    ).unwrap();

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Connections refused because the server was shutting down
    pub static ref WS_CONNECTIONS_REJECTED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_rejected_total", METRIC_PREFIX),
        "Total WebSocket connections rejected during shutdown"
    ).unwrap();

    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Inbound frames by outcome (chat, ignored)
    pub static ref MESSAGES_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_received_total", METRIC_PREFIX),
        "Total inbound WebSocket frames",
        &["kind"]
    ).unwrap();

    pub static ref MESSAGES_DISPATCHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_dispatched_total", METRIC_PREFIX),
        "Total chat messages broadcast"
    ).unwrap();

    /// Total messages delivered (connection count)
    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total messages placed on connection queues"
    ).unwrap();

    pub static ref CONNECTIONS_EVICTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_evicted_total", METRIC_PREFIX),
        "Total connections dropped because their queue was full or closed"
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Time to enqueue one heartbeat round in milliseconds",
        vec![0.1, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0]
    ).unwrap();

    pub static ref STALE_CONNECTIONS_REMOVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_stale_connections_removed_total", METRIC_PREFIX),
        "Total connections removed for inactivity"
    ).unwrap();
}
