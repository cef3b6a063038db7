use prometheus::{Encoder, TextEncoder};

use super::*;

/// Encode all registered metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn record_rejected() {
        WS_CONNECTIONS_REJECTED.inc();
    }

    pub fn set_active(count: usize) {
        CONNECTIONS_TOTAL.set(count as i64);
    }
}

/// Helper struct for recording message metrics
pub struct MessageMetrics;

impl MessageMetrics {
    pub fn record_received_chat() {
        MESSAGES_RECEIVED_TOTAL.with_label_values(&["chat"]).inc();
    }

    pub fn record_received_ignored() {
        MESSAGES_RECEIVED_TOTAL.with_label_values(&["ignored"]).inc();
    }

    pub fn record_dispatched() {
        MESSAGES_DISPATCHED_TOTAL.inc();
    }

    pub fn record_delivered(count: u64) {
        MESSAGES_DELIVERED_TOTAL.inc_by(count);
    }

    pub fn record_evicted(count: u64) {
        if count > 0 {
            CONNECTIONS_EVICTED_TOTAL.inc_by(count);
        }
    }
}

/// Helper struct for recording heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_duration_ms(ms: f64) {
        HEARTBEAT_DURATION_MS.observe(ms);
    }

    pub fn record_stale_removed(count: u64) {
        STALE_CONNECTIONS_REMOVED_TOTAL.inc_by(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_prefix() {
        MessageMetrics::record_dispatched();
        ConnectionMetrics::set_active(0);
        let output = encode_metrics().unwrap();
        assert!(output.contains("chat_relay_messages_dispatched_total"));
        assert!(output.contains("chat_relay_connections_total"));
    }
}
