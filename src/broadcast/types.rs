use serde::Serialize;
use uuid::Uuid;

/// One inbound chat message. Lives only for the duration of a dispatch.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Connection that sent the message
    pub origin_id: Uuid,
    /// Opaque payload, relayed as-is
    pub payload: String,
}

impl ChatMessage {
    pub fn new(origin_id: Uuid, payload: impl Into<String>) -> Self {
        Self {
            origin_id,
            payload: payload.into(),
        }
    }
}

/// Result of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    /// Connections whose outbound queue accepted the message
    pub delivered: usize,
    /// Connections dropped because their queue was full or closed
    pub evicted: usize,
}
