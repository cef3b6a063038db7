use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message};
use serde::{Deserialize, Serialize};

/// The one event exchanged in both directions:
/// `{"event": "chat message", "data": "<payload>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChatEvent {
    #[serde(rename = "chat message")]
    ChatMessage(String),
}

impl ChatEvent {
    pub fn chat_message(payload: impl Into<String>) -> Self {
        Self::ChatMessage(payload.into())
    }

    pub fn payload(&self) -> &str {
        match self {
            Self::ChatMessage(payload) => payload,
        }
    }

    pub fn into_payload(self) -> String {
        match self {
            Self::ChatMessage(payload) => payload,
        }
    }
}

/// Items placed on a connection's outbound queue
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Serialized by the writer task
    Event(ChatEvent),
    /// Serialized once by the dispatcher and shared by every recipient
    Preserialized(Arc<str>),
    /// WebSocket ping frame (heartbeat)
    Ping,
}

impl OutboundMessage {
    /// Serialize a chat event once so it can be cloned cheaply per target
    pub fn preserialized(event: &ChatEvent) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(event)?;
        Ok(Self::Preserialized(Arc::from(json)))
    }

    /// Convert into a WebSocket frame
    pub fn into_frame(self) -> Result<Message, serde_json::Error> {
        match self {
            Self::Event(event) => Ok(Message::Text(serde_json::to_string(&event)?.into())),
            Self::Preserialized(json) => Ok(Message::Text(json.as_ref().into())),
            Self::Ping => Ok(Message::Ping(Default::default())),
        }
    }
}

/// Close frame sent when the server goes away
pub fn going_away_frame() -> Message {
    Message::Close(Some(CloseFrame {
        code: axum::extract::ws::close_code::AWAY,
        reason: "server shutting down".into(),
    }))
}
