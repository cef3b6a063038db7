//! Fan-out of chat messages to every registered connection.

mod dispatcher;
mod types;

pub use dispatcher::{BroadcastDispatcher, DispatcherStats, DispatcherStatsSnapshot};
pub use types::{ChatMessage, DeliveryResult};
