//! Connection statistics and info structures

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{ConnectionHandle, ConnectionState};

/// Connection statistics
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub closing_connections: usize,
    pub accepting: bool,
}

/// Point-in-time view of one connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub state: ConnectionState,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub queue_capacity: usize,
}

impl From<&ConnectionHandle> for ConnectionInfo {
    fn from(handle: &ConnectionHandle) -> Self {
        Self {
            id: handle.id,
            state: handle.state(),
            connected_at: handle.connected_at,
            last_activity: handle.last_activity(),
            queue_capacity: handle.queue_capacity(),
        }
    }
}
