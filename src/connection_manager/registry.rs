use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::OutboundMessage;

use super::{ConnectionHandle, ConnectionInfo, ConnectionState, ConnectionStats, RegistryError};

/// Manages all active WebSocket connections
///
/// Each map operation is atomic per entry and no guard is ever held across an
/// `.await`, so registry calls are safe from any number of connection tasks.
pub struct ConnectionManager {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    accepting: AtomicBool,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            accepting: AtomicBool::new(true),
        }
    }

    /// Register a new connection
    ///
    /// Fails once shutdown has begun; the caller must then close its transport.
    pub fn register(
        &self,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Result<Arc<ConnectionHandle>, RegistryError> {
        if !self.is_accepting() {
            return Err(RegistryError::ShuttingDown);
        }

        let handle = Arc::new(ConnectionHandle::new(sender));
        let conn_id = handle.id;
        self.connections.insert(conn_id, handle.clone());

        // A shutdown that started between the check and the insert may have
        // already swept the map; back out so nothing outlives close_all.
        if !self.is_accepting() {
            if let Some((_, handle)) = self.connections.remove(&conn_id) {
                handle.mark_closed();
            }
            return Err(RegistryError::ShuttingDown);
        }

        tracing::info!(connection_id = %conn_id, "Connection registered");

        Ok(handle)
    }

    /// Unregister a connection. Unknown ids are ignored.
    pub fn unregister(&self, connection_id: Uuid) -> bool {
        match self.connections.remove(&connection_id) {
            Some((_, handle)) => {
                handle.mark_closed();
                tracing::info!(connection_id = %connection_id, "Connection unregistered");
                true
            }
            None => false,
        }
    }

    /// Copy of every registered connection at this instant
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn contains(&self, connection_id: Uuid) -> bool {
        self.connections.contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting registrations and mark every live connection `Closing`.
    /// Returns the number of connections moved to `Closing`.
    pub fn begin_shutdown(&self) -> usize {
        self.accepting.store(false, Ordering::SeqCst);

        let closing = self
            .snapshot()
            .into_iter()
            .filter(|handle| handle.mark_closing())
            .count();

        tracing::info!(closing = closing, "Registry stopped accepting connections");
        closing
    }

    /// Remove every remaining connection. Returns how many were removed.
    pub fn close_all(&self) -> usize {
        self.accepting.store(false, Ordering::SeqCst);

        let ids: Vec<Uuid> = self.connections.iter().map(|r| *r.key()).collect();
        let removed = ids.into_iter().filter(|id| self.unregister(*id)).count();

        if removed > 0 {
            tracing::warn!(removed = removed, "Force-closed remaining connections");
        }
        removed
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        let closing_connections = self
            .connections
            .iter()
            .filter(|r| r.value().state() == ConnectionState::Closing)
            .count();

        ConnectionStats {
            total_connections: self.connections.len(),
            closing_connections,
            accepting: self.is_accepting(),
        }
    }

    pub fn connection_info(&self, connection_id: Uuid) -> Option<ConnectionInfo> {
        self.connections
            .get(&connection_id)
            .map(|h| ConnectionInfo::from(h.value().as_ref()))
    }

    /// Find connections that have been inactive for longer than the timeout
    pub fn find_stale_connections(&self, timeout_secs: u64) -> Vec<Uuid> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Remove stale connections and return the count of removed connections
    pub fn cleanup_stale_connections(&self, timeout_secs: u64) -> usize {
        let stale = self.find_stale_connections(timeout_secs);

        stale
            .into_iter()
            .filter(|conn_id| {
                tracing::info!(connection_id = %conn_id, "Removing stale connection due to timeout");
                self.unregister(*conn_id)
            })
            .count()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
