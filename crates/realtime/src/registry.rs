use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::protocol::OutboundEvent;

/// Active connections keyed by user id, at most one per user.
///
/// Every operation takes the same exclusive lock. Writes into a handle never
/// wait, so no socket I/O happens while the lock is held.
#[derive(Clone, Default)]
pub struct Registry {
    connections: Arc<Mutex<HashMap<String, ConnectionHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the user's connection. A replaced connection is closed.
    pub async fn register(&self, user_id: &str, handle: ConnectionHandle) {
        let connection_id = handle.id();
        let mut connections = self.connections.lock().await;

        if let Some(previous) = connections.insert(user_id.to_string(), handle) {
            if previous.id() != connection_id {
                info!(
                    %user_id,
                    replaced = previous.id(),
                    connection_id,
                    "replacing existing connection"
                );
                previous.close();
            }
        }
        debug!(%user_id, connection_id, online = connections.len(), "connection registered");
    }

    /// Remove and close whatever connection the user has.
    pub async fn unregister(&self, user_id: &str) -> bool {
        let removed = self.connections.lock().await.remove(user_id);
        match removed {
            Some(handle) => {
                handle.close();
                debug!(%user_id, connection_id = handle.id(), "connection unregistered");
                true
            }
            None => false,
        }
    }

    /// Remove the user's entry only if it still belongs to `connection_id`.
    pub async fn release(&self, user_id: &str, connection_id: u64) -> bool {
        let mut connections = self.connections.lock().await;
        let owned = connections
            .get(user_id)
            .is_some_and(|handle| handle.id() == connection_id);

        if owned {
            connections.remove(user_id);
            debug!(%user_id, connection_id, "connection released");
        }
        owned
    }

    /// Deliver to the user's connection. Absent users are skipped; a failed
    /// write evicts and closes the connection. Returns whether it was delivered.
    pub async fn send(&self, user_id: &str, event: OutboundEvent) -> bool {
        let mut connections = self.connections.lock().await;
        let Some(handle) = connections.get(user_id) else {
            return false;
        };

        match handle.try_deliver(event) {
            Ok(()) => true,
            Err(error) => {
                warn!(%user_id, %error, "evicting connection after failed write");
                if let Some(handle) = connections.remove(user_id) {
                    handle.close();
                }
                false
            }
        }
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.connections.lock().await.contains_key(user_id)
    }

    pub async fn connection_id(&self, user_id: &str) -> Option<u64> {
        self.connections.lock().await.get(user_id).map(ConnectionHandle::id)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Close and remove every connection. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let mut connections = self.connections.lock().await;
        let count = connections.len();
        for (_, handle) in connections.drain() {
            handle.close();
        }
        count
    }
}
