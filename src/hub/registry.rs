use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::UserIdentity;
use crate::events::{OutboundEvent, ServerEvent};

/// Handle for a single live WebSocket connection.
///
/// The registry holds a non-owning reference; the transport task owns the
/// receiving half of the channel and drops it on disconnect.
pub struct ConnectionHandle {
    pub id: Uuid,
    pub identity: UserIdentity,
    pub sender: mpsc::Sender<OutboundEvent>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(identity: UserIdentity, sender: mpsc::Sender<OutboundEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            sender,
            connected_at: Utc::now(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.id
    }

    /// Send an event (serialized when written to the socket)
    pub async fn send(
        &self,
        event: ServerEvent,
    ) -> Result<(), mpsc::error::SendError<OutboundEvent>> {
        self.sender.send(OutboundEvent::Raw(event)).await
    }

    /// Send a pre-serialized event (for multi-connection fan-out)
    pub async fn send_outbound(
        &self,
        event: OutboundEvent,
    ) -> Result<(), mpsc::error::SendError<OutboundEvent>> {
        self.sender.send(event).await
    }
}

/// Live mapping from user identity to active connection handles.
///
/// A user id appears in the index iff it has at least one open connection.
/// Values are sets of handles, so a second device never invalidates the
/// first one's registration.
#[derive(Default)]
pub struct ConnectionRegistry {
    /// connection_id -> handle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// user_id -> set of connection ids
    user_index: DashMap<String, HashSet<Uuid>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for an authenticated identity.
    pub fn register(
        &self,
        identity: UserIdentity,
        sender: mpsc::Sender<OutboundEvent>,
    ) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(identity, sender));
        let conn_id = handle.id;

        self.connections.insert(conn_id, handle.clone());
        self.user_index
            .entry(handle.identity.id.clone())
            .or_default()
            .insert(conn_id);

        tracing::info!(
            connection_id = %conn_id,
            user_id = %handle.identity.id,
            "Connection registered"
        );

        handle
    }

    /// Remove one connection. Idempotent: unknown ids are a no-op.
    pub fn unregister(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.connections.remove(&connection_id)?;

        if let Some(mut user_conns) = self.user_index.get_mut(&handle.identity.id) {
            user_conns.remove(&connection_id);
            if user_conns.is_empty() {
                drop(user_conns);
                self.user_index.remove(&handle.identity.id);
            }
        }

        tracing::info!(
            connection_id = %connection_id,
            user_id = %handle.identity.id,
            "Connection unregistered"
        );

        Some(handle)
    }

    /// Resolve member ids to live handles.
    ///
    /// Identities without a live connection are silently skipped; users
    /// routinely have chats open on other devices or are offline.
    pub fn resolve(&self, user_ids: &[String]) -> Vec<Arc<ConnectionHandle>> {
        let mut handles = Vec::new();
        for user_id in user_ids {
            if let Some(conn_ids) = self.user_index.get(user_id) {
                handles.extend(
                    conn_ids
                        .iter()
                        .filter_map(|id| self.connections.get(id).map(|h| h.clone())),
                );
            }
        }
        handles
    }

    /// Whether an identity still has at least one open connection
    pub fn is_connected(&self, user_id: &str) -> bool {
        self.user_index.contains_key(user_id)
    }

    /// All live handles (for global broadcasts and heartbeats)
    pub fn all_handles(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_connections: self.connections.len(),
            unique_users: self.user_index.len(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub unique_users: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> mpsc::Sender<OutboundEvent> {
        mpsc::channel(8).0
    }

    #[test]
    fn test_register_then_unregister_leaves_no_stale_handles() {
        let registry = ConnectionRegistry::new();
        let handle = registry.register(UserIdentity::new("u1", "Alice"), channel());

        assert_eq!(registry.resolve(&["u1".to_string()]).len(), 1);

        registry.unregister(handle.id);
        assert!(registry.resolve(&["u1".to_string()]).is_empty());
        assert!(!registry.is_connected("u1"));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let handle = registry.register(UserIdentity::new("u1", "Alice"), channel());

        assert!(registry.unregister(handle.id).is_some());
        assert!(registry.unregister(handle.id).is_none());
        assert!(registry.unregister(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_multi_device_registration() {
        let registry = ConnectionRegistry::new();
        let phone = registry.register(UserIdentity::new("u1", "Alice"), channel());
        let laptop = registry.register(UserIdentity::new("u1", "Alice"), channel());

        // Both handles stay live; the second device does not evict the first
        assert_eq!(registry.resolve(&["u1".to_string()]).len(), 2);
        assert_eq!(registry.stats().unique_users, 1);
        assert_eq!(registry.stats().total_connections, 2);

        registry.unregister(phone.id);
        assert!(registry.is_connected("u1"));
        assert_eq!(registry.resolve(&["u1".to_string()]).len(), 1);

        registry.unregister(laptop.id);
        assert!(!registry.is_connected("u1"));
    }

    #[test]
    fn test_resolve_skips_offline_members() {
        let registry = ConnectionRegistry::new();
        registry.register(UserIdentity::new("u1", "Alice"), channel());

        let handles = registry.resolve(&["u1".to_string(), "offline".to_string()]);
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].user_id(), "u1");
    }
}
