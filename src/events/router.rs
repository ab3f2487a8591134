use std::sync::Arc;

use uuid::Uuid;

use crate::broadcast::RoomBroadcaster;
use crate::hub::{ConnectionHandle, ConnectionHub};
use crate::metrics::{EVENTS_RECEIVED, MESSAGES_PERSISTED, PERSISTENCE_FAILURES, USERS_ONLINE};
use crate::store::{MessageDraft, MessageStore};

use super::{ClientEvent, ServerEvent, TransientMessage};

/// Dispatch table from inbound event kinds to handler logic.
///
/// The connection's authenticated identity is threaded through every
/// handler call; handlers for different connections interleave freely,
/// while hub mutations are individually atomic.
pub struct EventRouter {
    hub: Arc<ConnectionHub>,
    broadcaster: RoomBroadcaster,
    store: Arc<dyn MessageStore>,
}

impl EventRouter {
    pub fn new(hub: Arc<ConnectionHub>, store: Arc<dyn MessageStore>) -> Self {
        let broadcaster = RoomBroadcaster::new(hub.clone());
        Self {
            hub,
            broadcaster,
            store,
        }
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Route one inbound event from an authenticated connection.
    #[tracing::instrument(
        name = "event.dispatch",
        skip(self, conn, event),
        fields(
            connection_id = %conn.id,
            user_id = %conn.user_id(),
            kind = event.kind()
        )
    )]
    pub async fn dispatch(&self, conn: &Arc<ConnectionHandle>, event: ClientEvent) {
        EVENTS_RECEIVED.with_label_values(&[event.kind()]).inc();

        match event {
            ClientEvent::NewMessage {
                chat_id,
                members,
                message,
            } => self.on_new_message(conn, chat_id, members, message).await,
            ClientEvent::StartTyping { chat_id, members } => {
                self.broadcaster
                    .to_members_excluding(
                        &members,
                        conn.user_id(),
                        ServerEvent::StartTyping { chat_id },
                    )
                    .await;
            }
            ClientEvent::StopTyping { chat_id, members } => {
                self.broadcaster
                    .to_members_excluding(
                        &members,
                        conn.user_id(),
                        ServerEvent::StopTyping { chat_id },
                    )
                    .await;
            }
            ClientEvent::ChatJoined { user_id, members } => {
                self.on_chat_joined(user_id, &members).await;
            }
            ClientEvent::ChatLeaved { user_id, members } => {
                self.on_chat_leaved(&user_id, &members).await;
            }
        }
    }

    /// Broadcast the transient message plus a content-free alert, then
    /// hand the draft to the store in a background task. The two paths are
    /// deliberately decoupled: a failed write never recalls the broadcast.
    async fn on_new_message(
        &self,
        conn: &Arc<ConnectionHandle>,
        chat_id: String,
        members: Vec<String>,
        content: String,
    ) {
        let message = TransientMessage::new(content.clone(), conn.identity.clone(), chat_id.clone());

        self.broadcaster
            .to_members(
                &members,
                ServerEvent::NewMessage {
                    chat_id: chat_id.clone(),
                    message,
                },
            )
            .await;

        self.broadcaster
            .to_members(
                &members,
                ServerEvent::NewMessageAlert {
                    chat_id: chat_id.clone(),
                },
            )
            .await;

        let store = self.store.clone();
        let draft = MessageDraft {
            content,
            sender_id: conn.user_id().to_string(),
            chat_id,
        };
        tokio::spawn(async move {
            match store.persist(draft).await {
                Ok(stored) => {
                    MESSAGES_PERSISTED.inc();
                    tracing::debug!(
                        message_id = %stored.id,
                        chat_id = %stored.chat_id,
                        "Message persisted"
                    );
                }
                Err(e) => {
                    PERSISTENCE_FAILURES.inc();
                    tracing::error!(error = %e, "Failed to persist message");
                }
            }
        });
    }

    async fn on_chat_joined(&self, user_id: String, members: &[String]) {
        self.hub.presence.mark_online(user_id);
        USERS_ONLINE.set(self.hub.presence.len() as i64);

        // Full snapshot, not a delta: self-healing if a prior broadcast
        // was missed by any member.
        self.broadcaster
            .to_members(members, ServerEvent::OnlineUsers(self.hub.presence.snapshot()))
            .await;
    }

    async fn on_chat_leaved(&self, user_id: &str, members: &[String]) {
        self.hub.presence.mark_offline(user_id);
        USERS_ONLINE.set(self.hub.presence.len() as i64);

        self.broadcaster
            .to_members(members, ServerEvent::OnlineUsers(self.hub.presence.snapshot()))
            .await;
    }

    /// Single cleanup path for both graceful close and abrupt disconnect.
    ///
    /// Idempotent: the second call for the same connection finds nothing
    /// to remove and does not broadcast. The presence entry is only
    /// dropped once the identity's last handle is gone, so one device
    /// disconnecting does not mark a still-active user offline.
    #[tracing::instrument(name = "event.disconnect", skip(self))]
    pub async fn on_disconnect(&self, connection_id: Uuid) {
        let Some(handle) = self.hub.registry.unregister(connection_id) else {
            return;
        };

        if !self.hub.registry.is_connected(handle.user_id()) {
            self.hub.presence.mark_offline(handle.user_id());
        }
        USERS_ONLINE.set(self.hub.presence.len() as i64);

        // The connection's chat context is gone with it, so the updated
        // online set goes to every live connection rather than a member list.
        self.broadcaster
            .to_all(ServerEvent::OnlineUsers(self.hub.presence.snapshot()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserIdentity;
    use crate::events::OutboundEvent;
    use crate::store::MemoryMessageStore;
    use tokio::sync::mpsc;

    fn test_router() -> (Arc<ConnectionHub>, EventRouter, Arc<MemoryMessageStore>) {
        let hub = Arc::new(ConnectionHub::new());
        let store = Arc::new(MemoryMessageStore::new());
        let router = EventRouter::new(hub.clone(), store.clone());
        (hub, router, store)
    }

    fn connect(
        hub: &ConnectionHub,
        id: &str,
        name: &str,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = hub.registry.register(UserIdentity::new(id, name), tx);
        (handle, rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<OutboundEvent>) -> ServerEvent {
        let json = rx.recv().await.unwrap().to_json().unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn test_chat_joined_broadcasts_snapshot_to_members() {
        let (hub, router, _) = test_router();
        let (_a, mut rx_a) = connect(&hub, "u1", "Alice");
        let (_b, mut rx_b) = connect(&hub, "u2", "Bob");

        router
            .dispatch(
                &_a,
                ClientEvent::ChatJoined {
                    user_id: "u1".to_string(),
                    members: vec!["u1".to_string(), "u2".to_string()],
                },
            )
            .await;

        for rx in [&mut rx_a, &mut rx_b] {
            match next_event(rx).await {
                ServerEvent::OnlineUsers(users) => assert_eq!(users, vec!["u1"]),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_disconnect_cleanup_is_idempotent() {
        let (hub, router, _) = test_router();
        let (a, _rx_a) = connect(&hub, "u1", "Alice");
        let (_b, _rx_b) = connect(&hub, "u2", "Bob");
        hub.presence.mark_online("u1");
        hub.presence.mark_online("u2");

        router.on_disconnect(a.id).await;
        router.on_disconnect(a.id).await;

        assert!(!hub.presence.is_online("u1"));
        assert!(hub.presence.is_online("u2"));
        assert!(hub.registry.is_connected("u2"));
    }

    #[tokio::test]
    async fn test_disconnect_keeps_presence_while_other_device_lives() {
        let (hub, router, _) = test_router();
        let (phone, _rx1) = connect(&hub, "u1", "Alice");
        let (_laptop, _rx2) = connect(&hub, "u1", "Alice");
        hub.presence.mark_online("u1");

        router.on_disconnect(phone.id).await;

        assert!(hub.presence.is_online("u1"));
        assert!(hub.registry.is_connected("u1"));
    }

    #[tokio::test]
    async fn test_new_message_reaches_sender_too() {
        let (hub, router, _) = test_router();
        let (a, mut rx_a) = connect(&hub, "u1", "Alice");

        router
            .dispatch(
                &a,
                ClientEvent::NewMessage {
                    chat_id: "c1".to_string(),
                    members: vec!["u1".to_string()],
                    message: "hi".to_string(),
                },
            )
            .await;

        // Sender's own UI updates optimistically from the same broadcast
        match next_event(&mut rx_a).await {
            ServerEvent::NewMessage { chat_id, message } => {
                assert_eq!(chat_id, "c1");
                assert_eq!(message.content, "hi");
                assert_eq!(message.sender.name, "Alice");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match next_event(&mut rx_a).await {
            ServerEvent::NewMessageAlert { chat_id } => assert_eq!(chat_id, "c1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
