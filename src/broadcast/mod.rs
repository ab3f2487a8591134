//! Room-scoped event fan-out.
//!
//! Delivery is fire-and-forget: a send counts as delivered once the
//! connection's outbound channel accepts it. A channel that has closed
//! between resolution and send means the peer is mid-disconnect; the drop
//! is swallowed and the disconnect cleanup path reconciles state.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;

use crate::events::{OutboundEvent, ServerEvent};
use crate::hub::{ConnectionHandle, ConnectionHub};
use crate::metrics::{EVENTS_DELIVERED, EVENTS_DROPPED};

/// Maximum number of concurrent channel sends
const MAX_CONCURRENT_SENDS: usize = 100;

/// Member-set size at which the event body is serialized once and shared
const PRESERIALIZATION_THRESHOLD: usize = 4;

/// Outcome of one fan-out attempt.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeliveryReport {
    /// Sends accepted by a live connection channel
    pub delivered: usize,
    /// Sends dropped because the channel had closed
    pub dropped: usize,
}

impl DeliveryReport {
    fn new(delivered: usize, dropped: usize) -> Self {
        Self { delivered, dropped }
    }
}

/// Delivers one event to the live handles of a member list.
pub struct RoomBroadcaster {
    hub: Arc<ConnectionHub>,
}

impl RoomBroadcaster {
    pub fn new(hub: Arc<ConnectionHub>) -> Self {
        Self { hub }
    }

    /// Deliver to every live handle of the given members.
    #[tracing::instrument(name = "broadcast.members", skip(self, event), fields(member_count = members.len()))]
    pub async fn to_members(&self, members: &[String], event: ServerEvent) -> DeliveryReport {
        let handles = self.hub.registry.resolve(members);
        self.send_to_handles(handles, event).await
    }

    /// Deliver to members, excluding every handle of the sender's identity.
    ///
    /// Exclusion is by identity, not by single connection: a typing
    /// indicator should not bounce back to the sender's other devices.
    #[tracing::instrument(
        name = "broadcast.members_excluding",
        skip(self, event),
        fields(member_count = members.len(), excluded = %exclude_user)
    )]
    pub async fn to_members_excluding(
        &self,
        members: &[String],
        exclude_user: &str,
        event: ServerEvent,
    ) -> DeliveryReport {
        let handles: Vec<_> = self
            .hub
            .registry
            .resolve(members)
            .into_iter()
            .filter(|h| h.user_id() != exclude_user)
            .collect();
        self.send_to_handles(handles, event).await
    }

    /// Deliver to every live connection in the process.
    #[tracing::instrument(name = "broadcast.all", skip(self, event))]
    pub async fn to_all(&self, event: ServerEvent) -> DeliveryReport {
        let handles = self.hub.registry.all_handles();
        self.send_to_handles(handles, event).await
    }

    async fn send_to_handles(
        &self,
        handles: Vec<Arc<ConnectionHandle>>,
        event: ServerEvent,
    ) -> DeliveryReport {
        if handles.is_empty() {
            return DeliveryReport::new(0, 0);
        }

        // Small fan-outs: sequential sends, no shared serialization
        if handles.len() < PRESERIALIZATION_THRESHOLD {
            let mut delivered = 0;
            let mut dropped = 0;
            for handle in &handles {
                match handle.send(event.clone()).await {
                    Ok(()) => delivered += 1,
                    Err(_) => dropped += 1,
                }
            }
            EVENTS_DELIVERED.inc_by(delivered as u64);
            EVENTS_DROPPED.inc_by(dropped as u64);
            return DeliveryReport::new(delivered, dropped);
        }

        // Larger fan-outs: serialize once, send concurrently with a bound
        let outbound = match OutboundEvent::preserialized(&event) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to pre-serialize event, falling back to per-connection serialization");
                OutboundEvent::Raw(event.clone())
            }
        };

        let mut futures = FuturesUnordered::new();
        let mut delivered = 0;
        let mut dropped = 0;
        let mut pending = 0;

        for handle in handles {
            let msg = outbound.clone();
            futures.push(async move { handle.send_outbound(msg).await.is_ok() });
            pending += 1;

            while pending >= MAX_CONCURRENT_SENDS {
                match futures.next().await {
                    Some(true) => {
                        pending -= 1;
                        delivered += 1;
                    }
                    Some(false) => {
                        pending -= 1;
                        dropped += 1;
                    }
                    None => break,
                }
            }
        }

        while let Some(ok) = futures.next().await {
            if ok {
                delivered += 1;
            } else {
                dropped += 1;
            }
        }

        EVENTS_DELIVERED.inc_by(delivered as u64);
        EVENTS_DROPPED.inc_by(dropped as u64);
        DeliveryReport::new(delivered, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserIdentity;
    use tokio::sync::mpsc;

    fn register(
        hub: &ConnectionHub,
        id: &str,
    ) -> mpsc::Receiver<OutboundEvent> {
        let (tx, rx) = mpsc::channel(8);
        hub.registry.register(UserIdentity::new(id, id), tx);
        rx
    }

    #[tokio::test]
    async fn test_delivers_to_members_only() {
        let hub = Arc::new(ConnectionHub::new());
        let mut rx_a = register(&hub, "u1");
        let mut rx_c = register(&hub, "u3");

        let broadcaster = RoomBroadcaster::new(hub);
        let report = broadcaster
            .to_members(
                &["u1".to_string(), "u2".to_string()],
                ServerEvent::NewMessageAlert {
                    chat_id: "c1".to_string(),
                },
            )
            .await;

        // u2 has no live connection and is skipped; u3 is not a member
        assert_eq!(report.delivered, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_exclude_sender() {
        let hub = Arc::new(ConnectionHub::new());
        let mut rx_a = register(&hub, "u1");
        let mut rx_b = register(&hub, "u2");

        let broadcaster = RoomBroadcaster::new(hub);
        broadcaster
            .to_members_excluding(
                &["u1".to_string(), "u2".to_string()],
                "u1",
                ServerEvent::StartTyping {
                    chat_id: "c1".to_string(),
                },
            )
            .await;

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_stale_handle_is_swallowed() {
        let hub = Arc::new(ConnectionHub::new());
        let rx = register(&hub, "u1");
        drop(rx); // peer went away without unregistering yet

        let broadcaster = RoomBroadcaster::new(hub);
        let report = broadcaster
            .to_members(
                &["u1".to_string()],
                ServerEvent::Heartbeat,
            )
            .await;

        assert_eq!(report.delivered, 0);
        assert_eq!(report.dropped, 1);
    }

    #[tokio::test]
    async fn test_large_fanout_uses_preserialized_body() {
        let hub = Arc::new(ConnectionHub::new());
        let mut receivers: Vec<_> = (0..8)
            .map(|i| register(&hub, &format!("u{}", i)))
            .collect();
        let members: Vec<String> = (0..8).map(|i| format!("u{}", i)).collect();

        let broadcaster = RoomBroadcaster::new(hub);
        let report = broadcaster
            .to_members(
                &members,
                ServerEvent::OnlineUsers(members.clone()),
            )
            .await;

        assert_eq!(report.delivered, 8);
        for rx in &mut receivers {
            match rx.try_recv().unwrap() {
                OutboundEvent::Preserialized(json) => {
                    assert!(json.contains("ONLINE_USERS"));
                }
                OutboundEvent::Raw(_) => panic!("expected shared serialized body"),
            }
        }
    }
}
