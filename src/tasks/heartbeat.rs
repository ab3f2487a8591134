use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::broadcast::RoomBroadcaster;
use crate::config::WebSocketConfig;
use crate::events::ServerEvent;
use crate::hub::ConnectionHub;

/// Background task emitting a periodic heartbeat event to every live
/// connection, letting clients detect a silently dead link.
pub struct HeartbeatTask {
    config: WebSocketConfig,
    broadcaster: RoomBroadcaster,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        hub: Arc<ConnectionHub>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            broadcaster: RoomBroadcaster::new(hub),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer =
            tokio::time::interval(Duration::from_secs(self.config.heartbeat_interval));

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let report = self.broadcaster.to_all(ServerEvent::Heartbeat).await;
                    tracing::debug!(
                        delivered = report.delivered,
                        dropped = report.dropped,
                        "Heartbeat sent"
                    );
                }
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task shutting down");
                    break;
                }
            }
        }
    }
}
