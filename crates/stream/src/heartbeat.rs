//! Idle-stream heartbeats (§4.H): keeps SSE connections from looking dead
//! to proxies/load balancers when a session produces no real events.

use std::time::Duration;

use faultline_types::stream::{StreamMessage, STREAM_HEARTBEAT_INTERVAL_SECS};

use crate::registry::StreamRegistry;

/// Spawns a ticker that publishes a heartbeat to `session_id` every
/// `STREAM_HEARTBEAT_INTERVAL_SECS` until no subscribers remain, then
/// reclaims the registry entry and exits.
pub fn spawn(registry: StreamRegistry, session_id: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(STREAM_HEARTBEAT_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if registry.is_idle(&session_id).await {
                registry.remove_if_idle(&session_id).await;
                break;
            }
            registry.publish(&session_id, StreamMessage::heartbeat()).await;
        }
    })
}
