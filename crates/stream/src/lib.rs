//! The Stream Dispatcher (§4.H): fans session events out to SSE
//! subscribers with a heartbeat. The long-poll fallback is a direct
//! database read (§4.A) rather than an in-process cursor — it lives in
//! `faultline-server::routes::stream` so `since` can be a real row id and
//! survive a restart, the way capture itself already is durable.

mod heartbeat;
mod registry;

pub use heartbeat::spawn as spawn_heartbeat;
pub use registry::{StreamRegistry, CHANNEL_CAPACITY};

pub use tokio::sync::broadcast::error::RecvError;

use faultline_types::session::TimelineEntry;
use faultline_types::stream::{StreamMessage, StreamMessageType};

/// Thin wrapper around the push registry, the shape `AppState` stores for
/// the whole Stream Dispatcher.
#[derive(Clone)]
pub struct StreamDispatcher {
    pub registry: StreamRegistry,
}

impl StreamDispatcher {
    pub fn new() -> Self {
        Self {
            registry: StreamRegistry::new(),
        }
    }

    /// Fans a newly captured row out to any live SSE subscriber of its
    /// session (§4.H). The row itself is already durable in its table by
    /// the time a caller reaches this — a dropped publish (no
    /// subscribers, or a lagged/slow one) costs nothing but a stream
    /// frame; the long-poll fallback reads the same rows straight from
    /// storage.
    pub async fn dispatch(&self, session_id: &str, message_type: StreamMessageType, entry: TimelineEntry) {
        let timestamp = entry.timestamp();
        let data = serde_json::to_value(&entry).unwrap_or(serde_json::Value::Null);
        self.registry
            .publish(session_id, StreamMessage { message_type, data, timestamp })
            .await;
    }

    /// Publishes a `session-ended` frame.
    pub async fn session_ended(&self, session_id: &str) {
        self.registry.publish(session_id, StreamMessage::session_ended()).await;
    }
}

impl Default for StreamDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn dispatch_reaches_subscriber() {
        let dispatcher = StreamDispatcher::new();
        let mut rx = dispatcher.registry.subscribe("session-1").await;

        dispatcher
            .dispatch(
                "session-1",
                StreamMessageType::SessionEvent,
                TimelineEntry::SessionEvent {
                    id: 1,
                    event_type: "click".to_string(),
                    data: serde_json::json!({"x": 1}),
                    timestamp: Utc::now(),
                },
            )
            .await;

        let message = rx.recv().await.unwrap();
        assert_eq!(message.message_type, StreamMessageType::SessionEvent);
    }

    #[tokio::test]
    async fn dispatch_with_no_subscriber_is_a_noop() {
        let dispatcher = StreamDispatcher::new();
        dispatcher
            .dispatch(
                "session-2",
                StreamMessageType::ErrorEvent,
                TimelineEntry::Error {
                    id: 7,
                    message: "boom".to_string(),
                    error_group_id: Some(42),
                    timestamp: Utc::now(),
                },
            )
            .await;
    }
}
