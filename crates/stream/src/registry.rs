//! Per-session subscription registry (§4.H).
//!
//! Grounded on the teacher's `server/src/live/manager.rs`, which keeps a
//! `LiveSessionMap = Arc<RwLock<HashMap<String, LiveSession>>>` fanning a
//! `broadcast::Sender<SessionEvent>` out to every subscriber of a live
//! session. `broadcast::channel`'s own lag semantics (a slow receiver gets
//! `RecvError::Lagged(n)` and the sender keeps going) is exactly the
//! "drop oldest, mark degraded" overflow policy the dispatcher needs, so
//! this crate reuses it directly instead of hand-rolling a ring buffer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use faultline_types::stream::StreamMessage;

/// Bounded per-session broadcast capacity. A receiver that falls this far
/// behind sees `Lagged` on its next `recv()` rather than unbounded memory
/// growth (§4.H overflow policy).
pub const CHANNEL_CAPACITY: usize = 256;

struct SessionChannel {
    tx: broadcast::Sender<StreamMessage>,
}

/// Registry of live per-session broadcast channels, created lazily on
/// first subscribe and torn down once the last subscriber disconnects.
#[derive(Clone)]
pub struct StreamRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionChannel>>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn channel_for(&self, session_id: &str) -> Arc<SessionChannel> {
        if let Some(channel) = self.sessions.read().await.get(session_id) {
            return Arc::clone(channel);
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
                Arc::new(SessionChannel { tx })
            })
            .clone()
    }

    /// Subscribes to a session's event stream, creating its channel if this
    /// is the first subscriber.
    pub async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<StreamMessage> {
        let rx = self.channel_for(session_id).await.tx.subscribe();
        self.report_subscriber_count().await;
        rx
    }

    /// Total live receivers across every session, for the
    /// `stream_active_subscribers` gauge (§4.H, §10.3).
    async fn report_subscriber_count(&self) {
        let total: usize = self.sessions.read().await.values().map(|c| c.tx.receiver_count()).sum();
        faultline_observability::set_stream_subscribers(total);
    }

    /// Publishes a message to every current subscriber of `session_id`. A
    /// session with no subscribers and no channel yet is a silent no-op;
    /// one with a channel but zero live receivers just drops the send
    /// (broadcast semantics), which is fine since nobody is listening.
    pub async fn publish(&self, session_id: &str, message: StreamMessage) {
        if let Some(channel) = self.sessions.read().await.get(session_id) {
            let _ = channel.tx.send(message);
        }
    }

    /// True once no subscribers remain for a session that has a channel.
    /// Callers use this to stop heartbeat tickers and reclaim the entry.
    pub async fn is_idle(&self, session_id: &str) -> bool {
        match self.sessions.read().await.get(session_id) {
            Some(channel) => channel.tx.receiver_count() == 0,
            None => true,
        }
    }

    pub async fn remove_if_idle(&self, session_id: &str) {
        {
            let mut sessions = self.sessions.write().await;
            if let Some(channel) = sessions.get(session_id) {
                if channel.tx.receiver_count() == 0 {
                    sessions.remove(session_id);
                }
            }
        }
        self.report_subscriber_count().await;
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_types::stream::StreamMessageType;

    #[tokio::test]
    async fn subscribe_then_publish_delivers_message() {
        let registry = StreamRegistry::new();
        let mut rx = registry.subscribe("session-1").await;
        registry.publish("session-1", StreamMessage::heartbeat()).await;
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.message_type, StreamMessageType::Heartbeat);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_noop() {
        let registry = StreamRegistry::new();
        registry.publish("ghost-session", StreamMessage::heartbeat()).await;
    }

    #[tokio::test]
    async fn is_idle_reflects_subscriber_count() {
        let registry = StreamRegistry::new();
        let rx = registry.subscribe("session-1").await;
        assert!(!registry.is_idle("session-1").await);
        drop(rx);
        assert!(registry.is_idle("session-1").await);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_rather_than_blocking_publisher() {
        let registry = StreamRegistry::new();
        let mut rx = registry.subscribe("session-1").await;
        for _ in 0..(CHANNEL_CAPACITY + 10) {
            registry.publish("session-1", StreamMessage::heartbeat()).await;
        }
        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }
}
