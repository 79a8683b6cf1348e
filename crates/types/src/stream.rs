//! Stream Dispatcher wire types (§4.H).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StreamMessageType {
    SessionEvent,
    ErrorEvent,
    Heartbeat,
    SessionEnded,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub message_type: StreamMessageType,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl StreamMessage {
    pub fn heartbeat() -> Self {
        Self {
            message_type: StreamMessageType::Heartbeat,
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn session_ended() -> Self {
        Self {
            message_type: StreamMessageType::SessionEnded,
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }
}

/// Heartbeat cadence on an idle stream (§4.H).
pub const STREAM_HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// Clients that see no message for this long MUST reconnect (§4.H).
pub const STREAM_CLIENT_RECONNECT_SECS: u64 = 30;

/// Long-poll page size (§4.H, §6).
pub const POLL_MAX_EVENTS: usize = 100;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PollQuery {
    pub since: Option<i64>,
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub events: Vec<crate::session::TimelineEntry>,
    pub has_more: bool,
}
