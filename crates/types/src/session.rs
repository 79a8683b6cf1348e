//! SessionEvent / NetworkEvent: append-only per-session event streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub id: i64,
    pub session_id: String,
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    pub id: i64,
    pub session_id: String,
    pub method: String,
    pub url: String,
    pub status_code: Option<i32>,
    pub response_time: Option<i64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub request_data: serde_json::Value,
    #[serde(default)]
    pub response_data: serde_json::Value,
}

/// A single entry in a merged session timeline (§6 `GET /api/session/{id}/events`
/// and the `/replay` endpoint), discriminated by `kind`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineEntry {
    SessionEvent {
        id: i64,
        event_type: String,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    NetworkEvent {
        id: i64,
        method: String,
        url: String,
        status_code: Option<i32>,
        response_time: Option<i64>,
        timestamp: DateTime<Utc>,
    },
    Error {
        id: i64,
        message: String,
        error_group_id: Option<i64>,
        timestamp: DateTime<Utc>,
    },
}

impl From<SessionEvent> for TimelineEntry {
    fn from(e: SessionEvent) -> Self {
        TimelineEntry::SessionEvent {
            id: e.id,
            event_type: e.event_type,
            data: e.data,
            timestamp: e.timestamp,
        }
    }
}

impl From<NetworkEvent> for TimelineEntry {
    fn from(e: NetworkEvent) -> Self {
        TimelineEntry::NetworkEvent {
            id: e.id,
            method: e.method,
            url: e.url,
            status_code: e.status_code,
            response_time: e.response_time,
            timestamp: e.timestamp,
        }
    }
}

impl TimelineEntry {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TimelineEntry::SessionEvent { timestamp, .. } => *timestamp,
            TimelineEntry::NetworkEvent { timestamp, .. } => *timestamp,
            TimelineEntry::Error { timestamp, .. } => *timestamp,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            TimelineEntry::SessionEvent { id, .. } => *id,
            TimelineEntry::NetworkEvent { id, .. } => *id,
            TimelineEntry::Error { id, .. } => *id,
        }
    }
}

/// One relative-timestamped frame of a session replay.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFrame {
    #[serde(flatten)]
    pub entry: TimelineEntry,
    /// Milliseconds since `Session.started_at`.
    pub offset_ms: i64,
}
