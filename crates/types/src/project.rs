//! Project: the tenant boundary. `api_key` is the sole ingest authenticator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    /// Never serialized back out to a dashboard client once stored; only
    /// compared against the inbound `X-API-Key` header.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

/// Client-chosen opaque session identifier, unique per project.
pub type SessionId = String;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    pub project_id: i64,
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Session {
    /// Invariant: `ended_at >= started_at` when set.
    pub fn is_valid(&self) -> bool {
        match self.ended_at {
            Some(ended) => ended >= self.started_at,
            None => true,
        }
    }
}
