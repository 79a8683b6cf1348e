//! Wire types for the Ingest Gateway (§4.E) and SDK Transport Contract (§4.I).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error_group::ErrorGroup;

/// A single inbound error payload, as either the top-level fields of
/// `POST /api/capture/error` or one element of its `errors[]` bulk array.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCapture {
    pub message: String,
    pub stack_trace: Option<String>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Request body for `POST /api/capture/error`: either a single error's
/// fields inline, or a bulk `errors[]` array (bulk wins if both given).
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCaptureRequest {
    #[serde(flatten)]
    pub single: ErrorCapture,
    #[serde(default)]
    pub errors: Option<Vec<ErrorCapture>>,
}

impl ErrorCaptureRequest {
    /// The effective list of errors to ingest: the bulk array if present
    /// and non-empty, otherwise the single inline payload.
    pub fn items(self) -> Vec<ErrorCapture> {
        match self.errors {
            Some(items) if !items.is_empty() => items,
            _ => vec![self.single],
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionEventCapture {
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionEventCaptureRequest {
    pub session_id: String,
    pub events: Vec<SessionEventCapture>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEventCapture {
    pub method: String,
    pub url: String,
    pub status_code: Option<i32>,
    pub response_time: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(default)]
    pub request_data: serde_json::Value,
    #[serde(default)]
    pub response_data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEventCaptureRequest {
    pub session_id: String,
    pub events: Vec<NetworkEventCapture>,
}

/// Bulk-capture threshold (§4.E): above this count, processing is async
/// and `error_groups` comes back empty.
pub const BULK_THRESHOLD: usize = 5;

/// Bounded parallelism for synchronous (non-bulk) grouping calls.
pub const SYNC_GROUPING_CONCURRENCY: usize = 10;

/// Batch insert chunk size (§4.E).
pub const BATCH_INSERT_CHUNK_SIZE: usize = 100;

/// Clients SHOULD send no more than this many events per request (§4.I).
pub const SDK_MAX_BATCH_SIZE: usize = 100;

/// Minimum dedup-index retention for idempotency keys (§4.I).
pub const IDEMPOTENCY_TTL_SECS: i64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCaptureResponse {
    pub error_ids: Vec<i64>,
    pub error_groups: Vec<ErrorGroup>,
    pub background_jobs: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkCaptureResponse {
    pub inserted_ids: Vec<i64>,
}
