//! The Ingest Gateway (§4.E): `POST /api/capture/{error,session-event,network-event}`.
//!
//! Every handler here follows the same shape: authenticate, decode the
//! (possibly gzipped) body, honor an optional `Idempotency-Key` header,
//! write rows, invalidate the project's cache entries unconditionally on
//! success, and never let that invalidation failure fail the request.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{body::Bytes, Json};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde_json::json;

use faultline_core::config::MAX_CAPTURE_PAYLOAD_BYTES;
use faultline_core::fingerprint::ErrorInput;
use faultline_db::{errors, idempotency, network_events, session_events, sessions};
use faultline_jobs::{JobKind, Priority};
use faultline_types::session::TimelineEntry;
use faultline_types::stream::StreamMessageType;
use faultline_types::{
    BulkCaptureResponse, ErrorCapture, ErrorCaptureRequest, ErrorCaptureResponse, ErrorGroup,
    NetworkEventCaptureRequest, SessionEventCaptureRequest, BULK_THRESHOLD, SYNC_GROUPING_CONCURRENCY,
};

use crate::body::decode_capture_body;
use crate::error::{ApiError, ApiResult};
use crate::grouping;
use crate::state::AppState;
use crate::AuthenticatedProject;

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Whether this request is a fresh claim of its idempotency key, has none,
/// or is a replay the caller should answer with a no-op success.
enum Idempotency {
    NotProvided,
    FreshClaim,
    AlreadySeen,
}

fn idempotency_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(IDEMPOTENCY_KEY_HEADER).and_then(|v| v.to_str().ok())
}

async fn check_idempotency(state: &AppState, project_id: i64, headers: &HeaderMap) -> ApiResult<Idempotency> {
    let Some(key) = idempotency_key(headers) else {
        return Ok(Idempotency::NotProvided);
    };
    if idempotency::claim(state.db.pool(), project_id, key).await? {
        Ok(Idempotency::FreshClaim)
    } else {
        Ok(Idempotency::AlreadySeen)
    }
}

/// The response a replayed request should answer with (§8 invariant 5: the
/// same set of ids as the original). Falls back to `default` only if the
/// original claim never got far enough to store one.
async fn replay_response<T: serde::de::DeserializeOwned>(state: &AppState, project_id: i64, headers: &HeaderMap, default: T) -> ApiResult<T> {
    let Some(key) = idempotency_key(headers) else {
        return Ok(default);
    };
    match idempotency::get_response(state.db.pool(), project_id, key).await? {
        Some(stored) => serde_json::from_value(stored).map_err(|e| ApiError::Invalid(e.to_string())),
        None => Ok(default),
    }
}

fn check_payload_size(body: &[u8]) -> ApiResult<()> {
    if body.len() > MAX_CAPTURE_PAYLOAD_BYTES {
        return Err(ApiError::PayloadTooLarge(format!(
            "{} bytes exceeds the {} byte cap",
            body.len(),
            MAX_CAPTURE_PAYLOAD_BYTES
        )));
    }
    Ok(())
}

async fn ensure_session(state: &AppState, project_id: i64, session_id: &str, at: chrono::DateTime<Utc>) -> ApiResult<()> {
    sessions::start_or_get(state.db.pool(), project_id, session_id, None, at, json!({})).await?;
    Ok(())
}

fn to_new_error(item: &ErrorCapture) -> errors::NewError {
    errors::NewError {
        message: item.message.clone(),
        stack_trace: item.stack_trace.clone(),
        url: item.url.clone(),
        user_agent: item.user_agent.clone(),
        session_id: item.session_id.clone(),
        timestamp: item.timestamp.unwrap_or_else(Utc::now),
        metadata: item.metadata.clone(),
    }
}

/// `POST /api/capture/error` (§4.E, §6).
#[utoipa::path(post, path = "/api/capture/error", responses((status = 200, body = ErrorCaptureResponse)))]
pub async fn capture_error(
    State(state): State<Arc<AppState>>,
    AuthenticatedProject(project): AuthenticatedProject,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ErrorCaptureResponse>> {
    check_payload_size(&body)?;
    let started = Instant::now();

    if matches!(check_idempotency(&state, project.id, &headers).await?, Idempotency::AlreadySeen) {
        faultline_observability::record_capture("error", true, started.elapsed());
        let default = ErrorCaptureResponse {
            error_ids: Vec::new(),
            error_groups: Vec::new(),
            background_jobs: Vec::new(),
        };
        return Ok(Json(replay_response(&state, project.id, &headers, default).await?));
    }

    let decoded = decode_capture_body(&headers, &body)?;
    let request: ErrorCaptureRequest = serde_json::from_slice(&decoded).map_err(|e| ApiError::Invalid(e.to_string()))?;
    let items = request.items();

    let response = if items.len() > BULK_THRESHOLD {
        capture_error_bulk(&state, project.id, &items).await?
    } else {
        capture_error_sync(&state, project.id, &items).await?
    };

    if let Some(key) = idempotency_key(&headers) {
        let value = serde_json::to_value(&response).unwrap_or(serde_json::Value::Null);
        idempotency::store_response(state.db.pool(), project.id, key, &value).await?;
    }

    state.cache.invalidate_project(project.id).await;
    faultline_observability::record_capture("error", true, started.elapsed());
    Ok(Json(response))
}

/// Synchronous path (§4.E: `events.length <= 5`): bounded-parallelism
/// grouping, response carries the resolved `error_groups`.
async fn capture_error_sync(state: &AppState, project_id: i64, items: &[ErrorCapture]) -> ApiResult<ErrorCaptureResponse> {
    let pool = state.db.pool();
    let results: Vec<ApiResult<(i64, ErrorGroup)>> = stream::iter(items)
        .map(|item| async move {
            if let Some(session_id) = &item.session_id {
                ensure_session(state, project_id, session_id, item.timestamp.unwrap_or_else(Utc::now)).await?;
            }
            let new_error = to_new_error(item);
            let error_id = errors::insert(pool, project_id, &new_error).await?;

            let input = ErrorInput {
                message: &item.message,
                stack_trace: item.stack_trace.as_deref(),
                url: item.url.as_deref(),
                user_agent: item.user_agent.as_deref(),
            };
            let occurred_at = new_error.timestamp;
            let outcome = grouping::process_error(pool, project_id, &input, occurred_at, item.user_id.as_deref()).await?;
            errors::assign_group(pool, error_id, outcome.group.id, &outcome.fingerprint).await?;
            faultline_db::statistics::record_occurrence(
                pool,
                project_id,
                outcome.group.id,
                occurred_at,
                item.user_id.is_some(),
                item.session_id.is_some(),
            )
            .await?;
            if let Some(session_id) = &item.session_id {
                state
                    .stream
                    .dispatch(
                        session_id,
                        StreamMessageType::ErrorEvent,
                        TimelineEntry::Error {
                            id: error_id,
                            message: item.message.clone(),
                            error_group_id: Some(outcome.group.id),
                            timestamp: occurred_at,
                        },
                    )
                    .await;
            }
            Ok((error_id, outcome.group))
        })
        .buffer_unordered(SYNC_GROUPING_CONCURRENCY)
        .collect()
        .await;

    let mut error_ids = Vec::with_capacity(results.len());
    let mut error_groups = Vec::with_capacity(results.len());
    for result in results {
        let (error_id, group) = result?;
        error_ids.push(error_id);
        error_groups.push(group);
    }
    Ok(ErrorCaptureResponse {
        error_ids,
        error_groups,
        background_jobs: Vec::new(),
    })
}

/// Bulk path (§4.E: `events.length > 5`): batch-insert then hand every row
/// to the Job Processor at `Priority::High`; grouping happens out of band.
async fn capture_error_bulk(state: &AppState, project_id: i64, items: &[ErrorCapture]) -> ApiResult<ErrorCaptureResponse> {
    for item in items {
        if let Some(session_id) = &item.session_id {
            ensure_session(state, project_id, session_id, item.timestamp.unwrap_or_else(Utc::now)).await?;
        }
    }

    let news: Vec<errors::NewError> = items.iter().map(to_new_error).collect();
    let error_ids = errors::insert_batch(state.db.pool(), project_id, &news).await?;

    let mut background_jobs = Vec::with_capacity(error_ids.len());
    for error_id in &error_ids {
        let job_id = state
            .jobs
            .enqueue(JobKind::ErrorGrouping, Priority::High, json!({ "project_id": project_id, "error_id": error_id }))
            .await;
        background_jobs.push(job_id);
    }

    Ok(ErrorCaptureResponse {
        error_ids,
        error_groups: Vec::new(),
        background_jobs,
    })
}

/// `POST /api/capture/session-event` (§6).
#[utoipa::path(post, path = "/api/capture/session-event", responses((status = 200, body = BulkCaptureResponse)))]
pub async fn capture_session_event(
    State(state): State<Arc<AppState>>,
    AuthenticatedProject(project): AuthenticatedProject,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<BulkCaptureResponse>> {
    check_payload_size(&body)?;
    let started = Instant::now();

    if matches!(check_idempotency(&state, project.id, &headers).await?, Idempotency::AlreadySeen) {
        faultline_observability::record_capture("session_event", true, started.elapsed());
        let default = BulkCaptureResponse { inserted_ids: Vec::new() };
        return Ok(Json(replay_response(&state, project.id, &headers, default).await?));
    }

    let decoded = decode_capture_body(&headers, &body)?;
    let request: SessionEventCaptureRequest = serde_json::from_slice(&decoded).map_err(|e| ApiError::Invalid(e.to_string()))?;

    let first_ts = request.events.first().map(|e| e.timestamp).unwrap_or_else(Utc::now);
    ensure_session(&state, project.id, &request.session_id, first_ts).await?;

    let rows: Vec<(String, serde_json::Value, chrono::DateTime<Utc>)> =
        request.events.iter().map(|e| (e.event_type.clone(), e.data.clone(), e.timestamp)).collect();
    let inserted_ids = session_events::insert_batch(state.db.pool(), &request.session_id, &rows).await?;

    for (id, (event_type, data, timestamp)) in inserted_ids.iter().zip(rows.iter()) {
        state
            .stream
            .dispatch(
                &request.session_id,
                StreamMessageType::SessionEvent,
                TimelineEntry::SessionEvent {
                    id: *id,
                    event_type: event_type.clone(),
                    data: data.clone(),
                    timestamp: *timestamp,
                },
            )
            .await;
    }

    let response = BulkCaptureResponse { inserted_ids };
    if let Some(key) = idempotency_key(&headers) {
        let value = serde_json::to_value(&response).unwrap_or(serde_json::Value::Null);
        idempotency::store_response(state.db.pool(), project.id, key, &value).await?;
    }

    state.cache.invalidate_project(project.id).await;
    faultline_observability::record_capture("session_event", true, started.elapsed());
    Ok(Json(response))
}

/// `POST /api/capture/network-event` (§6).
#[utoipa::path(post, path = "/api/capture/network-event", responses((status = 200, body = BulkCaptureResponse)))]
pub async fn capture_network_event(
    State(state): State<Arc<AppState>>,
    AuthenticatedProject(project): AuthenticatedProject,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<BulkCaptureResponse>> {
    check_payload_size(&body)?;
    let started = Instant::now();

    if matches!(check_idempotency(&state, project.id, &headers).await?, Idempotency::AlreadySeen) {
        faultline_observability::record_capture("network_event", true, started.elapsed());
        let default = BulkCaptureResponse { inserted_ids: Vec::new() };
        return Ok(Json(replay_response(&state, project.id, &headers, default).await?));
    }

    let decoded = decode_capture_body(&headers, &body)?;
    let request: NetworkEventCaptureRequest = serde_json::from_slice(&decoded).map_err(|e| ApiError::Invalid(e.to_string()))?;

    let first_ts = request.events.first().map(|e| e.timestamp).unwrap_or_else(Utc::now);
    ensure_session(&state, project.id, &request.session_id, first_ts).await?;

    let rows: Vec<network_events::NewNetworkEvent> = request
        .events
        .iter()
        .map(|e| network_events::NewNetworkEvent {
            method: e.method.clone(),
            url: e.url.clone(),
            status_code: e.status_code,
            response_time: e.response_time,
            timestamp: e.timestamp,
            request_data: e.request_data.clone(),
            response_data: e.response_data.clone(),
        })
        .collect();
    let inserted_ids = network_events::insert_batch(state.db.pool(), &request.session_id, &rows).await?;

    for (id, row) in inserted_ids.iter().zip(rows.iter()) {
        state
            .stream
            .dispatch(
                &request.session_id,
                StreamMessageType::SessionEvent,
                TimelineEntry::NetworkEvent {
                    id: *id,
                    method: row.method.clone(),
                    url: row.url.clone(),
                    status_code: row.status_code,
                    response_time: row.response_time,
                    timestamp: row.timestamp,
                },
            )
            .await;
    }

    let response = BulkCaptureResponse { inserted_ids };
    if let Some(key) = idempotency_key(&headers) {
        let value = serde_json::to_value(&response).unwrap_or(serde_json::Value::Null);
        idempotency::store_response(state.db.pool(), project.id, key, &value).await?;
    }

    state.cache.invalidate_project(project.id).await;
    faultline_observability::record_capture("network_event", true, started.elapsed());
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_over_cap_is_rejected() {
        let oversized = vec![0u8; MAX_CAPTURE_PAYLOAD_BYTES + 1];
        let err = check_payload_size(&oversized).unwrap_err();
        assert!(matches!(err, ApiError::PayloadTooLarge(_)));
    }

    #[test]
    fn payload_at_cap_is_accepted() {
        let exact = vec![0u8; MAX_CAPTURE_PAYLOAD_BYTES];
        assert!(check_payload_size(&exact).is_ok());
    }
}
