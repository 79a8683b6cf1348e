//! Session listing and the reconstructed timeline (§4.H composition
//! surface, §6): list, merged event timeline, and replay.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use faultline_core::config::MAX_PAGE_SIZE;
use faultline_db::errors::ErrorFilter;
use faultline_db::page::PageRequest;
use faultline_db::sessions::SessionFilter;
use faultline_db::{errors, network_events, session_events, sessions};
use faultline_types::{ReplayFrame, Session, TimelineEntry};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{page_request, PageResponse};
use crate::state::AppState;
use crate::AuthenticatedProject;

/// Merges session events, network events, and grouped errors for one
/// session into a single chronologically-ordered timeline (§6). The error
/// slice is capped at `MAX_PAGE_SIZE`, the same ceiling every other listing
/// endpoint enforces.
async fn build_timeline(state: &AppState, project_id: i64, session_id: &str) -> ApiResult<Vec<TimelineEntry>> {
    let pool = state.db.pool();

    let session_events = session_events::list_for_session(pool, session_id).await?;
    let network_events = network_events::list_for_session(pool, session_id).await?;
    let error_filter = ErrorFilter {
        session_id: Some(session_id.to_string()),
        ..Default::default()
    };
    let errors_page = errors::list(pool, project_id, &error_filter, PageRequest::new(None, Some(MAX_PAGE_SIZE))).await?;

    let mut timeline = Vec::with_capacity(session_events.len() + network_events.len() + errors_page.items.len());
    timeline.extend(session_events.into_iter().map(TimelineEntry::from));
    timeline.extend(network_events.into_iter().map(TimelineEntry::from));
    timeline.extend(errors_page.items.into_iter().map(|e| TimelineEntry::Error {
        id: e.id,
        message: e.message,
        error_group_id: e.error_group_id,
        timestamp: e.timestamp,
    }));
    timeline.sort_by_key(|entry| entry.timestamp());
    Ok(timeline)
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub has_errors: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// `GET /api/projects/{project_id}/sessions` (§4.A, §6).
#[utoipa::path(get, path = "/api/projects/{project_id}/sessions", responses((status = 200)))]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    AuthenticatedProject(project): AuthenticatedProject,
    Path(project_id): Path<i64>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<PageResponse<Session>>> {
    if project_id != project.id {
        return Err(ApiError::Unauthenticated("API key does not match requested project".to_string()));
    }

    let filter = SessionFilter {
        user_id: q.user_id,
        start_date: q.start_date,
        end_date: q.end_date,
        has_errors: q.has_errors,
    };
    let page = sessions::list(state.db.pool(), project.id, &filter, page_request(q.page, q.limit)).await?;
    Ok(Json(page.into()))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionEventsResponse {
    pub events: Vec<TimelineEntry>,
}

/// `GET /api/session/{session_id}/events` (§6): the merged timeline.
#[utoipa::path(get, path = "/api/session/{session_id}/events", responses((status = 200, body = SessionEventsResponse)))]
pub async fn session_events_timeline(
    State(state): State<Arc<AppState>>,
    AuthenticatedProject(project): AuthenticatedProject,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionEventsResponse>> {
    sessions::get_by_id(state.db.pool(), project.id, &session_id).await?;
    let events = build_timeline(&state, project.id, &session_id).await?;
    Ok(Json(SessionEventsResponse { events }))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionReplayResponse {
    pub frames: Vec<ReplayFrame>,
}

/// `GET /api/session/{session_id}/replay` (§6): the same timeline with each
/// entry stamped with its millisecond offset from `Session.started_at`.
#[utoipa::path(get, path = "/api/session/{session_id}/replay", responses((status = 200, body = SessionReplayResponse)))]
pub async fn session_replay(
    State(state): State<Arc<AppState>>,
    AuthenticatedProject(project): AuthenticatedProject,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionReplayResponse>> {
    let session = sessions::get_by_id(state.db.pool(), project.id, &session_id).await?;
    let timeline = build_timeline(&state, project.id, &session_id).await?;

    let frames = timeline
        .into_iter()
        .map(|entry| {
            let offset_ms = (entry.timestamp() - session.started_at).num_milliseconds().max(0);
            ReplayFrame { entry, offset_ms }
        })
        .collect();
    Ok(Json(SessionReplayResponse { frames }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects/{project_id}/sessions", get(list_sessions))
        .route("/session/{session_id}/events", get(session_events_timeline))
        .route("/session/{session_id}/replay", get(session_replay))
}
