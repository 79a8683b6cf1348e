//! Raw error listing (§6): `GET /api/projects/{project_id}/errors`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use faultline_db::errors::{self, ErrorFilter};
use faultline_types::ErrorRow;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{page_request, PageResponse};
use crate::state::AppState;
use crate::AuthenticatedProject;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub session_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub error_group_id: Option<i64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// `GET /api/projects/{project_id}/errors` (§4.A, §6).
#[utoipa::path(get, path = "/api/projects/{project_id}/errors", responses((status = 200)))]
pub async fn list_errors(
    State(state): State<Arc<AppState>>,
    AuthenticatedProject(project): AuthenticatedProject,
    Path(project_id): Path<i64>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<PageResponse<ErrorRow>>> {
    if project_id != project.id {
        return Err(ApiError::Unauthenticated("API key does not match requested project".to_string()));
    }

    let filter = ErrorFilter {
        session_id: q.session_id,
        start_date: q.start_date,
        end_date: q.end_date,
        error_group_id: q.error_group_id,
    };
    let page = errors::list(state.db.pool(), project.id, &filter, page_request(q.page, q.limit)).await?;
    Ok(Json(page.into()))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/projects/{project_id}/errors", get(list_errors))
}
