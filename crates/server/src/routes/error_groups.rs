//! Error Group listing and triage (§4.D, §6): `GET
//! /api/projects/{project_id}/error-groups` and `PATCH /api/error-groups/{id}`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;

use faultline_db::error_groups::{self, ErrorGroupFilter, ErrorGroupSort};
use faultline_types::{ErrorGroup, ErrorGroupPatch, ErrorGroupPriority, ErrorGroupStatus};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{page_request, sort_order, PageResponse};
use crate::state::AppState;
use crate::AuthenticatedProject;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn require_own_project(project_id: i64, project: &faultline_types::Project) -> ApiResult<()> {
    if project_id != project.id {
        return Err(ApiError::Unauthenticated("API key does not match requested project".to_string()));
    }
    Ok(())
}

/// `GET /api/projects/{project_id}/error-groups` (§4.A, §6).
#[utoipa::path(get, path = "/api/projects/{project_id}/error-groups", responses((status = 200)))]
pub async fn list_error_groups(
    State(state): State<Arc<AppState>>,
    AuthenticatedProject(project): AuthenticatedProject,
    Path(project_id): Path<i64>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<PageResponse<ErrorGroup>>> {
    require_own_project(project_id, &project)?;

    let filter = ErrorGroupFilter {
        status: q.status.as_deref().and_then(ErrorGroupStatus::parse),
        priority: q.priority.as_deref().and_then(ErrorGroupPriority::parse),
        assigned_to: q.assigned_to,
        search: q.search,
    };
    let sort = ErrorGroupSort::parse(q.sort_by.as_deref());
    let order = sort_order(q.sort_order.as_deref());

    let page = error_groups::list(state.db.pool(), project.id, &filter, sort, order, page_request(q.page, q.limit)).await?;
    Ok(Json(page.into()))
}

/// `PATCH /api/error-groups/{id}` (§4.D triage, §6).
#[utoipa::path(patch, path = "/api/error-groups/{id}", responses((status = 200, body = ErrorGroup)))]
pub async fn patch_error_group(
    State(state): State<Arc<AppState>>,
    AuthenticatedProject(project): AuthenticatedProject,
    Path(group_id): Path<i64>,
    Json(patch): Json<ErrorGroupPatch>,
) -> ApiResult<Json<ErrorGroup>> {
    let existing = error_groups::get_by_id(state.db.pool(), group_id).await?;
    if existing.project_id != project.id {
        return Err(ApiError::NotFound {
            entity: "error_group",
            id: group_id.to_string(),
        });
    }

    let updated = error_groups::patch(state.db.pool(), group_id, &patch).await?;
    state.cache.invalidate_project(project.id).await;
    Ok(Json(updated))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects/{project_id}/error-groups", get(list_error_groups))
        .route("/error-groups/{id}", patch(patch_error_group))
}
