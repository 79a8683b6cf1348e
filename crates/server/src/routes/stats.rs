//! `GET /api/projects/{project_id}/stats` (§4.G, §6): the dashboard's
//! composite stats payload, served through the Stats Aggregator.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use faultline_types::{ProjectStats, StatsQuery};

use crate::error::{ApiError, ApiResult};
use crate::stats::get_project_stats;
use crate::state::AppState;
use crate::AuthenticatedProject;

#[utoipa::path(get, path = "/api/projects/{project_id}/stats", responses((status = 200, body = ProjectStats)))]
pub async fn project_stats(
    State(state): State<Arc<AppState>>,
    AuthenticatedProject(project): AuthenticatedProject,
    Path(project_id): Path<i64>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<ProjectStats>> {
    if project_id != project.id {
        return Err(ApiError::Unauthenticated("API key does not match requested project".to_string()));
    }

    let stats = get_project_stats(&state, project.id, query.days).await?;
    Ok(Json(stats))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/projects/{project_id}/stats", get(project_stats))
}
