//! Authentication for the Ingest Gateway and Stream Dispatcher (§4.E, §4.H,
//! §4.I): every request carries `X-API-Key`, resolved to a `project_id`
//! against `faultline_db::projects::get_by_api_key`.
//!
//! No teacher analog — the teacher is a local-first single-user tool with
//! no multi-tenant auth boundary — so this is a standard axum
//! `FromRequestParts` extractor, the idiomatic way the framework the
//! teacher already depends on expresses a per-request auth guard.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use std::sync::Arc;

use faultline_types::Project;

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated tenant for the current request. Extracting this
/// rejects the request with `ApiError::Unauthenticated` before any handler
/// body runs if the header is missing or the key doesn't resolve.
pub struct AuthenticatedProject(pub Project);

impl<S> FromRequestParts<S> for AuthenticatedProject
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthenticated("missing X-API-Key header".to_string()))?;

        let project = faultline_db::projects::get_by_api_key(app_state.db.pool(), api_key)
            .await?
            .ok_or_else(|| ApiError::Unauthenticated("unknown API key".to_string()))?;

        Ok(AuthenticatedProject(project))
    }
}

/// Resolves an API key passed as a query parameter rather than a header —
/// used by the stream/poll endpoints (§6), whose clients are `EventSource`
/// and long-poll callers that can't set custom request headers.
pub async fn authenticate_query_key(app_state: &AppState, api_key: Option<&str>) -> Result<Project, ApiError> {
    let api_key = api_key.ok_or_else(|| ApiError::Unauthenticated("missing apiKey query parameter".to_string()))?;
    faultline_db::projects::get_by_api_key(app_state.db.pool(), api_key)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("unknown API key".to_string()))
}
