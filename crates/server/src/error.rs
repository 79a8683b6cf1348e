//! API error taxonomy (§7): every handler returns `ApiResult<T>`, and this
//! module is the single place request failures turn into a status code and
//! a JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use faultline_cache::CacheError;
use faultline_db::DbError;

/// Structured JSON error body returned on every non-2xx response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// The §7 error taxonomy. Each variant carries its own status code and
/// retry semantics; `Conflict` is recovered internally by the grouping
/// engine's re-read path (§4.D step 6) and should rarely reach a handler
/// boundary — it's kept here for the rare case something upstream surfaces
/// it anyway.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

/// `DbError` maps onto the taxonomy by variant rather than a blanket
/// `#[from]`-to-Fatal: `NotFound`/`Conflict` carry their own semantics, and
/// a raw `sqlx::Error` is treated as `Transient` (§7: "connection loss,
/// 5xx from dependency" — a pool-level sqlx error is exactly that from the
/// caller's point of view).
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::NotFound { entity, id },
            DbError::Conflict(constraint) => ApiError::Conflict(constraint.to_string()),
            DbError::Sqlx(e) => ApiError::Transient(e.to_string()),
            DbError::Migrate(e) => ApiError::Fatal(e.to_string()),
        }
    }
}

/// Cache failures never fail a request (§4.E, §7) — this conversion exists
/// only for call sites that use `?` inline before deciding to ignore the
/// error; handlers should prefer logging a cache miss and continuing.
impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::Transient(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Unauthenticated(msg) => {
                tracing::warn!(message = %msg, "unauthenticated request");
                (StatusCode::UNAUTHORIZED, ErrorResponse::new("unauthenticated"))
            }
            ApiError::Invalid(msg) => {
                tracing::warn!(message = %msg, "invalid request");
                (StatusCode::BAD_REQUEST, ErrorResponse::with_details("invalid request", msg.clone()))
            }
            ApiError::PayloadTooLarge(msg) => {
                tracing::warn!(message = %msg, "payload too large");
                (StatusCode::PAYLOAD_TOO_LARGE, ErrorResponse::with_details("payload too large", msg.clone()))
            }
            ApiError::NotFound { entity, id } => {
                tracing::warn!(entity = %entity, id = %id, "entity not found");
                (StatusCode::NOT_FOUND, ErrorResponse::with_details("not found", format!("{entity} {id}")))
            }
            ApiError::Conflict(msg) => {
                tracing::warn!(message = %msg, "conflict");
                (StatusCode::CONFLICT, ErrorResponse::with_details("conflict", msg.clone()))
            }
            ApiError::Transient(msg) => {
                tracing::error!(message = %msg, "transient failure");
                (StatusCode::SERVICE_UNAVAILABLE, ErrorResponse::with_details("temporarily unavailable", msg.clone()))
            }
            ApiError::Fatal(msg) => {
                tracing::error!(message = %msg, "fatal error");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new("internal server error"))
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn extract(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unauthenticated_returns_401() {
        let (status, body) = extract(ApiError::Unauthenticated("bad key".into()).into_response()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.error, "unauthenticated");
    }

    #[tokio::test]
    async fn invalid_returns_400_with_details() {
        let (status, body) = extract(ApiError::Invalid("missing message".into()).into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.details.unwrap(), "missing message");
    }

    #[tokio::test]
    async fn payload_too_large_returns_413() {
        let (status, _) = extract(ApiError::PayloadTooLarge("6MB > 5MB cap".into()).into_response()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn not_found_returns_404() {
        let (status, body) = extract(
            ApiError::NotFound {
                entity: "error_group",
                id: "42".to_string(),
            }
            .into_response(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.details.unwrap().contains("42"));
    }

    #[tokio::test]
    async fn conflict_returns_409() {
        let (status, _) = extract(ApiError::Conflict("error_groups(project_id, fingerprint)".into()).into_response()).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn transient_returns_503() {
        let (status, _) = extract(ApiError::Transient("pool exhausted".into()).into_response()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn fatal_hides_details_from_client() {
        let (status, body) = extract(ApiError::Fatal("invariant violated".into()).into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.details.is_none());
    }

    #[test]
    fn db_not_found_maps_to_api_not_found() {
        let db_err = DbError::NotFound {
            entity: "session",
            id: "abc".to_string(),
        };
        let api_err: ApiError = db_err.into();
        assert!(matches!(api_err, ApiError::NotFound { .. }));
    }

    #[test]
    fn db_conflict_maps_to_api_conflict() {
        let db_err = DbError::Conflict("error_groups(project_id, fingerprint)");
        let api_err: ApiError = db_err.into();
        assert!(matches!(api_err, ApiError::Conflict(_)));
    }
}
