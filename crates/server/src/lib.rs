//! Library surface for the faultline server binary: state, error taxonomy,
//! auth, the Grouping Engine's request-path composition, body decoding,
//! Stats Aggregator composition, and route composition.
//!
//! Grounded on the teacher's `crates/server/src/lib.rs`, which assembles
//! `api_routes(state)` behind `CompressionLayer`/`cors_layer()`/
//! `TraceLayer`. The CORS policy differs on purpose: the teacher is a
//! local-first single-user tool restricting to localhost origins, while
//! this is a multi-tenant ingest API called by SDKs running in arbitrary
//! customer browsers, so the layer here is permissive rather than an
//! origin allowlist.

pub mod auth;
pub mod body;
pub mod error;
pub mod grouping;
pub mod pagination;
pub mod routes;
pub mod state;
pub mod stats;

use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

pub use auth::AuthenticatedProject;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Permissive CORS: there's no browser-cookie session to protect here, and
/// the API key travels in a header or query parameter the caller already
/// controls, so an origin allowlist would add friction without adding
/// security (§4.I: SDKs run inside whatever site embeds them).
fn cors_layer() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
}

/// Assembles the full router: API routes, compression, CORS, request
/// tracing, and — when the `swagger` feature is enabled — the OpenAPI
/// document and its Swagger UI.
pub fn create_app(state: Arc<AppState>) -> Router {
    let router = routes::api_routes(state)
        .layer(CompressionLayer::new())
        .layer(cors_layer())
        .layer(faultline_observability::trace_layer());

    with_swagger(router)
}

#[cfg(feature = "swagger")]
fn with_swagger(router: Router) -> Router {
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    router.merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
}

#[cfg(not(feature = "swagger"))]
fn with_swagger(router: Router) -> Router {
    router
}

#[cfg(feature = "swagger")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::capture::capture_error,
        routes::capture::capture_session_event,
        routes::capture::capture_network_event,
        routes::error_groups::list_error_groups,
        routes::error_groups::patch_error_group,
        routes::errors::list_errors,
        routes::sessions::list_sessions,
        routes::sessions::session_events_timeline,
        routes::sessions::session_replay,
        routes::stats::project_stats,
        routes::stream::stream_session_events,
        routes::stream::poll_session_events,
    ),
    components(schemas(
        faultline_types::ErrorCaptureResponse,
        faultline_types::BulkCaptureResponse,
        faultline_types::ErrorGroup,
        faultline_types::ErrorGroupPatch,
        faultline_types::ErrorRow,
        faultline_types::Session,
        faultline_types::ProjectStats,
        faultline_types::PollResponse,
        routes::health::HealthResponse,
        routes::sessions::SessionEventsResponse,
        routes::sessions::SessionReplayResponse,
    ))
)]
struct ApiDoc;
