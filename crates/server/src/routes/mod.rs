//! Route composition: each submodule owns its own `Router` and exposes
//! `pub fn router() -> Router<Arc<AppState>>`; this nests every one of them
//! under `/api` and attaches shared state exactly once.

pub mod capture;
pub mod error_groups;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod sessions;
pub mod stats;
pub mod stream;

use std::sync::Arc;

use axum::routing::post;
use axum::Router;

use crate::routes::capture::{capture_error, capture_network_event, capture_session_event};
use crate::state::AppState;

fn capture_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/capture/error", post(capture_error))
        .route("/capture/session-event", post(capture_session_event))
        .route("/capture/network-event", post(capture_network_event))
}

/// `/metrics` does not carry the `/api` prefix — it's the standard
/// Prometheus scrape path, not part of the SDK-facing surface.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", capture_router())
        .nest("/api", error_groups::router())
        .nest("/api", errors::router())
        .nest("/api", sessions::router())
        .nest("/api", stats::router())
        .nest("/api", stream::router())
        .merge(metrics::router())
        .with_state(state)
}
