//! Prometheus metrics endpoint.
//!
//! Exposes application metrics in Prometheus text format at `GET /metrics`.

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use faultline_observability::render_metrics;

use crate::state::AppState;

/// `GET /metrics` — returns 503 if `init_metrics` hasn't run yet, which
/// shouldn't happen outside of tests that build a router directly.
pub async fn metrics_handler() -> Response {
    match render_metrics() {
        Some(output) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], output).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}

/// Does not carry the `/api` prefix — `/metrics` is the standard
/// Prometheus scrape path.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics_handler))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use faultline_core::config::Config;
    use faultline_db::Database;
    use faultline_jobs::{JobProcessor, ProcessorConfig};

    use super::*;

    async fn test_app() -> Router {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must point at a scratch Postgres instance to run server crate tests");
        let db = Database::new(&database_url, 5).await.expect("test database should connect and migrate");
        let state = AppState::new(Config::default(), db, JobProcessor::new(ProcessorConfig::default()));
        router().with_state(state)
    }

    #[tokio::test]
    async fn returns_503_before_metrics_are_initialized() {
        // `init_metrics` is process-global and idempotent, so this only
        // asserts the shape of the uninitialized response; once any other
        // test in the binary has called `init_metrics`, this will observe
        // the initialized branch instead, which is also a valid response.
        let app = test_app().await;
        let response = app.oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await.unwrap();
        assert!(response.status() == StatusCode::OK || response.status() == StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_text_once_initialized() {
        faultline_observability::init_metrics();
        let app = test_app().await;

        let response = app.oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap().to_string();
        assert!(content_type.contains("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!body.is_empty());
    }
}
