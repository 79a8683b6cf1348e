//! Request tracing middleware for the axum router (SPEC_FULL §10.3).
//!
//! Grounded on the teacher's per-request `record_request()` metrics call
//! in `main.rs`'s router construction, generalized into reusable
//! `tower_http::trace::TraceLayer` callbacks instead of a manual call from
//! each handler.

use std::time::Duration;

use axum::extract::Request;
use axum::response::Response;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;
use tracing::Span;

pub fn make_span(request: &Request) -> Span {
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    )
}

pub fn on_response(response: &Response, latency: Duration, span: &Span) {
    span.record("status", response.status().as_u16());
    span.record("latency_ms", latency.as_millis() as u64);
}

pub fn on_failure(error: ServerErrorsFailureClass, latency: Duration, span: &Span) {
    span.record("latency_ms", latency.as_millis() as u64);
    tracing::warn!(parent: span, %error, "request failed");
}

/// Builds the standard trace layer for the router: one `INFO` span per
/// request carrying method/path/status/latency.
pub fn trace_layer() -> TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
    fn(&Request) -> Span,
    tower_http::trace::DefaultOnRequest,
    fn(&Response, Duration, &Span),
    tower_http::trace::DefaultOnBodyChunk,
    tower_http::trace::DefaultOnEos,
    fn(ServerErrorsFailureClass, Duration, &Span),
> {
    TraceLayer::new_for_http()
        .make_span_with(make_span as fn(&Request) -> Span)
        .on_response(on_response as fn(&Response, Duration, &Span))
        .on_failure(on_failure as fn(ServerErrorsFailureClass, Duration, &Span))
}
