//! Application metrics for Prometheus monitoring (SPEC_FULL §10.3).
//!
//! Grounded on the teacher's `server/src/metrics.rs`: a global
//! `PrometheusHandle` behind a `OnceLock`, `describe_*!` calls at init
//! time, and small `record_*` helpers called from the request/job paths.
//! Metric names are renamed for this system's ingestion/grouping/job
//! domain instead of the teacher's sync/indexing domain.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder. Idempotent: a second call is a
/// no-op and returns `false`.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("failed to set global metrics recorder (already set)");
        return false;
    }
    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("failed to store prometheus handle (already set)");
    }

    describe_metrics();
    tracing::info!("prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("captures_received_total", "Total capture requests accepted, by kind");
    describe_counter!("captures_rejected_total", "Total capture requests rejected, by reason");
    describe_histogram!("capture_request_duration_seconds", "Duration of capture handling");

    describe_counter!("grouping_decisions_total", "Error grouping outcomes: new_group, attached, race_retried");
    describe_histogram!("grouping_duration_seconds", "Duration of the fingerprint+similarity grouping path");

    describe_gauge!("job_queue_depth", "Pending jobs in a priority lane, by kind and priority");
    describe_counter!("jobs_completed_total", "Jobs that finished successfully, by kind");
    describe_counter!("jobs_failed_total", "Jobs that exhausted retries, by kind");

    describe_gauge!("stream_active_subscribers", "Currently connected SSE/poll subscribers");
}

/// Renders current metrics in Prometheus text exposition format.
/// `None` if `init_metrics` has not run yet.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_capture(kind: &str, accepted: bool, duration: Duration) {
    if accepted {
        counter!("captures_received_total", "kind" => kind.to_string()).increment(1);
    } else {
        counter!("captures_rejected_total", "kind" => kind.to_string()).increment(1);
    }
    histogram!("capture_request_duration_seconds", "kind" => kind.to_string()).record(duration.as_secs_f64());
}

pub fn record_grouping_decision(outcome: &str, duration: Duration) {
    counter!("grouping_decisions_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("grouping_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_job_outcome(kind: &str, succeeded: bool) {
    if succeeded {
        counter!("jobs_completed_total", "kind" => kind.to_string()).increment(1);
    } else {
        counter!("jobs_failed_total", "kind" => kind.to_string()).increment(1);
    }
}

pub fn set_job_queue_depth(kind: &str, priority: &str, depth: usize) {
    gauge!("job_queue_depth", "kind" => kind.to_string(), "priority" => priority.to_string()).set(depth as f64);
}

pub fn set_stream_subscribers(count: usize) {
    gauge!("stream_active_subscribers").set(count as f64);
}
