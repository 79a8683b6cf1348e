//! Ambient logging, metrics, and request-tracing setup (SPEC_FULL §10.3),
//! shared by the server binary and its background tasks.

mod http;
mod logging;
mod metrics;

pub use http::trace_layer;
pub use logging::{init_logging, init_sentry};
pub use metrics::{
    init_metrics, record_capture, record_grouping_decision, record_job_outcome, render_metrics,
    set_job_queue_depth, set_stream_subscribers,
};
