//! Structured logging setup (SPEC_FULL §10.3).
//!
//! Grounded on the teacher's `server/src/main.rs`, which builds a
//! `FmtSubscriber` from `RUST_LOG`/`EnvFilter` with a `"warn"` fallback.
//! This version additionally wires `sentry-tracing` so error-level spans
//! and events are forwarded as Sentry breadcrumbs/events when a DSN is
//! configured, matching `sentry_layer()`'s standard composition with a
//! `tracing_subscriber::Registry`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Installs the global tracing subscriber. Call once at process startup,
/// before any `tracing::*!` call. Returns the sentry-tracing layer wrapped
/// into the composed subscriber so the caller just needs to keep the
/// returned `sentry::ClientInitGuard` (if any) alive for the process
/// lifetime.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().compact();
    let sentry_layer = sentry_tracing::layer();

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_layer)
        .init();
}

/// Initializes the Sentry client from `SENTRY_DSN` if set. Returns the
/// guard the caller must hold for the process lifetime; dropping it
/// flushes any buffered events. A missing DSN is not an error: Sentry
/// reporting is an ambient concern, not a hard dependency (SPEC_FULL §10.3).
pub fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            traces_sample_rate: 0.0,
            ..Default::default()
        },
    )))
}
