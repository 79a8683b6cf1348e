//! Faultline server binary.
//!
//! Binds and starts the HTTP server immediately, with the Job Processor's
//! tick loop and the SDK-facing API served from the same shared state.
//! Graceful shutdown on Ctrl-C drains both: axum stops accepting new
//! connections while in-flight requests finish, and the Job Processor
//! stops ticking and waits out its grace period for in-flight jobs.

use std::sync::Arc;

use anyhow::{Context, Result};

use faultline_core::config::Config;
use faultline_db::{errors, idempotency, statistics, Database};
use faultline_jobs::{JobKind, JobProcessor, Priority, ProcessorConfig};
use faultline_server::state::AppState;

/// Registers the `error_grouping` handler (§4.F): groups one previously
/// inserted, still-ungrouped error row and folds its occurrence into the
/// hourly rollup. Mirrors the synchronous capture path's steps, minus the
/// insert (already done) and minus `user_id` (the bulk payload that
/// enqueued this job never carried one past the insert).
async fn register_error_grouping(state: &Arc<AppState>) {
    let state = Arc::clone(state);
    state
        .jobs
        .clone()
        .register_handler(JobKind::ErrorGrouping, move |payload| {
            let state = Arc::clone(&state);
            async move {
                let project_id = payload["project_id"].as_i64().ok_or("missing project_id in job payload")?;
                let error_id = payload["error_id"].as_i64().ok_or("missing error_id in job payload")?;
                process_error_grouping_job(&state, project_id, error_id).await.map_err(|e| e.to_string())
            }
        })
        .await;
}

async fn process_error_grouping_job(state: &AppState, project_id: i64, error_id: i64) -> anyhow::Result<()> {
    let pool = state.db.pool();
    let row = errors::get_by_id(pool, project_id, error_id).await?;
    if row.error_group_id.is_some() {
        return Ok(()); // already grouped by a prior, since-retried attempt
    }

    let input = faultline_core::fingerprint::ErrorInput {
        message: &row.message,
        stack_trace: row.stack_trace.as_deref(),
        url: row.url.as_deref(),
        user_agent: row.user_agent.as_deref(),
    };
    let outcome = faultline_server::grouping::process_error(pool, project_id, &input, row.timestamp, None).await?;
    errors::assign_group(pool, error_id, outcome.group.id, &outcome.fingerprint).await?;
    statistics::record_occurrence(pool, project_id, outcome.group.id, row.timestamp, false, row.session_id.is_some()).await?;
    if let Some(session_id) = &row.session_id {
        state
            .stream
            .dispatch(
                session_id,
                faultline_types::stream::StreamMessageType::ErrorEvent,
                faultline_types::session::TimelineEntry::Error {
                    id: error_id,
                    message: row.message.clone(),
                    error_group_id: Some(outcome.group.id),
                    timestamp: row.timestamp,
                },
            )
            .await;
    }
    state.cache.invalidate_project(project_id).await;
    Ok(())
}

/// Registers the `stats_recalculation` handler (§4.F): periodic
/// housekeeping rather than per-project recomputation — the Stats
/// Aggregator itself always recomputes from live rows on a cache miss, so
/// there's nothing here to "recalculate" beyond pruning what's aged out.
async fn register_stats_recalculation(state: &Arc<AppState>) {
    let state = Arc::clone(state);
    state
        .jobs
        .clone()
        .register_handler(JobKind::StatsRecalculation, move |_payload| {
            let state = Arc::clone(&state);
            async move {
                let pool = state.db.pool();
                let pruned_stats = statistics::prune_older_than(pool, faultline_core::config::STATS_RETENTION_DAYS)
                    .await
                    .map_err(|e| e.to_string())?;
                let pruned_keys = idempotency::prune_expired(pool).await.map_err(|e| e.to_string())?;
                tracing::info!(pruned_stats, pruned_keys, "stats recalculation housekeeping complete");
                Ok(())
            }
        })
        .await;
}

/// Enqueues a `stats_recalculation` job on a fixed interval — nothing in
/// the request path needs this job kind to run, so it has no other
/// producer (contrast `error_grouping`, which `capture_error_bulk`
/// enqueues per row).
fn spawn_stats_recalculation_enqueuer(jobs: Arc<JobProcessor>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(faultline_core::config::STATS_RECALCULATION_INTERVAL);
        loop {
            interval.tick().await;
            jobs.enqueue(JobKind::StatsRecalculation, Priority::Low, serde_json::json!({})).await;
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    faultline_observability::init_logging();
    let _sentry_guard = faultline_observability::init_sentry();
    faultline_observability::init_metrics();

    let config = Config::from_env();
    tracing::info!(bind_addr = %config.bind_addr(), "starting faultline server");

    let db = if config.migrate_on_startup {
        Database::new(&config.database_url, config.db_max_connections).await
    } else {
        Database::connect_without_migrating(&config.database_url, config.db_max_connections).await
    }
    .context("failed to connect to database")?;

    let jobs = JobProcessor::new(ProcessorConfig {
        tick: faultline_core::config::JOB_TICK_INTERVAL,
        batch_size: faultline_core::config::JOB_BATCH_SIZE,
        backoff_base: faultline_core::config::JOB_BACKOFF_BASE,
        backoff_cap: faultline_core::config::JOB_BACKOFF_CAP,
        shutdown_grace: faultline_core::config::JOB_SHUTDOWN_GRACE,
    });

    let state = AppState::new(config.clone(), db, jobs.clone());
    register_error_grouping(&state).await;
    register_stats_recalculation(&state).await;
    spawn_stats_recalculation_enqueuer(jobs.clone());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let jobs_handle = tokio::spawn(jobs.clone().run(shutdown_rx));

    let app = faultline_server::create_app(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received, draining job processor");
            shutdown_tx.send(true).ok();
        })
        .await
        .context("server error")?;

    jobs_handle.await.context("job processor task panicked")?;
    Ok(())
}
