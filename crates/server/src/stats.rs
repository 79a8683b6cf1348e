//! Stats Aggregator composition (§4.G): cache read-through in front of
//! `faultline_db::statistics`'s per-metric queries, assembled into one
//! `ProjectStats` payload.

use std::sync::Arc;

use chrono::{Duration, Utc};

use faultline_cache::stats_key;
use faultline_db::statistics;
use faultline_types::ProjectStats;

use crate::error::ApiResult;
use crate::state::AppState;

/// Backs `GET /api/projects/{id}/stats` (§4.G, §6). Checks the stats cache
/// namespace first; on a miss, runs every per-metric query and writes the
/// assembled payload back with the configured TTL before returning it.
pub async fn get_project_stats(state: &Arc<AppState>, project_id: i64, days: i64) -> ApiResult<ProjectStats> {
    let key = stats_key(project_id, days);
    if let Some(cached) = state.cache.stats.get::<ProjectStats>(&key).await? {
        return Ok(cached);
    }

    let pool = state.db.pool();
    let since = Utc::now() - Duration::days(days);

    let total_errors = statistics::total_errors(pool, project_id, since).await?;
    let active_sessions = statistics::active_sessions(pool, project_id, since).await?;
    let unique_users = statistics::unique_users(pool, project_id, since).await?;
    let avg_session_duration_secs = statistics::avg_session_duration_secs(pool, project_id, since).await?;
    let top_errors = statistics::top_errors(pool, project_id, since, 10).await?;
    let top_urls = statistics::top_urls(pool, project_id, since, 10).await?;
    let daily_trend = statistics::daily_trend(pool, project_id, since).await?;
    let errors_by_status = statistics::errors_by_status(pool, project_id).await?;
    let (browser_distribution, os_distribution, device_distribution) =
        statistics::browser_os_device_distribution(pool, project_id, since).await?;
    let resolution_distribution = statistics::resolution_distribution(pool, project_id, since).await?;

    let error_rate_per_day = if days > 0 { total_errors as f64 / days as f64 } else { 0.0 };

    let stats = ProjectStats {
        project_id,
        days,
        total_errors,
        error_rate_per_day,
        active_sessions,
        unique_users,
        avg_session_duration_secs,
        top_errors,
        top_urls,
        daily_trend,
        browser_distribution,
        os_distribution,
        device_distribution,
        resolution_distribution,
        errors_by_status,
    };

    state.cache.stats.set(&key, project_id, &stats).await?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_cache::AppCache;
    use faultline_core::config::Config;
    use faultline_db::{projects, Database};
    use faultline_jobs::{JobProcessor, ProcessorConfig};
    use faultline_stream::StreamDispatcher;
    use std::time::Duration as StdDuration;

    async fn test_state() -> Arc<AppState> {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must point at a scratch Postgres instance to run server crate tests");
        let db = Database::new(&database_url, 5).await.expect("test database should connect and migrate");
        AppState::new_with_parts(
            Config::default(),
            db,
            JobProcessor::new(ProcessorConfig::default()),
            AppCache::new(StdDuration::from_millis(50), StdDuration::from_secs(60)),
            StreamDispatcher::new(),
        )
    }

    #[tokio::test]
    async fn empty_project_has_zeroed_stats() {
        let state = test_state().await;
        let project = projects::insert(state.db.pool(), "acme", &format!("sk-{}", uuid::Uuid::new_v4())).await.unwrap();

        let stats = get_project_stats(&state, project.id, 7).await.unwrap();
        assert_eq!(stats.total_errors, 0);
        assert_eq!(stats.days, 7);
        assert!(stats.top_errors.is_empty());
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let state = test_state().await;
        let project = projects::insert(state.db.pool(), "acme", &format!("sk-{}", uuid::Uuid::new_v4())).await.unwrap();

        let first = get_project_stats(&state, project.id, 7).await.unwrap();
        let second = get_project_stats(&state, project.id, 7).await.unwrap();
        assert_eq!(first.total_errors, second.total_errors);
    }
}
