//! The Stats Aggregator's storage half (§4.G): hourly rollup upserts plus
//! the read queries behind `GET /api/projects/{id}/stats`.
//!
//! Browser/OS/device/resolution breakdowns have no dedicated columns (see
//! DESIGN.md Open Question 3) — they're derived by pulling the relevant
//! raw strings and bucketing them in Rust with `faultline_core::useragent`,
//! the same division of labor the fingerprinter uses for normalization.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use faultline_core::useragent;
use faultline_types::{DayCount, Distribution, DistributionBucket, TopError, TopUrl};

use crate::DbResult;

/// Floors a timestamp to the start of its hour, the rollup's `time_bucket`
/// granularity (§4.G).
pub fn hour_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Increments the hourly rollup for one error occurrence (§4.D step 5 /
/// §4.G). `is_new_user`/`is_new_session` tell the caller's per-bucket
/// dedup whether to bump the unique counters; this module has no way to
/// know uniqueness on its own since it only ever sees one occurrence.
pub async fn record_occurrence(
    pool: &sqlx::PgPool,
    project_id: i64,
    error_group_id: i64,
    occurred_at: DateTime<Utc>,
    is_new_user: bool,
    is_new_session: bool,
) -> DbResult<()> {
    let bucket = hour_bucket(occurred_at);
    sqlx::query(
        "INSERT INTO error_statistics (project_id, error_group_id, time_bucket, error_count, unique_users, unique_sessions)
         VALUES ($1, $2, $3, 1, CASE WHEN $4 THEN 1 ELSE 0 END, CASE WHEN $5 THEN 1 ELSE 0 END)
         ON CONFLICT (project_id, error_group_id, time_bucket)
         DO UPDATE SET
             error_count = error_statistics.error_count + 1,
             unique_users = error_statistics.unique_users + CASE WHEN $4 THEN 1 ELSE 0 END,
             unique_sessions = error_statistics.unique_sessions + CASE WHEN $5 THEN 1 ELSE 0 END",
    )
    .bind(project_id)
    .bind(error_group_id)
    .bind(bucket)
    .bind(is_new_user)
    .bind(is_new_session)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn total_errors(pool: &sqlx::PgPool, project_id: i64, since: DateTime<Utc>) -> DbResult<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM errors WHERE project_id = $1 AND timestamp >= $2")
        .bind(project_id)
        .bind(since)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn active_sessions(pool: &sqlx::PgPool, project_id: i64, since: DateTime<Utc>) -> DbResult<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE project_id = $1 AND started_at >= $2")
        .bind(project_id)
        .bind(since)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn unique_users(pool: &sqlx::PgPool, project_id: i64, since: DateTime<Utc>) -> DbResult<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(DISTINCT user_id) FROM sessions WHERE project_id = $1 AND started_at >= $2 AND user_id IS NOT NULL",
    )
    .bind(project_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn avg_session_duration_secs(pool: &sqlx::PgPool, project_id: i64, since: DateTime<Utc>) -> DbResult<f64> {
    let row: (Option<f64>,) = sqlx::query_as(
        "SELECT AVG(EXTRACT(EPOCH FROM (ended_at - started_at)))
         FROM sessions
         WHERE project_id = $1 AND started_at >= $2 AND ended_at IS NOT NULL",
    )
    .bind(project_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(row.0.unwrap_or(0.0))
}

pub async fn top_errors(pool: &sqlx::PgPool, project_id: i64, since: DateTime<Utc>, limit: i64) -> DbResult<Vec<TopError>> {
    let rows: Vec<(i64, String, i64, DateTime<Utc>)> = sqlx::query_as(
        "SELECT id, title, total_occurrences, last_seen
         FROM error_groups
         WHERE project_id = $1 AND last_seen >= $2
         ORDER BY total_occurrences DESC
         LIMIT $3",
    )
    .bind(project_id)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(error_group_id, title, count, last_seen)| TopError {
            error_group_id,
            title,
            count,
            last_seen,
        })
        .collect())
}

pub async fn top_urls(pool: &sqlx::PgPool, project_id: i64, since: DateTime<Utc>, limit: i64) -> DbResult<Vec<TopUrl>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT url, COUNT(*) AS count
         FROM errors
         WHERE project_id = $1 AND timestamp >= $2 AND url IS NOT NULL
         GROUP BY url
         ORDER BY count DESC
         LIMIT $3",
    )
    .bind(project_id)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(url, count)| TopUrl { url, count }).collect())
}

pub async fn daily_trend(pool: &sqlx::PgPool, project_id: i64, since: DateTime<Utc>) -> DbResult<Vec<DayCount>> {
    let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
        "SELECT date_trunc('day', timestamp)::date AS day, COUNT(*) AS count
         FROM errors
         WHERE project_id = $1 AND timestamp >= $2
         GROUP BY day
         ORDER BY day ASC",
    )
    .bind(project_id)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(day, count)| DayCount { day, count }).collect())
}

pub async fn errors_by_status(pool: &sqlx::PgPool, project_id: i64) -> DbResult<Distribution> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM error_groups WHERE project_id = $1 GROUP BY status",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(to_distribution(rows))
}

/// Browser/OS/device distributions, parsed from `errors.user_agent`
/// (§4.G). Best-effort: rows with no `user_agent` are excluded rather
/// than bucketed into `"unknown"`, since absence isn't itself a browser.
pub async fn browser_os_device_distribution(
    pool: &sqlx::PgPool,
    project_id: i64,
    since: DateTime<Utc>,
) -> DbResult<(Distribution, Distribution, Distribution)> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT user_agent FROM errors WHERE project_id = $1 AND timestamp >= $2 AND user_agent IS NOT NULL",
    )
    .bind(project_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut browsers: HashMap<String, i64> = HashMap::new();
    let mut oses: HashMap<String, i64> = HashMap::new();
    let mut devices: HashMap<String, i64> = HashMap::new();

    for (ua,) in &rows {
        let info = useragent::parse(ua);
        *browsers.entry(info.browser).or_default() += 1;
        *oses.entry(info.os).or_default() += 1;
        *devices.entry(useragent::device_bucket(&info.device).to_string()).or_default() += 1;
    }

    Ok((to_distribution_map(browsers), to_distribution_map(oses), to_distribution_map(devices)))
}

/// Screen-resolution distribution, parsed from `sessions.metadata->>'resolution'`.
pub async fn resolution_distribution(pool: &sqlx::PgPool, project_id: i64, since: DateTime<Utc>) -> DbResult<Distribution> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT metadata->>'resolution' AS resolution, COUNT(*)
         FROM sessions
         WHERE project_id = $1 AND started_at >= $2 AND metadata->>'resolution' IS NOT NULL
         GROUP BY resolution",
    )
    .bind(project_id)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(to_distribution(rows))
}

fn to_distribution(rows: Vec<(String, i64)>) -> Distribution {
    Distribution {
        buckets: rows
            .into_iter()
            .map(|(label, count)| DistributionBucket { label, count })
            .collect(),
    }
}

fn to_distribution_map(map: HashMap<String, i64>) -> Distribution {
    let mut buckets: Vec<DistributionBucket> = map.into_iter().map(|(label, count)| DistributionBucket { label, count }).collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count));
    Distribution { buckets }
}

/// Deletes rollup rows older than `retain_days`, the housekeeping half of
/// the `stats_recalculation` background job kind (§4.F).
pub async fn prune_older_than(pool: &sqlx::PgPool, retain_days: i64) -> DbResult<u64> {
    let cutoff = Utc::now() - Duration::days(retain_days);
    let result = sqlx::query("DELETE FROM error_statistics WHERE time_bucket < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error_groups, projects, test_pool};
    use faultline_core::fingerprint::{ErrorInput, Fingerprinter};

    async fn seed_group(pool: &sqlx::PgPool) -> (i64, i64) {
        let project_id = projects::insert(pool, "acme", &format!("sk-{}", uuid::Uuid::new_v4())).await.unwrap().id;
        let fp = Fingerprinter::compute(&ErrorInput { message: "boom", ..Default::default() });
        let group = error_groups::insert_new(pool, project_id, &fp, Utc::now()).await.unwrap();
        (project_id, group.id)
    }

    #[tokio::test]
    async fn hour_bucket_floors_to_the_hour() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 14, 37, 22).unwrap();
        let bucket = hour_bucket(ts);
        assert_eq!(bucket.minute(), 0);
        assert_eq!(bucket.second(), 0);
        assert_eq!(bucket.hour(), 14);
    }

    #[tokio::test]
    async fn record_occurrence_upserts_and_increments() {
        let db = test_pool().await;
        let (project_id, group_id) = seed_group(db.pool()).await;
        let now = Utc::now();

        record_occurrence(db.pool(), project_id, group_id, now, true, true).await.unwrap();
        record_occurrence(db.pool(), project_id, group_id, now, false, true).await.unwrap();

        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT error_count, unique_users, unique_sessions FROM error_statistics WHERE project_id = $1 AND error_group_id = $2",
        )
        .bind(project_id)
        .bind(group_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(row.0, 2);
        assert_eq!(row.1, 1);
        assert_eq!(row.2, 2);
    }

    #[tokio::test]
    async fn top_errors_orders_by_occurrence_count() {
        let db = test_pool().await;
        let project_id = projects::insert(db.pool(), "acme", &format!("sk-{}", uuid::Uuid::new_v4())).await.unwrap().id;
        let fp_a = Fingerprinter::compute(&ErrorInput { message: "a", ..Default::default() });
        let fp_b = Fingerprinter::compute(&ErrorInput { message: "b", ..Default::default() });
        let group_a = error_groups::insert_new(db.pool(), project_id, &fp_a, Utc::now()).await.unwrap();
        let group_b = error_groups::insert_new(db.pool(), project_id, &fp_b, Utc::now()).await.unwrap();
        error_groups::attach_occurrence(db.pool(), group_b.id, Utc::now(), false, None).await.unwrap();
        error_groups::attach_occurrence(db.pool(), group_b.id, Utc::now(), false, None).await.unwrap();

        let top = top_errors(db.pool(), project_id, Utc::now() - Duration::days(7), 10).await.unwrap();
        assert_eq!(top[0].error_group_id, group_b.id);
        assert_eq!(top[0].count, 3);
        assert!(top.iter().any(|t| t.error_group_id == group_a.id));
    }
}
