//! Stats Aggregator payload types (§4.G) and the hourly rollup row (§3).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Hour-aligned rollup row, upsert-keyed on `(project_id, error_group_id, time_bucket)`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatistics {
    pub project_id: i64,
    pub error_group_id: i64,
    pub time_bucket: DateTime<Utc>,
    pub error_count: i64,
    pub unique_users: i64,
    pub unique_sessions: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopError {
    pub error_group_id: i64,
    pub title: String,
    pub count: i64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopUrl {
    pub url: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DayCount {
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub buckets: Vec<DistributionBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBucket {
    pub label: String,
    pub count: i64,
}

/// Composite dashboard payload returned by `GET /api/projects/{id}/stats`.
/// Also the cached value under the `stats:{project_id}:{days}` key (§4.B),
/// so this round-trips through `serde_json` both ways.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub project_id: i64,
    pub days: i64,
    pub total_errors: i64,
    pub error_rate_per_day: f64,
    pub active_sessions: i64,
    pub unique_users: i64,
    pub avg_session_duration_secs: f64,
    pub top_errors: Vec<TopError>,
    pub top_urls: Vec<TopUrl>,
    pub daily_trend: Vec<DayCount>,
    pub browser_distribution: Distribution,
    pub os_distribution: Distribution,
    pub device_distribution: Distribution,
    pub resolution_distribution: Distribution,
    pub errors_by_status: Distribution,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StatsQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    7
}
