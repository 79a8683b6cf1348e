//! Job, priority, and kind types for the Job Processor (§4.F).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type JobId = u64;

/// The two job kinds the Job Processor drains (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ErrorGrouping,
    StatsRecalculation,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ErrorGrouping => "error_grouping",
            JobKind::StatsRecalculation => "stats_recalculation",
        }
    }

    /// Default `max_retries` per kind (§4.F: 3 for grouping, 2 for stats).
    pub fn default_max_retries(&self) -> u32 {
        match self {
            JobKind::ErrorGrouping => 3,
            JobKind::StatsRecalculation => 2,
        }
    }
}

/// Priority lane. Ordered `High > Medium > Low`: the tick loop drains
/// high before medium before low within a kind's batch (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL_HIGH_TO_LOW: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A unit of background work. `payload` stays an opaque JSON value at this
/// layer — the handler registered for `kind` is responsible for decoding it
/// (§9 Design Notes: dynamic JSON blobs stay opaque at the boundary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(id: JobId, kind: JobKind, priority: Priority, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            payload,
            priority,
            retry_count: 0,
            max_retries: kind.default_max_retries(),
            created_at: now,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        if self.completed_at.is_some() {
            if self.error.is_some() {
                JobStatus::Failed
            } else {
                JobStatus::Completed
            }
        } else if self.started_at.is_some() {
            JobStatus::Running
        } else {
            JobStatus::Pending
        }
    }
}

/// Exponential backoff with a cap, per §4.F: `100ms * 2^attempt`, capped at
/// 30s. `attempt` is the retry count *before* this delay is applied (0 on
/// the first retry).
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let scaled = base.as_millis().saturating_mul(multiplier as u128);
    let capped = scaled.min(cap.as_millis());
    Duration::from_millis(capped as u64)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub kind: String,
    pub priority: String,
    pub status: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        let status = match job.status() {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        Self {
            id: job.id,
            kind: job.kind.as_str().to_string(),
            priority: match job.priority {
                Priority::High => "high".to_string(),
                Priority::Medium => "medium".to_string(),
                Priority::Low => "low".to_string(),
            },
            status: status.to_string(),
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            error: job.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        let cap = Duration::from_secs(30);
        assert_eq!(backoff_delay(0, base, cap), Duration::from_millis(100));
        assert_eq!(backoff_delay(1, base, cap), Duration::from_millis(200));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_millis(400));
        assert_eq!(backoff_delay(20, base, cap), cap);
    }

    #[test]
    fn default_max_retries_match_spec() {
        assert_eq!(JobKind::ErrorGrouping.default_max_retries(), 3);
        assert_eq!(JobKind::StatsRecalculation.default_max_retries(), 2);
    }

    #[test]
    fn priority_high_to_low_is_ordered() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }
}
