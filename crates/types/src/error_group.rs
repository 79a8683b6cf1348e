//! Error and ErrorGroup rows (§3 Data Model) plus their status/priority enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRow {
    pub id: i64,
    pub project_id: i64,
    pub message: String,
    pub stack_trace: Option<String>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Set exactly-once after grouping. Never overwritten once `Some`.
    pub error_group_id: Option<i64>,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorGroupStatus {
    Open,
    Investigating,
    Resolved,
    Ignored,
}

impl ErrorGroupStatus {
    pub const ALL: [ErrorGroupStatus; 4] = [
        ErrorGroupStatus::Open,
        ErrorGroupStatus::Investigating,
        ErrorGroupStatus::Resolved,
        ErrorGroupStatus::Ignored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorGroupStatus::Open => "open",
            ErrorGroupStatus::Investigating => "investigating",
            ErrorGroupStatus::Resolved => "resolved",
            ErrorGroupStatus::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorGroupPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl ErrorGroupPriority {
    pub const ALL: [ErrorGroupPriority; 4] = [
        ErrorGroupPriority::Critical,
        ErrorGroupPriority::High,
        ErrorGroupPriority::Medium,
        ErrorGroupPriority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorGroupPriority::Critical => "critical",
            ErrorGroupPriority::High => "high",
            ErrorGroupPriority::Medium => "medium",
            ErrorGroupPriority::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

impl Default for ErrorGroupStatus {
    fn default() -> Self {
        ErrorGroupStatus::Open
    }
}

impl Default for ErrorGroupPriority {
    fn default() -> Self {
        ErrorGroupPriority::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorGroup {
    pub id: i64,
    pub project_id: i64,
    pub fingerprint: String,
    pub pattern_hash: String,
    pub title: String,
    pub message_template: String,
    pub stack_pattern: Option<String>,
    pub url_pattern: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_occurrences: i64,
    pub unique_users: i64,
    pub status: ErrorGroupStatus,
    pub priority: ErrorGroupPriority,
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Maximum number of similar-but-distinct fingerprints retained in
/// `metadata.similar_fingerprints[]` per group (§4.D step 5).
pub const MAX_SIMILAR_FINGERPRINTS: usize = 64;

/// Up to 10 same-`pattern_hash` candidates are considered for similarity
/// attach (§4.D step 4).
pub const SIMILARITY_CANDIDATE_LIMIT: i64 = 10;

/// Minimum Jaro-Winkler score to attach to an existing group by similarity.
pub const SIMILARITY_THRESHOLD: f64 = 0.80;

/// Appends `fingerprint` into the group's `metadata.similar_fingerprints`
/// array with set semantics, FIFO-evicting the oldest entry once the cap
/// is reached. Returns the updated metadata value.
pub fn append_similar_fingerprint(metadata: &serde_json::Value, fingerprint: &str) -> serde_json::Value {
    let mut metadata = metadata.clone();
    let obj = metadata
        .as_object_mut()
        .expect("group metadata is always a JSON object");
    let list = obj
        .entry("similar_fingerprints")
        .or_insert_with(|| serde_json::Value::Array(Vec::new()));
    let arr = list.as_array_mut().expect("similar_fingerprints is always an array");

    if arr.iter().any(|v| v.as_str() == Some(fingerprint)) {
        return metadata;
    }
    arr.push(serde_json::Value::String(fingerprint.to_string()));
    while arr.len() > MAX_SIMILAR_FINGERPRINTS {
        arr.remove(0);
    }
    metadata
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorGroupPatch {
    pub status: Option<ErrorGroupStatus>,
    pub priority: Option<ErrorGroupPriority>,
    pub assigned_to: Option<String>,
    pub tags: Option<Vec<String>>,
    pub resolution_notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similar_fingerprints_are_capped_fifo() {
        let mut metadata = serde_json::json!({ "similar_fingerprints": [] });
        for i in 0..(MAX_SIMILAR_FINGERPRINTS + 5) {
            metadata = append_similar_fingerprint(&metadata, &format!("fp{i}"));
        }
        let arr = metadata["similar_fingerprints"].as_array().unwrap();
        assert_eq!(arr.len(), MAX_SIMILAR_FINGERPRINTS);
        assert_eq!(arr[0].as_str().unwrap(), "fp5");
    }

    #[test]
    fn duplicate_fingerprint_is_not_appended_twice() {
        let metadata = serde_json::json!({ "similar_fingerprints": ["fp1"] });
        let updated = append_similar_fingerprint(&metadata, "fp1");
        assert_eq!(updated["similar_fingerprints"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn status_and_priority_round_trip_through_str() {
        for s in ErrorGroupStatus::ALL {
            assert_eq!(ErrorGroupStatus::parse(s.as_str()), Some(s));
        }
        for p in ErrorGroupPriority::ALL {
            assert_eq!(ErrorGroupPriority::parse(p.as_str()), Some(p));
        }
        assert_eq!(ErrorGroupStatus::parse("bogus"), None);
    }
}
