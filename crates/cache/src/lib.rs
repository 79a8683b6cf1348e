//! The Cache Layer (§4.B): a TTL key/value cache with per-project
//! invalidation namespaces.
//!
//! Grounded on no direct teacher-repo analog — the teacher has no
//! request-path cache of its own — so this crate reaches for `moka`, the
//! Rust ecosystem's standard async TTL-cache crate, whose
//! `future::Cache` gives per-entry TTL and bulk `invalidate_entries_if`
//! out of the box, matching the contract below directly.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// `stats:{project_id}:{days}` (§4.B).
pub fn stats_key(project_id: i64, days: i64) -> String {
    format!("stats:{project_id}:{days}")
}

/// `group:{project_id}:{fingerprint}` (§4.B).
pub fn group_key(project_id: i64, fingerprint: &str) -> String {
    format!("group:{project_id}:{fingerprint}")
}

#[derive(Clone)]
struct Entry {
    project_id: i64,
    value: Arc<Vec<u8>>,
}

/// A TTL cache scoped to a single entity kind (stats or group lookups),
/// each with its own default TTL per the spec's key scheme. Call
/// `invalidate_project` after every durable write that could affect a
/// cached value — never before (§4.B).
#[derive(Clone)]
pub struct TtlCache {
    inner: Cache<String, Entry>,
}

impl TtlCache {
    pub fn new(default_ttl: Duration, max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .time_to_live(default_ttl)
            .max_capacity(max_capacity)
            .build();
        Self { inner }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.inner.get(key).await {
            Some(entry) => Ok(Some(serde_json::from_slice(&entry.value)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, project_id: i64, value: &T) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.inner
            .insert(
                key.to_string(),
                Entry {
                    project_id,
                    value: Arc::new(bytes),
                },
            )
            .await;
        Ok(())
    }

    /// Namespace-delete: evicts every entry belonging to `project_id`.
    /// Safe to call unconditionally after a write; a miss is cheap.
    pub async fn invalidate_project(&self, project_id: i64) {
        self.inner
            .invalidate_entries_if(move |_, entry| entry.project_id == project_id)
            .ok();
    }

    #[cfg(test)]
    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

/// The two cache namespaces named in §4.B, each with its own TTL.
pub struct AppCache {
    pub stats: TtlCache,
    pub groups: TtlCache,
}

impl AppCache {
    pub fn new(stats_ttl: Duration, group_ttl: Duration) -> Self {
        Self {
            stats: TtlCache::new(stats_ttl, 10_000),
            groups: TtlCache::new(group_ttl, 50_000),
        }
    }

    pub async fn invalidate_project(&self, project_id: i64) {
        self.stats.invalidate_project(project_id).await;
        self.groups.invalidate_project(project_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = TtlCache::new(Duration::from_secs(60), 100);
        cache.set("stats:1:7", 1, &json!({"totalErrors": 5})).await.unwrap();
        let value: serde_json::Value = cache.get("stats:1:7").await.unwrap().unwrap();
        assert_eq!(value["totalErrors"], 5);
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = TtlCache::new(Duration::from_secs(60), 100);
        let value: Option<serde_json::Value> = cache.get("nope").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn invalidate_project_clears_only_that_projects_entries() {
        let cache = TtlCache::new(Duration::from_secs(60), 100);
        cache.set("stats:1:7", 1, &json!(1)).await.unwrap();
        cache.set("stats:2:7", 2, &json!(2)).await.unwrap();
        cache.invalidate_project(1).await;
        assert_eq!(cache.entry_count().await, 1);
        let remaining: serde_json::Value = cache.get("stats:2:7").await.unwrap().unwrap();
        assert_eq!(remaining, 2);
    }

    #[test]
    fn key_schemes_match_spec() {
        assert_eq!(stats_key(42, 7), "stats:42:7");
        assert_eq!(group_key(42, "abc"), "group:42:abc");
    }
}
