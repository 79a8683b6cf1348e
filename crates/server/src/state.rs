//! Application state for the axum server.

use std::sync::Arc;
use std::time::Instant;

use faultline_cache::AppCache;
use faultline_core::config::Config;
use faultline_db::Database;
use faultline_jobs::JobProcessor;
use faultline_stream::StreamDispatcher;

/// Shared application state accessible from every route handler.
pub struct AppState {
    /// Server start time for uptime reporting.
    pub start_time: Instant,
    pub config: Config,
    pub db: Database,
    pub cache: AppCache,
    pub jobs: Arc<JobProcessor>,
    pub stream: StreamDispatcher,
}

impl AppState {
    pub fn new(config: Config, db: Database, jobs: Arc<JobProcessor>) -> Arc<Self> {
        let cache = AppCache::new(faultline_core::config::STATS_CACHE_TTL, faultline_core::config::GROUP_CACHE_TTL);
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            db,
            cache,
            jobs,
            stream: StreamDispatcher::new(),
        })
    }

    /// Create with an externally-built cache/stream pair, for tests that
    /// want control over TTLs or want to share a dispatcher across handles.
    pub fn new_with_parts(config: Config, db: Database, jobs: Arc<JobProcessor>, cache: AppCache, stream: StreamDispatcher) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            db,
            cache,
            jobs,
            stream,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_jobs::ProcessorConfig;

    async fn test_state() -> Arc<AppState> {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must point at a scratch Postgres instance to run server crate tests");
        let db = Database::new(&database_url, 5).await.expect("test database should connect and migrate");
        AppState::new(Config::default(), db, JobProcessor::new(ProcessorConfig::default()))
    }

    #[tokio::test]
    async fn uptime_starts_near_zero() {
        let state = test_state().await;
        assert!(state.uptime_secs() < 2);
    }
}
