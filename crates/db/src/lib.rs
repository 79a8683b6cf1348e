//! The Storage Adapter (§4.A): a Postgres connection pool plus typed
//! per-entity query modules.
//!
//! Grounded on the teacher's `crates/db/src/lib.rs` `Database`/`DbError`/
//! `run_migrations` shape. The driver is swapped from the teacher's
//! embedded SQLite to Postgres (see DESIGN.md) and the hand-rolled
//! `_migrations` version table is replaced by `sqlx::migrate!`, the
//! idiomatic sqlx runner for a real server-side database (SPEC_FULL §10.5).

pub mod error_groups;
pub mod errors;
pub mod idempotency;
pub mod network_events;
pub mod page;
pub mod projects;
pub mod session_events;
pub mod sessions;
pub mod statistics;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("unique constraint violated on {0}")]
    Conflict(&'static str),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// True when the underlying error is a Postgres unique-constraint
    /// violation, the signal the Grouping Engine uses to branch to its
    /// idempotent re-read path (§4.D step 6).
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            DbError::Sqlx(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
        )
    }
}

/// Main database handle wrapping a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connects to `database_url` with `max_connections`, running pending
    /// migrations before returning.
    pub async fn new(database_url: &str, max_connections: u32) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        tracing::info!("database connected and migrated");
        Ok(db)
    }

    /// Connects without running migrations, for callers (e.g. a
    /// `--migrate-only` CLI path) that drive migrations explicitly.
    pub async fn connect_without_migrating(database_url: &str, max_connections: u32) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> Database {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must point at a scratch Postgres instance to run db crate tests");
    Database::new(&database_url, 5)
        .await
        .expect("test database should connect and migrate")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_and_migrates() {
        let db = test_pool().await;
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects")
            .fetch_one(db.pool())
            .await
            .expect("projects table should exist after migration");
        assert!(count.0 >= 0);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = test_pool().await;
        db.run_migrations().await.expect("second migration run should be a no-op");
    }
}
