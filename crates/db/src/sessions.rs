//! Session accessors (§3: sessions are loosely referenced by string
//! `session_id`, no FK, and may arrive after their events).

use chrono::{DateTime, Utc};
use faultline_types::Session;

use crate::page::{Page, PageRequest};
use crate::{DbError, DbResult};

#[derive(Debug, Default, Clone)]
pub struct SessionFilter {
    pub user_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub has_errors: Option<bool>,
}

/// Creates the session row if this is the first time it has been seen,
/// otherwise returns the existing row untouched. Sessions may legitimately
/// arrive more than once (e.g. a retried SDK request), so this is `ON
/// CONFLICT DO NOTHING` rather than an error.
pub async fn start_or_get(
    pool: &sqlx::PgPool,
    project_id: i64,
    session_id: &str,
    user_id: Option<&str>,
    started_at: DateTime<Utc>,
    metadata: serde_json::Value,
) -> DbResult<Session> {
    sqlx::query(
        "INSERT INTO sessions (project_id, session_id, user_id, started_at, metadata)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (project_id, session_id) DO NOTHING",
    )
    .bind(project_id)
    .bind(session_id)
    .bind(user_id)
    .bind(started_at)
    .bind(&metadata)
    .execute(pool)
    .await?;

    get_by_id(pool, project_id, session_id).await
}

pub async fn end_session(pool: &sqlx::PgPool, project_id: i64, session_id: &str, ended_at: DateTime<Utc>) -> DbResult<()> {
    sqlx::query("UPDATE sessions SET ended_at = $1 WHERE project_id = $2 AND session_id = $3")
        .bind(ended_at)
        .bind(project_id)
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_by_id(pool: &sqlx::PgPool, project_id: i64, session_id: &str) -> DbResult<Session> {
    sqlx::query_as::<_, SessionRow>(
        "SELECT session_id, project_id, user_id, started_at, ended_at, metadata
         FROM sessions WHERE project_id = $1 AND session_id = $2",
    )
    .bind(project_id)
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    .map(Into::into)
    .ok_or(DbError::NotFound {
        entity: "session",
        id: session_id.to_string(),
    })
}

pub async fn list(
    pool: &sqlx::PgPool,
    project_id: i64,
    filter: &SessionFilter,
    page_req: PageRequest,
) -> DbResult<Page<Session>> {
    let rows = sqlx::query_as::<_, SessionRow>(
        "SELECT s.session_id, s.project_id, s.user_id, s.started_at, s.ended_at, s.metadata
         FROM sessions s
         WHERE s.project_id = $1
           AND ($2::text IS NULL OR s.user_id = $2)
           AND ($3::timestamptz IS NULL OR s.started_at >= $3)
           AND ($4::timestamptz IS NULL OR s.started_at <= $4)
           AND (
             $5::bool IS NULL
             OR EXISTS (SELECT 1 FROM errors e WHERE e.session_id = s.session_id AND e.project_id = s.project_id) = $5
           )
         ORDER BY s.started_at DESC
         LIMIT $6 OFFSET $7",
    )
    .bind(project_id)
    .bind(&filter.user_id)
    .bind(filter.start_date)
    .bind(filter.end_date)
    .bind(filter.has_errors)
    .bind(page_req.limit)
    .bind(page_req.offset())
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sessions s
         WHERE s.project_id = $1
           AND ($2::text IS NULL OR s.user_id = $2)
           AND ($3::timestamptz IS NULL OR s.started_at >= $3)
           AND ($4::timestamptz IS NULL OR s.started_at <= $4)
           AND (
             $5::bool IS NULL
             OR EXISTS (SELECT 1 FROM errors e WHERE e.session_id = s.session_id AND e.project_id = s.project_id) = $5
           )",
    )
    .bind(project_id)
    .bind(&filter.user_id)
    .bind(filter.start_date)
    .bind(filter.end_date)
    .bind(filter.has_errors)
    .fetch_one(pool)
    .await?;

    Ok(Page {
        items: rows.into_iter().map(Into::into).collect(),
        total: total.0,
        page: page_req.page,
        limit: page_req.limit,
    })
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    project_id: i64,
    user_id: Option<String>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            session_id: row.session_id,
            project_id: row.project_id,
            user_id: row.user_id,
            started_at: row.started_at,
            ended_at: row.ended_at,
            metadata: row.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{projects, test_pool};

    async fn seed_project(pool: &sqlx::PgPool) -> i64 {
        projects::insert(pool, "acme", &format!("sk-{}", uuid::Uuid::new_v4())).await.unwrap().id
    }

    #[tokio::test]
    async fn start_or_get_is_idempotent() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        let now = Utc::now();
        let first = start_or_get(db.pool(), project_id, "sess-1", Some("user-1"), now, serde_json::json!({})).await.unwrap();
        let second = start_or_get(db.pool(), project_id, "sess-1", Some("user-2"), now, serde_json::json!({})).await.unwrap();
        assert_eq!(first.user_id, second.user_id);
    }

    #[tokio::test]
    async fn end_session_sets_ended_at() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        let started = Utc::now();
        start_or_get(db.pool(), project_id, "sess-2", None, started, serde_json::json!({})).await.unwrap();
        let ended = started + chrono::Duration::seconds(5);
        end_session(db.pool(), project_id, "sess-2", ended).await.unwrap();
        let session = get_by_id(db.pool(), project_id, "sess-2").await.unwrap();
        assert_eq!(session.ended_at, Some(ended));
        assert!(session.is_valid());
    }
}
