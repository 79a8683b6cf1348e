//! Raw error row accessors (§4.E): ingest writes one row per captured
//! error, initially ungrouped (`error_group_id = NULL`), then the
//! Grouping Engine sets `error_group_id`/`fingerprint` exactly once.

use chrono::{DateTime, Utc};
use faultline_types::ErrorRow;

use crate::page::{Page, PageRequest};
use crate::{DbError, DbResult};

#[derive(Debug, Default, Clone)]
pub struct ErrorFilter {
    pub session_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub error_group_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewError {
    pub message: String,
    pub stack_trace: Option<String>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Inserts one error row ungrouped, returning its id — used by the
/// synchronous (non-bulk) capture path, which groups immediately after.
pub async fn insert(pool: &sqlx::PgPool, project_id: i64, e: &NewError) -> DbResult<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO errors (project_id, message, stack_trace, url, user_agent, session_id, timestamp, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id",
    )
    .bind(project_id)
    .bind(&e.message)
    .bind(&e.stack_trace)
    .bind(&e.url)
    .bind(&e.user_agent)
    .bind(&e.session_id)
    .bind(e.timestamp)
    .bind(&e.metadata)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Bulk insert path (§4.E): chunks at `BATCH_INSERT_CHUNK_SIZE`, each
/// chunk in its own multi-row `INSERT`. A chunk that fails outright falls
/// back to inserting its rows one at a time so a single malformed row
/// doesn't drop the whole batch.
pub async fn insert_batch(pool: &sqlx::PgPool, project_id: i64, errors: &[NewError]) -> DbResult<Vec<i64>> {
    let mut ids = Vec::with_capacity(errors.len());
    for chunk in errors.chunks(faultline_types::BATCH_INSERT_CHUNK_SIZE) {
        match insert_chunk(pool, project_id, chunk).await {
            Ok(mut chunk_ids) => ids.append(&mut chunk_ids),
            Err(_) => {
                for e in chunk {
                    match insert(pool, project_id, e).await {
                        Ok(id) => ids.push(id),
                        Err(err) => tracing::warn!(error = %err, "dropping unwritable error row in bulk insert"),
                    }
                }
            }
        }
    }
    Ok(ids)
}

async fn insert_chunk(pool: &sqlx::PgPool, project_id: i64, chunk: &[NewError]) -> DbResult<Vec<i64>> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(chunk.len());
    for e in chunk {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO errors (project_id, message, stack_trace, url, user_agent, session_id, timestamp, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(project_id)
        .bind(&e.message)
        .bind(&e.stack_trace)
        .bind(&e.url)
        .bind(&e.user_agent)
        .bind(&e.session_id)
        .bind(e.timestamp)
        .bind(&e.metadata)
        .fetch_one(&mut *tx)
        .await?;
        ids.push(row.0);
    }
    tx.commit().await?;
    Ok(ids)
}

/// Assigns the grouping result to an error row. Called exactly once per
/// row (§3 invariant: `error_group_id` is never overwritten once set).
pub async fn assign_group(pool: &sqlx::PgPool, error_id: i64, error_group_id: i64, fingerprint: &str) -> DbResult<()> {
    sqlx::query("UPDATE errors SET error_group_id = $2, fingerprint = $3 WHERE id = $1 AND error_group_id IS NULL")
        .bind(error_id)
        .bind(error_group_id)
        .bind(fingerprint)
        .execute(pool)
        .await?;
    Ok(())
}

/// Error ids still awaiting grouping, oldest first — what the async
/// `error_grouping` background job drains (§4.F).
pub async fn ungrouped_ids(pool: &sqlx::PgPool, project_id: i64, limit: i64) -> DbResult<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM errors WHERE project_id = $1 AND error_group_id IS NULL ORDER BY timestamp ASC LIMIT $2",
    )
    .bind(project_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn get_by_id(pool: &sqlx::PgPool, project_id: i64, error_id: i64) -> DbResult<ErrorRow> {
    sqlx::query_as::<_, ErrorDbRow>(
        "SELECT id, project_id, message, stack_trace, url, user_agent, session_id, timestamp,
                metadata, error_group_id, fingerprint
         FROM errors WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(error_id)
    .fetch_optional(pool)
    .await?
    .map(Into::into)
    .ok_or(DbError::NotFound {
        entity: "error",
        id: error_id.to_string(),
    })
}

pub async fn list(pool: &sqlx::PgPool, project_id: i64, filter: &ErrorFilter, page_req: PageRequest) -> DbResult<Page<ErrorRow>> {
    let rows = sqlx::query_as::<_, ErrorDbRow>(
        "SELECT id, project_id, message, stack_trace, url, user_agent, session_id, timestamp,
                metadata, error_group_id, fingerprint
         FROM errors
         WHERE project_id = $1
           AND ($2::text IS NULL OR session_id = $2)
           AND ($3::timestamptz IS NULL OR timestamp >= $3)
           AND ($4::timestamptz IS NULL OR timestamp <= $4)
           AND ($5::bigint IS NULL OR error_group_id = $5)
         ORDER BY timestamp DESC
         LIMIT $6 OFFSET $7",
    )
    .bind(project_id)
    .bind(&filter.session_id)
    .bind(filter.start_date)
    .bind(filter.end_date)
    .bind(filter.error_group_id)
    .bind(page_req.limit)
    .bind(page_req.offset())
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM errors
         WHERE project_id = $1
           AND ($2::text IS NULL OR session_id = $2)
           AND ($3::timestamptz IS NULL OR timestamp >= $3)
           AND ($4::timestamptz IS NULL OR timestamp <= $4)
           AND ($5::bigint IS NULL OR error_group_id = $5)",
    )
    .bind(project_id)
    .bind(&filter.session_id)
    .bind(filter.start_date)
    .bind(filter.end_date)
    .bind(filter.error_group_id)
    .fetch_one(pool)
    .await?;

    Ok(Page {
        items: rows.into_iter().map(Into::into).collect(),
        total: total.0,
        page: page_req.page,
        limit: page_req.limit,
    })
}

/// Rows for one session with `id > since` (§4.H long-poll: `since` is a
/// real row id, not an in-process cursor), newest-`limit` by timestamp.
pub async fn list_since(pool: &sqlx::PgPool, project_id: i64, session_id: &str, since: i64, limit: i64) -> DbResult<Vec<ErrorRow>> {
    let rows = sqlx::query_as::<_, ErrorDbRow>(
        "SELECT id, project_id, message, stack_trace, url, user_agent, session_id, timestamp,
                metadata, error_group_id, fingerprint
         FROM errors
         WHERE project_id = $1 AND session_id = $2 AND id > $3
         ORDER BY timestamp ASC
         LIMIT $4",
    )
    .bind(project_id)
    .bind(session_id)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(sqlx::FromRow)]
struct ErrorDbRow {
    id: i64,
    project_id: i64,
    message: String,
    stack_trace: Option<String>,
    url: Option<String>,
    user_agent: Option<String>,
    session_id: Option<String>,
    timestamp: DateTime<Utc>,
    metadata: serde_json::Value,
    error_group_id: Option<i64>,
    fingerprint: Option<String>,
}

impl From<ErrorDbRow> for ErrorRow {
    fn from(row: ErrorDbRow) -> Self {
        ErrorRow {
            id: row.id,
            project_id: row.project_id,
            message: row.message,
            stack_trace: row.stack_trace,
            url: row.url,
            user_agent: row.user_agent,
            session_id: row.session_id,
            timestamp: row.timestamp,
            metadata: row.metadata,
            error_group_id: row.error_group_id,
            fingerprint: row.fingerprint,
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

    fn new_error(message: &str) -> NewError {
        NewError {
            message: message.to_string(),
            stack_trace: None,
            url: None,
            user_agent: None,
            session_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn insert_then_get_by_id_round_trips() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        let id = insert(db.pool(), project_id, &new_error("boom")).await.unwrap();
        let row = get_by_id(db.pool(), project_id, id).await.unwrap();
        assert_eq!(row.message, "boom");
        assert!(row.error_group_id.is_none());
    }

    #[tokio::test]
    async fn assign_group_is_write_once() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        let id = insert(db.pool(), project_id, &new_error("boom")).await.unwrap();

        assign_group(db.pool(), id, 1, "fp-a").await.unwrap();
        assign_group(db.pool(), id, 2, "fp-b").await.unwrap();

        let row = get_by_id(db.pool(), project_id, id).await.unwrap();
        assert_eq!(row.error_group_id, Some(1));
        assert_eq!(row.fingerprint.as_deref(), Some("fp-a"));
    }

    #[tokio::test]
    async fn insert_batch_chunks_and_returns_all_ids() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        let errors: Vec<NewError> = (0..250).map(|i| new_error(&format!("err-{i}"))).collect();
        let ids = insert_batch(db.pool(), project_id, &errors).await.unwrap();
        assert_eq!(ids.len(), 250);
    }

    #[tokio::test]
    async fn ungrouped_ids_excludes_assigned_rows() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        let a = insert(db.pool(), project_id, &new_error("a")).await.unwrap();
        let b = insert(db.pool(), project_id, &new_error("b")).await.unwrap();
        assign_group(db.pool(), a, 1, "fp-a").await.unwrap();

        let pending = ungrouped_ids(db.pool(), project_id, 100).await.unwrap();
        assert_eq!(pending, vec![b]);
    }

    #[tokio::test]
    async fn list_since_filters_by_row_id_not_position() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        let mut error = new_error("boom");
        error.session_id = Some("sess-1".to_string());
        let a = insert(db.pool(), project_id, &error).await.unwrap();
        let b = insert(db.pool(), project_id, &error).await.unwrap();
        let c = insert(db.pool(), project_id, &error).await.unwrap();

        let after_first = list_since(db.pool(), project_id, "sess-1", a, 100).await.unwrap();
        assert_eq!(after_first.iter().map(|e| e.id).collect::<Vec<_>>(), vec![b, c]);
    }
}
