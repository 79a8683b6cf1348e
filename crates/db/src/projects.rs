//! Project accessors. `api_key` lookup is the sole ingest authenticator
//! (§3) — hit on every request, so callers should front it with
//! `faultline-cache` or an in-process LRU in a future iteration (not
//! required by the spec today).

use faultline_types::Project;

use crate::{DbError, DbResult};

pub async fn insert(pool: &sqlx::PgPool, name: &str, api_key: &str) -> DbResult<Project> {
    let row = sqlx::query_as::<_, ProjectRow>(
        "INSERT INTO projects (name, api_key) VALUES ($1, $2) RETURNING id, name, api_key, created_at",
    )
    .bind(name)
    .bind(api_key)
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

pub async fn get_by_id(pool: &sqlx::PgPool, id: i64) -> DbResult<Project> {
    sqlx::query_as::<_, ProjectRow>("SELECT id, name, api_key, created_at FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Into::into)
        .ok_or(DbError::NotFound {
            entity: "project",
            id: id.to_string(),
        })
}

/// The authentication lookup the Ingest Gateway runs on every request
/// (§4.E: `X-API-Key` → `project_id`).
pub async fn get_by_api_key(pool: &sqlx::PgPool, api_key: &str) -> DbResult<Option<Project>> {
    let row = sqlx::query_as::<_, ProjectRow>("SELECT id, name, api_key, created_at FROM projects WHERE api_key = $1")
        .bind(api_key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    api_key: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            api_key: row.api_key,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    #[tokio::test]
    async fn insert_then_lookup_by_api_key() {
        let db = test_pool().await;
        let project = insert(db.pool(), "acme", "sk-test-key-1").await.unwrap();
        let found = get_by_api_key(db.pool(), "sk-test-key-1").await.unwrap();
        assert_eq!(found.unwrap().id, project.id);
    }

    #[tokio::test]
    async fn unknown_api_key_returns_none() {
        let db = test_pool().await;
        let found = get_by_api_key(db.pool(), "sk-does-not-exist").await.unwrap();
        assert!(found.is_none());
    }
}
