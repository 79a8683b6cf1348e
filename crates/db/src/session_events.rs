//! Append-only session event stream (§3 `session_events`).

use chrono::{DateTime, Utc};
use faultline_types::SessionEvent;

use crate::DbResult;

pub async fn insert(pool: &sqlx::PgPool, session_id: &str, event_type: &str, data: &serde_json::Value, timestamp: DateTime<Utc>) -> DbResult<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO session_events (session_id, event_type, data, timestamp)
         VALUES ($1, $2, $3, $4)
         RETURNING id",
    )
    .bind(session_id)
    .bind(event_type)
    .bind(data)
    .bind(timestamp)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn insert_batch(pool: &sqlx::PgPool, session_id: &str, events: &[(String, serde_json::Value, DateTime<Utc>)]) -> DbResult<Vec<i64>> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(events.len());
    for (event_type, data, timestamp) in events {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO session_events (session_id, event_type, data, timestamp)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(session_id)
        .bind(event_type)
        .bind(data)
        .bind(timestamp)
        .fetch_one(&mut *tx)
        .await?;
        ids.push(row.0);
    }
    tx.commit().await?;
    Ok(ids)
}

pub async fn list_for_session(pool: &sqlx::PgPool, session_id: &str) -> DbResult<Vec<SessionEvent>> {
    let rows = sqlx::query_as::<_, SessionEventRow>(
        "SELECT id, session_id, event_type, data, timestamp
         FROM session_events
         WHERE session_id = $1
         ORDER BY timestamp ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Rows with `id > since` (§4.H long-poll: `since` is a real row id, not
/// an in-process cursor), newest-`limit` by timestamp.
pub async fn list_since(pool: &sqlx::PgPool, session_id: &str, since: i64, limit: i64) -> DbResult<Vec<SessionEvent>> {
    let rows = sqlx::query_as::<_, SessionEventRow>(
        "SELECT id, session_id, event_type, data, timestamp
         FROM session_events
         WHERE session_id = $1 AND id > $2
         ORDER BY timestamp ASC
         LIMIT $3",
    )
    .bind(session_id)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(sqlx::FromRow)]
struct SessionEventRow {
    id: i64,
    session_id: String,
    event_type: String,
    data: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl From<SessionEventRow> for SessionEvent {
    fn from(row: SessionEventRow) -> Self {
        SessionEvent {
            id: row.id,
            session_id: row.session_id,
            event_type: row.event_type,
            data: row.data,
            timestamp: row.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{projects, sessions, test_pool};

    async fn seed_session(pool: &sqlx::PgPool) -> (i64, String) {
        let project_id = projects::insert(pool, "acme", &format!("sk-{}", uuid::Uuid::new_v4())).await.unwrap().id;
        let session_id = "sess-1".to_string();
        sessions::start_or_get(pool, project_id, &session_id, None, Utc::now(), serde_json::json!({})).await.unwrap();
        (project_id, session_id)
    }

    #[tokio::test]
    async fn insert_then_list_orders_by_timestamp() {
        let db = test_pool().await;
        let (_project_id, session_id) = seed_session(db.pool()).await;
        let t0 = Utc::now();
        insert(db.pool(), &session_id, "click", &serde_json::json!({"x": 1}), t0).await.unwrap();
        insert(db.pool(), &session_id, "scroll", &serde_json::json!({}), t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();

        let events = list_for_session(db.pool(), &session_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "click");
        assert_eq!(events[1].event_type, "scroll");
    }

    #[tokio::test]
    async fn insert_batch_writes_all_events() {
        let db = test_pool().await;
        let (_project_id, session_id) = seed_session(db.pool()).await;
        let events: Vec<_> = (0..10)
            .map(|i| ("click".to_string(), serde_json::json!({"i": i}), Utc::now()))
            .collect();
        let ids = insert_batch(db.pool(), &session_id, &events).await.unwrap();
        assert_eq!(ids.len(), 10);
    }

    #[tokio::test]
    async fn list_since_excludes_rows_up_to_and_including_the_given_id() {
        let db = test_pool().await;
        let (_project_id, session_id) = seed_session(db.pool()).await;
        let t0 = Utc::now();
        let mut ids = Vec::new();
        for i in 0..3 {
            let id = insert(db.pool(), &session_id, "click", &serde_json::json!({"i": i}), t0 + chrono::Duration::seconds(i))
                .await
                .unwrap();
            ids.push(id);
        }

        let after_first = list_since(db.pool(), &session_id, ids[0], 100).await.unwrap();
        assert_eq!(after_first.iter().map(|e| e.id).collect::<Vec<_>>(), vec![ids[1], ids[2]]);

        let after_last = list_since(db.pool(), &session_id, ids[2], 100).await.unwrap();
        assert!(after_last.is_empty());
    }
}
