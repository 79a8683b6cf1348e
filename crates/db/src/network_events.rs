//! Append-only network event stream (§3 `network_events`).

use chrono::{DateTime, Utc};
use faultline_types::NetworkEvent;

use crate::DbResult;

pub struct NewNetworkEvent {
    pub method: String,
    pub url: String,
    pub status_code: Option<i32>,
    pub response_time: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub request_data: serde_json::Value,
    pub response_data: serde_json::Value,
}

pub async fn insert_batch(pool: &sqlx::PgPool, session_id: &str, events: &[NewNetworkEvent]) -> DbResult<Vec<i64>> {
    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(events.len());
    for e in events {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO network_events
                (session_id, method, url, status_code, response_time, timestamp, request_data, response_data)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(session_id)
        .bind(&e.method)
        .bind(&e.url)
        .bind(e.status_code)
        .bind(e.response_time)
        .bind(e.timestamp)
        .bind(&e.request_data)
        .bind(&e.response_data)
        .fetch_one(&mut *tx)
        .await?;
        ids.push(row.0);
    }
    tx.commit().await?;
    Ok(ids)
}

pub async fn list_for_session(pool: &sqlx::PgPool, session_id: &str) -> DbResult<Vec<NetworkEvent>> {
    let rows = sqlx::query_as::<_, NetworkEventRow>(
        "SELECT id, session_id, method, url, status_code, response_time, timestamp, request_data, response_data
         FROM network_events
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
pub async fn list_since(pool: &sqlx::PgPool, session_id: &str, since: i64, limit: i64) -> DbResult<Vec<NetworkEvent>> {
    let rows = sqlx::query_as::<_, NetworkEventRow>(
        "SELECT id, session_id, method, url, status_code, response_time, timestamp, request_data, response_data
         FROM network_events
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
struct NetworkEventRow {
    id: i64,
    session_id: String,
    method: String,
    url: String,
    status_code: Option<i32>,
    response_time: Option<i64>,
    timestamp: DateTime<Utc>,
    request_data: serde_json::Value,
    response_data: serde_json::Value,
}

impl From<NetworkEventRow> for NetworkEvent {
    fn from(row: NetworkEventRow) -> Self {
        NetworkEvent {
            id: row.id,
            session_id: row.session_id,
            method: row.method,
            url: row.url,
            status_code: row.status_code,
            response_time: row.response_time,
            timestamp: row.timestamp,
            request_data: row.request_data,
            response_data: row.response_data,
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
    async fn insert_batch_then_list_preserves_order() {
        let db = test_pool().await;
        let (_project_id, session_id) = seed_session(db.pool()).await;
        let t0 = Utc::now();
        let events = vec![
            NewNetworkEvent {
                method: "GET".to_string(),
                url: "/api/a".to_string(),
                status_code: Some(200),
                response_time: Some(42),
                timestamp: t0,
                request_data: serde_json::json!({}),
                response_data: serde_json::json!({}),
            },
            NewNetworkEvent {
                method: "POST".to_string(),
                url: "/api/b".to_string(),
                status_code: Some(500),
                response_time: Some(800),
                timestamp: t0 + chrono::Duration::seconds(1),
                request_data: serde_json::json!({}),
                response_data: serde_json::json!({}),
            },
        ];
        insert_batch(db.pool(), &session_id, &events).await.unwrap();

        let listed = list_for_session(db.pool(), &session_id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].url, "/api/a");
        assert_eq!(listed[1].status_code, Some(500));
    }

    #[tokio::test]
    async fn list_since_filters_by_row_id_not_position() {
        let db = test_pool().await;
        let (_project_id, session_id) = seed_session(db.pool()).await;
        let t0 = Utc::now();
        let events: Vec<_> = (0..3)
            .map(|i| NewNetworkEvent {
                method: "GET".to_string(),
                url: format!("/api/{i}"),
                status_code: Some(200),
                response_time: Some(10),
                timestamp: t0 + chrono::Duration::seconds(i),
                request_data: serde_json::json!({}),
                response_data: serde_json::json!({}),
            })
            .collect();
        let ids = insert_batch(db.pool(), &session_id, &events).await.unwrap();

        let after_first = list_since(db.pool(), &session_id, ids[0], 100).await.unwrap();
        assert_eq!(after_first.iter().map(|e| e.id).collect::<Vec<_>>(), vec![ids[1], ids[2]]);
    }
}
