//! Idempotency key dedup index (§4.I SDK transport contract): the Ingest
//! Gateway consults this before processing a capture request carrying an
//! `Idempotency-Key` header.

use chrono::{Duration, Utc};
use faultline_types::IDEMPOTENCY_TTL_SECS;

use crate::DbResult;

/// Returns `true` if the key was newly claimed (the caller should
/// process the request), `false` if it was already present within its
/// TTL (the caller should replay the prior response instead).
///
/// Uses `ON CONFLICT DO NOTHING` plus a rows-affected check rather than a
/// separate existence query, so the claim itself is the race-free check.
pub async fn claim(pool: &sqlx::PgPool, project_id: i64, idempotency_key: &str) -> DbResult<bool> {
    let result = sqlx::query(
        "INSERT INTO idempotency_keys (project_id, idempotency_key, created_at)
         VALUES ($1, $2, now())
         ON CONFLICT (project_id, idempotency_key) DO NOTHING",
    )
    .bind(project_id)
    .bind(idempotency_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// True if `idempotency_key` is still within its dedup TTL window, for
/// callers that need to check without claiming.
pub async fn is_active(pool: &sqlx::PgPool, project_id: i64, idempotency_key: &str) -> DbResult<bool> {
    let cutoff = Utc::now() - Duration::seconds(IDEMPOTENCY_TTL_SECS);
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM idempotency_keys WHERE project_id = $1 AND idempotency_key = $2 AND created_at >= $3",
    )
    .bind(project_id)
    .bind(idempotency_key)
    .bind(cutoff)
    .fetch_one(pool)
    .await?;
    Ok(row.0 > 0)
}

/// Records the response a freshly claimed key produced, so a later replay
/// of the same key can return it instead of a no-op empty result (§8
/// invariant 5). Best-effort: a claim that never stores a response (the
/// process crashing between `claim` and this call) just falls back to
/// replaying an empty result, same as before this existed.
pub async fn store_response(pool: &sqlx::PgPool, project_id: i64, idempotency_key: &str, response: &serde_json::Value) -> DbResult<()> {
    sqlx::query("UPDATE idempotency_keys SET response = $3 WHERE project_id = $1 AND idempotency_key = $2")
        .bind(project_id)
        .bind(idempotency_key)
        .bind(response)
        .execute(pool)
        .await?;
    Ok(())
}

/// The response stored by `store_response` for a previously claimed key,
/// if any — what a replay (`claim` returning `false`) should answer with.
pub async fn get_response(pool: &sqlx::PgPool, project_id: i64, idempotency_key: &str) -> DbResult<Option<serde_json::Value>> {
    let row: Option<(Option<serde_json::Value>,)> =
        sqlx::query_as("SELECT response FROM idempotency_keys WHERE project_id = $1 AND idempotency_key = $2")
            .bind(project_id)
            .bind(idempotency_key)
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(response,)| response))
}

/// Reclaims dedup rows past their TTL. Run periodically from the
/// `stats_recalculation` job's housekeeping pass rather than on every
/// request.
pub async fn prune_expired(pool: &sqlx::PgPool) -> DbResult<u64> {
    let cutoff = Utc::now() - Duration::seconds(IDEMPOTENCY_TTL_SECS);
    let result = sqlx::query("DELETE FROM idempotency_keys WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{projects, test_pool};

    async fn seed_project(pool: &sqlx::PgPool) -> i64 {
        projects::insert(pool, "acme", &format!("sk-{}", uuid::Uuid::new_v4())).await.unwrap().id
    }

    #[tokio::test]
    async fn claim_is_true_once_then_false() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        assert!(claim(db.pool(), project_id, "key-1").await.unwrap());
        assert!(!claim(db.pool(), project_id, "key-1").await.unwrap());
    }

    #[tokio::test]
    async fn is_active_reflects_claimed_key() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        assert!(!is_active(db.pool(), project_id, "key-2").await.unwrap());
        claim(db.pool(), project_id, "key-2").await.unwrap();
        assert!(is_active(db.pool(), project_id, "key-2").await.unwrap());
    }

    #[tokio::test]
    async fn replay_returns_the_stored_response() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;

        assert!(claim(db.pool(), project_id, "key-3").await.unwrap());
        assert_eq!(get_response(db.pool(), project_id, "key-3").await.unwrap(), None);

        let response = serde_json::json!({ "errorIds": [1, 2, 3] });
        store_response(db.pool(), project_id, "key-3", &response).await.unwrap();

        assert!(!claim(db.pool(), project_id, "key-3").await.unwrap());
        assert_eq!(get_response(db.pool(), project_id, "key-3").await.unwrap(), Some(response));
    }
}
