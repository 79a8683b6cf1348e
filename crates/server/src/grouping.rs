//! The Grouping Engine's request-path composition (§4.D): wires
//! `faultline_core`'s pure fingerprinter/similarity scorer to
//! `faultline_db`'s storage accessors, implementing `process_error` exactly
//! as the algorithm in §4.D steps 1-6 prescribes.

use std::time::Instant;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use faultline_core::fingerprint::{ErrorInput, Fingerprinter};
use faultline_core::similarity::best_match;
use faultline_db::{error_groups, DbError};
use faultline_types::{append_similar_fingerprint, ErrorGroup};

use crate::error::ApiError;

pub struct GroupingOutcome {
    pub group: ErrorGroup,
    pub is_new_group: bool,
    pub fingerprint: String,
    pub similarity: Option<f64>,
}

/// Implements §4.D `process_error`. Does not touch the `errors` table or
/// statistics rollup itself — those are the caller's job once it has a
/// group to attach to, so this stays a pure "find or create the group"
/// operation that's easy to retry.
pub async fn process_error(
    pool: &PgPool,
    project_id: i64,
    input: &ErrorInput<'_>,
    occurred_at: DateTime<Utc>,
    user_id: Option<&str>,
) -> Result<GroupingOutcome, ApiError> {
    let started = Instant::now();
    let fp = Fingerprinter::compute(input);

    // Step 2/3: exact fingerprint match.
    if let Some(group) = error_groups::get_by_fingerprint(pool, project_id, &fp.fingerprint).await? {
        let updated = error_groups::attach_occurrence(pool, group.id, occurred_at, user_id.is_some(), None).await?;
        faultline_observability::record_grouping_decision("attached_exact", started.elapsed());
        return Ok(GroupingOutcome {
            group: updated,
            is_new_group: false,
            fingerprint: fp.fingerprint,
            similarity: None,
        });
    }

    // Step 4: same-pattern_hash candidates, scored by Jaro-Winkler.
    let candidates = error_groups::similarity_candidates(pool, project_id, &fp.pattern_hash).await?;
    if let Some((group_id, score)) = best_match(&fp.normalized_message, &candidates) {
        let existing = error_groups::get_by_id(pool, group_id).await?;
        let metadata = append_similar_fingerprint(&existing.metadata, &fp.fingerprint);
        let updated = error_groups::attach_occurrence(pool, group_id, occurred_at, user_id.is_some(), Some(&metadata)).await?;
        faultline_observability::record_grouping_decision("attached_similar", started.elapsed());
        return Ok(GroupingOutcome {
            group: updated,
            is_new_group: false,
            fingerprint: fp.fingerprint,
            similarity: Some(score),
        });
    }

    // Step 6: insert a new group, retrying on a unique-constraint race.
    match error_groups::insert_new(pool, project_id, &fp, occurred_at).await {
        Ok(group) => {
            faultline_observability::record_grouping_decision("new_group", started.elapsed());
            Ok(GroupingOutcome {
                group,
                is_new_group: true,
                fingerprint: fp.fingerprint,
                similarity: None,
            })
        }
        Err(DbError::Conflict(_)) => {
            faultline_observability::record_grouping_decision("race_retried", started.elapsed());
            let group = error_groups::get_by_fingerprint(pool, project_id, &fp.fingerprint)
                .await?
                .ok_or_else(|| ApiError::Fatal("group vanished immediately after unique-constraint conflict".to_string()))?;
            let updated = error_groups::attach_occurrence(pool, group.id, occurred_at, user_id.is_some(), None).await?;
            Ok(GroupingOutcome {
                group: updated,
                is_new_group: false,
                fingerprint: fp.fingerprint,
                similarity: None,
            })
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_db::{projects, Database};

    async fn test_db() -> Database {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must point at a scratch Postgres instance to run server crate tests");
        Database::new(&database_url, 5).await.expect("test database should connect and migrate")
    }

    async fn seed_project(pool: &PgPool) -> i64 {
        projects::insert(pool, "acme", &format!("sk-{}", uuid::Uuid::new_v4())).await.unwrap().id
    }

    fn input(message: &'static str) -> ErrorInput<'static> {
        ErrorInput {
            message,
            stack_trace: None,
            url: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn first_occurrence_creates_a_new_group() {
        let db = test_db().await;
        let project_id = seed_project(db.pool()).await;
        let outcome = process_error(db.pool(), project_id, &input("boom"), Utc::now(), None).await.unwrap();
        assert!(outcome.is_new_group);
        assert_eq!(outcome.group.total_occurrences, 1);
    }

    #[tokio::test]
    async fn repeat_occurrence_attaches_to_existing_group() {
        let db = test_db().await;
        let project_id = seed_project(db.pool()).await;
        let first = process_error(db.pool(), project_id, &input("boom"), Utc::now(), Some("u1")).await.unwrap();
        let second = process_error(db.pool(), project_id, &input("boom"), Utc::now(), Some("u2")).await.unwrap();
        assert!(!second.is_new_group);
        assert_eq!(second.group.id, first.group.id);
        assert_eq!(second.group.total_occurrences, 2);
    }
}
