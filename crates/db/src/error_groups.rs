//! ErrorGroup accessors — the heart of the Grouping Engine (§4.D).
//!
//! `insert_new` relies on the `(project_id, fingerprint)` unique
//! constraint for linearizable group creation (§5): a concurrent insert
//! racing on the same fingerprint surfaces as `DbError::Conflict`, which
//! the grouping engine in `faultline-server` catches and turns into an
//! idempotent re-read (§4.D step 6).

use chrono::{DateTime, Utc};
use faultline_core::fingerprint::Fingerprint;
use faultline_types::{ErrorGroup, ErrorGroupPatch, ErrorGroupPriority, ErrorGroupStatus};

use crate::page::{Page, PageRequest, SortOrder};
use crate::{DbError, DbResult};

#[derive(Debug, Default, Clone)]
pub struct ErrorGroupFilter {
    pub status: Option<ErrorGroupStatus>,
    pub priority: Option<ErrorGroupPriority>,
    pub assigned_to: Option<String>,
    pub search: Option<String>,
}

/// The whitelist §4.A names explicitly: "sort by `last_seen |
/// total_occurrences | unique_users | created_at`". This crate has no
/// `created_at` column on `error_groups` — `first_seen` is its analogue
/// (the timestamp the group was created) — so `CreatedAt` maps there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorGroupSort {
    LastSeen,
    TotalOccurrences,
    UniqueUsers,
    CreatedAt,
}

impl ErrorGroupSort {
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("total_occurrences") => ErrorGroupSort::TotalOccurrences,
            Some("unique_users") => ErrorGroupSort::UniqueUsers,
            Some("created_at") => ErrorGroupSort::CreatedAt,
            _ => ErrorGroupSort::LastSeen,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            ErrorGroupSort::LastSeen => "last_seen",
            ErrorGroupSort::TotalOccurrences => "total_occurrences",
            ErrorGroupSort::UniqueUsers => "unique_users",
            ErrorGroupSort::CreatedAt => "first_seen",
        }
    }
}

pub async fn get_by_fingerprint(pool: &sqlx::PgPool, project_id: i64, fingerprint: &str) -> DbResult<Option<ErrorGroup>> {
    let row = sqlx::query_as::<_, ErrorGroupRow>(
        "SELECT id, project_id, fingerprint, pattern_hash, title, message_template, stack_pattern,
                url_pattern, first_seen, last_seen, total_occurrences, unique_users, status,
                priority, assigned_to, tags, metadata
         FROM error_groups WHERE project_id = $1 AND fingerprint = $2",
    )
    .bind(project_id)
    .bind(fingerprint)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn get_by_id(pool: &sqlx::PgPool, group_id: i64) -> DbResult<ErrorGroup> {
    sqlx::query_as::<_, ErrorGroupRow>(
        "SELECT id, project_id, fingerprint, pattern_hash, title, message_template, stack_pattern,
                url_pattern, first_seen, last_seen, total_occurrences, unique_users, status,
                priority, assigned_to, tags, metadata
         FROM error_groups WHERE id = $1",
    )
    .bind(group_id)
    .fetch_optional(pool)
    .await?
    .map(Into::into)
    .ok_or(DbError::NotFound {
        entity: "error_group",
        id: group_id.to_string(),
    })
}

/// Up to `SIMILARITY_CANDIDATE_LIMIT` same-`pattern_hash` groups, ordered
/// most-recent first (§4.D step 4).
pub async fn similarity_candidates(pool: &sqlx::PgPool, project_id: i64, pattern_hash: &str) -> DbResult<Vec<faultline_core::similarity::SimilarityCandidate>> {
    let rows = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
        "SELECT id, message_template, last_seen FROM error_groups
         WHERE project_id = $1 AND pattern_hash = $2
         ORDER BY last_seen DESC
         LIMIT $3",
    )
    .bind(project_id)
    .bind(pattern_hash)
    .bind(faultline_types::SIMILARITY_CANDIDATE_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(group_id, message_template, last_seen)| faultline_core::similarity::SimilarityCandidate {
            group_id,
            message_template,
            last_seen,
        })
        .collect())
}

/// Inserts a brand-new group. On a unique-constraint race, returns
/// `DbError::Conflict` rather than propagating the raw Postgres error, so
/// callers can branch on it directly (§4.D step 6).
pub async fn insert_new(pool: &sqlx::PgPool, project_id: i64, fp: &Fingerprint, seen_at: DateTime<Utc>) -> DbResult<ErrorGroup> {
    let result = sqlx::query_as::<_, ErrorGroupRow>(
        "INSERT INTO error_groups
            (project_id, fingerprint, pattern_hash, title, message_template, stack_pattern,
             url_pattern, first_seen, last_seen, total_occurrences, unique_users)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, 1, 0)
         RETURNING id, project_id, fingerprint, pattern_hash, title, message_template, stack_pattern,
                   url_pattern, first_seen, last_seen, total_occurrences, unique_users, status,
                   priority, assigned_to, tags, metadata",
    )
    .bind(project_id)
    .bind(&fp.fingerprint)
    .bind(&fp.pattern_hash)
    .bind(&fp.title)
    .bind(&fp.normalized_message)
    .bind(&fp.normalized_stack)
    .bind(&fp.url_pattern)
    .bind(seen_at)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(row.into()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(DbError::Conflict("error_groups(project_id, fingerprint)")),
        Err(e) => Err(e.into()),
    }
}

/// Attaches one more occurrence to an existing group (§4.D steps 3/5):
/// bumps `last_seen`/`total_occurrences`, optionally `unique_users`, and
/// replaces `metadata` wholesale (the caller computes the new value via
/// `append_similar_fingerprint`, or passes the unchanged value through).
pub async fn attach_occurrence(
    pool: &sqlx::PgPool,
    group_id: i64,
    seen_at: DateTime<Utc>,
    bump_unique_users: bool,
    metadata: Option<&serde_json::Value>,
) -> DbResult<ErrorGroup> {
    let row = sqlx::query_as::<_, ErrorGroupRow>(
        "UPDATE error_groups
         SET last_seen = GREATEST(last_seen, $2),
             total_occurrences = total_occurrences + 1,
             unique_users = unique_users + CASE WHEN $3 THEN 1 ELSE 0 END,
             metadata = COALESCE($4, metadata)
         WHERE id = $1
         RETURNING id, project_id, fingerprint, pattern_hash, title, message_template, stack_pattern,
                   url_pattern, first_seen, last_seen, total_occurrences, unique_users, status,
                   priority, assigned_to, tags, metadata",
    )
    .bind(group_id)
    .bind(seen_at)
    .bind(bump_unique_users)
    .bind(metadata)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound {
        entity: "error_group",
        id: group_id.to_string(),
    })?;
    Ok(row.into())
}

pub async fn patch(pool: &sqlx::PgPool, group_id: i64, patch: &ErrorGroupPatch) -> DbResult<ErrorGroup> {
    let row = sqlx::query_as::<_, ErrorGroupRow>(
        "UPDATE error_groups
         SET status = COALESCE($2, status),
             priority = COALESCE($3, priority),
             assigned_to = COALESCE($4, assigned_to),
             tags = COALESCE($5::text[], tags),
             metadata = CASE WHEN $6::text IS NOT NULL
                             THEN jsonb_set(metadata, '{resolution_notes}', to_jsonb($6::text))
                             ELSE metadata END
         WHERE id = $1
         RETURNING id, project_id, fingerprint, pattern_hash, title, message_template, stack_pattern,
                   url_pattern, first_seen, last_seen, total_occurrences, unique_users, status,
                   priority, assigned_to, tags, metadata",
    )
    .bind(group_id)
    .bind(patch.status.map(|s| s.as_str()))
    .bind(patch.priority.map(|p| p.as_str()))
    .bind(&patch.assigned_to)
    .bind(&patch.tags)
    .bind(&patch.resolution_notes)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound {
        entity: "error_group",
        id: group_id.to_string(),
    })?;
    Ok(row.into())
}

pub async fn list(
    pool: &sqlx::PgPool,
    project_id: i64,
    filter: &ErrorGroupFilter,
    sort: ErrorGroupSort,
    order: SortOrder,
    page_req: PageRequest,
) -> DbResult<Page<ErrorGroup>> {
    let sql = format!(
        "SELECT id, project_id, fingerprint, pattern_hash, title, message_template, stack_pattern,
                url_pattern, first_seen, last_seen, total_occurrences, unique_users, status,
                priority, assigned_to, tags, metadata
         FROM error_groups
         WHERE project_id = $1
           AND ($2::text IS NULL OR status = $2)
           AND ($3::text IS NULL OR priority = $3)
           AND ($4::text IS NULL OR assigned_to = $4)
           AND ($5::text IS NULL OR title ILIKE '%' || $5 || '%' OR message_template ILIKE '%' || $5 || '%')
         ORDER BY {} {}
         LIMIT $6 OFFSET $7",
        sort.column(),
        order.as_sql()
    );
    let rows = sqlx::query_as::<_, ErrorGroupRow>(&sql)
        .bind(project_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.priority.map(|p| p.as_str()))
        .bind(&filter.assigned_to)
        .bind(&filter.search)
        .bind(page_req.limit)
        .bind(page_req.offset())
        .fetch_all(pool)
        .await?;

    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM error_groups
         WHERE project_id = $1
           AND ($2::text IS NULL OR status = $2)
           AND ($3::text IS NULL OR priority = $3)
           AND ($4::text IS NULL OR assigned_to = $4)
           AND ($5::text IS NULL OR title ILIKE '%' || $5 || '%' OR message_template ILIKE '%' || $5 || '%')",
    )
    .bind(project_id)
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.priority.map(|p| p.as_str()))
    .bind(&filter.assigned_to)
    .bind(&filter.search)
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
struct ErrorGroupRow {
    id: i64,
    project_id: i64,
    fingerprint: String,
    pattern_hash: String,
    title: String,
    message_template: String,
    stack_pattern: Option<String>,
    url_pattern: Option<String>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    total_occurrences: i64,
    unique_users: i64,
    status: String,
    priority: String,
    assigned_to: Option<String>,
    tags: Vec<String>,
    metadata: serde_json::Value,
}

impl From<ErrorGroupRow> for ErrorGroup {
    fn from(row: ErrorGroupRow) -> Self {
        ErrorGroup {
            id: row.id,
            project_id: row.project_id,
            fingerprint: row.fingerprint,
            pattern_hash: row.pattern_hash,
            title: row.title,
            message_template: row.message_template,
            stack_pattern: row.stack_pattern,
            url_pattern: row.url_pattern,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
            total_occurrences: row.total_occurrences,
            unique_users: row.unique_users,
            status: ErrorGroupStatus::parse(&row.status).unwrap_or_default(),
            priority: ErrorGroupPriority::parse(&row.priority).unwrap_or_default(),
            assigned_to: row.assigned_to,
            tags: row.tags,
            metadata: row.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{projects, test_pool};
    use faultline_core::fingerprint::{ErrorInput, Fingerprinter};

    async fn seed_project(pool: &sqlx::PgPool) -> i64 {
        projects::insert(pool, "acme", &format!("sk-{}", uuid::Uuid::new_v4())).await.unwrap().id
    }

    #[tokio::test]
    async fn insert_new_then_conflict_on_same_fingerprint() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        let fp = Fingerprinter::compute(&ErrorInput { message: "boom", ..Default::default() });
        let now = Utc::now();

        insert_new(db.pool(), project_id, &fp, now).await.unwrap();
        let result = insert_new(db.pool(), project_id, &fp, now).await;
        assert!(matches!(result, Err(DbError::Conflict(_))));
    }

    #[tokio::test]
    async fn attach_occurrence_bumps_counts_and_last_seen() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        let fp = Fingerprinter::compute(&ErrorInput { message: "boom", ..Default::default() });
        let t0 = Utc::now();
        let group = insert_new(db.pool(), project_id, &fp, t0).await.unwrap();

        let t1 = t0 + chrono::Duration::seconds(60);
        let updated = attach_occurrence(db.pool(), group.id, t1, true, None).await.unwrap();
        assert_eq!(updated.total_occurrences, 2);
        assert_eq!(updated.unique_users, 1);
        assert_eq!(updated.last_seen, t1);
        assert_eq!(updated.first_seen, t0);
    }

    #[tokio::test]
    async fn patch_updates_status_and_priority() {
        let db = test_pool().await;
        let project_id = seed_project(db.pool()).await;
        let fp = Fingerprinter::compute(&ErrorInput { message: "boom", ..Default::default() });
        let group = insert_new(db.pool(), project_id, &fp, Utc::now()).await.unwrap();

        let patched = patch(
            db.pool(),
            group.id,
            &ErrorGroupPatch {
                status: Some(ErrorGroupStatus::Resolved),
                priority: Some(ErrorGroupPriority::Critical),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(patched.status, ErrorGroupStatus::Resolved);
        assert_eq!(patched.priority, ErrorGroupPriority::Critical);
    }
}
