//! Similarity scoring used by the Grouping Engine's fallback path (§4.D
//! step 4): Jaro-Winkler distance between normalized messages.

pub use faultline_types::{SIMILARITY_CANDIDATE_LIMIT, SIMILARITY_THRESHOLD};

/// A same-`pattern_hash` candidate under consideration for similarity
/// attach.
#[derive(Debug, Clone)]
pub struct SimilarityCandidate {
    pub group_id: i64,
    pub message_template: String,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

/// Scores every candidate and returns the best match at or above
/// `SIMILARITY_THRESHOLD`, ties broken by most recent `last_seen`
/// (§4.D step 4 — the spec's prescribed, previously-ambiguous
/// tie-break rule; see DESIGN.md Open Question 1).
///
/// `candidates` is expected to already be capped at
/// `SIMILARITY_CANDIDATE_LIMIT` and ordered by `last_seen desc` by the
/// caller's storage query; this function re-sorts defensively so it is
/// correct regardless of input order.
pub fn best_match(normalized_message: &str, candidates: &[SimilarityCandidate]) -> Option<(i64, f64)> {
    debug_assert!(candidates.len() <= SIMILARITY_CANDIDATE_LIMIT as usize);

    let mut best: Option<(i64, f64, chrono::DateTime<chrono::Utc>)> = None;
    for c in candidates {
        let score = strsim::jaro_winkler(normalized_message, &c.message_template);
        if score < SIMILARITY_THRESHOLD {
            continue;
        }
        let better = match &best {
            None => true,
            Some((_, best_score, best_last_seen)) => {
                score > *best_score || (score == *best_score && c.last_seen > *best_last_seen)
            }
        };
        if better {
            best = Some((c.group_id, score, c.last_seen));
        }
    }
    best.map(|(id, score, _)| (id, score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn s2_similar_message_attaches_to_existing_group() {
        let now = Utc::now();
        let candidates = vec![SimilarityCandidate {
            group_id: 1,
            message_template: "cannot read property <str> of undefined oldname".to_string(),
            last_seen: now,
        }];
        let result = best_match("cannot read property <str> of undefined newname", &candidates);
        assert!(result.is_some());
        let (id, score) = result.unwrap();
        assert_eq!(id, 1);
        assert!(score >= SIMILARITY_THRESHOLD);
    }

    #[test]
    fn dissimilar_message_does_not_match() {
        let candidates = vec![SimilarityCandidate {
            group_id: 1,
            message_template: "completely unrelated text about networking".to_string(),
            last_seen: Utc::now(),
        }];
        assert!(best_match("typeerror cannot read property", &candidates).is_none());
    }

    #[test]
    fn ties_broken_by_most_recent_last_seen() {
        let now = Utc::now();
        let candidates = vec![
            SimilarityCandidate {
                group_id: 1,
                message_template: "identical text here".to_string(),
                last_seen: now - Duration::hours(2),
            },
            SimilarityCandidate {
                group_id: 2,
                message_template: "identical text here".to_string(),
                last_seen: now,
            },
        ];
        let (id, _) = best_match("identical text here", &candidates).unwrap();
        assert_eq!(id, 2);
    }
}
