//! Matcher (C7): inverted-index lookup + offset-histogram scoring.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::config::MatcherConfig;

/// A scored candidate source recording with an estimated frame offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub recording_id: Uuid,
    pub delta: i32,
    pub matches: u32,
}

/// One posting-list entry: a prior occurrence of a hash in a stored
/// recording at a given reference frame.
#[derive(Debug, Clone, Copy)]
pub struct Posting {
    pub recording_id: Uuid,
    pub t_ref: u32,
}

/// Runs the offset-histogram algorithm against an already-materialized
/// view of the inverted index: for each query hash, its posting list
/// and its global frequency rank.
///
/// `postings_for` returns `None` for hashes that are too common
/// (`|post(h)| > max_hits_per_hash`); `is_stopword` reports whether a
/// hash falls in the top `ignore_fraction` of global frequency.
pub fn query_candidates<F, S>(
    query: &[(String, u32)],
    postings_for: F,
    is_stopword: S,
    params: &MatcherConfig,
) -> Vec<Candidate>
where
    F: Fn(&str) -> Option<Vec<Posting>>,
    S: Fn(&str) -> bool,
{
    let mut counts: HashMap<(Uuid, i32), u32> = HashMap::new();

    for (hash, t_query) in query {
        if is_stopword(hash) {
            continue;
        }
        let Some(postings) = postings_for(hash) else {
            continue;
        };
        if postings.len() > params.max_hits_per_hash {
            continue;
        }
        for posting in postings {
            let delta = posting.t_ref as i64 - *t_query as i64;
            let delta = delta as i32;
            *counts.entry((posting.recording_id, delta)).or_insert(0) += 1;
        }
    }

    let mut candidates: Vec<Candidate> = counts
        .into_iter()
        .filter(|(_, matches)| *matches >= params.min_matches)
        .map(|((recording_id, delta), matches)| Candidate { recording_id, delta, matches })
        .collect();

    candidates.sort_by(|a, b| {
        b.matches
            .cmp(&a.matches)
            .then(a.recording_id.cmp(&b.recording_id))
    });
    candidates.truncate(params.limit_candidates);

    debug!(count = candidates.len(), "matcher produced candidates");
    candidates
}

/// Merges candidates for the same recording whose deltas differ by at
/// most `tolerance` into the top-1 candidate only, summing match
/// counts and keeping the top candidate's delta. Candidates for other
/// recordings and any not within tolerance of the top-1 are untouched.
pub fn merge_close_deltas(candidates: &[Candidate], tolerance: i32) -> Vec<Candidate> {
    let Some((top_idx, _)) = candidates
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| c.matches)
    else {
        return Vec::new();
    };

    let top = candidates[top_idx];
    let mut merged_matches = top.matches;
    let mut rest = Vec::new();

    for (i, c) in candidates.iter().enumerate() {
        if i == top_idx {
            continue;
        }
        if c.recording_id == top.recording_id && (c.delta - top.delta).abs() <= tolerance {
            merged_matches += c.matches;
        } else {
            rest.push(*c);
        }
    }

    let mut result = vec![Candidate { matches: merged_matches, ..top }];
    result.extend(rest);
    result.sort_by(|a, b| {
        b.matches
            .cmp(&a.matches)
            .then(a.recording_id.cmp(&b.recording_id))
    });
    result
}

/// Decision rule: `merged_matches / query_length >= threshold`.
pub fn is_duplicate(merged_matches: u32, query_length: usize, threshold: f64) -> bool {
    if query_length == 0 {
        return false;
    }
    (merged_matches as f64 / query_length as f64) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MatcherConfig {
        crate::config::Config::default().matcher
    }

    #[test]
    fn test_self_match() {
        let params = cfg();
        let rid = Uuid::new_v4();
        let query: Vec<(String, u32)> = (0..20).map(|i| (format!("h{i}"), i)).collect();

        let postings: HashMap<String, Vec<Posting>> = query
            .iter()
            .map(|(h, t)| (h.clone(), vec![Posting { recording_id: rid, t_ref: *t }]))
            .collect();

        let candidates = query_candidates(
            &query,
            |h| postings.get(h).cloned(),
            |_| false,
            &params,
        );

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].recording_id, rid);
        assert_eq!(candidates[0].delta, 0);
        assert_eq!(candidates[0].matches, query.len() as u32);
    }

    #[test]
    fn test_monotonicity() {
        let params = cfg();
        let rid = Uuid::new_v4();

        let small_query: Vec<(String, u32)> = (0..8).map(|i| (format!("h{i}"), i)).collect();
        let large_query: Vec<(String, u32)> = (0..16).map(|i| (format!("h{i}"), i)).collect();

        let postings: HashMap<String, Vec<Posting>> = large_query
            .iter()
            .map(|(h, t)| (h.clone(), vec![Posting { recording_id: rid, t_ref: *t }]))
            .collect();

        let small_result = query_candidates(&small_query, |h| postings.get(h).cloned(), |_| false, &params);
        let large_result = query_candidates(&large_query, |h| postings.get(h).cloned(), |_| false, &params);

        let small_matches = small_result.iter().find(|c| c.delta == 0).map(|c| c.matches).unwrap_or(0);
        let large_matches = large_result.iter().find(|c| c.delta == 0).map(|c| c.matches).unwrap_or(0);
        assert!(large_matches >= small_matches);
    }

    #[test]
    fn test_too_common_hash_is_dropped() {
        let mut params = cfg();
        params.max_hits_per_hash = 2;
        let rid = Uuid::new_v4();
        let query = vec![("common".to_string(), 0u32)];

        let postings = vec![
            Posting { recording_id: rid, t_ref: 0 },
            Posting { recording_id: Uuid::new_v4(), t_ref: 0 },
            Posting { recording_id: Uuid::new_v4(), t_ref: 0 },
        ];

        let candidates = query_candidates(&query, |_| Some(postings.clone()), |_| false, &params);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_stopword_hash_is_dropped() {
        let params = cfg();
        let rid = Uuid::new_v4();
        let query = vec![("stop".to_string(), 0u32)];
        let postings = vec![Posting { recording_id: rid, t_ref: 0 }];

        let candidates = query_candidates(&query, |_| Some(postings.clone()), |_| true, &params);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_tie_break_by_recording_id() {
        let params = cfg();
        let mut ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        ids.sort();

        let candidates = vec![
            Candidate { recording_id: ids[1], delta: 0, matches: 10 },
            Candidate { recording_id: ids[0], delta: 0, matches: 10 },
        ];
        let mut sorted = candidates.clone();
        sorted.sort_by(|a, b| b.matches.cmp(&a.matches).then(a.recording_id.cmp(&b.recording_id)));
        assert_eq!(sorted[0].recording_id, ids[0]);
        let _ = params;
    }

    #[test]
    fn test_merge_close_deltas_merges_into_top1_only() {
        let rid = Uuid::new_v4();
        let other = Uuid::new_v4();
        let candidates = vec![
            Candidate { recording_id: rid, delta: 100, matches: 20 },
            Candidate { recording_id: rid, delta: 101, matches: 5 },
            Candidate { recording_id: rid, delta: 50, matches: 8 },
            Candidate { recording_id: other, delta: 100, matches: 6 },
        ];

        let merged = merge_close_deltas(&candidates, 1);
        let top = merged.iter().find(|c| c.recording_id == rid && c.delta == 100).unwrap();
        assert_eq!(top.matches, 25);

        assert!(merged.iter().any(|c| c.recording_id == rid && c.delta == 50));
        assert!(merged.iter().any(|c| c.recording_id == other));
    }

    #[test]
    fn test_decision_rule_threshold() {
        assert!(is_duplicate(10, 100, 0.10));
        assert!(!is_duplicate(9, 100, 0.10));
        assert!(!is_duplicate(10, 0, 0.10));
    }
}
