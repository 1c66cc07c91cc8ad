//! Index contract (§6): the seam between the core and a persisted store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MatcherConfig;
use crate::error::{CoreError, Result};
use crate::matcher::{query_candidates, Candidate, Posting};
use crate::recording::{MatchStatus, Recording};

/// Abstract inverted-index + recording-status store. Implemented by
/// [`InMemoryIndex`] for tests and [`PgIndex`] for production.
#[async_trait]
pub trait Index: Send + Sync {
    async fn upsert_hash_stats(&self, recording_id: Uuid, counts: &HashMap<String, u32>) -> Result<()>;

    async fn insert_occurrences(
        &self,
        recording_id: Uuid,
        occurrences: &[(String, u32)],
    ) -> Result<()>;

    async fn query_candidates(
        &self,
        query: &[(String, u32)],
        params: &MatcherConfig,
    ) -> Result<Vec<Candidate>>;

    async fn delete_recording(&self, recording_id: Uuid) -> Result<u64>;

    async fn set_status(
        &self,
        recording_id: Uuid,
        status: MatchStatus,
        original_recording_id: Option<Uuid>,
    ) -> Result<()>;

    async fn next_pending(
        &self,
        limit: usize,
        cursor: Option<Uuid>,
    ) -> Result<(Vec<Recording>, Option<Uuid>)>;
}

/// In-process index for unit/integration tests. No network I/O.
#[derive(Default)]
pub struct InMemoryIndex {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    postings: HashMap<String, Vec<Posting>>,
    recordings: HashMap<Uuid, Recording>,
    insertion_order: Vec<Uuid>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, recording: Recording) {
        let mut state = self.inner.lock().unwrap();
        if !state.recordings.contains_key(&recording.id) {
            state.insertion_order.push(recording.id);
        }
        state.recordings.insert(recording.id, recording);
    }
}

#[async_trait]
impl Index for InMemoryIndex {
    async fn upsert_hash_stats(&self, _recording_id: Uuid, _counts: &HashMap<String, u32>) -> Result<()> {
        // Global frequency stats are derived from `postings` directly
        // in this in-memory implementation; no separate table needed.
        Ok(())
    }

    async fn insert_occurrences(
        &self,
        recording_id: Uuid,
        occurrences: &[(String, u32)],
    ) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        for (hash, t_ref) in occurrences {
            state
                .postings
                .entry(hash.clone())
                .or_default()
                .push(Posting { recording_id, t_ref: *t_ref });
        }
        debug!(recording_id = %recording_id, count = occurrences.len(), "inserted occurrences");
        Ok(())
    }

    async fn query_candidates(
        &self,
        query: &[(String, u32)],
        params: &MatcherConfig,
    ) -> Result<Vec<Candidate>> {
        let state = self.inner.lock().unwrap();
        let total_hashes = state.postings.len().max(1);
        let stopword_cutoff = ((total_hashes as f64) * params.ignore_fraction).ceil() as usize;

        let mut by_frequency: Vec<&String> = state.postings.keys().collect();
        by_frequency.sort_by_key(|h| std::cmp::Reverse(state.postings[*h].len()));
        let stopwords: std::collections::HashSet<&str> = by_frequency
            .iter()
            .take(stopword_cutoff)
            .map(|s| s.as_str())
            .collect();

        let candidates = query_candidates(
            query,
            |h| state.postings.get(h).cloned(),
            |h| stopwords.contains(h),
            params,
        );
        Ok(candidates)
    }

    async fn delete_recording(&self, recording_id: Uuid) -> Result<u64> {
        let mut state = self.inner.lock().unwrap();
        let mut removed = 0u64;
        for postings in state.postings.values_mut() {
            let before = postings.len();
            postings.retain(|p| p.recording_id != recording_id);
            removed += (before - postings.len()) as u64;
        }
        state.postings.retain(|_, v| !v.is_empty());
        state.recordings.remove(&recording_id);
        Ok(removed)
    }

    async fn set_status(
        &self,
        recording_id: Uuid,
        status: MatchStatus,
        original_recording_id: Option<Uuid>,
    ) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        if let Some(recording) = state.recordings.get_mut(&recording_id) {
            recording.match_status = status;
            recording.original_recording_id = original_recording_id;
        }
        info!(recording_id = %recording_id, status = status.as_str(), "status updated");
        Ok(())
    }

    async fn next_pending(
        &self,
        limit: usize,
        cursor: Option<Uuid>,
    ) -> Result<(Vec<Recording>, Option<Uuid>)> {
        let state = self.inner.lock().unwrap();
        let start = match cursor {
            Some(c) => state.insertion_order.iter().position(|id| *id == c).map(|i| i + 1).unwrap_or(0),
            None => 0,
        };

        let mut rows = Vec::new();
        for id in state.insertion_order.iter().skip(start) {
            if let Some(recording) = state.recordings.get(id) {
                if recording.match_status == MatchStatus::Pending {
                    rows.push(recording.clone());
                    if rows.len() >= limit {
                        break;
                    }
                }
            }
        }
        let next_cursor = rows.last().map(|r| r.id);
        Ok((rows, next_cursor))
    }
}

/// Postgres-backed index. Schema and stored procedures live in
/// `migrations/`.
pub struct PgIndex {
    pool: PgPool,
}

impl PgIndex {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            CoreError::Database(sqlx::Error::Migrate(Box::new(e)))
        })?;
        Ok(PgIndex { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Index for PgIndex {
    async fn upsert_hash_stats(&self, _recording_id: Uuid, _counts: &HashMap<String, u32>) -> Result<()> {
        // `fingerprint_hashes` counts are maintained by a trigger on
        // `fingerprints` (see migrations); nothing to do here.
        Ok(())
    }

    async fn insert_occurrences(
        &self,
        recording_id: Uuid,
        occurrences: &[(String, u32)],
    ) -> Result<()> {
        const CHUNK_SIZE: usize = 5000;
        let mut tx = self.pool.begin().await?;

        for chunk in occurrences.chunks(CHUNK_SIZE) {
            let hashes: Vec<String> = chunk.iter().map(|(h, _)| h.clone()).collect();
            let t_refs: Vec<i32> = chunk.iter().map(|(_, t)| *t as i32).collect();

            sqlx::query(
                r#"
                INSERT INTO fingerprints (hash, recording_id, t_ref)
                SELECT * FROM UNNEST($1::text[], $2::uuid[], $3::int[])
                ON CONFLICT (hash, recording_id, t_ref) DO NOTHING
                "#,
            )
            .bind(&hashes)
            .bind(vec![recording_id; chunk.len()])
            .bind(&t_refs)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE recordings SET match_status = 'fingerprinted' WHERE id = $1")
            .bind(recording_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(recording_id = %recording_id, count = occurrences.len(), "inserted occurrences");
        Ok(())
    }

    async fn query_candidates(
        &self,
        query: &[(String, u32)],
        params: &MatcherConfig,
    ) -> Result<Vec<Candidate>> {
        let hashes: Vec<String> = query.iter().map(|(h, _)| h.clone()).collect();
        let t_queries: Vec<i32> = query.iter().map(|(_, t)| *t as i32).collect();

        let rows = sqlx::query_as::<_, (Uuid, i32, i64)>(
            "SELECT recording_id, delta, matches FROM find_fingerprint_candidates($1::text[], $2::int[], $3, $4, $5, $6)",
        )
        .bind(&hashes)
        .bind(&t_queries)
        .bind(params.ignore_fraction)
        .bind(params.min_matches as i64)
        .bind(params.max_hits_per_hash as i64)
        .bind(params.limit_candidates as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(recording_id, delta, matches)| Candidate { recording_id, delta, matches: matches as u32 })
            .collect())
    }

    async fn delete_recording(&self, recording_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM fingerprints WHERE recording_id = $1")
            .bind(recording_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_status(
        &self,
        recording_id: Uuid,
        status: MatchStatus,
        original_recording_id: Option<Uuid>,
    ) -> Result<()> {
        let status_value: Option<&str> = match status {
            MatchStatus::Unset => None,
            _ => Some(status.as_str()),
        };

        sqlx::query(
            "UPDATE recordings SET match_status = $2, original_recording_id = $3 WHERE id = $1",
        )
        .bind(recording_id)
        .bind(status_value)
        .bind(original_recording_id)
        .execute(&self.pool)
        .await?;
        info!(recording_id = %recording_id, status = status.as_str(), "status updated");
        Ok(())
    }

    async fn next_pending(
        &self,
        limit: usize,
        cursor: Option<Uuid>,
    ) -> Result<(Vec<Recording>, Option<Uuid>)> {
        let rows = sqlx::query_as::<_, (Uuid, String, Option<i32>, Option<String>, Option<Uuid>)>(
            "SELECT id, external_id, duration_frames, match_status, original_recording_id FROM get_videos_pending_keyset($1, $2)",
        )
        .bind(cursor)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let recordings: Vec<Recording> = rows
            .into_iter()
            .map(|(id, external_id, duration_frames, status, original_id)| Recording {
                id,
                external_id,
                duration_frames: duration_frames.map(|d| d as u32),
                match_status: match status.as_deref() {
                    Some("pending") => MatchStatus::Pending,
                    Some("fingerprinted") => MatchStatus::Fingerprinted,
                    Some("matched") => MatchStatus::Matched,
                    Some("too_short") => MatchStatus::TooShort,
                    Some("flag") => MatchStatus::Flag,
                    None => MatchStatus::Unset,
                    _ => MatchStatus::Pending,
                },
                original_recording_id: original_id,
            })
            .collect();

        let next_cursor = recordings.last().map(|r| r.id);
        Ok((recordings, next_cursor))
    }
}
