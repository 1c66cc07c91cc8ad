//! Ingest/match driver (C8): orchestrates C1-C7 and applies the
//! accept/reject policy against a persisted store.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::fingerprint::{fingerprint_signal, Fingerprint};
use crate::index::Index;
use crate::matcher::{is_duplicate, merge_close_deltas};
use crate::recording::{MatchStatus, Recording};
use crate::segment::select_segments;
use crate::signal::Signal;

/// Owns a temporary decoded-audio path and unlinks it on every exit,
/// including a panic unwound through `Drop`. The collaborator layer
/// (media acquisition) creates one of these around the path it
/// downloads to before handing it to [`Signal::from_path`].
pub struct TempFileGuard {
    path: std::path::PathBuf,
}

impl TempFileGuard {
    pub fn new(path: std::path::PathBuf) -> Self {
        TempFileGuard { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to unlink temp file");
            }
        }
    }
}

/// Orchestrates the fingerprint-and-match pipeline over an abstract
/// [`Index`], bounding concurrency with a semaphore-sized worker pool.
pub struct Driver<I: Index> {
    config: Config,
    index: Arc<I>,
}

impl<I: Index + 'static> Driver<I> {
    pub fn new(config: Config, index: Arc<I>) -> Self {
        Driver { config, index }
    }

    /// Runs the whole pipeline for one recording and applies the
    /// pending → {fingerprinted | matched | too_short | flag | unset}
    /// transition. Idempotent with respect to `recording.id`.
    pub async fn process_one(
        &self,
        recording: &Recording,
        signal: &Signal,
        cancel: &CancellationToken,
    ) -> Result<MatchStatus> {
        if cancel.is_cancelled() {
            self.index.set_status(recording.id, MatchStatus::Unset, None).await?;
            return Err(CoreError::Cancelled);
        }

        let fingerprint = fingerprint_signal(signal, &self.config.audio, &self.config.landmark);

        if fingerprint.len() < self.config.worker.too_short_frames {
            info!(recording_id = %recording.id, len = fingerprint.len(), "too short");
            self.index.set_status(recording.id, MatchStatus::TooShort, None).await?;
            return Ok(MatchStatus::TooShort);
        }

        if cancel.is_cancelled() {
            self.index.set_status(recording.id, MatchStatus::Unset, None).await?;
            return Err(CoreError::Cancelled);
        }

        let (query, _info) = select_segments(&fingerprint, &self.config.segment);
        let decision = self.try_match(recording.id, &query).await?;

        match decision {
            Some(original_id) => {
                info!(recording_id = %recording.id, original_id = %original_id, "matched");
                self.index
                    .set_status(recording.id, MatchStatus::Matched, Some(original_id))
                    .await?;
                Ok(MatchStatus::Matched)
            }
            None => {
                self.insert_with_retry(recording.id, &fingerprint).await?;
                info!(recording_id = %recording.id, "fingerprinted");
                Ok(MatchStatus::Fingerprinted)
            }
        }
    }

    async fn try_match(&self, recording_id: Uuid, query: &Fingerprint) -> Result<Option<Uuid>> {
        let candidates = self
            .index
            .query_candidates(&query.landmarks, &self.config.matcher)
            .await?;

        if candidates.is_empty() {
            return Ok(None);
        }

        let merged = merge_close_deltas(&candidates, self.config.matcher.merge_delta_tolerance);
        let Some(top) = merged.first() else {
            return Ok(None);
        };

        if top.recording_id == recording_id {
            return Ok(None);
        }

        if is_duplicate(top.matches, query.len(), self.config.matcher.duplicate_ratio_threshold) {
            Ok(Some(top.recording_id))
        } else {
            Ok(None)
        }
    }

    async fn insert_with_retry(&self, recording_id: Uuid, fingerprint: &Fingerprint) -> Result<()> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.config.worker.backoff_initial_ms),
            max_interval: Duration::from_millis(self.config.worker.backoff_max_ms),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let mut attempt = 0u32;
        loop {
            let result = self
                .index
                .insert_occurrences(recording_id, &fingerprint.landmarks)
                .await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.worker.max_index_retries => {
                    attempt += 1;
                    let delay = backoff.next_backoff().unwrap_or(Duration::from_millis(self.config.worker.backoff_max_ms));
                    warn!(recording_id = %recording_id, attempt, error = %e, "retrying transient index error");
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    error!(recording_id = %recording_id, error = %e, "exhausted retries, flagging");
                    self.index.set_status(recording_id, MatchStatus::Flag, None).await?;
                    return Err(e);
                }
                Err(e) => {
                    error!(recording_id = %recording_id, error = %e, "index error, flagging");
                    self.index.set_status(recording_id, MatchStatus::Flag, None).await?;
                    return Err(e);
                }
            }
        }
    }

    /// Pulls a batch of pending recordings and runs a bounded worker
    /// pool over them. Each item's signal is produced by `load`.
    /// Returns the advanced cursor.
    pub async fn process_pending<F, Fut>(
        &self,
        limit: usize,
        cursor: Option<Uuid>,
        load: F,
        cancel: CancellationToken,
    ) -> Result<Option<Uuid>>
    where
        F: Fn(Recording) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Signal>> + Send,
        I: Sync,
    {
        let (batch, next_cursor) = self.index.next_pending(limit, cursor).await?;
        let semaphore = Arc::new(Semaphore::new(self.config.worker.pool_size));
        let load = Arc::new(load);

        let mut handles = Vec::with_capacity(batch.len());
        for recording in batch {
            if cancel.is_cancelled() {
                break;
            }
            let permit = semaphore.clone().acquire_owned().await.map_err(|_| CoreError::Cancelled)?;
            let load = load.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                match load(recording.clone()).await {
                    Ok(_signal) => Ok((recording, _signal)),
                    Err(e) => Err((recording.id, e)),
                }
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok((recording, signal))) => {
                    if let Err(e) = self.process_one(&recording, &signal, &cancel).await {
                        if !matches!(e, CoreError::Cancelled) {
                            warn!(recording_id = %recording.id, error = %e, "processing failed");
                        }
                    }
                }
                Ok(Err((recording_id, e))) => {
                    warn!(recording_id = %recording_id, error = %e, "load failed, flagging");
                    let _ = self.index.set_status(recording_id, MatchStatus::Flag, None).await;
                }
                Err(join_err) => {
                    error!(error = %join_err, "worker task panicked");
                }
            }
        }

        Ok(next_cursor)
    }
}
