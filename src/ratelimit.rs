//! Rate limiter (C5): origin-invariant cap on hashes per rolling window.

use std::collections::VecDeque;

use tracing::debug;

use crate::config::{AudioConfig, LandmarkConfig};
use crate::landmarks::{hash_candidate, Candidate, Landmark};

/// Greedily keeps candidates in canonical order subject to a FIFO cap
/// over the trailing `W = sample_rate / hop` frames, then hashes the
/// survivors and dedupes by `(t1, hash)` preserving first occurrence.
///
/// `candidates` must already be in the canonical `(t1, dt, f1, f2)`
/// order produced by [`crate::landmarks::generate_candidates`].
pub fn limit_and_hash(
    candidates: &[Candidate],
    audio: &AudioConfig,
    landmark: &LandmarkConfig,
) -> Vec<Landmark> {
    let window = (audio.sample_rate as usize / audio.hop_length) as u32;

    let mut window_fifo: VecDeque<u32> = VecDeque::new();
    let mut kept: Vec<&Candidate> = Vec::new();

    for c in candidates {
        while let Some(&front) = window_fifo.front() {
            if c.t1.saturating_sub(front) >= window {
                window_fifo.pop_front();
            } else {
                break;
            }
        }

        if window_fifo.len() < landmark.max_hashes_per_second {
            window_fifo.push_back(c.t1);
            kept.push(c);
        }
    }

    let mut landmarks: Vec<Landmark> = kept
        .into_iter()
        .map(|c| Landmark {
            hash: hash_candidate(c),
            t1: c.t1,
        })
        .collect();

    landmarks.sort_by(|a, b| a.t1.cmp(&b.t1).then(a.hash.cmp(&b.hash)));
    landmarks.dedup_by(|a, b| a.t1 == b.t1 && a.hash == b.hash);

    debug!(count = landmarks.len(), window, "rate-limited fingerprint");
    landmarks
}
