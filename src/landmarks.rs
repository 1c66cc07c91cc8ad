//! Landmark hasher (C4): pairs peaks into canonical hash candidates.

use sha1::{Digest, Sha1};
use tracing::debug;

use crate::config::LandmarkConfig;
use crate::peaks::Peak;

/// An anchor/target peak pair before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub t1: u32,
    pub f1: usize,
    pub f2: usize,
    pub dt: u32,
}

/// `(hash, t1)` — the hash is the first 20 hex chars of SHA-1 over
/// `"{f1}|{f2}|{dt}"`. `t1` is carried alongside but is not a hash
/// input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Landmark {
    pub hash: String,
    pub t1: u32,
}

/// Pairs peaks within the fan-out/delta window. Peaks must already be
/// ordered by `(t, f)` ascending. Returns candidates in canonical
/// `(t1, dt, f1, f2)` order, ready for rate limiting.
pub fn generate_candidates(peaks: &[Peak], config: &LandmarkConfig) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for (i, anchor) in peaks.iter().enumerate() {
        let mut emitted = 0usize;
        for target in &peaks[i + 1..] {
            if emitted >= config.fan_value {
                break;
            }
            let dt = target.t as i64 - anchor.t as i64;
            if dt <= 0 {
                continue;
            }
            if dt as u32 > config.max_delta_frames {
                break;
            }
            let bucketed = bucket_dt(dt as u32, config.dt_bucket_frames);
            candidates.push(Candidate {
                t1: anchor.t as u32,
                f1: anchor.f,
                f2: target.f,
                dt: bucketed,
            });
            emitted += 1;
        }
    }

    candidates.sort_by(|a, b| {
        a.t1.cmp(&b.t1)
            .then(a.dt.cmp(&b.dt))
            .then(a.f1.cmp(&b.f1))
            .then(a.f2.cmp(&b.f2))
    });

    debug!(count = candidates.len(), "generated landmark candidates");
    candidates
}

fn bucket_dt(dt: u32, bucket: u32) -> u32 {
    (dt / bucket) * bucket
}

/// SHA-1 over `"{f1}|{f2}|{dt}"`, truncated to 20 hex chars (80 bits).
pub fn hash_candidate(c: &Candidate) -> String {
    let input = format!("{}|{}|{}", c.f1, c.f2, c.dt);
    let digest = Sha1::digest(input.as_bytes());
    let full_hex = hex::encode(digest);
    full_hex[..20].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LandmarkConfig {
        crate::config::Config::default().landmark
    }

    #[test]
    fn test_hash_is_20_lowercase_hex() {
        let c = Candidate { t1: 0, f1: 3, f2: 7, dt: 2 };
        let h = hash_candidate(&c);
        assert_eq!(h.len(), 20);
        assert!(h.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_deterministic_and_order_sensitive() {
        let a = Candidate { t1: 0, f1: 3, f2: 7, dt: 2 };
        let b = Candidate { t1: 0, f1: 7, f2: 3, dt: 2 };
        assert_eq!(hash_candidate(&a), hash_candidate(&a));
        assert_ne!(hash_candidate(&a), hash_candidate(&b));
    }

    #[test]
    fn test_fan_value_caps_emitted_pairs() {
        let config = cfg();
        let peaks: Vec<Peak> = (0..20).map(|t| Peak { f: 1, t, db: 0.0 }).collect();
        let candidates = generate_candidates(&peaks, &config);
        let from_anchor_zero = candidates.iter().filter(|c| c.t1 == 0).count();
        assert!(from_anchor_zero <= config.fan_value);
    }

    #[test]
    fn test_dt_bounds_and_bucketing() {
        let config = cfg();
        let peaks: Vec<Peak> = (0..40).map(|t| Peak { f: 1, t, db: 0.0 }).collect();
        let candidates = generate_candidates(&peaks, &config);
        for c in &candidates {
            assert!(c.dt > 0);
            assert!(c.dt <= config.max_delta_frames);
            assert_eq!(c.dt % config.dt_bucket_frames, 0);
        }
    }

    #[test]
    fn test_canonical_order() {
        let config = cfg();
        let peaks: Vec<Peak> = vec![
            Peak { f: 5, t: 0, db: 0.0 },
            Peak { f: 2, t: 0, db: 0.0 },
            Peak { f: 1, t: 3, db: 0.0 },
        ];
        let candidates = generate_candidates(&peaks, &config);
        let mut sorted = candidates.clone();
        sorted.sort_by(|a, b| {
            a.t1.cmp(&b.t1)
                .then(a.dt.cmp(&b.dt))
                .then(a.f1.cmp(&b.f1))
                .then(a.f2.cmp(&b.f2))
        });
        assert_eq!(candidates, sorted);
    }
}
