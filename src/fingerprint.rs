//! Fingerprint (C2-C5 orchestration): PCM signal to canonical hash list.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AudioConfig, LandmarkConfig};
use crate::error::Result;
use crate::landmarks::{generate_candidates, Landmark};
use crate::peaks::find_peaks;
use crate::ratelimit::limit_and_hash;
use crate::signal::Signal;
use crate::spectrogram::compute_spectrogram;

/// Canonical, ordered `(hash, t1)` sequence for one recording.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub landmarks: Vec<(String, u32)>,
}

impl Fingerprint {
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

impl From<Vec<Landmark>> for Fingerprint {
    fn from(landmarks: Vec<Landmark>) -> Self {
        Fingerprint {
            landmarks: landmarks.into_iter().map(|l| (l.hash, l.t1)).collect(),
        }
    }
}

/// Runs the full deterministic DSP pipeline (C2-C5) over a decoded
/// signal and produces its fingerprint.
pub fn fingerprint_signal(
    signal: &Signal,
    audio: &AudioConfig,
    landmark: &LandmarkConfig,
) -> Fingerprint {
    let spectrogram = compute_spectrogram(&signal.samples, audio);
    let peaks = find_peaks(&spectrogram, audio);
    let candidates = generate_candidates(&peaks, landmark);
    let landmarks = limit_and_hash(&candidates, audio, landmark);

    debug!(
        frames = spectrogram.frame_count(),
        peaks = peaks.len(),
        landmarks = landmarks.len(),
        "fingerprinted signal"
    );

    landmarks.into()
}
