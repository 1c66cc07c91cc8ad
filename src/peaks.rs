//! Peak picker (C3): local maxima over a rectangular neighborhood.

use tracing::debug;

use crate::config::AudioConfig;
use crate::spectrogram::Spectrogram;

/// A local-maximum bin: zero-based band-relative frequency index,
/// frame index, and dB power.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub f: usize,
    pub t: usize,
    pub db: f32,
}

const TIE_EPSILON: f32 = 1e-6;

/// Quantizes to one decimal place, max-filters with nearest-edge
/// reflection padding, and emits every bin within `TIE_EPSILON` of its
/// neighborhood maximum and above the dB floor. Returns peaks ordered
/// by `(t, f)` ascending.
pub fn find_peaks(spec: &Spectrogram, config: &AudioConfig) -> Vec<Peak> {
    let bands = spec.band_bins();
    let frames = spec.frame_count();
    if bands == 0 || frames == 0 {
        return Vec::new();
    }

    let quantized: Vec<f32> = spec.data.iter().map(|&v| round1(v)).collect();
    let at = |f: usize, t: usize| quantized[f * frames + t];

    let half_f = config.peak_neighborhood_freq / 2;
    let half_t = config.peak_neighborhood_time / 2;

    let mut peaks = Vec::new();
    for t in 0..frames {
        for f in 0..bands {
            let center = at(f, t);
            if center <= config.peak_threshold_db {
                continue;
            }

            let mut neighborhood_max = f32::MIN;
            for df in 0..config.peak_neighborhood_freq {
                let nf = reflect_index(f as isize + df as isize - half_f as isize, bands);
                for dt in 0..config.peak_neighborhood_time {
                    let nt = reflect_index(t as isize + dt as isize - half_t as isize, frames);
                    let v = at(nf, nt);
                    if v > neighborhood_max {
                        neighborhood_max = v;
                    }
                }
            }

            if center >= neighborhood_max - TIE_EPSILON {
                peaks.push(Peak { f, t, db: center });
            }
        }
    }

    peaks.sort_by(|a, b| a.t.cmp(&b.t).then(a.f.cmp(&b.f)));
    debug!(count = peaks.len(), "picked peaks");
    peaks
}

fn round1(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

/// Nearest-edge reflection: indices past the boundary mirror back in,
/// matching `scipy.ndimage.maximum_filter(mode="nearest")` semantics
/// (clamp, not bounce, since the edge sample repeats).
fn reflect_index(i: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    if i < 0 {
        0
    } else if i as usize >= len {
        len - 1
    } else {
        i as usize
    }
}
