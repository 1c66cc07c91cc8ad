//! Segment selector (C6): length-adaptive sampling of a fingerprint.

use tracing::debug;

use crate::config::{SegmentAnchor, SegmentConfig};
use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    pub length: usize,
    pub segments: usize,
    pub hashes_per_segment: usize,
    pub coverage_pct: f64,
}

/// Returns a bounded representative subsequence of `fingerprint`
/// (preserving source order) plus a report describing how it was
/// sampled.
pub fn select_segments(fingerprint: &Fingerprint, config: &SegmentConfig) -> (Fingerprint, SegmentInfo) {
    let l = fingerprint.len();

    if l < config.full_fingerprint_threshold {
        return (
            fingerprint.clone(),
            SegmentInfo {
                length: l,
                segments: 1,
                hashes_per_segment: l,
                coverage_pct: 1.0,
            },
        );
    }

    let (per_segment, coverage, smin, smax) = interpolate(l as f64, &config.anchors);

    let per_segment = per_segment as usize;
    let sections = ((l as f64 * coverage / per_segment as f64).ceil())
        .clamp(smin, smax) as usize;

    let mut sampled = Vec::with_capacity(sections * per_segment);
    let stride = l / sections;
    for i in 0..sections {
        let start = i * stride;
        let end = (start + per_segment).min(l);
        if start >= l {
            break;
        }
        sampled.extend_from_slice(&fingerprint.landmarks[start..end]);
    }

    let length = sections * per_segment;

    debug!(
        length = l,
        segments = sections,
        hashes_per_segment = per_segment,
        "selected segments"
    );

    (
        Fingerprint { landmarks: sampled },
        SegmentInfo {
            length,
            segments: sections,
            hashes_per_segment: per_segment,
            coverage_pct: length as f64 / l as f64,
        },
    )
}

/// Piecewise interpolation between anchor rows: linear for
/// `coverage`/`smin`/`smax`, square-root for `per_segment`. Values at
/// or beyond the final anchor clamp to that anchor's row.
fn interpolate(l: f64, anchors: &[SegmentAnchor]) -> (f64, f64, f64, f64) {
    let first = anchors.first().expect("segment anchor table must be non-empty");
    if l <= first.length {
        return (first.per_segment, first.coverage, first.min_sections, first.max_sections);
    }

    let last = anchors.last().expect("segment anchor table must be non-empty");
    if l >= last.length {
        return (last.per_segment, last.coverage, last.min_sections, last.max_sections);
    }

    for window in anchors.windows(2) {
        let (lo, hi) = (&window[0], &window[1]);
        if l >= lo.length && l <= hi.length {
            let frac = (l - lo.length) / (hi.length - lo.length);
            let per_segment = sqrt_lerp(lo.per_segment, hi.per_segment, frac);
            let coverage = lerp(lo.coverage, hi.coverage, frac);
            let smin = lerp(lo.min_sections, hi.min_sections, frac);
            let smax = lerp(lo.max_sections, hi.max_sections, frac);
            return (per_segment, coverage, smin, smax);
        }
    }

    (last.per_segment, last.coverage, last.min_sections, last.max_sections)
}

fn lerp(a: f64, b: f64, frac: f64) -> f64 {
    a + (b - a) * frac
}

fn sqrt_lerp(a: f64, b: f64, frac: f64) -> f64 {
    a + frac.sqrt() * (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn fp_of_length(l: usize) -> Fingerprint {
        Fingerprint {
            landmarks: (0..l).map(|i| (format!("{:020x}", i), i as u32)).collect(),
        }
    }

    #[test]
    fn test_small_fingerprint_returned_whole() {
        let config = Config::default().segment;
        let fp = fp_of_length(500);
        let (selected, info) = select_segments(&fp, &config);
        assert_eq!(selected.len(), 500);
        assert_eq!(info.segments, 1);
        assert_eq!(info.coverage_pct, 1.0);
    }

    #[test]
    fn test_large_fingerprint_bounds() {
        let config = Config::default().segment;
        let fp = fp_of_length(20_000);
        let (selected, info) = select_segments(&fp, &config);

        let (_, _, smin, smax) = interpolate(20_000.0, &config.anchors);
        assert!(info.segments as f64 >= smin);
        assert!(info.segments as f64 <= smax);
        assert!(selected.len() <= info.segments * info.hashes_per_segment);
    }

    #[test]
    fn test_windows_do_not_overlap() {
        let config = Config::default().segment;
        let fp = fp_of_length(60_000);
        let (selected, info) = select_segments(&fp, &config);
        assert!(selected.len() <= info.segments * info.hashes_per_segment);

        let t1s: Vec<u32> = selected.landmarks.iter().map(|(_, t)| *t).collect();
        for pair in t1s.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn test_beyond_final_anchor_clamps() {
        let config = Config::default().segment;
        let (per_segment, coverage, smin, smax) = interpolate(500_000.0, &config.anchors);
        let last = config.anchors.last().unwrap();
        assert_eq!(per_segment, last.per_segment);
        assert_eq!(coverage, last.coverage);
        assert_eq!(smin, last.min_sections);
        assert_eq!(smax, last.max_sections);
    }
}
