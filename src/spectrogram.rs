//! Spectrogram (C2): band-limited log-power STFT.

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;

use crate::config::AudioConfig;

/// `S[f, t]` dB-scale power spectrogram, band-limited to `[fmin, fmax]`.
pub struct Spectrogram {
    pub data: Array2<f32>,
    /// Center frequency in Hz of each retained row.
    pub bin_freqs: Vec<f32>,
}

impl Spectrogram {
    pub fn frame_count(&self) -> usize {
        self.data.ncols()
    }

    pub fn band_bins(&self) -> usize {
        self.data.nrows()
    }
}

const EPSILON: f32 = 1e-10;

/// Computes `|STFT(x)|^2`, Hann-windowed, no centering/padding (frames
/// only where a full window fits), converted to dB and restricted to
/// the configured frequency band.
pub fn compute_spectrogram(signal: &[f32], config: &AudioConfig) -> Spectrogram {
    let n_fft = config.n_fft;
    let hop = config.hop_length;

    if signal.len() < n_fft {
        return Spectrogram {
            data: Array2::zeros((0, 0)),
            bin_freqs: Vec::new(),
        };
    }

    let frame_count = (signal.len() - n_fft) / hop + 1;
    let window = hann_window(n_fft);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);

    let full_bins = n_fft / 2 + 1;
    let freq_resolution = config.sample_rate as f32 / n_fft as f32;
    let band_indices: Vec<usize> = (0..full_bins)
        .filter(|&i| {
            let freq = i as f32 * freq_resolution;
            freq >= config.fmin && freq <= config.fmax
        })
        .collect();
    let bin_freqs: Vec<f32> = band_indices
        .iter()
        .map(|&i| i as f32 * freq_resolution)
        .collect();

    let mut data = Array2::<f32>::zeros((band_indices.len(), frame_count));
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

    for t in 0..frame_count {
        let start = t * hop;
        for i in 0..n_fft {
            buffer[i] = Complex::new(signal[start + i] * window[i], 0.0);
        }
        fft.process(&mut buffer);

        for (row, &bin) in band_indices.iter().enumerate() {
            let power = buffer[bin].norm_sqr();
            let db = 10.0 * (power.max(EPSILON) / 1.0).log10();
            data[[row, t]] = db;
        }
    }

    debug!(frame_count, band_bins = band_indices.len(), "computed spectrogram");

    Spectrogram { data, bin_freqs }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
