//! Signal loader (C1): decode + downmix + resample to a fixed mono rate.

use std::fs::File;
use std::io::Read as IoRead;
use std::path::Path;

use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Decoded, downmixed, resampled mono signal at a fixed sample rate.
#[derive(Debug, Clone)]
pub struct Signal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Signal {
    /// Build a signal from already-decoded interleaved PCM at its
    /// native sample rate and channel count. This is the path the DSP
    /// pipeline is tested against; `from_reader`/`from_path` both
    /// funnel into it after decoding.
    pub fn from_samples(
        interleaved: &[f32],
        channels: usize,
        source_rate: u32,
        target_rate: u32,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(CoreError::Decode("zero audio channels".to_string()));
        }
        let mono = downmix(interleaved, channels);
        debug!(samples = mono.len(), source_rate, "downmixed to mono");

        let samples = if source_rate == target_rate {
            mono
        } else {
            resample(&mono, source_rate, target_rate)?
        };
        debug!(samples = samples.len(), target_rate, "resampled");

        Ok(Signal {
            samples,
            sample_rate: target_rate,
        })
    }

    /// Decode a compressed container/codec byte stream (mp3/ogg/wav/
    /// flac/m4a) and produce a mono signal at `target_rate`.
    pub fn from_reader<R: IoRead + Send + Sync + 'static>(
        reader: R,
        extension_hint: Option<&str>,
        target_rate: u32,
    ) -> Result<Self> {
        let mss = MediaSourceStream::new(
            Box::new(ReadSource(reader)),
            Default::default(),
        );

        let mut hint = Hint::new();
        if let Some(ext) = extension_hint {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| CoreError::Decode(e.to_string()))?;

        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
            .ok_or_else(|| CoreError::Decode("no decodable track found".to_string()))?
            .clone();

        let source_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| CoreError::Decode("unknown source sample rate".to_string()))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| CoreError::Decode(e.to_string()))?;

        let mut interleaved: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(e) => return Err(CoreError::Decode(e.to_string())),
            };
            if packet.track_id() != track.id {
                continue;
            }
            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut sample_buf =
                        SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(decoded);
                    interleaved.extend_from_slice(sample_buf.samples());
                }
                Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
                Err(e) => return Err(CoreError::Decode(e.to_string())),
            }
        }

        Self::from_samples(&interleaved, channels, source_rate, target_rate)
    }

    pub fn from_path<P: AsRef<Path>>(path: P, target_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let extension = path.extension().and_then(|e| e.to_str());
        Self::from_reader(file, extension, target_rate)
    }
}

struct ReadSource<R: IoRead + Send + Sync>(R);

impl<R: IoRead + Send + Sync> IoRead for ReadSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: IoRead + Send + Sync> symphonia::core::io::MediaSource for ReadSource<R> {
    fn is_seekable(&self) -> bool {
        false
    }
    fn byte_len(&self) -> Option<u64> {
        None
    }
}

impl<R: IoRead + Send + Sync> std::io::Seek for ReadSource<R> {
    fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "stream is not seekable",
        ))
    }
}

/// Average interleaved channels down to mono.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Deterministic polyphase resampling via a sinc-windowed filter.
fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let params = InterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: InterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| CoreError::Decode(e.to_string()))?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .map_err(|e| CoreError::Decode(e.to_string()))?;

    Ok(output.into_iter().next().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let interleaved = vec![1.0, 3.0, 2.0, 4.0];
        let mono = downmix(&interleaved, 2);
        assert_eq!(mono, vec![2.0, 3.0]);
    }

    #[test]
    fn test_from_samples_same_rate_is_noop() {
        let samples = vec![0.1_f32, 0.2, 0.3, 0.4];
        let signal = Signal::from_samples(&samples, 1, 16_000, 16_000).unwrap();
        assert_eq!(signal.samples, samples);
        assert_eq!(signal.sample_rate, 16_000);
    }

    #[test]
    fn test_from_samples_rejects_zero_channels() {
        let samples = vec![0.1_f32; 10];
        let err = Signal::from_samples(&samples, 0, 16_000, 16_000).unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
    }

    #[test]
    fn test_resample_changes_length() {
        let samples: Vec<f32> = (0..1000)
            .map(|i| (i as f32 * 0.01).sin())
            .collect();
        let resampled = resample(&samples, 44_100, 16_000).unwrap();
        assert!(!resampled.is_empty());
        assert!(resampled.len() < samples.len());
    }
}
