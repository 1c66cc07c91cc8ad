//! End-to-end pipeline tests against an in-memory index: decode → fingerprint
//! → segment → match, without needing a live Postgres instance.

use std::sync::Arc;

use castprint_core::config::Config;
use castprint_core::driver::Driver;
use castprint_core::index::InMemoryIndex;
use castprint_core::recording::{MatchStatus, Recording};
use castprint_core::signal::Signal;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn wav_bytes_for_sine(freq: f32, seconds: f32, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut buffer, spec).unwrap();
        let n = (seconds * sample_rate as f32) as usize;
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let sample = (2.0 * std::f32::consts::PI * freq * t).sin();
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    buffer.into_inner()
}

#[tokio::test]
async fn test_wav_decode_then_fingerprint_self_match() {
    let config = Config::default();
    // Long enough that the landmark count clears `too_short_frames`
    // (10_000 at the default 40 hashes/sec cap) with margin.
    let wav = wav_bytes_for_sine(1000.0, 300.0, config.audio.sample_rate);

    let signal = Signal::from_reader(std::io::Cursor::new(wav), Some("wav"), config.audio.sample_rate)
        .expect("decode should succeed");
    assert!(!signal.samples.is_empty());

    let index = Arc::new(InMemoryIndex::new());
    let driver = Driver::new(config, index.clone());
    let cancel = CancellationToken::new();

    let original = Recording::new(Uuid::new_v4(), "original");
    index.register(original.clone());
    let status = driver.process_one(&original, &signal, &cancel).await.unwrap();
    assert_eq!(status, MatchStatus::Fingerprinted);

    let duplicate = Recording::new(Uuid::new_v4(), "duplicate");
    index.register(duplicate.clone());
    let status = driver.process_one(&duplicate, &signal, &cancel).await.unwrap();
    assert_eq!(status, MatchStatus::Matched);
}

#[tokio::test]
async fn test_distinct_recordings_do_not_match() {
    let config = Config::default();
    let index = Arc::new(InMemoryIndex::new());
    let driver = Driver::new(config.clone(), index.clone());
    let cancel = CancellationToken::new();

    // Long enough that the landmark count clears `too_short_frames`
    // (10_000 at the default 40 hashes/sec cap) with margin.
    let sine_a = Signal {
        samples: (0..(config.audio.sample_rate as usize * 300))
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / config.audio.sample_rate as f32).sin())
            .collect(),
        sample_rate: config.audio.sample_rate,
    };
    let sine_b = Signal {
        samples: (0..(config.audio.sample_rate as usize * 300))
            .map(|i| (2.0 * std::f32::consts::PI * 2700.0 * i as f32 / config.audio.sample_rate as f32).sin())
            .collect(),
        sample_rate: config.audio.sample_rate,
    };

    let rec_a = Recording::new(Uuid::new_v4(), "a");
    index.register(rec_a.clone());
    assert_eq!(
        driver.process_one(&rec_a, &sine_a, &cancel).await.unwrap(),
        MatchStatus::Fingerprinted
    );

    let rec_b = Recording::new(Uuid::new_v4(), "b");
    index.register(rec_b.clone());
    assert_eq!(
        driver.process_one(&rec_b, &sine_b, &cancel).await.unwrap(),
        MatchStatus::Fingerprinted
    );
}

#[tokio::test]
async fn test_process_pending_batches_through_worker_pool() {
    let config = Config::default();
    let index = Arc::new(InMemoryIndex::new());

    let recordings: Vec<Recording> = (0..3)
        .map(|i| Recording::new(Uuid::new_v4(), format!("ext-{i}")))
        .collect();
    for r in &recordings {
        index.register(r.clone());
    }

    let driver = Arc::new(Driver::new(config.clone(), index.clone()));
    let sample_rate = config.audio.sample_rate;

    let cursor = driver
        .process_pending(
            10,
            None,
            move |recording| {
                let freq = 300.0 + recording.external_id.len() as f32 * 10.0;
                async move {
                    // Long enough that the landmark count clears
                    // `too_short_frames` at the default rate cap.
                    let samples = (0..(sample_rate as usize * 300))
                        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
                        .collect();
                    Ok(Signal { samples, sample_rate })
                }
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(cursor.is_some());
}
