use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use hushmark_core::payload::{self, PayloadFormat};
use hushmark_core::resample::Resampler;
use hushmark_core::{AudioBuffer, degrade, quality};

fn make_test_audio(num_samples: usize, sample_rate: u32) -> Vec<f32> {
    let mut samples = vec![0.0f32; num_samples];
    for (i, sample) in samples.iter_mut().enumerate() {
        let t = i as f32 / sample_rate as f32;
        for k in 1u32..80 {
            let freq = k as f32 * 60.0;
            let amp = 1.0 / (k as f32).sqrt();
            *sample += amp * (2.0 * std::f32::consts::PI * freq * t + k as f32).sin();
        }
    }
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if peak > 0.0 {
        for s in samples.iter_mut() {
            *s *= 0.5 / peak;
        }
    }
    samples
}

fn bench_resample(c: &mut Criterion) {
    // 5 seconds, the typical upload length
    let audio = make_test_audio(16000 * 5, 16000);
    let mut resampler = Resampler::new();

    c.bench_function("resample_5s_16k_to_44k", |b| {
        b.iter(|| {
            let out = resampler.process(black_box(&audio), 16000, 44100).unwrap();
            black_box(out);
        });
    });
}

fn bench_compression(c: &mut Criterion) {
    let audio = make_test_audio(44100 * 5, 44100);
    let mut rng = StdRng::seed_from_u64(1);

    c.bench_function("compression_sim_5s_44k_64kbps", |b| {
        b.iter(|| {
            let out = degrade::simulate_compression_artifacts_with_rng(
                black_box(&audio),
                44100,
                64,
                &mut rng,
            );
            black_box(out);
        });
    });
}

fn bench_noise(c: &mut Criterion) {
    let audio = make_test_audio(44100 * 5, 44100);
    let mut rng = StdRng::seed_from_u64(2);

    c.bench_function("noise_5s_44k", |b| {
        b.iter(|| {
            let out = degrade::apply_noise_with_rng(black_box(&audio), -20.0, &mut rng);
            black_box(out);
        });
    });
}

fn bench_sdr(c: &mut Criterion) {
    let left = make_test_audio(44100 * 5, 44100);
    let right: Vec<f32> = left.iter().map(|s| s * 0.99).collect();
    let original = AudioBuffer::from_channels(vec![left.clone(), left], 44100).unwrap();
    let processed = AudioBuffer::from_channels(vec![right.clone(), right], 44100).unwrap();

    c.bench_function("sdr_5s_44k_stereo", |b| {
        b.iter(|| {
            black_box(quality::compute_sdr(black_box(&original), black_box(&processed)).unwrap());
        });
    });
}

fn bench_payload_codec(c: &mut Criterion) {
    c.bench_function("parse_message_all_formats", |b| {
        b.iter(|| {
            let text = payload::parse_message(black_box("Hello"), PayloadFormat::Text).unwrap();
            let numeric =
                payload::parse_message(black_box("72,101,108,108,111"), PayloadFormat::Numeric)
                    .unwrap();
            let binary = payload::parse_message(
                black_box("0100100001100101011011000110110001101111"),
                PayloadFormat::Binary,
            )
            .unwrap();
            black_box((text, numeric, binary));
        });
    });
}

criterion_group!(
    benches,
    bench_resample,
    bench_compression,
    bench_noise,
    bench_sdr,
    bench_payload_codec,
);

criterion_main!(benches);
