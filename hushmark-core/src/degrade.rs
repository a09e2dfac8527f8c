//! Signal degradations for robustness testing.
//!
//! These simulate what happens to watermarked audio in the wild (additive
//! noise, lossy codec band-limiting) without encoding anything.

use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::filter::LowPass;

/// Standard deviation of the quantization noise added after band-limiting.
const QUANTIZATION_NOISE_STD: f32 = 0.001;

/// Low-pass cutoff in Hz a lossy encoder at `bitrate_kbps` would roughly keep.
pub fn compression_cutoff_hz(bitrate_kbps: u32) -> f32 {
    match bitrate_kbps {
        0..=64 => 8000.0,
        65..=128 => 12000.0,
        _ => 16000.0,
    }
}

/// Add Gaussian noise `noise_db` dB relative to the signal power.
pub fn apply_noise(samples: &[f32], noise_db: f32) -> Vec<f32> {
    apply_noise_with_rng(samples, noise_db, &mut rand::rng())
}

/// [`apply_noise`] with a caller-supplied RNG, for reproducible runs.
///
/// Noise power is `mean(x²) * 10^(noise_db / 10)`. The result is scaled
/// down to a peak of 1.0 if the noise pushed it over.
pub fn apply_noise_with_rng<R: Rng + ?Sized>(
    samples: &[f32],
    noise_db: f32,
    rng: &mut R,
) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let signal_power = mean_square(samples);
    let noise_std = (signal_power * 10.0f32.powf(noise_db / 10.0)).sqrt();

    let mut noisy = samples.to_vec();
    add_gaussian(&mut noisy, noise_std, rng);
    normalize_peak(&mut noisy);
    noisy
}

/// Approximate lossy-codec damage at `bitrate_kbps`.
pub fn simulate_compression_artifacts(
    samples: &[f32],
    sample_rate: u32,
    bitrate_kbps: u32,
) -> Vec<f32> {
    simulate_compression_artifacts_with_rng(samples, sample_rate, bitrate_kbps, &mut rand::rng())
}

/// [`simulate_compression_artifacts`] with a caller-supplied RNG.
///
/// Applies a zero-phase 4th-order Butterworth low-pass at the cutoff for
/// the bitrate, then small quantization noise. If the cutoff is at or above
/// Nyquist the input is returned unchanged.
pub fn simulate_compression_artifacts_with_rng<R: Rng + ?Sized>(
    samples: &[f32],
    sample_rate: u32,
    bitrate_kbps: u32,
    rng: &mut R,
) -> Vec<f32> {
    let cutoff_hz = compression_cutoff_hz(bitrate_kbps);
    let nyquist = sample_rate as f32 / 2.0;
    let Some(filter) = LowPass::new(cutoff_hz / nyquist) else {
        debug!("cutoff {cutoff_hz}Hz is not below Nyquist ({nyquist}Hz), leaving audio untouched");
        return samples.to_vec();
    };

    let mut compressed = filter.filtfilt(samples);
    add_gaussian(&mut compressed, QUANTIZATION_NOISE_STD, rng);
    normalize_peak(&mut compressed);
    compressed
}

fn mean_square(samples: &[f32]) -> f32 {
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64) as f32
}

fn add_gaussian<R: Rng + ?Sized>(samples: &mut [f32], std_dev: f32, rng: &mut R) {
    let Ok(normal) = Normal::new(0.0f32, std_dev) else {
        return;
    };
    for s in samples.iter_mut() {
        *s += normal.sample(rng);
    }
}

fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if peak > 1.0 {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}
