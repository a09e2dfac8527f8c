use crate::buffer::AudioBuffer;
use crate::error::{Error, Result};

/// Signal-to-distortion ratio in dB between two buffers of the same shape.
///
/// Higher is better; identical buffers give `+inf`.
pub fn compute_sdr(original: &AudioBuffer, processed: &AudioBuffer) -> Result<f64> {
    if original.shape() != processed.shape() {
        return Err(Error::ShapeMismatch {
            original: original.shape(),
            processed: processed.shape(),
        });
    }

    let mut signal = 0.0f64;
    let mut distortion = 0.0f64;
    for (o, p) in original.channels().iter().zip(processed.channels()) {
        let (s, d) = power_sums(o, p);
        signal += s;
        distortion += d;
    }
    Ok(ratio_db(signal, distortion))
}

/// [`compute_sdr`] for plain sample slices.
pub fn sdr(original: &[f32], processed: &[f32]) -> Result<f64> {
    if original.len() != processed.len() {
        return Err(Error::ShapeMismatch {
            original: (1, original.len()),
            processed: (1, processed.len()),
        });
    }
    let (signal, distortion) = power_sums(original, processed);
    Ok(ratio_db(signal, distortion))
}

/// Sums of `o²` and `(o - p)²`. Both means share a denominator, so the
/// ratio of sums equals the ratio of means.
fn power_sums(original: &[f32], processed: &[f32]) -> (f64, f64) {
    original
        .iter()
        .zip(processed)
        .fold((0.0, 0.0), |(signal, distortion), (&o, &p)| {
            let o = o as f64;
            let diff = o - p as f64;
            (signal + o * o, distortion + diff * diff)
        })
}

fn ratio_db(signal: f64, distortion: f64) -> f64 {
    if distortion == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (signal / distortion).log10()
}
