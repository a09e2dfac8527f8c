use realfft::RealFftPlanner;

use crate::error::{Error, Result};

/// Exact output length for a rate change: `round(len * target / source)`.
pub fn target_len(len: usize, source_rate: u32, target_rate: u32) -> usize {
    let source = source_rate as u64;
    ((len as u64 * target_rate as u64 + source / 2) / source) as usize
}

/// Band-limited resampler working in the frequency domain.
///
/// The whole signal is transformed at once, the spectrum is truncated or
/// zero-extended to the target length and transformed back. Plans are cached
/// by the planner, so reusing one `Resampler` across calls of the same sizes
/// is cheap.
pub struct Resampler {
    planner: RealFftPlanner<f32>,
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler {
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::<f32>::new(),
        }
    }

    /// Resample `samples` from `source_rate` to `target_rate`.
    ///
    /// Identity when the rates match. Output length is
    /// [`target_len`]`(samples.len(), source_rate, target_rate)`.
    pub fn process(
        &mut self,
        samples: &[f32],
        source_rate: u32,
        target_rate: u32,
    ) -> Result<Vec<f32>> {
        if source_rate == target_rate {
            return Ok(samples.to_vec());
        }
        if source_rate == 0 || target_rate == 0 {
            return Err(Error::InvalidRate(0));
        }

        let n = samples.len();
        let m = target_len(n, source_rate, target_rate);
        if n == 0 || m == 0 {
            return Ok(vec![0.0; m]);
        }

        let forward = self.planner.plan_fft_forward(n);
        let inverse = self.planner.plan_fft_inverse(m);

        let mut input = samples.to_vec();
        let mut spectrum = forward.make_output_vec();
        forward
            .process(&mut input, &mut spectrum)
            .map_err(|e| Error::Fft(e.to_string()))?;

        let mut resized = inverse.make_input_vec();
        let shared = spectrum.len().min(resized.len());
        resized[..shared].copy_from_slice(&spectrum[..shared]);

        // An even-length source holds its Nyquist energy in one bin; once it
        // is no longer the last bin it has to be split with its mirror.
        if n.is_multiple_of(2) && m > n {
            resized[n / 2] *= 0.5;
        }

        // DC and (for even lengths) Nyquist must be real for the inverse.
        resized[0].im = 0.0;
        if m.is_multiple_of(2)
            && let Some(last) = resized.last_mut()
        {
            last.im = 0.0;
        }

        let mut output = inverse.make_output_vec();
        inverse
            .process(&mut resized, &mut output)
            .map_err(|e| Error::Fft(e.to_string()))?;

        // realfft's inverse is unnormalized; 1/n restores the source amplitude.
        let scale = 1.0 / n as f32;
        for s in output.iter_mut() {
            *s *= scale;
        }
        Ok(output)
    }
}

/// One-shot convenience wrapper around [`Resampler::process`].
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    Resampler::new().process(samples, source_rate, target_rate)
}
