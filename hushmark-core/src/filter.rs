//! Butterworth low-pass filtering for the lossy-codec simulation.
//!
//! A 4th-order Butterworth response is built from two cascaded biquad
//! sections and applied forward then backward, so the result has zero phase
//! shift and the squared magnitude response of the single pass. Both ends are
//! extended by odd reflection and every section starts in its steady state,
//! so edges carry no start-up transient.

/// Q factors of the two second-order sections of a 4th-order Butterworth
/// filter: `1 / (2 cos(pi/8))` and `1 / (2 cos(3pi/8))`.
const BUTTERWORTH_Q4: [f32; 2] = [0.541_196_1, 1.306_563];

/// Edge extension for [`LowPass::filtfilt`]: three times the coefficient
/// count of the 4th-order transfer function.
const EDGE_PAD: usize = 3 * 5;

/// Second-order IIR (biquad) filter coefficients.
#[derive(Debug, Clone)]
struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoeffs {
    /// Low-pass section with `cutoff` as a fraction of Nyquist (0, 1).
    fn lowpass(cutoff: f32, q: f32) -> Self {
        let w0 = core::f32::consts::PI * cutoff;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha;
        Self {
            b0: ((1.0 - cos_w0) / 2.0) / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: ((1.0 - cos_w0) / 2.0) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn dc_gain(&self) -> f32 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// Biquad filter state (Direct Form I).
#[derive(Debug, Clone, Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    /// State after a long run of constant input `x`.
    fn settled(coeffs: &BiquadCoeffs, x: f32) -> Self {
        let y = x * coeffs.dc_gain();
        Self {
            x1: x,
            x2: x,
            y1: y,
            y2: y,
        }
    }

    fn process(&mut self, coeffs: &BiquadCoeffs, x: f32) -> f32 {
        let y = coeffs.b0 * x + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// 4th-order Butterworth low-pass filter.
#[derive(Debug, Clone)]
pub struct LowPass {
    sections: [BiquadCoeffs; 2],
}

impl LowPass {
    /// Design a filter with `cutoff` given as a fraction of Nyquist.
    ///
    /// Returns `None` unless `0 < cutoff < 1`.
    pub fn new(cutoff: f32) -> Option<Self> {
        if !(cutoff > 0.0 && cutoff < 1.0) {
            return None;
        }
        Some(Self {
            sections: BUTTERWORTH_Q4.map(|q| BiquadCoeffs::lowpass(cutoff, q)),
        })
    }

    /// Single causal pass over `samples` in place, starting from rest.
    pub fn apply(&self, samples: &mut [f32]) {
        self.run(samples, [BiquadState::default(), BiquadState::default()]);
    }

    /// Zero-phase filtering: forward pass, then a pass over the reversed
    /// signal.
    pub fn filtfilt(&self, samples: &[f32]) -> Vec<f32> {
        let (Some(&first), Some(&last)) = (samples.first(), samples.last()) else {
            return Vec::new();
        };
        let pad = EDGE_PAD.min(samples.len() - 1);

        let mut ext = Vec::with_capacity(samples.len() + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - samples[i]));
        ext.extend_from_slice(samples);
        ext.extend((1..=pad).map(|i| 2.0 * last - samples[samples.len() - 1 - i]));

        let start = ext[0];
        self.run(&mut ext, self.settled(start));
        ext.reverse();
        let start = ext[0];
        self.run(&mut ext, self.settled(start));
        ext.reverse();

        ext.drain(..pad);
        ext.truncate(samples.len());
        ext
    }

    /// Section states for a signal that has been at `x` forever.
    fn settled(&self, x: f32) -> [BiquadState; 2] {
        let [first, second] = &self.sections;
        let upper = BiquadState::settled(first, x);
        let lower = BiquadState::settled(second, upper.y1);
        [upper, lower]
    }

    fn run(&self, samples: &mut [f32], mut states: [BiquadState; 2]) {
        for s in samples.iter_mut() {
            let mut y = *s;
            for (coeffs, state) in self.sections.iter().zip(states.iter_mut()) {
                y = state.process(coeffs, y);
            }
            *s = y;
        }
    }
}
