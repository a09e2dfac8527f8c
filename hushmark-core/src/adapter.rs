//! Shape adaptation between caller audio and the engine's input contract.
//!
//! The engine wants mono samples of at least a minimum duration. These
//! helpers reduce, pad and later undo both steps so the caller gets back
//! audio of the shape they handed in.

use log::debug;

use crate::buffer::AudioBuffer;

/// Record of one adaptation pass, enough to invert it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptationContext {
    /// Frames in the caller's buffer.
    pub original_frames: usize,
    /// Caller's sample rate in Hz.
    pub source_rate: u32,
    /// Rate the engine was fed, in Hz.
    pub working_rate: u32,
    /// Zero samples appended to reach the minimum duration (at the working rate).
    pub padded_by: usize,
    /// The input had two channels and was reduced to its first.
    pub was_stereo: bool,
}

impl AdaptationContext {
    pub fn was_padded(&self) -> bool {
        self.padded_by > 0
    }

    pub fn was_resampled(&self) -> bool {
        self.source_rate != self.working_rate
    }
}

/// Take channel 0. Mono input passes through unchanged.
pub fn extract_mono_channel(buffer: &AudioBuffer) -> Vec<f32> {
    if buffer.num_channels() > 1 {
        debug!(
            "using channel 0 of {} for watermarking",
            buffer.num_channels()
        );
    }
    buffer.channel(0).map(<[f32]>::to_vec).unwrap_or_default()
}

/// Right-pad with zeros to `round(sample_rate * min_seconds)` samples.
///
/// Returns the padded samples and the original length.
pub fn pad_to_minimum_duration(
    samples: &[f32],
    sample_rate: u32,
    min_seconds: f32,
) -> (Vec<f32>, usize) {
    let original_len = samples.len();
    let min_samples = (sample_rate as f32 * min_seconds).round() as usize;
    let mut padded = samples.to_vec();
    if original_len < min_samples {
        padded.resize(min_samples, 0.0);
    }
    (padded, original_len)
}

/// Truncate to `original_len` if padding made the buffer longer.
pub fn restore_length(mut samples: Vec<f32>, original_len: usize) -> Vec<f32> {
    samples.truncate(original_len);
    samples
}

/// Force an exact length, truncating or zero-extending.
///
/// Resampling round trips can be off by a sample; this snaps them back.
pub fn fit_length(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    samples.resize(len, 0.0);
    samples
}

/// Rebuild the caller's channel layout from a mono result.
///
/// Stereo input gets the mono result on both channels; the watermark was
/// embedded in channel 0 only. Anything else comes back mono.
pub fn restore_channel_layout(
    samples: Vec<f32>,
    was_stereo: bool,
    sample_rate: u32,
) -> AudioBuffer {
    if was_stereo {
        AudioBuffer::replicated(samples, 2, sample_rate)
    } else {
        AudioBuffer::mono(samples, sample_rate)
    }
}
