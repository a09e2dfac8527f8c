//! Planar audio buffers and the channel-orientation policy for raw matrices.

use crate::error::{Error, Result};

/// How a raw 2-D sample matrix is laid out.
///
/// Row-major matrices of shape `(rows, cols)` come from decoders and foreign
/// APIs without saying which axis holds channels. Callers that know the layout
/// should declare it; `Infer` applies the size heuristic, which is only
/// reliable when the channel count is much smaller than the frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// `rows` are channels, `cols` are frames.
    ChannelsFirst,
    /// `rows` are frames, `cols` are channels (interleaved).
    ChannelsLast,
    /// Channels-first when `rows < cols`, otherwise channels-last.
    Infer,
}

impl Orientation {
    /// Resolve `Infer` against a concrete shape.
    pub fn resolve(self, rows: usize, cols: usize) -> Orientation {
        match self {
            Orientation::Infer if rows < cols => Orientation::ChannelsFirst,
            Orientation::Infer => Orientation::ChannelsLast,
            declared => declared,
        }
    }
}

/// Summary of an audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMetadata {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub frames: usize,
}

/// Floating-point audio stored one `Vec` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// The same samples on `num_channels` channels.
    pub fn replicated(samples: Vec<f32>, num_channels: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples; num_channels],
            sample_rate,
        }
    }

    /// Buffer from per-channel sample vectors. All channels must share a length.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if let Some(first) = channels.first()
            && let Some(bad) = channels.iter().find(|c| c.len() != first.len())
        {
            return Err(Error::ShapeMismatch {
                original: (channels.len(), first.len()),
                processed: (channels.len(), bad.len()),
            });
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Buffer from interleaved samples (frame-major), as WAV/FLAC decoders
    /// produce them. A trailing partial frame is dropped.
    pub fn from_interleaved(samples: &[f32], num_channels: usize, sample_rate: u32) -> Self {
        if num_channels == 0 {
            return Self {
                channels: Vec::new(),
                sample_rate,
            };
        }
        let frames = samples.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (channel, &s) in channels.iter_mut().zip(frame) {
                channel.push(s);
            }
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Buffer from a row-major `(rows, cols)` matrix with a declared orientation.
    pub fn from_matrix(
        data: &[f32],
        rows: usize,
        cols: usize,
        orientation: Orientation,
        sample_rate: u32,
    ) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::ShapeMismatch {
                original: (rows, cols),
                processed: (1, data.len()),
            });
        }
        match orientation.resolve(rows, cols) {
            Orientation::ChannelsFirst => {
                let channels = if cols == 0 {
                    vec![Vec::new(); rows]
                } else {
                    data.chunks_exact(cols).map(<[f32]>::to_vec).collect()
                };
                Ok(Self {
                    channels,
                    sample_rate,
                })
            }
            _ => Ok(Self::from_interleaved(data, cols, sample_rate)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// `(channels, frames)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_channels(), self.frames())
    }

    /// True when there is no sample data at all.
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Frame-major sample order, for writers.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.num_channels() * self.frames());
        for frame in 0..self.frames() {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }

    /// Apply a per-channel transform, keeping the sample rate.
    pub fn map_channels<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&[f32]) -> Result<Vec<f32>>,
    {
        let channels = self
            .channels
            .iter()
            .map(|c| f(c))
            .collect::<Result<Vec<_>>>()?;
        Self::from_channels(channels, self.sample_rate)
    }

    pub fn metadata(&self) -> AudioMetadata {
        let frames = self.frames();
        let duration_secs = if self.sample_rate == 0 {
            0.0
        } else {
            frames as f64 / self.sample_rate as f64
        };
        AudioMetadata {
            duration_secs,
            sample_rate: self.sample_rate,
            channels: self.num_channels(),
            frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_orientation_by_shape() {
        assert_eq!(Orientation::Infer.resolve(2, 1000), Orientation::ChannelsFirst);
        assert_eq!(Orientation::Infer.resolve(1000, 2), Orientation::ChannelsLast);
        // Square input cannot be told apart; the heuristic falls to channels-last.
        assert_eq!(Orientation::Infer.resolve(2, 2), Orientation::ChannelsLast);
        assert_eq!(
            Orientation::ChannelsFirst.resolve(1000, 2),
            Orientation::ChannelsFirst
        );
    }

    #[test]
    fn matrix_channels_first() {
        let data = [1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
        let buf = AudioBuffer::from_matrix(&data, 2, 3, Orientation::Infer, 44100).unwrap();
        assert_eq!(buf.shape(), (2, 3));
        assert_eq!(buf.channel(0).unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(buf.channel(1).unwrap(), &[10.0, 20.0, 30.0]);
    }

    #[test]
    fn matrix_channels_last() {
        let data = [1.0, 10.0, 2.0, 20.0, 3.0, 30.0];
        let buf = AudioBuffer::from_matrix(&data, 3, 2, Orientation::Infer, 44100).unwrap();
        assert_eq!(buf.shape(), (2, 3));
        assert_eq!(buf.channel(0).unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn declared_orientation_overrides_heuristic() {
        // Inference would read this square matrix as channels-last.
        let data = [1.0, 2.0, 10.0, 20.0];
        let buf =
            AudioBuffer::from_matrix(&data, 2, 2, Orientation::ChannelsFirst, 16000).unwrap();
        assert_eq!(buf.channel(0).unwrap(), &[1.0, 2.0]);
        assert_eq!(buf.channel(1).unwrap(), &[10.0, 20.0]);
    }

    #[test]
    fn matrix_size_mismatch() {
        assert!(AudioBuffer::from_matrix(&[0.0; 5], 2, 3, Orientation::Infer, 16000).is_err());
    }

    #[test]
    fn interleaved_round_trip() {
        let data = [0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let buf = AudioBuffer::from_interleaved(&data, 2, 44100);
        assert_eq!(buf.shape(), (2, 3));
        assert_eq!(buf.to_interleaved(), data);
    }

    #[test]
    fn ragged_channels_rejected() {
        let result = AudioBuffer::from_channels(vec![vec![0.0; 4], vec![0.0; 3]], 44100);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn metadata_reports_duration() {
        let buf = AudioBuffer::from_channels(vec![vec![0.0; 88200]; 2], 44100).unwrap();
        let meta = buf.metadata();
        assert_eq!(meta.channels, 2);
        assert_eq!(meta.frames, 88200);
        assert!((meta.duration_secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_buffers() {
        assert!(AudioBuffer::mono(Vec::new(), 44100).is_empty());
        assert!(AudioBuffer::from_interleaved(&[], 0, 44100).is_empty());
    }
}
