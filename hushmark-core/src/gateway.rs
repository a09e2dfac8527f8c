//! Embed and detect through a [`WatermarkEngine`].
//!
//! The gateway conforms caller audio to what the engine accepts (mono, the
//! working rate, a minimum duration), runs the engine and undoes the
//! conforming on the way out.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::adapter::{self, AdaptationContext};
use crate::buffer::AudioBuffer;
use crate::config::GatewayConfig;
use crate::engine::{EngineError, EngineRegistry};
use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::quality;
use crate::resample::Resampler;

/// Result of [`WatermarkGateway::embed`].
#[derive(Debug, Clone)]
pub struct EncodeResult {
    /// Watermarked audio with the caller's rate, frame count and layout.
    pub audio: AudioBuffer,
    /// SDR of the watermarked audio against the input, in dB.
    pub quality_db: f64,
    pub context: AdaptationContext,
}

/// Result of [`WatermarkGateway::detect`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    pub detected: bool,
    pub payload: Option<Payload>,
    /// Engine confidence in `[0, 1]`, when it reported one.
    pub confidence: Option<f32>,
}

impl DecodeResult {
    pub fn not_detected() -> Self {
        Self {
            detected: false,
            payload: None,
            confidence: None,
        }
    }

    pub fn confidence_level(&self) -> Option<ConfidenceLevel> {
        self.confidence.map(ConfidenceLevel::from_confidence)
    }
}

/// Coarse bucket of a detection confidence, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.9 {
            Self::VeryHigh
        } else if confidence >= 0.7 {
            Self::High
        } else if confidence >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::VeryHigh => "Very High",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Front door for watermarking: shape adaptation around a shared engine
/// registry.
#[derive(Debug, Clone)]
pub struct WatermarkGateway {
    registry: Arc<EngineRegistry>,
    config: GatewayConfig,
}

impl WatermarkGateway {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self::with_config(registry, GatewayConfig::default())
    }

    pub fn with_config(registry: Arc<EngineRegistry>, config: GatewayConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Embed `payload` into `audio`.
    ///
    /// The result has the same sample rate and frame count as `audio`. Stereo
    /// input comes back as two identical channels carrying the watermark;
    /// other multichannel input comes back mono.
    pub fn embed(&self, audio: &AudioBuffer, payload: &Payload) -> Result<EncodeResult> {
        if audio.is_empty() {
            return Err(Error::EmptyAudio);
        }
        let working_rate = self.config.working_rate;
        let engine = self.registry.get(working_rate)?;

        let source_rate = audio.sample_rate();
        let original_frames = audio.frames();
        let was_stereo = audio.num_channels() == 2;
        let mono = adapter::extract_mono_channel(audio);

        let mut resampler = Resampler::new();
        let working = if source_rate != working_rate {
            debug!("resampling {source_rate}Hz -> {working_rate}Hz for embedding");
            resampler.process(&mono, source_rate, working_rate)?
        } else {
            mono
        };

        let (padded, working_len) = adapter::pad_to_minimum_duration(
            &working,
            working_rate,
            self.config.min_duration_secs,
        );
        let padded_by = padded.len() - working_len;
        if padded_by > 0 {
            warn!(
                "audio padded from {:.2}s to {:.2}s to meet the engine's minimum length",
                working_len as f64 / working_rate as f64,
                padded.len() as f64 / working_rate as f64
            );
        }

        info!("embedding payload {payload}");
        let embedding = engine
            .embed(&padded, working_rate, payload)
            .map_err(embed_failure)?;

        let watermarked = adapter::restore_length(embedding.samples, working_len);
        let watermarked = if source_rate != working_rate {
            resampler.process(&watermarked, working_rate, source_rate)?
        } else {
            watermarked
        };
        let watermarked = adapter::fit_length(watermarked, original_frames);
        let restored = adapter::restore_channel_layout(watermarked, was_stereo, source_rate);

        // Only channel 0 went through the engine; any other input channel
        // was replaced, so comparing it would measure the replacement.
        let quality_db = match (audio.channel(0), restored.channel(0)) {
            (Some(original), Some(watermarked)) => quality::sdr(original, watermarked)?,
            _ => embedding.quality_db,
        };
        info!("embedding done, SDR {quality_db:.2} dB");

        Ok(EncodeResult {
            audio: restored,
            quality_db,
            context: AdaptationContext {
                original_frames,
                source_rate,
                working_rate,
                padded_by,
                was_stereo,
            },
        })
    }

    /// [`embed`](Self::embed) with an unchecked payload such as one decoded
    /// from a request body.
    pub fn embed_values(&self, audio: &AudioBuffer, values: &[i64]) -> Result<EncodeResult> {
        let payload = Payload::from_values(values)?;
        self.embed(audio, &payload)
    }

    /// Look for a watermark in `audio`.
    ///
    /// Only channel 0 is examined, at the buffer's own rate. `robust` turns on
    /// the engine's slower phase-shift search, which survives cropping.
    pub fn detect(&self, audio: &AudioBuffer, robust: bool) -> Result<DecodeResult> {
        if audio.is_empty() {
            return Err(Error::EmptyAudio);
        }
        let engine = self.registry.get(self.config.working_rate)?;
        let mono = adapter::extract_mono_channel(audio);

        debug!(
            "detecting on {} samples at {}Hz (robust: {robust})",
            mono.len(),
            audio.sample_rate()
        );
        let detection = engine
            .detect(&mono, audio.sample_rate(), robust)
            .map_err(|e| Error::EngineFailure(format!("failed to decode watermark: {e}")))?;

        let Some(message) = detection.messages.first().filter(|_| detection.status) else {
            info!("no watermark detected");
            return Ok(DecodeResult::not_detected());
        };
        let payload = Payload::from_values(message).map_err(|e| {
            Error::EngineFailure(format!("engine returned an invalid message: {e}"))
        })?;
        let confidence = detection
            .confidences
            .first()
            .map(|c| c.clamp(0.0, 1.0));

        info!("watermark detected: {payload}");
        Ok(DecodeResult {
            detected: true,
            payload: Some(payload),
            confidence,
        })
    }
}

fn embed_failure(e: EngineError) -> Error {
    let message = e.to_string();
    if message.contains("broadcast") || message.contains("shape") {
        Error::EngineFailure(format!(
            "audio length mismatch inside the engine; this can happen with very \
             short audio (<3s): {message}"
        ))
    } else {
        Error::EngineFailure(format!("failed to embed watermark: {message}"))
    }
}
