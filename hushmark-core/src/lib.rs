pub mod adapter;
pub mod bridge;
pub mod buffer;
pub mod config;
pub mod degrade;
pub mod engine;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod io;
pub mod payload;
pub mod quality;
pub mod resample;
pub mod task;

use std::path::Path;

// Re-export primary API types
pub use adapter::AdaptationContext;
pub use bridge::ProcessLoader;
pub use buffer::{AudioBuffer, AudioMetadata, Orientation};
pub use config::{FileRules, GatewayConfig};
pub use engine::{EngineLoader, EngineRegistry, ModelKind, WatermarkEngine};
pub use error::{Error, Result};
pub use gateway::{ConfidenceLevel, DecodeResult, EncodeResult, WatermarkGateway};
pub use io::{ValidationResult, load_audio, save_audio, validate_format};
pub use payload::{Payload, PayloadFormat};
pub use quality::compute_sdr;
pub use task::{TaskHandle, TaskSlot};

/// Watermark a file on disk.
///
/// Loads `input`, embeds `payload` and writes the result to `output` as
/// 32-bit float WAV. For in-memory audio, see [`WatermarkGateway::embed`].
pub fn embed_file(
    gateway: &WatermarkGateway,
    input: &Path,
    output: &Path,
    payload: &Payload,
) -> Result<EncodeResult> {
    let audio = load_audio(input)?;
    let result = gateway.embed(&audio, payload)?;
    save_audio(&result.audio, output)?;
    Ok(result)
}

/// Look for a watermark in a file on disk.
pub fn detect_file(gateway: &WatermarkGateway, input: &Path, robust: bool) -> Result<DecodeResult> {
    let audio = load_audio(input)?;
    gateway.detect(&audio, robust)
}
