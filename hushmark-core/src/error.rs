use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("audio data is empty")]
    EmptyAudio,

    #[error("unsupported sample rate: {0}Hz (supported: 16000Hz, 44100Hz)")]
    UnsupportedRate(u32),

    #[error("invalid sample rate: {0}Hz")]
    InvalidRate(u32),

    #[error("audio file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("unsupported audio file format: {0}")]
    UnsupportedFileFormat(String),

    #[error("watermark engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("watermark engine failed: {0}")]
    EngineFailure(String),

    #[error("shape mismatch: original is {original:?}, processed is {processed:?}")]
    ShapeMismatch {
        original: (usize, usize),
        processed: (usize, usize),
    },

    #[error("a task is already in flight")]
    TaskInFlight,

    #[error("background task panicked")]
    TaskPanicked,

    #[error("FFT error: {0}")]
    Fft(String),

    #[error("failed to decode audio: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
