/// Sample rate the external engine works at internally.
pub const WORKING_RATE: u32 = 44100;

/// Minimum duration fed to the engine on embed. The engine documents a 3 s
/// floor; the extra half second is margin.
pub const MIN_EMBED_SECONDS: f32 = 3.5;

/// Configuration for the watermark gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Rate audio is conformed to before embedding, in Hz. Also selects
    /// which engine model the registry hands out.
    pub working_rate: u32,
    /// Embedding input shorter than this is zero-padded, then trimmed back.
    pub min_duration_secs: f32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            working_rate: WORKING_RATE,
            min_duration_secs: MIN_EMBED_SECONDS,
        }
    }
}

impl GatewayConfig {
    /// Minimum embed length in samples at the working rate.
    pub fn min_samples(&self) -> usize {
        (self.working_rate as f32 * self.min_duration_secs).round() as usize
    }
}

/// Acceptance rules for audio files handed to [`crate::io::validate_format`].
#[derive(Debug, Clone)]
pub struct FileRules {
    /// Maximum file size in bytes. Default: 50 MiB.
    pub max_file_size: u64,
    /// Allowed extensions, lowercase without the dot.
    pub extensions: Vec<&'static str>,
    /// Allowed container sample rates in Hz.
    pub sample_rates: Vec<u32>,
}

impl Default for FileRules {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            extensions: vec!["wav", "flac"],
            sample_rates: vec![16000, 44100],
        }
    }
}
