//! The seam between the gateway and the external watermark engine.
//!
//! The engine itself is opaque: something that can embed a [`Payload`] into
//! mono samples at a given rate and find it again. [`EngineRegistry`] owns
//! one engine per [`ModelKind`], loads each on first use and hands out
//! shared references afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};

use crate::error::{Error, Result};
use crate::payload::Payload;

/// Failure reported by an engine. The message is kept verbatim so callers
/// can classify it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Output of [`WatermarkEngine::embed`].
#[derive(Debug, Clone)]
pub struct EngineEmbedding {
    pub samples: Vec<f32>,
    /// The engine's own estimate of the embedding quality, in dB.
    pub quality_db: f64,
}

/// Raw output of [`WatermarkEngine::detect`].
///
/// `messages` and `confidences` are parallel; messages are unchecked and
/// may hold values outside a byte.
#[derive(Debug, Clone, Default)]
pub struct EngineDetection {
    pub status: bool,
    pub messages: Vec<Vec<i64>>,
    pub confidences: Vec<f32>,
}

impl EngineDetection {
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// An opaque watermark engine working on mono `f32` samples.
pub trait WatermarkEngine: Send + Sync {
    fn embed(
        &self,
        samples: &[f32],
        sample_rate: u32,
        payload: &Payload,
    ) -> std::result::Result<EngineEmbedding, EngineError>;

    fn detect(
        &self,
        samples: &[f32],
        sample_rate: u32,
        robust: bool,
    ) -> std::result::Result<EngineDetection, EngineError>;

    /// Whether the engine can still serve requests. The registry replaces an
    /// unhealthy engine on the next [`EngineRegistry::get`].
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Engine models, one per supported working rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Khz16,
    Khz44_1,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Khz16, ModelKind::Khz44_1];

    pub fn from_rate(sample_rate: u32) -> Result<Self> {
        match sample_rate {
            16000 => Ok(Self::Khz16),
            44100 => Ok(Self::Khz44_1),
            other => Err(Error::UnsupportedRate(other)),
        }
    }

    pub fn sample_rate(self) -> u32 {
        match self {
            Self::Khz16 => 16000,
            Self::Khz44_1 => 44100,
        }
    }

    /// Short label, as used on the command line.
    pub fn label(self) -> &'static str {
        match self {
            Self::Khz16 => "16k",
            Self::Khz44_1 => "44.1k",
        }
    }

    /// Only the 44.1 kHz model is known to detect what it embeds.
    pub fn is_reliable(self) -> bool {
        matches!(self, Self::Khz44_1)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "16k" => Ok(Self::Khz16),
            "44.1k" => Ok(Self::Khz44_1),
            other => Err(Error::InvalidFormat(format!(
                "unknown model '{other}' (expected 16k or 44.1k)"
            ))),
        }
    }
}

/// Sample rates whose model is reliable enough to advertise.
pub fn supported_sample_rates() -> Vec<u32> {
    ModelKind::ALL
        .iter()
        .filter(|m| m.is_reliable())
        .map(|m| m.sample_rate())
        .collect()
}

/// Creates engine instances. Called at most once per model by the registry.
pub trait EngineLoader: Send + Sync {
    fn load(&self, model: ModelKind) -> Result<Arc<dyn WatermarkEngine>>;
}

impl<F> EngineLoader for F
where
    F: Fn(ModelKind) -> Result<Arc<dyn WatermarkEngine>> + Send + Sync,
{
    fn load(&self, model: ModelKind) -> Result<Arc<dyn WatermarkEngine>> {
        self(model)
    }
}

/// Lazily populated cache of engines keyed by model.
///
/// The lock is held while a model loads, so concurrent first calls for the
/// same model load it once. A failed load is not retried within the call
/// and is not cached either, so a later call starts a fresh load. A cached
/// engine that reports itself unhealthy is dropped and loaded again.
pub struct EngineRegistry {
    loader: Box<dyn EngineLoader>,
    engines: Mutex<HashMap<ModelKind, Arc<dyn WatermarkEngine>>>,
}

impl EngineRegistry {
    pub fn new(loader: impl EngineLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Engine for `sample_rate`, loading it on first use.
    pub fn get(&self, sample_rate: u32) -> Result<Arc<dyn WatermarkEngine>> {
        let model = ModelKind::from_rate(sample_rate)?;
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        match engines.get(&model) {
            Some(engine) if engine.is_healthy() => return Ok(Arc::clone(engine)),
            Some(_) => {
                warn!("{model} watermark engine is unhealthy, reloading");
                engines.remove(&model);
            }
            None => {}
        }

        if !model.is_reliable() {
            warn!("{model} model is unreliable for detection; prefer 44.1k");
        }
        info!("loading {model} watermark engine");
        let engine = self.loader.load(model)?;
        engines.insert(model, Arc::clone(&engine));
        Ok(engine)
    }

    /// Load the engines for `sample_rates` up front.
    pub fn initialize(&self, sample_rates: &[u32]) -> Result<()> {
        for &rate in sample_rates {
            self.get(rate)?;
        }
        Ok(())
    }

    pub fn is_loaded(&self, model: ModelKind) -> bool {
        self.engines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&model)
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        let mut loaded: Vec<_> = engines.keys().map(|m| m.label()).collect();
        loaded.sort_unstable();
        f.debug_struct("EngineRegistry")
            .field("loaded", &loaded)
            .finish()
    }
}
