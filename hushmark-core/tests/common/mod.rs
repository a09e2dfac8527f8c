//! Shared fixtures for the integration tests: test audio and a deterministic
//! in-process stand-in for the watermark engine.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hushmark_core::engine::{EngineDetection, EngineEmbedding, EngineError};
use hushmark_core::{
    EngineRegistry, GatewayConfig, ModelKind, Payload, WatermarkEngine, WatermarkGateway,
};

/// Samples compared when recognising audio the stub has watermarked.
const FINGERPRINT_LEN: usize = 256;

/// Shortest input the stub accepts, like the real engine's 3 s floor.
const MIN_ENGINE_SECONDS: f32 = 3.0;

/// Generate broadband test audio with energy across many frequencies.
pub fn make_test_audio(num_samples: usize, sample_rate: u32) -> Vec<f32> {
    let mut samples = vec![0.0f32; num_samples];
    for (i, sample) in samples.iter_mut().enumerate() {
        let t = i as f32 / sample_rate as f32;
        for k in 1u32..80 {
            let freq = k as f32 * 60.0;
            let amp = 1.0 / (k as f32).sqrt();
            *sample += amp * (2.0 * std::f32::consts::PI * freq * t + k as f32).sin();
        }
    }
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if peak > 0.0 {
        for s in samples.iter_mut() {
            *s *= 0.5 / peak;
        }
    }
    samples
}

/// A pure tone, for the simplest end-to-end cases.
pub fn make_tone(num_samples: usize, freq: f32, sample_rate: u32) -> Vec<f32> {
    (0..num_samples)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// One embed call as the stub saw it.
#[derive(Debug, Clone)]
pub struct EmbedCall {
    pub num_samples: usize,
    pub sample_rate: u32,
    pub payload: Payload,
}

/// Deterministic engine stand-in.
///
/// Embedding scales the input slightly and remembers the start of the output
/// with its payload. Detection reports the payload whose remembered output
/// matches the start of the input, so a watermark "survives" lossless
/// handling and is lost once the audio is changed.
#[derive(Debug, Default)]
pub struct StubEngine {
    marks: Mutex<Vec<(Vec<f32>, Payload)>>,
    calls: Mutex<Vec<EmbedCall>>,
}

impl StubEngine {
    pub fn calls(&self) -> Vec<EmbedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl WatermarkEngine for StubEngine {
    fn embed(
        &self,
        samples: &[f32],
        sample_rate: u32,
        payload: &Payload,
    ) -> Result<EngineEmbedding, EngineError> {
        self.calls.lock().unwrap().push(EmbedCall {
            num_samples: samples.len(),
            sample_rate,
            payload: *payload,
        });

        let min_len = (sample_rate as f32 * MIN_ENGINE_SECONDS) as usize;
        if samples.len() < min_len {
            return Err(EngineError::new(format!(
                "operands could not be broadcast together with shapes (1,{}) (1,{min_len})",
                samples.len()
            )));
        }

        let out: Vec<f32> = samples.iter().map(|s| s * 0.999).collect();
        let fingerprint = out[..FINGERPRINT_LEN.min(out.len())].to_vec();
        self.marks.lock().unwrap().push((fingerprint, *payload));
        Ok(EngineEmbedding {
            samples: out,
            quality_db: 30.0,
        })
    }

    fn detect(
        &self,
        samples: &[f32],
        _sample_rate: u32,
        _robust: bool,
    ) -> Result<EngineDetection, EngineError> {
        let marks = self.marks.lock().unwrap();
        let found = marks.iter().rev().find(|(fingerprint, _)| {
            samples.len() >= fingerprint.len()
                && fingerprint
                    .iter()
                    .zip(samples)
                    .all(|(a, b)| (a - b).abs() < 1e-4)
        });
        Ok(match found {
            Some((_, payload)) => EngineDetection {
                status: true,
                messages: vec![payload.to_values().to_vec()],
                confidences: vec![0.97],
            },
            None => EngineDetection::not_found(),
        })
    }
}

/// A gateway over one shared [`StubEngine`], plus the number of engine loads.
pub struct Harness {
    pub gateway: WatermarkGateway,
    pub engine: Arc<StubEngine>,
    pub loads: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let engine = Arc::new(StubEngine::default());
        let loads = Arc::new(AtomicUsize::new(0));

        let shared = Arc::clone(&engine);
        let counter = Arc::clone(&loads);
        let loader = move |_model: ModelKind| -> hushmark_core::Result<Arc<dyn WatermarkEngine>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&shared) as Arc<dyn WatermarkEngine>)
        };
        let registry = Arc::new(EngineRegistry::new(loader));

        Self {
            gateway: WatermarkGateway::with_config(registry, config),
            engine,
            loads,
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}
