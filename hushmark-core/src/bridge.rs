//! Engine bridge to an external executable.
//!
//! The executable is started once per model as `<program> --model <label>`
//! and then serves requests over its stdin/stdout. Every message starts with
//! one ASCII header line; sample blocks follow as little-endian `f32`.
//!
//! ```text
//! > EMBED <rate> <b0> <b1> <b2> <b3> <b4> <count>\n  <count * f32>
//! < OK <quality_db> <count>\n                       <count * f32>
//!
//! > DETECT <rate> <0|1> <count>\n                     <count * f32>
//! < NONE\n
//! < FOUND <n>\n   then n lines: <b0> <b1> <b2> <b3> <b4> <confidence>\n
//!
//! < ERR <message>\n   (in place of any response)
//! ```
//!
//! An `OK` reply carries exactly as many samples as the request. A reply
//! that breaks the framing leaves the pipe out of step, so the process is
//! stopped and the engine reports itself unhealthy from then on.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};

use crate::engine::{
    EngineDetection, EngineEmbedding, EngineError, EngineLoader, ModelKind, WatermarkEngine,
};
use crate::error::{Error, Result};
use crate::payload::Payload;

type EngineResult<T> = std::result::Result<T, EngineError>;

/// Loads engines by spawning an external program.
#[derive(Debug, Clone)]
pub struct ProcessLoader {
    program: PathBuf,
}

impl ProcessLoader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl EngineLoader for ProcessLoader {
    fn load(&self, model: ModelKind) -> Result<Arc<dyn WatermarkEngine>> {
        Ok(Arc::new(ProcessEngine::spawn(&self.program, model)?))
    }
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    broken: bool,
}

/// A running engine process. Requests are serialized; the process is killed
/// when the engine is dropped.
pub struct ProcessEngine {
    model: ModelKind,
    session: Mutex<Session>,
}

impl ProcessEngine {
    pub fn spawn(program: &Path, model: ModelKind) -> Result<Self> {
        let mut child = Command::new(program)
            .args(["--model", model.label()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    Error::EngineUnavailable(format!("{} not found", program.display()))
                }
                _ => Error::EngineUnavailable(format!(
                    "failed to start {}: {e}",
                    program.display()
                )),
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(Error::EngineUnavailable(
                "engine process has no stdio pipes".into(),
            ));
        };
        info!(
            "started {} engine (pid {}) from {}",
            model,
            child.id(),
            program.display()
        );

        Ok(Self {
            model,
            session: Mutex::new(Session {
                child,
                stdin,
                stdout: BufReader::new(stdout),
                broken: false,
            }),
        })
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    /// Run one request/reply exchange. The outer error of `exchange` is a
    /// framing failure and retires the session; the inner one is the
    /// engine's own refusal.
    fn call<T>(
        &self,
        exchange: impl FnOnce(&mut Session) -> EngineResult<EngineResult<T>>,
    ) -> EngineResult<T> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.broken {
            return Err(EngineError::new(format!(
                "{} engine was stopped after a protocol error",
                self.model
            )));
        }
        match exchange(&mut session) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{} engine protocol error, stopping it: {e}", self.model);
                session.broken = true;
                let _ = session.child.kill();
                Err(e)
            }
        }
    }
}

impl WatermarkEngine for ProcessEngine {
    fn embed(
        &self,
        samples: &[f32],
        sample_rate: u32,
        payload: &Payload,
    ) -> EngineResult<EngineEmbedding> {
        self.call(|session| {
            write_embed_request(&mut session.stdin, sample_rate, payload, samples)?;
            read_embed_reply(&mut session.stdout, samples.len())
        })
    }

    fn detect(
        &self,
        samples: &[f32],
        sample_rate: u32,
        robust: bool,
    ) -> EngineResult<EngineDetection> {
        self.call(|session| {
            write_detect_request(&mut session.stdin, sample_rate, robust, samples)?;
            read_detect_reply(&mut session.stdout)
        })
    }

    fn is_healthy(&self) -> bool {
        !self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .broken
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        let session = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        debug!("stopping {} engine (pid {})", self.model, session.child.id());
        let _ = session.child.kill();
        let _ = session.child.wait();
    }
}

fn io_error(e: io::Error) -> EngineError {
    EngineError::new(format!("engine i/o: {e}"))
}

/// Write an `EMBED` request.
pub fn write_embed_request<W: Write>(
    w: &mut W,
    sample_rate: u32,
    payload: &Payload,
    samples: &[f32],
) -> EngineResult<()> {
    let [b0, b1, b2, b3, b4] = *payload.as_bytes();
    writeln!(
        w,
        "EMBED {sample_rate} {b0} {b1} {b2} {b3} {b4} {}",
        samples.len()
    )
    .map_err(io_error)?;
    write_samples(w, samples)?;
    w.flush().map_err(io_error)
}

/// Write a `DETECT` request.
pub fn write_detect_request<W: Write>(
    w: &mut W,
    sample_rate: u32,
    robust: bool,
    samples: &[f32],
) -> EngineResult<()> {
    writeln!(
        w,
        "DETECT {sample_rate} {} {}",
        u8::from(robust),
        samples.len()
    )
    .map_err(io_error)?;
    write_samples(w, samples)?;
    w.flush().map_err(io_error)
}

/// Read the response to an `EMBED` request of `expected` samples.
pub fn read_embed_response<R: BufRead>(
    r: &mut R,
    expected: usize,
) -> EngineResult<EngineEmbedding> {
    read_embed_reply(r, expected).and_then(|reply| reply)
}

/// Read the response to a `DETECT` request.
pub fn read_detect_response<R: BufRead>(r: &mut R) -> EngineResult<EngineDetection> {
    read_detect_reply(r).and_then(|reply| reply)
}

fn read_embed_reply<R: BufRead>(
    r: &mut R,
    expected: usize,
) -> EngineResult<EngineResult<EngineEmbedding>> {
    let line = match read_header(r)? {
        Ok(line) => line,
        Err(refusal) => return Ok(Err(refusal)),
    };
    let mut fields = line.split_whitespace();
    match fields.next() {
        Some("OK") => {
            let quality_db: f64 = parse_field(fields.next(), "quality")?;
            let count: usize = parse_field(fields.next(), "sample count")?;
            if count != expected {
                return Err(EngineError::new(format!(
                    "engine returned {count} samples for a request of {expected}"
                )));
            }
            let samples = read_samples(r, count)?;
            Ok(Ok(EngineEmbedding {
                samples,
                quality_db,
            }))
        }
        _ => Err(unexpected(&line)),
    }
}

fn read_detect_reply<R: BufRead>(r: &mut R) -> EngineResult<EngineResult<EngineDetection>> {
    let line = match read_header(r)? {
        Ok(line) => line,
        Err(refusal) => return Ok(Err(refusal)),
    };
    let mut fields = line.split_whitespace();
    match fields.next() {
        Some("NONE") => Ok(Ok(EngineDetection::not_found())),
        Some("FOUND") => {
            let n: usize = parse_field(fields.next(), "match count")?;
            let mut detection = EngineDetection {
                status: true,
                messages: Vec::new(),
                confidences: Vec::new(),
            };
            for _ in 0..n {
                let entry = read_line(r)?;
                let mut values = entry.split_whitespace();
                let mut message = Vec::with_capacity(5);
                for _ in 0..5 {
                    message.push(parse_field::<i64>(values.next(), "message byte")?);
                }
                let confidence: f32 = parse_field(values.next(), "confidence")?;
                detection.messages.push(message);
                detection.confidences.push(confidence);
            }
            Ok(Ok(detection))
        }
        _ => Err(unexpected(&line)),
    }
}

/// Read a response header line. An `ERR ...` line is a well-framed refusal
/// and comes back as the inner error.
fn read_header<R: BufRead>(r: &mut R) -> EngineResult<EngineResult<String>> {
    let line = read_line(r)?;
    if let Some(message) = line.strip_prefix("ERR") {
        return Ok(Err(EngineError::new(message.trim())));
    }
    Ok(Ok(line))
}

fn read_line<R: BufRead>(r: &mut R) -> EngineResult<String> {
    let mut line = String::new();
    let n = r.read_line(&mut line).map_err(io_error)?;
    if n == 0 {
        return Err(EngineError::new("engine closed its output"));
    }
    Ok(line.trim_end().to_string())
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, what: &str) -> EngineResult<T> {
    field
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| EngineError::new(format!("malformed {what} in engine response")))
}

fn unexpected(line: &str) -> EngineError {
    EngineError::new(format!("unexpected engine response: {line:?}"))
}

fn write_samples<W: Write>(w: &mut W, samples: &[f32]) -> EngineResult<()> {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    w.write_all(&bytes).map_err(io_error)
}

fn read_samples<R: Read>(r: &mut R, count: usize) -> EngineResult<Vec<f32>> {
    let len = count
        .checked_mul(4)
        .ok_or_else(|| EngineError::new(format!("sample count {count} out of range")))?;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes).map_err(io_error)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
