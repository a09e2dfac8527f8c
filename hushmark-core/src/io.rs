//! Reading, writing and checking audio files.
//!
//! WAV goes through hound in both directions. FLAC is read with symphonia;
//! output is always 32-bit float WAV.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::buffer::AudioBuffer;
use crate::config::FileRules;
use crate::error::{Error, Result};

/// Outcome of [`validate_format`]. Every problem found is listed in
/// `errors`, not only the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    /// Lowercase extension including the dot, e.g. `.wav`.
    pub format: Option<String>,
    pub sample_rate: Option<u32>,
    pub errors: Vec<String>,
}

/// Check `path` against `rules` without decoding the audio.
pub fn validate_format(path: &Path, rules: &FileRules) -> ValidationResult {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            let error = match e.kind() {
                io::ErrorKind::NotFound => "File does not exist".to_string(),
                _ => format!("Cannot access file: {e}"),
            };
            return ValidationResult {
                valid: false,
                format: None,
                sample_rate: None,
                errors: vec![error],
            };
        }
    };

    let mut errors = Vec::new();
    if meta.len() > rules.max_file_size {
        errors.push(format!(
            "File size ({} bytes) exceeds maximum ({} bytes)",
            meta.len(),
            rules.max_file_size
        ));
    }

    let ext = extension(path);
    let format = ext.as_ref().map(|e| format!(".{e}"));
    if !ext
        .as_deref()
        .is_some_and(|e| rules.extensions.iter().any(|allowed| *allowed == e))
    {
        let supported: Vec<String> = rules.extensions.iter().map(|e| format!(".{e}")).collect();
        errors.push(format!(
            "Unsupported format: {}. Supported formats: {}",
            format.as_deref().unwrap_or("(none)"),
            supported.join(", ")
        ));
    }

    let sample_rate = match probe_sample_rate(path) {
        Ok(rate) => {
            if !rules.sample_rates.contains(&rate) {
                let supported: Vec<String> =
                    rules.sample_rates.iter().map(u32::to_string).collect();
                errors.push(format!(
                    "Unsupported sample rate: {rate}Hz. Supported rates: {}Hz",
                    supported.join(", ")
                ));
            }
            Some(rate)
        }
        Err(e) => {
            errors.push(format!("Failed to read audio file: {e}"));
            None
        }
    };

    ValidationResult {
        valid: errors.is_empty(),
        format,
        sample_rate,
        errors,
    }
}

/// Read the sample rate from the container header.
pub fn probe_sample_rate(path: &Path) -> Result<u32> {
    if extension(path).as_deref() == Some("wav") {
        return Ok(hound::WavReader::open(path)?.spec().sample_rate);
    }
    let format = open_format(path)?;
    let track = format
        .default_track()
        .ok_or_else(|| Error::UnsupportedFileFormat("no audio track".into()))?;
    track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::UnsupportedFileFormat("unknown sample rate".into()))
}

/// Load a WAV or FLAC file into a planar buffer at its native rate.
pub fn load_audio(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let buffer = match extension(path).as_deref() {
        Some("wav") => load_wav(path)?,
        Some("flac") => load_with_symphonia(path)?,
        Some(other) => return Err(Error::UnsupportedFileFormat(format!(".{other}"))),
        None => return Err(Error::UnsupportedFileFormat("no file extension".into())),
    };
    debug!(
        "loaded {}: {} channel(s), {} frames at {}Hz",
        path.display(),
        buffer.num_channels(),
        buffer.frames(),
        buffer.sample_rate()
    );
    Ok(buffer)
}

/// Write `buffer` as a 32-bit float WAV, creating parent directories.
pub fn save_audio(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    if buffer.is_empty() {
        return Err(Error::EmptyAudio);
    }
    if buffer.sample_rate() == 0 {
        return Err(Error::InvalidRate(0));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let spec = hound::WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for s in buffer.to_interleaved() {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn load_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<Vec<f32>, _>>()?
        }
    };

    Ok(AudioBuffer::from_interleaved(
        &samples,
        spec.channels as usize,
        spec.sample_rate,
    ))
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension(path) {
        hint.with_extension(&ext);
    }
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    Ok(probed.format)
}

fn load_with_symphonia(path: &Path) -> Result<AudioBuffer> {
    let mut format = open_format(path)?;
    let track = format
        .default_track()
        .ok_or_else(|| Error::UnsupportedFileFormat("no audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::UnsupportedFileFormat("unknown sample rate".into()))?;
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("skipping corrupt audio frame: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        if num_frames == 0 {
            continue;
        }
        channels = spec.channels.count();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sample_buf.samples());
    }

    Ok(AudioBuffer::from_interleaved(
        &interleaved,
        channels,
        sample_rate,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_file_validation() {
        let result = validate_format(Path::new("/no/such/file.wav"), &FileRules::default());
        assert!(!result.valid);
        assert_eq!(result.format, None);
        assert_eq!(result.errors, vec!["File does not exist".to_string()]);
    }

    #[test]
    fn missing_file_load() {
        let path = PathBuf::from("/no/such/file.flac");
        assert!(matches!(load_audio(&path), Err(Error::FileNotFound(p)) if p == path));
    }

    #[test]
    fn extension_is_case_insensitive() {
        assert_eq!(extension(Path::new("a/B.WAV")).as_deref(), Some("wav"));
        assert_eq!(extension(Path::new("noext")), None);
    }

    #[test]
    fn save_guards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let empty = AudioBuffer::mono(Vec::new(), 44100);
        assert!(matches!(save_audio(&empty, &path), Err(Error::EmptyAudio)));
        let zero_rate = AudioBuffer::mono(vec![0.1; 10], 0);
        let err = save_audio(&zero_rate, &path).unwrap_err();
        assert!(matches!(err, Error::InvalidRate(0)));
        assert_eq!(err.to_string(), "invalid sample rate: 0Hz");
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_path_is_not_reported_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.wav");
        fs::write(&file, b"RIFF").unwrap();

        // A regular file used as a directory fails with ENOTDIR, not ENOENT.
        let result = validate_format(&file.join("inner.wav"), &FileRules::default());
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert!(
            result.errors[0].starts_with("Cannot access file"),
            "{}",
            result.errors[0]
        );
    }
}
