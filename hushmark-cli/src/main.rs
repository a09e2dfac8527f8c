use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::{LevelFilter, debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use hushmark_core::payload::{self, PayloadFormat};
use hushmark_core::{
    AudioBuffer, EngineRegistry, FileRules, GatewayConfig, ModelKind, ProcessLoader, TaskSlot,
    WatermarkGateway, degrade, quality,
};

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "hushmark", about = "Audio watermarking tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Watermark engine executable
    #[arg(long, global = true, env = "HUSHMARK_ENGINE", default_value = "hushmark-engine")]
    engine: PathBuf,

    /// Increase logging verbosity (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a watermark into an audio file
    Encode {
        /// Input audio file (WAV or FLAC)
        #[arg(short, long)]
        input: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Message to embed, interpreted according to --format
        #[arg(short, long)]
        message: String,

        /// Message format
        #[arg(short, long, value_enum, default_value = "text")]
        format: FormatArg,

        /// Engine model
        #[arg(long, value_enum, default_value = "44.1k")]
        model: ModelArg,

        /// Play the result after encoding
        #[arg(long)]
        play: bool,
    },
    /// Detect a watermark in an audio file
    Decode {
        /// Input audio file (WAV or FLAC)
        #[arg(short, long)]
        input: PathBuf,

        /// Engine model
        #[arg(long, value_enum, default_value = "44.1k")]
        model: ModelArg,

        /// Search phase shifts too; much slower, survives cropping
        #[arg(long)]
        phase_shift: bool,
    },
    /// Check that a file is acceptable input
    Validate {
        /// Audio file to check
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Show a message in all three payload formats
    Convert {
        /// Message to convert
        #[arg(short, long)]
        message: String,

        /// Format of the message
        #[arg(short, long, value_enum, default_value = "text")]
        format: FormatArg,
    },
    /// Apply noise and/or lossy-codec damage to a file
    Degrade {
        /// Input audio file (WAV or FLAC)
        #[arg(short, long)]
        input: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Add Gaussian noise at this level relative to the signal (dB)
        #[arg(long, allow_negative_numbers = true)]
        noise_db: Option<f32>,

        /// Simulate a lossy codec at this bitrate (kbps)
        #[arg(long)]
        bitrate: Option<u32>,

        /// Seed for reproducible noise
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Text,
    Numeric,
    Binary,
}

impl From<FormatArg> for PayloadFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => PayloadFormat::Text,
            FormatArg::Numeric => PayloadFormat::Numeric,
            FormatArg::Binary => PayloadFormat::Binary,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModelArg {
    #[value(name = "16k")]
    Khz16,
    #[value(name = "44.1k")]
    Khz44_1,
}

impl From<ModelArg> for ModelKind {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Khz16 => ModelKind::Khz16,
            ModelArg::Khz44_1 => ModelKind::Khz44_1,
        }
    }
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

fn init_logging(cli: &Cli) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Warn);
    builder.filter_module("hushmark_core", cli.log_level());
    builder.filter_module("hushmark", cli.log_level());
    builder.format_timestamp_millis().init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Command::Encode {
            input,
            output,
            message,
            format,
            model,
            play,
        } => encode(&cli.engine, &input, &output, &message, format.into(), model.into(), play),
        Command::Decode {
            input,
            model,
            phase_shift,
        } => decode(&cli.engine, &input, model.into(), phase_shift),
        Command::Validate { input } => validate(&input),
        Command::Convert { message, format } => convert(&message, format.into()),
        Command::Degrade {
            input,
            output,
            noise_db,
            bitrate,
            seed,
        } => degrade_file(&input, &output, noise_db, bitrate, seed),
    }
}

/// Gateway over the engine program. Processing always runs at the default
/// 44.1 kHz working rate; `model` only labels the run.
fn build_gateway(engine: &Path, model: ModelKind) -> WatermarkGateway {
    if !model.is_reliable() {
        warn!("the {model} model is unreliable; processing runs at 44.1 kHz");
    }
    let registry = Arc::new(EngineRegistry::new(ProcessLoader::new(engine)));
    WatermarkGateway::with_config(registry, GatewayConfig::default())
}

fn load_input(input: &Path) -> CliResult<AudioBuffer> {
    eprintln!("Loading {}...", input.display());
    let audio = hushmark_core::load_audio(input)?;
    let meta = audio.metadata();
    eprintln!(
        "  {:.2} s, {} Hz, {} channel(s)",
        meta.duration_secs, meta.sample_rate, meta.channels
    );
    if !FileRules::default().sample_rates.contains(&meta.sample_rate) {
        eprintln!(
            "Warning: sample rate is {} Hz; 16 kHz or 44.1 kHz work best. Audio will be resampled.",
            meta.sample_rate
        );
    }
    Ok(audio)
}

/// Run `task` on a worker thread, printing a dot to stderr every couple of
/// seconds until it finishes.
fn with_progress<T, F>(task: F) -> CliResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let slot = TaskSlot::new();
    let mut handle = slot.submit(task)?;
    let mut ticks = 0u32;
    while !handle.wait_timeout(Duration::from_millis(500)) {
        ticks += 1;
        if ticks.is_multiple_of(4) {
            eprint!(".");
        }
    }
    if ticks >= 4 {
        eprintln!();
    }
    Ok(handle.join()?)
}

fn encode(
    engine: &Path,
    input: &Path,
    output: &Path,
    message: &str,
    format: PayloadFormat,
    model: ModelKind,
    play: bool,
) -> CliResult<()> {
    // A bad message fails here, before any audio is read.
    let payload = payload::parse_message(message, format)?;
    eprintln!("Payload ({format}): {}", payload);
    let audio = load_input(input)?;

    let gateway = build_gateway(engine, model);
    eprintln!("Embedding watermark with the {model} model, this may take a moment...");
    let result = with_progress(move || gateway.embed(&audio, &payload))??;

    hushmark_core::save_audio(&result.audio, output)?;
    eprintln!("Watermarked audio written to {}", output.display());

    if play {
        play_file(output);
    }

    println!("Output:  {}", output.display());
    println!("SDR:     {:.2} dB", result.quality_db);
    println!("Numeric: {payload}");
    match format {
        PayloadFormat::Text => println!("Text:    {message}"),
        PayloadFormat::Binary => println!("Binary:  {message}"),
        PayloadFormat::Numeric => {}
    }
    Ok(())
}

fn decode(engine: &Path, input: &Path, model: ModelKind, phase_shift: bool) -> CliResult<()> {
    let audio = load_input(input)?;
    let gateway = build_gateway(engine, model);
    if phase_shift {
        eprintln!("Phase shift decoding enabled, this will take longer");
    }
    eprintln!("Detecting watermark with the {model} model...");
    let result = with_progress(move || gateway.detect(&audio, phase_shift))??;

    let Some(payload) = result.payload.filter(|_| result.detected) else {
        println!("No watermark detected.");
        return Ok(());
    };
    println!("Watermark detected");
    println!("  Numeric: {payload}");
    println!("  Text:    '{}'", payload.to_text());
    println!("  Binary:  {}", payload.to_binary());
    if let (Some(confidence), Some(level)) = (result.confidence, result.confidence_level()) {
        println!("  Confidence: {confidence:.4} ({level})");
    }
    Ok(())
}

fn validate(input: &Path) -> CliResult<()> {
    let result = hushmark_core::validate_format(input, &FileRules::default());
    if let Some(format) = &result.format {
        println!("Format:      {format}");
    }
    if let Some(rate) = result.sample_rate {
        println!("Sample rate: {rate} Hz");
    }
    if !result.valid {
        for error in &result.errors {
            println!("  - {error}");
        }
        return Err(format!("{} is not a valid input file", input.display()).into());
    }

    let meta = hushmark_core::load_audio(input)?.metadata();
    println!("Duration:    {:.2} s", meta.duration_secs);
    println!("Channels:    {}", meta.channels);
    println!("Samples:     {}", meta.frames);
    println!("Valid");
    Ok(())
}

fn convert(message: &str, format: PayloadFormat) -> CliResult<()> {
    let payload = payload::parse_message(message, format)?;
    println!("Numeric: {payload}");
    println!("Text:    '{}'", payload.to_text());
    println!("Binary:  {}", payload.to_binary());
    Ok(())
}

fn degrade_file(
    input: &Path,
    output: &Path,
    noise_db: Option<f32>,
    bitrate: Option<u32>,
    seed: Option<u64>,
) -> CliResult<()> {
    if noise_db.is_none() && bitrate.is_none() {
        return Err("nothing to do: pass --noise-db and/or --bitrate".into());
    }
    let audio = load_input(input)?;
    let sample_rate = audio.sample_rate();
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let degraded = audio.map_channels(|channel| {
        let mut samples = channel.to_vec();
        if let Some(kbps) = bitrate {
            debug!("simulating {kbps} kbps codec");
            samples =
                degrade::simulate_compression_artifacts_with_rng(&samples, sample_rate, kbps, &mut rng);
        }
        if let Some(db) = noise_db {
            debug!("adding noise at {db} dB");
            samples = degrade::apply_noise_with_rng(&samples, db, &mut rng);
        }
        Ok(samples)
    })?;

    hushmark_core::save_audio(&degraded, output)?;
    eprintln!("Degraded audio written to {}", output.display());
    println!("SDR: {:.2} dB", quality::compute_sdr(&audio, &degraded)?);
    Ok(())
}

/// Play `path` through the platform's command-line player. Failure only
/// warns; the file is already saved.
fn play_file(path: &Path) {
    let player = if cfg!(target_os = "macos") {
        "afplay"
    } else {
        "aplay"
    };
    eprintln!("Playing {} with {player}...", path.display());
    match std::process::Command::new(player).arg(path).status() {
        Ok(status) if status.success() => {}
        Ok(status) => eprintln!("Warning: playback failed ({status}); the file was saved"),
        Err(e) => eprintln!("Warning: playback failed ({e}); the file was saved"),
    }
}
