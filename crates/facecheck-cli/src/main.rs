use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facecheck_core::{
    encode_reference, CosineComparator, EuclideanComparator, FaceComparator, FaceDetector,
    FaceEncoder, FaceLocator, FaceRecognizer, ReferenceEncoding,
};
use facecheck_hw::{Camera, CameraError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;
mod display;
mod engine;
mod overlay;

use config::{Config, ConfigFile, Metric, Preset};
use display::HeadlessDisplay;
use engine::{run_session, DisplaySink, Engine, LoopConfig, LoopExit, SystemClock};

const WINDOW_TITLE: &str = "Face Recognition";

#[derive(Parser)]
#[command(
    name = "facecheck",
    version,
    about = "Match faces from a live webcam against a reference photo"
)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the webcam until the reference face shows up (or `q` is pressed)
    Run(RunArgs),
    /// Print the reference embedding of an image as JSON
    Encode {
        /// Image containing one face
        image: PathBuf,
    },
    /// List video capture devices
    Devices,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Reference image with the face to look for
    #[arg(short, long)]
    reference: Option<PathBuf>,
    /// Camera index or V4L2 device path
    #[arg(short, long)]
    device: Option<String>,
    /// Tuning preset
    #[arg(long, value_enum)]
    preset: Option<Preset>,
    /// Working-copy scale for detection, in (0, 1]
    #[arg(long)]
    scale: Option<f32>,
    /// Run detection on every Nth frame
    #[arg(long)]
    sample_interval: Option<u64>,
    /// Seconds to keep running after the first match
    #[arg(long)]
    grace_secs: Option<f32>,
    /// Draw the animated scan line while scanning
    #[arg(long, conflicts_with = "no_scan_overlay")]
    scan_overlay: bool,
    #[arg(long, hide = true)]
    no_scan_overlay: bool,
    /// Comparison metric
    #[arg(long, value_enum)]
    metric: Option<Metric>,
    /// Cosine similarity floor or Euclidean distance ceiling
    #[arg(long)]
    threshold: Option<f32>,
    /// Run without a window
    #[arg(long)]
    headless: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => {
            let config = resolve_config(&cli, args)?;
            watch(&config)
        }
        Commands::Encode { image } => {
            let config = resolve_config(&cli, &RunArgs::default())?;
            let (mut detector, mut recognizer) = load_models(&config)?;
            let reference = encode_reference(image, &mut detector, &mut recognizer)?;
            println!("{}", serde_json::to_string_pretty(reference.embedding())?);
            Ok(())
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(())
        }
    }
}

/// Preset, then config file, then environment, then flags.
fn resolve_config(cli: &Cli, args: &RunArgs) -> Result<Config> {
    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };

    let preset = args.preset.or(file.preset).unwrap_or_default();
    let mut config = Config::preset(preset);
    config.apply_file(file);
    config.apply_env();

    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(v) = &args.reference {
        config.reference = v.clone();
    }
    if let Some(v) = &args.device {
        config.camera_device = v.clone();
    }
    if let Some(v) = args.scale {
        config.scale = v;
    }
    if let Some(v) = args.sample_interval {
        config.sample_interval = v;
    }
    if let Some(v) = args.grace_secs.and_then(config::secs) {
        config.grace = v;
    }
    if args.scan_overlay {
        config.scan_overlay = true;
    }
    if args.no_scan_overlay {
        config.scan_overlay = false;
    }
    if let Some(v) = args.metric {
        config.metric = v;
    }
    if let Some(v) = args.threshold {
        config.threshold = Some(v);
    }
    if args.headless {
        config.headless = true;
    }

    config.validate()?;
    tracing::debug!(?preset, ?config, "resolved configuration");
    Ok(config)
}

fn load_models(config: &Config) -> Result<(FaceDetector, FaceRecognizer)> {
    let detector = FaceDetector::load(&config.scrfd_model_path())
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let recognizer = FaceRecognizer::load(&config.arcface_model_path())
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    Ok((detector, recognizer))
}

fn comparator(config: &Config) -> Box<dyn FaceComparator> {
    match config.metric {
        Metric::Cosine => Box::new(CosineComparator {
            threshold: config.threshold(),
        }),
        Metric::Euclidean => Box::new(EuclideanComparator {
            tolerance: config.threshold(),
        }),
    }
}

#[cfg(feature = "window")]
fn make_display(config: &Config) -> Box<dyn DisplaySink> {
    if config.headless {
        return Box::new(HeadlessDisplay::default());
    }
    Box::new(display::WindowDisplay::new(WINDOW_TITLE))
}

#[cfg(not(feature = "window"))]
fn make_display(config: &Config) -> Box<dyn DisplaySink> {
    if !config.headless {
        tracing::warn!(title = WINDOW_TITLE, "built without window support; running headless");
    }
    Box::new(HeadlessDisplay::default())
}

/// Reference first, camera second: a bad reference never touches the device.
fn start<L, E, S>(
    config: &Config,
    locator: &mut L,
    encoder: &mut E,
    open_source: impl FnOnce(&Config) -> Result<S, CameraError>,
) -> Result<(ReferenceEncoding, S)>
where
    L: FaceLocator + ?Sized,
    E: FaceEncoder + ?Sized,
{
    let reference = encode_reference(&config.reference, locator, encoder)?;
    println!("Loaded reference image: {}", config.reference.display());
    println!("Face encoding generated from reference image.");

    let source = open_source(config)?;
    println!("Starting webcam...");
    Ok((reference, source))
}

fn watch(config: &Config) -> Result<()> {
    let (mut detector, mut recognizer) = load_models(config)?;
    let (reference, camera) = start(config, &mut detector, &mut recognizer, |c| {
        Camera::open(&c.camera_device, c.capture_width, c.capture_height)
    })?;

    let mut engine = Engine::new(
        detector,
        recognizer,
        comparator(config),
        reference,
        LoopConfig::from(config),
    );
    let outcome = run_session(&mut engine, camera, make_display(config), &SystemClock);
    println!("Camera closed.");

    let outcome = outcome?;
    match outcome.exit {
        LoopExit::MatchGraceElapsed => println!("Face matched."),
        LoopExit::Quit if outcome.state.is_matched() => println!("Face matched."),
        LoopExit::Quit => println!("No match before quit."),
    }
    tracing::info!(
        frames = outcome.state.frame_count,
        elapsed_ms = outcome.state.elapsed.as_millis() as u64,
        exit = ?outcome.exit,
        "session finished"
    );
    Ok(())
}
