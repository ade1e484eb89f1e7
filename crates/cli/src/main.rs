use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use clap::Parser;

use face_emotion_core::detection::domain::detected_face::DetectedFace;
use face_emotion_core::detection::infrastructure::model_resolver::{
    self, ModelSpec, EMOTION_MODEL, FACE_MODEL,
};
use face_emotion_core::pipeline::infrastructure::inference_worker::{
    InferenceWorker, ResultPacket,
};
use face_emotion_core::pipeline::perf_monitor::PerfMonitor;
use face_emotion_core::pipeline::submission_throttle::SubmissionThrottle;
use face_emotion_core::pipeline::worker_config::WorkerConfig;
use face_emotion_core::video::domain::frame_source::FrameSource;
use face_emotion_core::video::infrastructure::image_sequence_reader::ImageSequenceReader;

/// How long to wait for the last submitted frame's result after input ends.
const FINAL_RESULT_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Real-time face emotion annotations for an image or a directory of frames.
#[derive(Parser)]
#[command(name = "face-emotion")]
struct Cli {
    /// Input image, or directory of images played back in name order.
    input: PathBuf,

    /// Nominal frame rate of the input sequence.
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Maximum frames per second handed to the worker (0 = every frame).
    #[arg(long, default_value = "0")]
    inference_fps: u32,

    /// Maximum simultaneously tracked faces (1-3).
    #[arg(long)]
    max_faces: Option<usize>,

    /// Frames wider than this are downscaled before detection (160-1920).
    #[arg(long)]
    inference_width: Option<u32>,

    /// Minimum winning probability for a non-uncertain label (0.0-1.0).
    #[arg(long)]
    confidence_threshold: Option<f32>,

    /// Smoothing time constant in seconds (0.0-2.0, 0 disables).
    #[arg(long)]
    smoothing_seconds: Option<f32>,

    /// JSON file with worker settings; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// YuNet face detection model (downloaded if omitted).
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// FER+ emotion model (downloaded if omitted).
    #[arg(long)]
    emotion_model: Option<PathBuf>,

    /// Pace frames at the nominal frame rate instead of as fast as possible.
    #[arg(long)]
    realtime: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    let config = build_config(&cli)?;

    let face_model = resolve_model(&FACE_MODEL, cli.face_model.as_deref())?;
    let emotion_model = resolve_model(&EMOTION_MODEL, cli.emotion_model.as_deref())?;

    let mut reader = ImageSequenceReader::new(cli.fps);
    let metadata = reader.open(&cli.input)?;

    let mut worker = InferenceWorker::new();
    worker.start(&face_model, &emotion_model, config)?;

    let mut throttle = SubmissionThrottle::new(cli.inference_fps);
    let mut monitor = PerfMonitor::default();
    let mut latest_faces: Vec<DetectedFace> = Vec::new();
    let mut last_submitted: Option<u64> = None;
    let mut last_consumed: Option<u64> = None;
    let started = Instant::now();

    for frame_result in reader.frames() {
        let frame = match frame_result {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Skipping frame: {e}");
                continue;
            }
        };
        let timestamp_ns = frame.timestamp_ns();
        if cli.realtime {
            pace(started, timestamp_ns);
        }

        if throttle.should_submit(timestamp_ns) {
            match worker.submit_frame(frame) {
                Ok(()) => last_submitted = Some(timestamp_ns),
                Err(e) => log::warn!("Frame at {timestamp_ns} ns not submitted: {e}"),
            }
        }

        if let Some(packet) = worker.try_consume_latest() {
            last_consumed = Some(packet.timestamp_ns);
            latest_faces = consume(packet, &mut monitor)?;
        }
        monitor.tick(timestamp_ns, worker.queue_len(), latest_faces.first());
    }

    let deadline = Instant::now() + FINAL_RESULT_TIMEOUT;
    while last_submitted.is_some() && last_consumed != last_submitted {
        if let Some(packet) = worker.try_consume_latest() {
            last_consumed = Some(packet.timestamp_ns);
            consume(packet, &mut monitor)?;
        } else if Instant::now() >= deadline {
            log::warn!("Timed out waiting for the final result");
            break;
        } else {
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    worker.stop();
    reader.close();
    log::info!(
        "Processed {} frame(s) from {}",
        metadata.total_frames,
        cli.input.display()
    );
    Ok(())
}

/// Print one result as a JSON line and feed the performance monitor.
fn consume(
    packet: ResultPacket,
    monitor: &mut PerfMonitor,
) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
    monitor.record(packet.inference_ms);
    println!("{}", serde_json::to_string(&packet)?);
    Ok(packet.faces)
}

/// Sleep until `timestamp_ns` of playback time has elapsed since `started`.
fn pace(started: Instant, timestamp_ns: u64) {
    let due = started + Duration::from_nanos(timestamp_ns);
    let now = Instant::now();
    if due > now {
        std::thread::sleep(due - now);
    }
}

fn build_config(cli: &Cli) -> Result<WorkerConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => WorkerConfig::from_json_file(path)?,
        None => WorkerConfig::default(),
    };
    if let Some(v) = cli.max_faces {
        config.max_faces = v;
    }
    if let Some(v) = cli.inference_width {
        config.inference_width = v;
    }
    if let Some(v) = cli.confidence_threshold {
        config.confidence_threshold = v;
    }
    if let Some(v) = cli.smoothing_seconds {
        config.smoothing_seconds = v;
    }

    let clamped = config.clamped();
    if clamped != config {
        log::warn!("Settings out of range were clamped: {clamped:?}");
    }
    Ok(clamped)
}

fn resolve_model(
    model: &ModelSpec,
    explicit: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {}", model.name);
    let name = model.name;
    let path = model_resolver::resolve(
        model,
        explicit,
        None,
        Some(Box::new(move |downloaded, total| {
            download_progress(name, downloaded, total)
        })),
    )?;
    log::debug!("Using {} at {}", model.name, path.display());
    Ok(path)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input not found: {}", cli.input.display()).into());
    }
    if !(cli.fps.is_finite() && cli.fps > 0.0) {
        return Err(format!("Frame rate must be positive, got {}", cli.fps).into());
    }
    Ok(())
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {name}... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading {name}... {downloaded} bytes");
    }
}
