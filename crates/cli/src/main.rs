mod settings;

use std::io::{self, BufRead};
use std::process;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use crossbeam_channel::Receiver;

use facecheck_core::camera::infrastructure::ffmpeg_camera::FfmpegCamera;
use facecheck_core::camera::infrastructure::jpeg_frame_encoder::JpegFrameEncoder;
use facecheck_core::detection::domain::face_detector::FaceDetector;
use facecheck_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facecheck_core::pipeline::capture_coordinator::{CaptureHandle, CaptureMessage, CaptureParts};
use facecheck_core::pipeline::capture_logger::SessionLogger;
use facecheck_core::pipeline::capture_worker;
use facecheck_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use facecheck_core::shared::model_resolver;
use facecheck_core::verification::domain::verification_result::VerificationResult;
use facecheck_core::verification::infrastructure::http_face_verifier::HttpFaceVerifier;

use settings::Settings;

/// Face check-in from the terminal: waits for one steady face, captures it
/// and submits it to the attendance server.
#[derive(Parser)]
#[command(name = "facecheck")]
struct Cli {
    /// Attendance server base URL (e.g. http://localhost:8000).
    #[arg(long)]
    server: Option<String>,

    /// Bearer token for the attendance API. Never saved.
    #[arg(long, env = "FACECHECK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Capture device (e.g. /dev/video0 on Linux, 0 on macOS).
    #[arg(long)]
    device: Option<String>,

    /// Requested capture width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Requested capture height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Milliseconds between detection samples.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Consecutive single-face samples required before capturing.
    #[arg(long)]
    confirm_frames: Option<u32>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Seconds to wait for the server's answer (0 waits indefinitely).
    #[arg(long)]
    verify_timeout: Option<u64>,

    /// Print the final result as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Write the effective settings (without the token) as new defaults.
    #[arg(long)]
    save_settings: bool,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Returns whether the check-in was recorded.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = apply_overrides(Settings::load(), &cli);
    settings.validate()?;

    if cli.save_settings {
        let path = settings.save()?;
        log::info!("Settings saved to {}", path.display());
    }

    let server = settings
        .server
        .clone()
        .ok_or("No attendance server configured; pass --server")?;
    let detector = build_detector(settings.confidence)?;
    let verifier = HttpFaceVerifier::new(&server, cli.token.clone(), settings.verify_timeout())?;
    log::info!("Verifying against {}", verifier.endpoint());

    let parts = CaptureParts {
        camera: Box::new(FfmpegCamera::new()),
        detector,
        encoder: Box::new(JpegFrameEncoder::default()),
        verifier: Arc::new(verifier),
        logger: Box::new(SessionLogger::new()),
        config: settings.capture_config(),
    };
    let (messages, handle) = capture_worker::spawn(parts);
    cancel_on_enter(handle);

    match present(messages, cli.json)? {
        Some(result) => Ok(result.success()),
        None => {
            eprintln!("Cancelled.");
            Ok(false)
        }
    }
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(server) = &cli.server {
        settings.server = Some(server.clone());
    }
    if let Some(device) = &cli.device {
        settings.device = Some(device.clone());
    }
    if let Some(width) = cli.width {
        settings.width = width;
    }
    if let Some(height) = cli.height {
        settings.height = height;
    }
    if let Some(interval_ms) = cli.interval_ms {
        settings.interval_ms = interval_ms;
    }
    if let Some(confirm_frames) = cli.confirm_frames {
        settings.confirm_frames = confirm_frames;
    }
    if let Some(confidence) = cli.confidence {
        settings.confidence = confidence;
    }
    if let Some(secs) = cli.verify_timeout {
        settings.verify_timeout_secs = secs;
    }
    settings
}

fn build_detector(confidence: f64) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        None,
        Some(Box::new(download_progress)),
    )?;
    Ok(Box::new(OnnxYoloDetector::new(&model_path, confidence)?))
}

/// Reports session events until the worker disconnects. A camera failure
/// is returned as an error; a cancelled session yields `None`.
fn present(
    messages: Receiver<CaptureMessage>,
    json: bool,
) -> Result<Option<VerificationResult>, Box<dyn std::error::Error>> {
    let mut result = None;

    for message in messages {
        match message {
            CaptureMessage::Opened => {
                eprintln!("Camera on. Look at the camera; press Enter to cancel.")
            }
            CaptureMessage::FaceStatus(status) => log::debug!("Face status: {status:?}"),
            CaptureMessage::Warning(advisory) => eprintln!("{advisory}"),
            CaptureMessage::Capturing => eprintln!("Hold still, capturing..."),
            CaptureMessage::Verifying => eprintln!("Verifying..."),
            CaptureMessage::Result(r) => {
                print_result(&r, json)?;
                result = Some(r);
            }
            CaptureMessage::RefreshHistory => log::debug!("Attendance history changed"),
            CaptureMessage::HardwareError(e) => return Err(e.into()),
            CaptureMessage::Closed => log::debug!("Camera off"),
        }
    }

    Ok(result)
}

fn print_result(result: &VerificationResult, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string(result)?);
        return Ok(());
    }
    let mark = if result.success() { "OK" } else { "FAILED" };
    match result.timestamp() {
        Some(ts) => println!("{mark}: {} at {ts}", result.message()),
        None => println!("{mark}: {}", result.message()),
    }
    Ok(())
}

fn cancel_on_enter(handle: CaptureHandle) {
    thread::spawn(move || {
        let mut line = String::new();
        // EOF (non-interactive stdin) must not cancel the session
        if let Ok(n) = io::stdin().lock().read_line(&mut line) {
            if n > 0 {
                handle.cancel();
            }
        }
    });
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
