use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::camera::domain::camera_device::{
    CameraConstraints, CameraDevice, CameraStream, Facing, HardwareError,
};
use crate::shared::constants::DEFAULT_CAPTURE_FRAMERATE;
use crate::shared::frame::Frame;

/// How long `stop()` waits for the reader thread. Packet reads block, so a
/// stalled device can hold the reader past this.
const READER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[cfg(target_os = "macos")]
const CAPTURE_FORMAT: &str = "avfoundation";
#[cfg(target_os = "macos")]
const DEFAULT_DEVICE: &str = "0";

#[cfg(target_os = "windows")]
const CAPTURE_FORMAT: &str = "dshow";
#[cfg(target_os = "windows")]
const DEFAULT_DEVICE: &str = "video=Integrated Camera";

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CAPTURE_FORMAT: &str = "v4l2";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DEFAULT_DEVICE: &str = "/dev/video0";

/// Opens the platform webcam through libavdevice.
///
/// Each opened stream gets a reader thread that decodes continuously and
/// keeps only the newest frame, so `current_frame` never returns a stale
/// buffered image.
pub struct FfmpegCamera {
    framerate: u32,
}

impl FfmpegCamera {
    pub fn new() -> Self {
        Self {
            framerate: DEFAULT_CAPTURE_FRAMERATE,
        }
    }
}

impl Default for FfmpegCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDevice for FfmpegCamera {
    fn open(
        &mut self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, HardwareError> {
        ffmpeg_next::init().map_err(|e| HardwareError::Unavailable(e.to_string()))?;
        ffmpeg_next::device::register_all();

        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == CAPTURE_FORMAT)
            .ok_or_else(|| {
                HardwareError::Unavailable(format!(
                    "capture backend '{CAPTURE_FORMAT}' is not available in this ffmpeg build"
                ))
            })?;

        let device = constraints
            .device
            .clone()
            .unwrap_or_else(|| DEFAULT_DEVICE.to_string());
        if constraints.facing != Facing::User {
            log::debug!("Facing hint {:?} ignored by {CAPTURE_FORMAT}", constraints.facing);
        }

        let mut options = ffmpeg_next::Dictionary::new();
        options.set(
            "video_size",
            &format!("{}x{}", constraints.width, constraints.height),
        );
        options.set("framerate", &self.framerate.to_string());

        log::debug!("Opening {CAPTURE_FORMAT} device {device}");
        let ictx = ffmpeg_next::format::open_with(
            &device,
            &ffmpeg_next::format::format::Format::Input(format),
            options,
        )
        .map_err(classify_open_error)?
        .input();

        let source =
            CaptureSource::new(ictx).map_err(|e| HardwareError::Unavailable(e.to_string()))?;
        let stream = FfmpegCameraStream::start(source).map_err(|e| {
            HardwareError::Unavailable(format!("failed to start camera reader: {e}"))
        })?;
        Ok(Box::new(stream))
    }
}

/// Permission failures are reported as `Denied`; anything else means the
/// device could not be used.
fn classify_open_error(err: ffmpeg_next::Error) -> HardwareError {
    if let ffmpeg_next::Error::Other { errno } = &err {
        let kind = std::io::Error::from_raw_os_error(*errno).kind();
        if kind == std::io::ErrorKind::PermissionDenied {
            return HardwareError::Denied(err.to_string());
        }
    }
    HardwareError::Unavailable(err.to_string())
}

struct CaptureSource {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

// Safety: a CaptureSource is moved into its reader thread right after
// construction and never touched from any other thread.
unsafe impl Send for CaptureSource {}

impl CaptureSource {
    fn new(ictx: ffmpeg_next::format::context::Input) -> Result<Self, ffmpeg_next::Error> {
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or(ffmpeg_next::Error::StreamNotFound)?;
        let stream_index = stream.index();
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
        })
    }
}

/// Live stream backed by a reader thread.
pub struct FfmpegCameraStream {
    latest: Arc<Mutex<Option<Frame>>>,
    stopped: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl FfmpegCameraStream {
    fn start(source: CaptureSource) -> std::io::Result<Self> {
        let latest = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));

        let reader = {
            let latest = latest.clone();
            let stopped = stopped.clone();
            thread::Builder::new()
                .name("facecheck-camera".into())
                .spawn(move || run_reader(source, &latest, &stopped))?
        };

        Ok(Self {
            latest,
            stopped,
            reader: Some(reader),
        })
    }
}

impl CameraStream for FfmpegCameraStream {
    fn current_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        if self.reader.is_none() {
            return Err("camera stream stopped".into());
        }
        let slot = self
            .latest
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        slot.clone().ok_or_else(|| "no frame decoded yet".into())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            if !join_within(handle, READER_STOP_TIMEOUT) {
                // The reader exits and frees the device once its read returns
                log::warn!(
                    "Camera reader did not stop within {READER_STOP_TIMEOUT:?}; detaching it"
                );
            }
        }
        if let Ok(mut slot) = self.latest.lock() {
            *slot = None;
        }
    }

    fn active_tracks(&self) -> usize {
        self.reader
            .as_ref()
            .map_or(0, |handle| usize::from(!handle.is_finished()))
    }
}

impl Drop for FfmpegCameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Joins `handle` if it finishes within `timeout`. Returns `false` and
/// detaches the thread otherwise.
fn join_within(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        log::error!("Camera reader thread panicked");
    }
    true
}

fn run_reader(mut source: CaptureSource, latest: &Mutex<Option<Frame>>, stopped: &AtomicBool) {
    let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
    let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
    let mut sequence: u64 = 0;

    for (stream, packet) in source.ictx.packets() {
        if stopped.load(Ordering::Relaxed) {
            break;
        }
        if stream.index() != source.stream_index {
            continue;
        }
        if let Err(e) = source.decoder.send_packet(&packet) {
            log::debug!("Dropping camera packet: {e}");
            continue;
        }
        while source.decoder.receive_frame(&mut decoded).is_ok() {
            if let Err(e) = source.scaler.run(&decoded, &mut rgb) {
                log::warn!("Camera frame conversion failed: {e}");
                continue;
            }
            sequence += 1;
            let pixels = extract_rgb_pixels(&rgb, source.width, source.height);
            let frame = Frame::new(pixels, source.width, source.height, sequence);
            match latest.lock() {
                Ok(mut slot) => *slot = Some(frame),
                Err(_) => return,
            }
        }
    }

    log::debug!("Camera reader exiting after {sequence} frames");
}

/// Copies an RGB24 ffmpeg frame into a tightly packed buffer, dropping the
/// per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * Frame::CHANNELS;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}
