use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::camera::domain::camera_device::{CameraConstraints, CameraDevice, HardwareError};
use crate::camera::domain::camera_session::CameraSession;
use crate::camera::domain::frame_encoder::FrameEncoder;
use crate::detection::domain::advisory_latch::{Advisory, AdvisoryLatch};
use crate::detection::domain::detection_sample::FaceStatus;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::stability_gate::StabilityGate;
use crate::pipeline::capture_logger::CaptureLogger;
use crate::pipeline::detection_loop::{DetectionLoop, DetectionLoopError, SampleResult};
use crate::pipeline::session_state::SessionState;
use crate::shared::constants::{CONFIRM_FRAMES, DEFAULT_VERIFY_TIMEOUT, DETECTION_INTERVAL};
use crate::verification::domain::face_verifier::{FaceVerifier, VerificationError};
use crate::verification::domain::verification_result::VerificationResult;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub constraints: CameraConstraints,
    pub detection_interval: Duration,
    pub confirm_frames: u32,
    /// `None` waits for the verifier indefinitely.
    pub verify_timeout: Option<Duration>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            constraints: CameraConstraints::default(),
            detection_interval: DETECTION_INTERVAL,
            confirm_frames: CONFIRM_FRAMES,
            verify_timeout: Some(DEFAULT_VERIFY_TIMEOUT),
        }
    }
}

/// Everything a coordinator owns for its lifetime.
pub struct CaptureParts {
    pub camera: Box<dyn CameraDevice>,
    pub detector: Box<dyn FaceDetector>,
    pub encoder: Box<dyn FrameEncoder>,
    pub verifier: Arc<dyn FaceVerifier>,
    pub logger: Box<dyn CaptureLogger>,
    pub config: CaptureConfig,
}

/// Events reported to whoever presents the session to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureMessage {
    Opened,
    FaceStatus(FaceStatus),
    /// Latched advisory, sent once per change of face-count class.
    Warning(Advisory),
    Capturing,
    Verifying,
    Result(VerificationResult),
    /// Sent after a successful check-in so history views can reload.
    RefreshHistory,
    HardwareError(HardwareError),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    Cancel,
}

/// Cloneable remote control for a running coordinator.
#[derive(Clone)]
pub struct CaptureHandle {
    commands: Sender<CaptureCommand>,
    cancelled: Arc<AtomicBool>,
}

impl CaptureHandle {
    /// Requests the session to close. Wins over a capture trigger that has
    /// not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.commands.send(CaptureCommand::Cancel);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("a capture session is already {0}")]
    SessionActive(SessionState),
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    #[error(transparent)]
    Detection(#[from] DetectionLoopError),
}

/// The single capture of a session.
#[derive(Debug, Clone)]
pub struct CaptureAttempt {
    pub image: Arc<[u8]>,
    pub started_at: Instant,
}

struct PendingVerification {
    attempt: CaptureAttempt,
    sent_at: Instant,
    results: Receiver<Result<VerificationResult, VerificationError>>,
    deadline: Receiver<Instant>,
}

/// State machine for one check-in: open the camera, poll the detector until
/// one face is held steady, capture once, verify once, release everything.
///
/// All transitions happen on the thread calling [`run`](Self::run) or
/// [`step`](Self::step). Other threads interact through a [`CaptureHandle`].
pub struct CaptureCoordinator {
    state: SessionState,
    config: CaptureConfig,
    camera: CameraSession,
    detection: DetectionLoop,
    gate: StabilityGate,
    latch: AdvisoryLatch,
    encoder: Box<dyn FrameEncoder>,
    verifier: Arc<dyn FaceVerifier>,
    logger: Box<dyn CaptureLogger>,
    events: Sender<CaptureMessage>,
    command_tx: Sender<CaptureCommand>,
    commands: Receiver<CaptureCommand>,
    cancelled: Arc<AtomicBool>,
    pending: Option<PendingVerification>,
}

impl CaptureCoordinator {
    pub fn new(parts: CaptureParts, events: Sender<CaptureMessage>) -> Self {
        let (command_tx, commands) = crossbeam_channel::unbounded();
        let CaptureParts {
            camera,
            detector,
            encoder,
            verifier,
            logger,
            config,
        } = parts;

        Self {
            state: SessionState::Idle,
            camera: CameraSession::new(camera),
            detection: DetectionLoop::new(detector, config.detection_interval),
            gate: StabilityGate::new(config.confirm_frames),
            latch: AdvisoryLatch::new(),
            config,
            encoder,
            verifier,
            logger,
            events,
            command_tx,
            commands,
            cancelled: Arc::new(AtomicBool::new(false)),
            pending: None,
        }
    }

    pub fn handle(&self) -> CaptureHandle {
        CaptureHandle {
            commands: self.command_tx.clone(),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_tracks(&self) -> usize {
        self.camera.active_tracks()
    }

    pub fn detection_running(&self) -> bool {
        self.detection.is_running()
    }

    /// Acquires the camera and starts detection. A hardware failure leaves
    /// the session `Idle` so the caller can retry. Cancels issued before
    /// this call do not carry over.
    pub fn open(&mut self) -> Result<(), CaptureError> {
        if !self.state.accepts_open() {
            return Err(CaptureError::SessionActive(self.state));
        }
        self.cancelled.store(false, Ordering::SeqCst);
        while self.commands.try_recv().is_ok() {}
        self.gate.reset();
        self.latch.reset();

        self.transition(SessionState::Opening);
        if let Err(e) = self.camera.open(&self.config.constraints) {
            log::warn!("Could not open camera: {e}");
            self.transition(SessionState::Idle);
            self.emit(CaptureMessage::HardwareError(e.clone()));
            return Err(e.into());
        }
        if let Err(e) = self.detection.start() {
            log::error!("Could not start detection: {e}");
            self.camera.close();
            self.transition(SessionState::Idle);
            return Err(e.into());
        }

        self.transition(SessionState::Detecting);
        self.logger.info("Camera opened; waiting for a single steady face");
        self.emit(CaptureMessage::Opened);
        Ok(())
    }

    /// Processes events until the session comes to rest. Returns the
    /// verification result, or `None` when the session was cancelled.
    pub fn run(&mut self) -> Option<VerificationResult> {
        let mut result = None;
        while self.state.is_active() {
            if let Some(r) = self.step() {
                result = Some(r);
            }
        }
        result
    }

    /// Blocks for the next event and handles it. Returns a result when this
    /// step completed the capture attempt.
    pub fn step(&mut self) -> Option<VerificationResult> {
        if !self.state.is_active() {
            return None;
        }

        let commands = self.commands.clone();
        let ticks = self.detection.ticks();
        let samples = self.detection.samples();
        let (results, deadline) = match &self.pending {
            Some(p) => (p.results.clone(), p.deadline.clone()),
            None => (crossbeam_channel::never(), crossbeam_channel::never()),
        };

        crossbeam_channel::select! {
            recv(commands) -> command => {
                if let Ok(CaptureCommand::Cancel) = command {
                    log::info!("Capture cancelled while {}", self.state);
                    self.close();
                }
                None
            }
            recv(ticks) -> _ => {
                self.on_tick();
                None
            }
            recv(samples) -> sample => match sample {
                Ok(sample) => self.on_sample(sample),
                Err(_) => {
                    log::error!("Detection worker stopped unexpectedly");
                    self.close();
                    None
                }
            },
            recv(results) -> outcome => {
                let outcome = outcome.unwrap_or_else(|_| {
                    Err(VerificationError::Transport(
                        "verification worker exited without a response".into(),
                    ))
                });
                self.on_verified(outcome)
            }
            recv(deadline) -> _ => self.on_timeout(),
        }
    }

    /// Ends the session from any state and releases the camera and the
    /// detection loop. An in-flight verification is abandoned and its
    /// result discarded. Idempotent.
    pub fn close(&mut self) {
        let was_active = self.state.is_active();
        self.release();
        if was_active {
            self.transition(SessionState::Closed);
            self.emit(CaptureMessage::Closed);
            self.logger.summary();
        }
    }

    fn on_tick(&mut self) {
        let capture_in_progress = self.state.capture_in_progress();
        let camera = &mut self.camera;
        let outcome = self.detection.tick(capture_in_progress, || {
            camera
                .current_frame()
                .map_err(|e| log::debug!("No frame for detection: {e}"))
                .ok()
        });
        log::trace!("Detection tick: {outcome:?}");
    }

    fn on_sample(&mut self, result: SampleResult) -> Option<VerificationResult> {
        let elapsed = result.elapsed;
        let sample = self.detection.accept(result)?;
        if self.state != SessionState::Detecting {
            return None;
        }

        self.logger.timing("detect", duration_ms(elapsed));
        self.logger.metric("face_count", sample.face_count as f64);

        let outcome = self.gate.observe(&sample);
        log::debug!(
            "{:?} ({}/{})",
            outcome.status,
            self.gate.consecutive_single_face_count(),
            self.gate.confirm_frames()
        );
        self.emit(CaptureMessage::FaceStatus(outcome.status));
        if let Some(advisory) = self.latch.update(outcome.status) {
            self.logger.info(&advisory.to_string());
            self.emit(CaptureMessage::Warning(advisory));
        }

        if outcome.trigger {
            return self.begin_capture();
        }
        None
    }

    fn begin_capture(&mut self) -> Option<VerificationResult> {
        if self.cancelled.load(Ordering::SeqCst) {
            log::info!("Discarding capture trigger; session is closing");
            self.close();
            return None;
        }

        self.transition(SessionState::Capturing);
        self.detection.stop();
        self.emit(CaptureMessage::Capturing);

        let started_at = Instant::now();
        let image = match self
            .camera
            .current_frame()
            .and_then(|frame| self.encoder.encode(&frame))
        {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Capture failed: {e}");
                return Some(self.finish(VerificationResult::failed(format!(
                    "Capture failed: {e}"
                ))));
            }
        };
        self.logger.timing("encode", duration_ms(started_at.elapsed()));

        self.dispatch_verification(CaptureAttempt {
            image: image.into(),
            started_at,
        })
    }

    fn dispatch_verification(&mut self, attempt: CaptureAttempt) -> Option<VerificationResult> {
        self.transition(SessionState::Verifying);
        self.emit(CaptureMessage::Verifying);

        let (result_tx, results) = crossbeam_channel::bounded(1);
        let verifier = Arc::clone(&self.verifier);
        let image = Arc::clone(&attempt.image);
        let spawned = std::thread::Builder::new()
            .name("face-verification".into())
            .spawn(move || {
                let _ = result_tx.send(verifier.verify(&image));
            });
        if let Err(e) = spawned {
            log::error!("Could not start verification: {e}");
            return Some(self.finish(VerificationResult::failed(format!(
                "Could not start verification: {e}"
            ))));
        }

        let sent_at = Instant::now();
        // A timeout too large to represent as an instant never fires
        let deadline = self
            .config
            .verify_timeout
            .and_then(|timeout| sent_at.checked_add(timeout))
            .map_or_else(crossbeam_channel::never, crossbeam_channel::at);
        log::info!("Submitted {} byte capture for verification", attempt.image.len());
        self.pending = Some(PendingVerification {
            attempt,
            sent_at,
            results,
            deadline,
        });
        None
    }

    fn on_verified(
        &mut self,
        outcome: Result<VerificationResult, VerificationError>,
    ) -> Option<VerificationResult> {
        if self.discard_if_cancelled() {
            return None;
        }
        let pending = self.pending.take()?;
        self.logger.timing("verify", duration_ms(pending.sent_at.elapsed()));
        log::debug!(
            "Capture attempt took {:?} end to end",
            pending.attempt.started_at.elapsed()
        );

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Verification request failed: {e}");
                VerificationResult::failed(format!("Network error: {e}"))
            }
        };
        Some(self.finish(result))
    }

    fn on_timeout(&mut self) -> Option<VerificationResult> {
        if self.discard_if_cancelled() {
            return None;
        }
        let pending = self.pending.take()?;
        let waited = pending.sent_at.elapsed();
        log::warn!("Verification timed out after {waited:?}; discarding late response");
        drop(pending);
        Some(self.finish(VerificationResult::failed(format!(
            "Network error: verification timed out after {:.1}s",
            waited.as_secs_f64()
        ))))
    }

    /// A cancel that returned before the response was handled closes the
    /// session without reporting the response.
    fn discard_if_cancelled(&mut self) -> bool {
        if !self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        log::info!("Discarding verification outcome; session was cancelled");
        self.close();
        true
    }

    /// Terminal path of a capture attempt: cleanup first, then report.
    fn finish(&mut self, result: VerificationResult) -> VerificationResult {
        self.release();
        self.transition(SessionState::Closed);

        if result.success() {
            self.logger.info(&format!("Verified: {}", result.message()));
        } else {
            self.logger.info(&format!("Not verified: {}", result.message()));
        }
        self.emit(CaptureMessage::Result(result.clone()));
        if result.success() {
            self.emit(CaptureMessage::RefreshHistory);
        }
        self.emit(CaptureMessage::Closed);
        self.logger.summary();
        result
    }

    fn release(&mut self) {
        if self.pending.take().is_some() {
            log::info!("Abandoning in-flight verification");
        }
        self.detection.stop();
        self.camera.close();
        self.gate.reset();
        self.latch.reset();
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::info!("Capture session {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn emit(&self, message: CaptureMessage) {
        let _ = self.events.send(message);
    }
}

impl Drop for CaptureCoordinator {
    fn drop(&mut self) {
        self.close();
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
