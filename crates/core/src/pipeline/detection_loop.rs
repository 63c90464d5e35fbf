use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::detection::domain::detection_sample::DetectionSample;
use crate::detection::domain::face_detector::{Detection, FaceDetector};
use crate::shared::frame::Frame;

/// Raw result sent back by the detection worker.
#[derive(Debug)]
pub struct SampleResult {
    pub observed_at: Instant,
    /// Time spent inside the detector.
    pub elapsed: Duration,
    pub outcome: Result<Detection, String>,
}

#[derive(Error, Debug)]
pub enum DetectionLoopError {
    #[error("failed to spawn detection worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("detector is unavailable after a previous worker failed")]
    DetectorUnavailable,
}

/// What a timer tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Dispatched,
    /// Previous frame is still being analysed.
    InFlight,
    CaptureInProgress,
    /// The camera has not produced a frame yet.
    NoFrame,
    Stopped,
}

struct Running {
    ticker: Receiver<Instant>,
    requests: Sender<Frame>,
    samples: Receiver<SampleResult>,
    worker: JoinHandle<Box<dyn FaceDetector>>,
    in_flight: bool,
}

/// Periodic detector poll with at most one frame outstanding.
///
/// The detector lives on a worker thread while the loop runs and is handed
/// back on `stop()`, so a later session reuses the loaded model. The owner
/// waits on [`ticks`](Self::ticks) and [`samples`](Self::samples) and feeds
/// each event back through [`tick`](Self::tick) and [`accept`](Self::accept).
pub struct DetectionLoop {
    interval: Duration,
    detector: Option<Box<dyn FaceDetector>>,
    running: Option<Running>,
}

impl DetectionLoop {
    pub fn new(detector: Box<dyn FaceDetector>, interval: Duration) -> Self {
        Self {
            interval,
            detector: Some(detector),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts the ticker and the detection worker. No-op while running.
    pub fn start(&mut self) -> Result<(), DetectionLoopError> {
        if self.running.is_some() {
            return Ok(());
        }
        let mut detector = self
            .detector
            .take()
            .ok_or(DetectionLoopError::DetectorUnavailable)?;

        let (requests, request_rx) = crossbeam_channel::bounded::<Frame>(1);
        let (sample_tx, samples) = crossbeam_channel::bounded::<SampleResult>(1);

        let worker = std::thread::Builder::new()
            .name("face-detection".into())
            .spawn(move || {
                for frame in request_rx {
                    let started = Instant::now();
                    let outcome = detector.detect(&frame).map_err(|e| e.to_string());
                    let result = SampleResult {
                        observed_at: Instant::now(),
                        elapsed: started.elapsed(),
                        outcome,
                    };
                    if sample_tx.send(result).is_err() {
                        break;
                    }
                }
                detector
            })?;

        self.running = Some(Running {
            ticker: crossbeam_channel::tick(self.interval),
            requests,
            samples,
            worker,
            in_flight: false,
        });
        log::debug!("Detection loop started ({:?} interval)", self.interval);
        Ok(())
    }

    /// Cancels the ticker and joins the worker. When this returns no detector
    /// call is running and no further sample can be observed. Idempotent.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let Running {
            ticker,
            requests,
            samples,
            worker,
            ..
        } = running;
        drop(ticker);
        drop(requests);
        drop(samples);

        match worker.join() {
            Ok(detector) => self.detector = Some(detector),
            Err(_) => log::error!("Detection worker panicked; detector dropped"),
        }
        log::debug!("Detection loop stopped");
    }

    /// Tick source to wait on. Never fires while stopped.
    pub fn ticks(&self) -> Receiver<Instant> {
        self.running
            .as_ref()
            .map_or_else(crossbeam_channel::never, |r| r.ticker.clone())
    }

    /// Sample source to wait on. Never fires while stopped.
    pub fn samples(&self) -> Receiver<SampleResult> {
        self.running
            .as_ref()
            .map_or_else(crossbeam_channel::never, |r| r.samples.clone())
    }

    /// Handles one timer tick. `grab` is only called when a frame will
    /// actually be sent to the detector.
    pub fn tick<F>(&mut self, capture_in_progress: bool, grab: F) -> TickOutcome
    where
        F: FnOnce() -> Option<Frame>,
    {
        let Some(running) = self.running.as_mut() else {
            return TickOutcome::Stopped;
        };
        if capture_in_progress {
            return TickOutcome::CaptureInProgress;
        }
        if running.in_flight {
            return TickOutcome::InFlight;
        }
        let Some(frame) = grab() else {
            return TickOutcome::NoFrame;
        };

        match running.requests.try_send(frame) {
            Ok(()) => {
                running.in_flight = true;
                TickOutcome::Dispatched
            }
            Err(TrySendError::Full(_)) => TickOutcome::InFlight,
            Err(TrySendError::Disconnected(_)) => {
                log::error!("Detection worker exited unexpectedly");
                TickOutcome::Stopped
            }
        }
    }

    /// Turns a worker result into a sample. A failed detection counts as a
    /// zero-face sample. Results arriving after `stop()` are dropped.
    pub fn accept(&mut self, result: SampleResult) -> Option<DetectionSample> {
        let running = self.running.as_mut()?;
        running.in_flight = false;

        let face_count = match result.outcome {
            Ok(detection) => detection.face_count,
            Err(e) => {
                log::warn!("Face detection failed, counting as no face: {e}");
                0
            }
        };
        Some(DetectionSample::new(face_count, result.observed_at))
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_frame, ScriptedDetector};

    const FAST: Duration = Duration::from_millis(5);
    const WAIT: Duration = Duration::from_secs(2);

    fn dispatch_and_wait(detection: &mut DetectionLoop) -> Option<DetectionSample> {
        assert_eq!(
            detection.tick(false, || Some(test_frame(0))),
            TickOutcome::Dispatched
        );
        let result = detection.samples().recv_timeout(WAIT).unwrap();
        detection.accept(result)
    }

    #[test]
    fn test_tick_while_stopped_does_nothing() {
        let detector = ScriptedDetector::new(vec![], 1);
        let mut detection = DetectionLoop::new(Box::new(detector.clone()), FAST);

        let outcome = detection.tick(false, || panic!("must not grab while stopped"));

        assert_eq!(outcome, TickOutcome::Stopped);
        assert_eq!(detector.calls(), 0);
    }

    #[test]
    fn test_ticks_fire_after_start() {
        let mut detection = DetectionLoop::new(Box::new(ScriptedDetector::new(vec![], 1)), FAST);
        assert!(detection.ticks().recv_timeout(Duration::from_millis(50)).is_err());

        detection.start().unwrap();

        assert!(detection.ticks().recv_timeout(WAIT).is_ok());
    }

    #[test]
    fn test_only_one_frame_in_flight() {
        let mut detection = DetectionLoop::new(Box::new(ScriptedDetector::new(vec![], 1)), FAST);
        detection.start().unwrap();

        assert_eq!(
            detection.tick(false, || Some(test_frame(0))),
            TickOutcome::Dispatched
        );
        assert_eq!(
            detection.tick(false, || panic!("must not grab while in flight")),
            TickOutcome::InFlight
        );

        let result = detection.samples().recv_timeout(WAIT).unwrap();
        assert_eq!(detection.accept(result).unwrap().face_count, 1);
        assert_eq!(
            detection.tick(false, || Some(test_frame(1))),
            TickOutcome::Dispatched
        );
    }

    #[test]
    fn test_capture_in_progress_skips_tick() {
        let detector = ScriptedDetector::new(vec![], 1);
        let mut detection = DetectionLoop::new(Box::new(detector.clone()), FAST);
        detection.start().unwrap();

        let outcome = detection.tick(true, || panic!("must not grab during capture"));

        assert_eq!(outcome, TickOutcome::CaptureInProgress);
        detection.stop();
        assert_eq!(detector.calls(), 0);
    }

    #[test]
    fn test_missing_frame_skips_tick() {
        let mut detection = DetectionLoop::new(Box::new(ScriptedDetector::new(vec![], 1)), FAST);
        detection.start().unwrap();

        assert_eq!(detection.tick(false, || None), TickOutcome::NoFrame);
        assert_eq!(
            detection.tick(false, || Some(test_frame(0))),
            TickOutcome::Dispatched
        );
    }

    #[test]
    fn test_detector_error_counts_as_zero_faces() {
        let detector = ScriptedDetector::new(vec![None, Some(2)], 1);
        let mut detection = DetectionLoop::new(Box::new(detector), FAST);
        detection.start().unwrap();

        assert_eq!(dispatch_and_wait(&mut detection).unwrap().face_count, 0);
        assert_eq!(dispatch_and_wait(&mut detection).unwrap().face_count, 2);
    }

    #[test]
    fn test_stop_discards_in_flight_result() {
        let detector = ScriptedDetector::new(vec![], 1);
        let mut detection = DetectionLoop::new(Box::new(detector.clone()), FAST);
        detection.start().unwrap();
        detection.tick(false, || Some(test_frame(0)));

        detection.stop();

        assert!(!detection.is_running());
        assert!(detection
            .samples()
            .recv_timeout(Duration::from_millis(50))
            .is_err());
        let late = SampleResult {
            observed_at: Instant::now(),
            elapsed: Duration::ZERO,
            outcome: Ok(Detection { face_count: 1 }),
        };
        assert!(detection.accept(late).is_none());
    }

    #[test]
    fn test_stop_is_idempotent_and_restart_reuses_detector() {
        let detector = ScriptedDetector::new(vec![], 1);
        let mut detection = DetectionLoop::new(Box::new(detector.clone()), FAST);

        detection.start().unwrap();
        dispatch_and_wait(&mut detection);
        detection.stop();
        detection.stop();
        detection.start().unwrap();
        dispatch_and_wait(&mut detection);

        assert_eq!(detector.calls(), 2);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut detection = DetectionLoop::new(Box::new(ScriptedDetector::new(vec![], 1)), FAST);
        detection.start().unwrap();
        detection.start().unwrap();
        assert!(detection.is_running());
    }
}
