//! Test doubles shared by the camera, loop and coordinator tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use crate::camera::domain::camera_device::{
    CameraConstraints, CameraDevice, CameraStream, HardwareError,
};
use crate::detection::domain::face_detector::{Detection, FaceDetector};
use crate::shared::frame::Frame;
use crate::verification::domain::face_verifier::{FaceVerifier, VerificationError};
use crate::verification::domain::verification_result::VerificationResult;

pub fn test_frame(sequence: u64) -> Frame {
    Frame::new(vec![128; 4 * 4 * Frame::CHANNELS], 4, 4, sequence)
}

#[derive(Default)]
struct CameraCounters {
    live: AtomicUsize,
    opens: AtomicUsize,
    stops: AtomicUsize,
    failures: Mutex<Option<(HardwareError, usize)>>,
}

/// Camera whose clones share counters, so a test can keep one clone and
/// hand the other to the code under test.
#[derive(Clone, Default)]
pub struct FakeCamera {
    counters: Arc<CameraCounters>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `times` opens with `error`, then succeeds.
    pub fn failing(error: HardwareError, times: usize) -> Self {
        let camera = Self::default();
        if let Ok(mut failures) = camera.counters.failures.lock() {
            *failures = Some((error, times));
        }
        camera
    }

    pub fn live_tracks(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }
}

impl CameraDevice for FakeCamera {
    fn open(
        &mut self,
        _constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, HardwareError> {
        {
            let mut failures = self.counters.failures.lock().unwrap();
            if let Some((error, remaining)) = failures.as_mut() {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            counters: Arc::clone(&self.counters),
            stopped: false,
            sequence: 0,
        }))
    }
}

struct FakeStream {
    counters: Arc<CameraCounters>,
    stopped: bool,
    sequence: u64,
}

impl CameraStream for FakeStream {
    fn current_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        if self.stopped {
            return Err("stream stopped".into());
        }
        self.sequence += 1;
        Ok(test_frame(self.sequence))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn active_tracks(&self) -> usize {
        usize::from(!self.stopped)
    }
}

/// Detector that replays face counts. `None` entries fail the call; once
/// the script runs out every call reports `tail` faces.
#[derive(Clone)]
pub struct ScriptedDetector {
    script: Arc<Mutex<VecDeque<Option<usize>>>>,
    tail: usize,
    calls: Arc<AtomicUsize>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Option<usize>>, tail: usize) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            tail,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counts(counts: &[usize], tail: usize) -> Self {
        Self::new(counts.iter().map(|&c| Some(c)).collect(), tail)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Detection, Box<dyn std::error::Error>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Some(face_count)) => Ok(Detection { face_count }),
            Some(None) => Err("corrupt frame".into()),
            None => Ok(Detection {
                face_count: self.tail,
            }),
        }
    }
}

/// Verifier returning a fixed response. A blocking verifier parks every
/// call until the paired sender sends or is dropped.
#[derive(Clone)]
pub struct RecordingVerifier {
    response: Result<VerificationResult, VerificationError>,
    calls: Arc<AtomicUsize>,
    release: Option<Receiver<()>>,
}

impl RecordingVerifier {
    pub fn returning(response: Result<VerificationResult, VerificationError>) -> Self {
        Self {
            response,
            calls: Arc::new(AtomicUsize::new(0)),
            release: None,
        }
    }

    pub fn succeeding() -> Self {
        Self::returning(Ok(VerificationResult::succeeded(
            "Attendance recorded (On time)",
            Some("2024-05-02 08:00:00".into()),
        )))
    }

    pub fn blocking(
        response: Result<VerificationResult, VerificationError>,
    ) -> (Self, Sender<()>) {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let mut verifier = Self::returning(response);
        verifier.release = Some(release_rx);
        (verifier, release_tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceVerifier for RecordingVerifier {
    fn verify(&self, image: &[u8]) -> Result<VerificationResult, VerificationError> {
        assert!(!image.is_empty(), "verifier received an empty image");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(release) = &self.release {
            let _ = release.recv();
        }
        self.response.clone()
    }
}
