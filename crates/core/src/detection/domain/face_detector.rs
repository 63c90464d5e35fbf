use crate::shared::frame::Frame;

/// What the detector saw in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub face_count: usize,
}

/// Domain interface for face detection.
///
/// Implementations may keep per-session state, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Detection, Box<dyn std::error::Error>>;
}
