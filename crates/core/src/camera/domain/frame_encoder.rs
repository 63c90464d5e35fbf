use crate::shared::frame::Frame;

/// Compresses the captured frame into the bytes submitted for verification.
pub trait FrameEncoder: Send {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, Box<dyn std::error::Error>>;
}
