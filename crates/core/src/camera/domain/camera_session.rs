use super::camera_device::{CameraConstraints, CameraDevice, CameraStream, HardwareError};
use crate::shared::frame::Frame;

/// Owns at most one open stream from a [`CameraDevice`] and guarantees it
/// is stopped on every exit path, including drop.
pub struct CameraSession {
    device: Box<dyn CameraDevice>,
    stream: Option<Box<dyn CameraStream>>,
}

impl CameraSession {
    pub fn new(device: Box<dyn CameraDevice>) -> Self {
        Self {
            device,
            stream: None,
        }
    }

    /// Acquires a stream matching `constraints`. An already open stream is
    /// released first, so the device is never held twice.
    pub fn open(&mut self, constraints: &CameraConstraints) -> Result<(), HardwareError> {
        self.close();
        let stream = self.device.open(constraints)?;
        log::info!(
            "Camera opened ({}x{}, {:?})",
            constraints.width,
            constraints.height,
            constraints.facing
        );
        self.stream = Some(stream);
        Ok(())
    }

    /// Stops every track of the held stream. Safe to call repeatedly and
    /// while nothing is open.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::info!("Camera released");
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn active_tracks(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.active_tracks())
    }

    pub fn current_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        match self.stream.as_mut() {
            Some(stream) => stream.current_frame(),
            None => Err("camera is not open".into()),
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}
