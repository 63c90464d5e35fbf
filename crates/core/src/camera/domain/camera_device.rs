use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH};
use crate::shared::frame::Frame;

/// Which way the requested camera should face. Desktop capture backends
/// usually expose a single device, so this is a hint rather than a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    User,
    Environment,
}

/// Resolution and device hints for opening a capture stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConstraints {
    /// Platform device identifier (e.g. `/dev/video0`); `None` picks the default.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub facing: Facing,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            device: None,
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            facing: Facing::User,
        }
    }
}

/// Failure to acquire the video device. Never fatal: the session stays idle
/// and the user may try again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HardwareError {
    #[error("camera access denied: {0}")]
    Denied(String),
    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

/// Grants exclusive access to a video input device.
pub trait CameraDevice: Send {
    fn open(
        &mut self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, HardwareError>;
}

/// A live, revocable stream handed out by a [`CameraDevice`].
pub trait CameraStream: Send {
    /// Latest decoded frame. Errors while the stream has not produced a
    /// frame yet or after it was stopped.
    fn current_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>>;

    /// Stops every track and releases the device. Idempotent.
    fn stop(&mut self);

    /// Number of tracks still delivering frames.
    fn active_tracks(&self) -> usize;
}
