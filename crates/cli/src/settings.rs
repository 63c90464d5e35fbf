use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use facecheck_core::camera::domain::camera_device::{CameraConstraints, Facing};
use facecheck_core::detection::infrastructure::onnx_yolo_detector::DEFAULT_CONFIDENCE;
use facecheck_core::pipeline::capture_coordinator::CaptureConfig;
use facecheck_core::shared::constants::{
    CONFIRM_FRAMES, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_VERIFY_TIMEOUT,
    DETECTION_INTERVAL,
};

/// Longest accepted wait for the attendance server.
const MAX_VERIFY_TIMEOUT_SECS: u64 = 3600;

/// Persisted defaults for the `facecheck` command. The API token is
/// deliberately absent and never written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: Option<String>,
    pub device: Option<String>,
    pub facing: Facing,
    pub width: u32,
    pub height: u32,
    pub interval_ms: u64,
    pub confirm_frames: u32,
    pub confidence: f64,
    /// `0` waits for the server indefinitely.
    pub verify_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: None,
            device: None,
            facing: Facing::User,
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            interval_ms: DETECTION_INTERVAL.as_millis() as u64,
            confirm_frames: CONFIRM_FRAMES,
            confidence: DEFAULT_CONFIDENCE,
            verify_timeout_secs: DEFAULT_VERIFY_TIMEOUT.as_secs(),
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceCheck").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings at {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = Self::config_path().ok_or("could not determine config directory")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            )
            .into());
        }
        if self.interval_ms == 0 {
            return Err("Detection interval must be greater than 0 ms".into());
        }
        if self.confirm_frames == 0 {
            return Err("Confirm frames must be at least 1".into());
        }
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "Resolution must be non-zero, got {}x{}",
                self.width, self.height
            )
            .into());
        }
        if self.verify_timeout_secs > MAX_VERIFY_TIMEOUT_SECS {
            return Err(format!(
                "Verify timeout must be at most {MAX_VERIFY_TIMEOUT_SECS} s, got {}",
                self.verify_timeout_secs
            )
            .into());
        }
        if let Some(server) = &self.server {
            if !server.starts_with("http://") && !server.starts_with("https://") {
                return Err(format!("Server URL must start with http:// or https://, got '{server}'").into());
            }
        }
        Ok(())
    }

    pub fn verify_timeout(&self) -> Option<Duration> {
        (self.verify_timeout_secs > 0).then(|| Duration::from_secs(self.verify_timeout_secs))
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            constraints: CameraConstraints {
                device: self.device.clone(),
                width: self.width,
                height: self.height,
                facing: self.facing,
            },
            detection_interval: Duration::from_millis(self.interval_ms),
            confirm_frames: self.confirm_frames,
            verify_timeout: self.verify_timeout(),
        }
    }
}
