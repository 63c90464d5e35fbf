use std::time::Duration;

pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Consecutive single-face samples required before a capture is triggered
/// (~2.5 s at the default cadence).
pub const CONFIRM_FRAMES: u32 = 10;

pub const DETECTION_INTERVAL: Duration = Duration::from_millis(250);

pub const DEFAULT_CAPTURE_WIDTH: u32 = 1280;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 720;
pub const DEFAULT_CAPTURE_FRAMERATE: u32 = 30;

pub const JPEG_QUALITY: u8 = 95;

pub const ATTENDANCE_PATH: &str = "users/attendance";
pub const FACE_IMAGE_FIELD: &str = "face_image";
pub const FACE_IMAGE_FILENAME: &str = "capture.jpg";

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(30);
