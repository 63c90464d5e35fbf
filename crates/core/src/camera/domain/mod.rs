pub mod camera_device;
pub mod camera_session;
pub mod frame_encoder;
