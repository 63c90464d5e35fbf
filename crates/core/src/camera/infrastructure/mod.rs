pub mod ffmpeg_camera;
pub mod jpeg_frame_encoder;
