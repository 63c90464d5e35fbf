pub mod advisory_latch;
pub mod detection_sample;
pub mod face_detector;
pub mod stability_gate;
