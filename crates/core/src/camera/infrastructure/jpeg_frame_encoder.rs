use image::codecs::jpeg::JpegEncoder;

use crate::camera::domain::frame_encoder::FrameEncoder;
use crate::shared::constants::JPEG_QUALITY;
use crate::shared::frame::Frame;

/// Encodes a captured frame as JPEG using the `image` crate.
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(JPEG_QUALITY)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let img = frame
            .to_rgb_image()
            .ok_or("Failed to create image from frame data")?;

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.quality).encode_image(&img)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Frame::new(data, width, height, 0)
    }

    #[test]
    fn test_encode_produces_decodable_jpeg() {
        let encoder = JpegFrameEncoder::default();
        let bytes = encoder.encode(&make_frame(64, 48, [40, 120, 200])).unwrap();

        assert_eq!(
            image::guess_format(&bytes).unwrap(),
            image::ImageFormat::Jpeg
        );
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        // Noisy content so quality actually changes the size
        let data: Vec<u8> = (0..(128u32 * 128 * 3)).map(|i| (i * 7919 % 251) as u8).collect();
        let frame = Frame::new(data, 128, 128, 0);

        let high = JpegFrameEncoder::new(95).encode(&frame).unwrap();
        let low = JpegFrameEncoder::new(20).encode(&frame).unwrap();

        assert!(low.len() < high.len());
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(JpegFrameEncoder::new(0).quality, 1);
        assert_eq!(JpegFrameEncoder::new(255).quality, 100);
    }
}
