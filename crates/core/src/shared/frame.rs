use std::time::Instant;

use ndarray::ArrayView3;

/// One RGB24 frame grabbed from the live camera stream.
///
/// Pixel data is tightly packed, row-major, three bytes per pixel. The
/// sequence number is assigned by the stream and increases monotonically.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * Self::CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// `[height, width, channel]` view used by detector preprocessing.
    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, Self::CHANNELS),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels into an `image` buffer for encoding.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}
