//! Frame buffers shared by the camera, the recognition loop, and the
//! overlay painter.

use image::RgbImage;

/// One decoded frame plus the media timestamp it was produced at. The
/// timestamp is what the loop uses to detect that the source has actually
/// advanced; two frames with the same timestamp are the same picture.
#[derive(Clone)]
pub struct VideoFrame {
    pub image: RgbImage,
    pub timestamp_ms: i64,
}

impl VideoFrame {
    pub fn new(image: RgbImage, timestamp_ms: i64) -> Self {
        Self {
            image,
            timestamp_ms,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}
