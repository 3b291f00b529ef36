use super::CaptureSource;
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;

/// A still image served as an endless stream of identical frames.
pub struct ImageFileSource {
    frame: RgbImage,
}

impl ImageFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading source image from {}", path.display());

        let frame = image::open(path)
            .with_context(|| format!("Failed to open image {}", path.display()))?
            .to_rgb8();
        tracing::debug!("Source image is {}x{}", frame.width(), frame.height());

        Ok(Self { frame })
    }

    pub fn from_image(frame: RgbImage) -> Self {
        Self { frame }
    }
}

impl CaptureSource for ImageFileSource {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        Ok(self.frame.clone())
    }

    fn resolution(&self) -> (u32, u32) {
        self.frame.dimensions()
    }
}
