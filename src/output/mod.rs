#[cfg(feature = "webcam")]
mod loopback;
mod png;
pub mod yuyv;

#[cfg(feature = "webcam")]
pub use loopback::V4L2Output;
pub use png::PngSink;

use anyhow::Result;
use image::RgbaImage;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}

/// Scale `frame` to `size` unless it already matches.
pub(crate) fn fit(frame: &RgbaImage, size: (u32, u32)) -> std::borrow::Cow<'_, RgbaImage> {
    if frame.dimensions() == size {
        std::borrow::Cow::Borrowed(frame)
    } else {
        std::borrow::Cow::Owned(image::imageops::resize(
            frame,
            size.0,
            size.1,
            image::imageops::FilterType::Lanczos3,
        ))
    }
}
