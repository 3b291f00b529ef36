use super::{fit, OutputSink};
use anyhow::{Context, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};

/// Writes each frame to an image file, replacing the previous one. The
/// format follows the file extension.
pub struct PngSink {
    path: PathBuf,
    size: Option<(u32, u32)>,
    frames: u64,
}

impl PngSink {
    /// Frames are written at their own size.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            size: None,
            frames: 0,
        }
    }

    /// Frames are scaled to `width` x `height` before writing.
    pub fn with_size<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Self {
        Self {
            size: Some((width, height)),
            ..Self::new(path)
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl OutputSink for PngSink {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        let frame = fit(frame, self.size.unwrap_or(frame.dimensions()));
        frame
            .save(&self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        self.frames += 1;
        tracing::debug!("Wrote frame {} to {}", self.frames, self.path.display());
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        self.size.unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn writes_and_scales_frames() {
        let dir = std::env::temp_dir().join(format!("edgematte-png-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.png");

        let mut sink = PngSink::with_size(&path, 4, 2);
        sink.write_frame(&RgbaImage::from_pixel(2, 1, Rgba([9, 8, 7, 255])))
            .unwrap();
        assert_eq!(sink.frames_written(), 1);

        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(back.dimensions(), (4, 2));
        let px = back.get_pixel(0, 0).0;
        for (got, want) in px.iter().zip([9u8, 8, 7, 255]) {
            assert!((*got as i32 - want as i32).abs() <= 1, "{px:?}");
        }

        std::fs::remove_dir_all(&dir).ok();
    }
}
