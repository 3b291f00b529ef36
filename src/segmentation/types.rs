use crate::error::{FxError, Result};
use image::RgbImage;
use ndarray::{Array3, ArrayView3};
use std::collections::BTreeSet;

/// Per-pixel class scores from a segmentation network.
///
/// Stored as `height x width x classes` (class is the fastest axis, the
/// NHWC layout networks emit). Only the top-left `scaled_shape` region
/// corresponds to the source image; the rest is padding.
#[derive(Debug, Clone)]
pub struct ClassScoreMap {
    scores: Array3<f32>,
    scaled_shape: (usize, usize),
    labels: Vec<String>,
}

impl ClassScoreMap {
    /// Build from a flat buffer.
    ///
    /// `output_shape` is `[width, height, classes]`, `scaled_shape` is
    /// `[width, height]` of the valid region.
    pub fn new(
        data: Vec<f32>,
        output_shape: [usize; 3],
        scaled_shape: [usize; 2],
        labels: Vec<String>,
    ) -> Result<Self> {
        let [width, height, classes] = output_shape;
        if classes == 0 || classes > 256 {
            return Err(FxError::shape(format!(
                "{classes} classes; masks hold 1 to 256"
            )));
        }
        if data.len() != width * height * classes {
            return Err(FxError::shape(format!(
                "score buffer has {} values, shape {width}x{height}x{classes} needs {}",
                data.len(),
                width * height * classes
            )));
        }
        let [scaled_w, scaled_h] = scaled_shape;
        if scaled_w > width || scaled_h > height {
            return Err(FxError::shape(format!(
                "scaled shape {scaled_w}x{scaled_h} exceeds output {width}x{height}"
            )));
        }
        let scores = Array3::from_shape_vec((height, width, classes), data)
            .map_err(|e| FxError::shape(e.to_string()))?;
        Ok(ClassScoreMap {
            scores,
            scaled_shape: (scaled_w, scaled_h),
            labels,
        })
    }

    pub fn width(&self) -> usize {
        self.scores.dim().1
    }

    pub fn height(&self) -> usize {
        self.scores.dim().0
    }

    pub fn num_classes(&self) -> usize {
        self.scores.dim().2
    }

    pub fn scaled_shape(&self) -> (usize, usize) {
        self.scaled_shape
    }

    pub fn scores(&self) -> ArrayView3<'_, f32> {
        self.scores.view()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Display name of a class, or `"unknown"` past the label list.
    pub fn label(&self, class: usize) -> &str {
        self.labels.get(class).map(String::as_str).unwrap_or("unknown")
    }

    /// Region of the map that masks are derived from.
    ///
    /// The scaled shape is used when the output matches it in width OR
    /// height; otherwise the whole output is used. With near-square outputs
    /// this picks the scaled region; for other shapes it can pick the full
    /// padded map.
    pub fn mask_extent(&self) -> (usize, usize) {
        let (scaled_w, scaled_h) = self.scaled_shape;
        let is_scaled = self.width() == scaled_w || self.height() == scaled_h;
        if is_scaled {
            (scaled_w, scaled_h)
        } else {
            (self.width(), self.height())
        }
    }
}

/// An 8-bit single-channel mask, row-major, top row first.
///
/// Holds either class indices or a 0/255 membership indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Mask {
    pub fn from_vec(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if data.len() != width * height {
            return Err(FxError::shape(format!(
                "mask of {} bytes for {width}x{height}",
                data.len()
            )));
        }
        Ok(Mask {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Distinct values present, ascending.
    pub fn distinct(&self) -> BTreeSet<u8> {
        self.data.iter().copied().collect()
    }

    /// 255 where the class is `target`, 0 elsewhere.
    pub fn select(&self, target: usize) -> Mask {
        let data = self
            .data
            .iter()
            .map(|&c| if c as usize == target { 255 } else { 0 })
            .collect();
        Mask {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends (RVM, DeepLab, MediaPipe, etc.)
pub trait SegmentationModel {
    /// Score every pixel of a frame.
    ///
    /// The returned map's scaled shape covers the frame; its classes index
    /// into `labels()`.
    fn segment(&mut self, frame: &RgbImage) -> anyhow::Result<ClassScoreMap>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Call this when:
    /// - Switching cameras
    /// - Scene cuts detected
    /// - Starting a new video session
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }

    /// Class index treated as the subject in matting effects.
    fn target_class(&self) -> usize {
        super::PERSON_CLASS
    }

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}
