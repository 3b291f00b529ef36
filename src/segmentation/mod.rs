mod argmax;
pub mod palette;
#[cfg(feature = "onnx")]
mod preprocess;
#[cfg(feature = "onnx")]
mod rvm;
pub mod types;

pub use argmax::{argmax, argmax_labels, argmax_target};
pub use palette::{Legend, LegendEntry};
#[cfg(feature = "onnx")]
pub use preprocess::Preprocessor;
#[cfg(feature = "onnx")]
pub use rvm::RobustVideoMatting;
pub use types::{ClassScoreMap, Mask, SegmentationModel};

use anyhow::{Context, Result};
use std::path::Path;

/// PASCAL VOC class index of "person".
pub const PERSON_CLASS: usize = 15;

/// PASCAL VOC class names, in palette order.
pub const VOC_LABELS: [&str; 21] = [
    "background",
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tv",
];

/// Load a raw little-endian `f32` score dump.
///
/// `output_shape` is `[width, height, classes]`; the valid region is taken
/// to be `scaled_shape`.
pub fn load_raw_scores<P: AsRef<Path>>(
    path: P,
    output_shape: [usize; 3],
    scaled_shape: [usize; 2],
    labels: Vec<String>,
) -> Result<ClassScoreMap> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read scores from {}", path.display()))?;
    if bytes.len() % 4 != 0 {
        anyhow::bail!(
            "{} is {} bytes, not a whole number of f32 values",
            path.display(),
            bytes.len()
        );
    }
    let data: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    tracing::debug!("Loaded {} scores from {}", data.len(), path.display());

    let map = ClassScoreMap::new(data, output_shape, scaled_shape, labels)
        .with_context(|| format!("Invalid score map in {}", path.display()))?;
    Ok(map)
}

/// Create a default segmentation model (RVM)
#[cfg(feature = "onnx")]
pub fn create_default_model(model_path: &str) -> Result<Box<dyn SegmentationModel>> {
    let model = RobustVideoMatting::new(model_path)?;
    Ok(Box::new(model))
}
