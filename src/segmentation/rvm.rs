use super::preprocess::Preprocessor;
use super::types::{ClassScoreMap, SegmentationModel};
use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{Array4, IxDyn};
use ort::{GraphOptimizationLevel, Session};
use std::path::Path;

/// RobustVideoMatting segmentation model
///
/// Recurrent: hidden states r1-r4 are carried between frames for temporal
/// stability. The alpha matte is reported as a two-class score map
/// (background, person).
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
    hidden: Option<[Array4<f32>; 4]>,
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Load an RVM ONNX export.
    ///
    /// Runs at 512x512 with hidden states at a quarter of that.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let width = 512;
        let height = 512;

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            width,
            height,
            hidden: None,
            downsample_ratio: 0.25,
        })
    }

    fn zero_hidden_states(&self) -> [Array4<f32>; 4] {
        let h = (self.height as f32 * self.downsample_ratio) as usize;
        let w = (self.width as f32 * self.downsample_ratio) as usize;

        tracing::debug!("Initializing hidden states to {}x{}", w, h);

        [
            Array4::zeros((1, 16, h, w)),
            Array4::zeros((1, 20, h / 2, w / 2)),
            Array4::zeros((1, 24, h / 4, w / 4)),
            Array4::zeros((1, 28, h / 8, w / 8)),
        ]
    }
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbImage) -> Result<ClassScoreMap> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let hidden = match self.hidden.take() {
            Some(hidden) => hidden,
            None => self.zero_hidden_states(),
        };
        let input_tensor = self.preprocessor.preprocess(frame);

        // RVM expects: src, r1, r2, r3, r4
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                input_tensor.view(),
                hidden[0].view(),
                hidden[1].view(),
                hidden[2].view(),
                hidden[3].view()
            ]?)
            .context("Failed to run inference")?;
        drop(_infer_span);

        // Outputs: fgr, pha, r1, r2, r3, r4
        let pha = outputs[1]
            .try_extract_tensor::<f32>()?
            .view()
            .to_owned()
            .into_dimensionality::<IxDyn>()?;

        let mut next = Vec::with_capacity(4);
        for i in 2..6 {
            let state: Array4<f32> = outputs[i]
                .try_extract_tensor::<f32>()?
                .view()
                .to_owned()
                .into_dimensionality()?;
            next.push(state);
        }
        self.hidden = next.try_into().ok();

        // Matte shape: [1, 1, H, W]
        let shape = pha.shape();
        let (matte_h, matte_w) = (shape[2], shape[3]);
        let matte: Vec<f32> = pha.iter().copied().collect();

        let scores = ClassScoreMap::new(
            Preprocessor::matte_to_scores(&matte),
            [matte_w, matte_h, 2],
            [matte_w, matte_h],
            vec!["background".to_string(), "person".to_string()],
        )?;
        Ok(scores)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.hidden = None;
    }

    fn target_class(&self) -> usize {
        1
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
