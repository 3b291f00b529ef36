use image::{imageops, RgbImage};
use ndarray::Array4;

/// Preprocessor for converting RGB frames to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Resize to the model resolution and lay out as a `[1, 3, H, W]`
    /// tensor with channels normalized to [0, 1].
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() != (self.target_width, self.target_height) {
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            image
        };

        let (w, h) = source.dimensions();
        Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
            source.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
    }

    /// Turn an alpha matte into two-class scores `[1 - alpha, alpha]` per
    /// pixel, class 1 being the subject.
    pub fn matte_to_scores(matte: &[f32]) -> Vec<f32> {
        matte
            .iter()
            .flat_map(|&a| {
                let a = a.clamp(0.0, 1.0);
                [1.0 - a, a]
            })
            .collect()
    }
}
