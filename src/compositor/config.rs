use crate::error::{FxError, Result};
use crate::guided::DEFAULT_EPSILON;
use crate::segmentation::PERSON_CLASS;

/// Background treatment of the composited frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Effect {
    /// Color-code every class over the source image.
    Label,
    /// Replace the background with a solid color.
    Fill,
    /// Gaussian-blur the background.
    #[default]
    Blur,
}

impl Effect {
    /// Fill and blur extract a single class and refine its edges.
    pub fn is_matting(self) -> bool {
        !matches!(self, Effect::Label)
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Effect::Label => "label",
            Effect::Fill => "fill",
            Effect::Blur => "blur",
        };
        f.write_str(name)
    }
}

/// Everything the compositor's output depends on besides its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub effect: Effect,
    /// Output pixels per mask pixel.
    pub zoom: usize,
    pub blur_radius: usize,
    pub blur_sigma: f32,
    /// Guided filter radius in output pixels.
    pub refine_radius: usize,
    pub epsilon: f32,
    pub fill_color: [u8; 3],
    /// Opacity of the label overlay.
    pub color_map_alpha: f32,
    /// Class kept by the matting effects.
    pub target_class: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            effect: Effect::Blur,
            zoom: 3,
            blur_radius: 30,
            blur_sigma: 30.0,
            refine_radius: 16,
            epsilon: DEFAULT_EPSILON,
            fill_color: [57, 135, 189],
            color_map_alpha: 0.7,
            target_class: PERSON_CLASS,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.zoom == 0 {
            return Err(FxError::shape("zoom must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.color_map_alpha) {
            return Err(FxError::shape(format!(
                "color map alpha {} outside [0, 1]",
                self.color_map_alpha
            )));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(FxError::shape(format!("epsilon must be > 0, got {}", self.epsilon)));
        }
        if self.blur_radius > 0 && (!self.blur_sigma.is_finite() || self.blur_sigma <= 0.0) {
            return Err(FxError::shape(format!(
                "blur sigma must be > 0, got {}",
                self.blur_sigma
            )));
        }
        Ok(())
    }

    /// Whether moving from `self` to `next` needs stages and targets rebuilt.
    /// Fill color and overlay alpha are plain draw parameters.
    pub fn requires_setup(&self, next: &PipelineConfig) -> bool {
        self.effect != next.effect
            || self.zoom != next.zoom
            || self.blur_radius != next.blur_radius
            || self.blur_sigma != next.blur_sigma
            || self.refine_radius != next.refine_radius
            || self.epsilon != next.epsilon
    }

    /// Whether the mask has to be derived again from the score map.
    pub fn requires_remask(&self, next: &PipelineConfig) -> bool {
        self.requires_setup(next) || self.target_class != next.target_class
    }

    /// Fill color as a normalized, opaque RGBA vector.
    pub fn fill_rgba(&self) -> [f32; 4] {
        let [r, g, b] = self.fill_color;
        [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_only_fields_skip_setup() {
        let base = PipelineConfig::default();
        let recolored = PipelineConfig {
            fill_color: [1, 2, 3],
            color_map_alpha: 0.2,
            ..base.clone()
        };
        assert!(!base.requires_setup(&recolored));
        assert!(!base.requires_remask(&recolored));

        let zoomed = PipelineConfig { zoom: 2, ..base.clone() };
        assert!(base.requires_setup(&zoomed));

        let other_class = PipelineConfig { target_class: 1, ..base.clone() };
        assert!(!base.requires_setup(&other_class));
        assert!(base.requires_remask(&other_class));
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        let ok = PipelineConfig::default();
        assert!(ok.validate().is_ok());
        assert!(PipelineConfig { zoom: 0, ..ok.clone() }.validate().is_err());
        assert!(PipelineConfig { color_map_alpha: 1.5, ..ok.clone() }.validate().is_err());
        assert!(PipelineConfig { epsilon: 0.0, ..ok.clone() }.validate().is_err());
        assert!(PipelineConfig { blur_sigma: -1.0, ..ok.clone() }.validate().is_err());
        assert!(PipelineConfig { blur_sigma: 0.0, blur_radius: 0, ..ok }.validate().is_ok());
    }

    #[test]
    fn fill_color_is_normalized() {
        let cfg = PipelineConfig {
            fill_color: [255, 0, 51],
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.fill_rgba(), [1.0, 0.0, 0.2, 1.0]);
    }
}
