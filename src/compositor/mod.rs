// compositor/mod.rs: segmentation compositing render graph.
//
// Label effect:
//   image, predictions, palette --colorize--> surface
//
// Matting effects (fill, blur):
//   scores --argmax--> mask --guided filter--> q
//   image, q --extract--> fg, bg
//   bg --blur H--> blurFirstPassResult --blur V--> styledBg     (blur)
//   bg --fill--> styledBg                                       (fill)
//   fg, styledBg, image --blend--> surface

mod config;
pub mod kernel;
mod stages;

pub use config::{Effect, PipelineConfig};

use crate::error::{FxError, Result};
use crate::gpu::{AttachmentDesc, FilterMode, RenderContext, Texture, TextureHandle};
use crate::guided::{GuidedFilter, MASK_CORRECTION};
use crate::segmentation::palette::{self, build_legend};
use crate::segmentation::{argmax_labels, ClassScoreMap, Legend, Mask};
use image::RgbaImage;
use stages::{Blend, Colorize, Extract, Fill, GaussianBlur};
use std::time::{Duration, Instant};

const IMAGE: &str = "image";
const PREDICTIONS: &str = "predictions";
const PALETTE: &str = "palette";
const EXTRACT: &str = "extract";
const FG: &str = "fg";
const BG: &str = "bg";
const BLUR_FIRST_PASS: &str = "blurFirstPassResult";
const STYLED_BG: &str = "styledBg";

const STAGE_COLORIZE: &str = "colorize";
const STAGE_EXTRACT: &str = "extract";
const STAGE_FILL: &str = "fill";
const STAGE_BLEND: &str = "blend";

/// Clipped source size assumed until the first upload.
const INITIAL_CLIPPED: (usize, usize) = (224, 224);

fn blur_stage(radius: usize) -> String {
    format!("blur/r{radius}")
}

/// End-to-end compositor over an owned [`RenderContext`].
///
/// Call [`setup`](Self::setup) (or [`reconfigure`](Self::reconfigure))
/// before drawing. Every draw rebinds its targets and inputs, so nothing is
/// assumed to stay bound between calls.
pub struct Compositor {
    ctx: RenderContext,
    guided: GuidedFilter,
    config: PipelineConfig,
    /// Configuration the current stages and targets were built for.
    applied: Option<PipelineConfig>,
    clipped: (usize, usize),
    source: Option<RgbaImage>,
    scores: Option<ClassScoreMap>,
    /// Arg-max class of every mask pixel from the last derivation.
    labels: Option<Mask>,
    /// Texture the extract or colorize stage reads the mask from.
    mask_texture: Option<TextureHandle>,
    legend: Legend,
    half_kernel: Vec<f32>,
    /// The mask must be derived again before the next draw.
    stale: bool,
}

impl Compositor {
    pub fn new(ctx: RenderContext) -> Result<Self> {
        Self::with_config(ctx, PipelineConfig::default())
    }

    /// Fails if the context cannot run the guided filter.
    pub fn with_config(ctx: RenderContext, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let guided = GuidedFilter::new(&ctx)?;
        let half_kernel = kernel::half_kernel(config.blur_radius, config.blur_sigma)?;
        Ok(Compositor {
            ctx,
            guided,
            config,
            applied: None,
            clipped: INITIAL_CLIPPED,
            source: None,
            scores: None,
            labels: None,
            mask_texture: None,
            legend: Legend::new(),
            half_kernel,
            stale: true,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn clipped_size(&self) -> (usize, usize) {
        self.clipped
    }

    /// Size of the visible surface: clipped size times zoom.
    pub fn output_size(&self) -> Result<(usize, usize)> {
        let zoom = self.config.zoom;
        let (w, h) = self.clipped;
        match (w.checked_mul(zoom), h.checked_mul(zoom)) {
            (Some(width), Some(height)) => Ok((width, height)),
            _ => Err(FxError::shape(format!("{w}x{h} at zoom {zoom} overflows"))),
        }
    }

    /// Legend of the last label draw.
    pub fn legend(&self) -> &Legend {
        &self.legend
    }

    /// Class index of every mask pixel from the last score map.
    pub fn labels(&self) -> Option<&Mask> {
        self.labels.as_ref()
    }

    /// Read the visible surface back, top row first.
    pub fn snapshot(&self) -> Result<RgbaImage> {
        self.ctx.read_surface()
    }

    /// Whether a draw has everything it needs.
    pub fn is_drawable(&self) -> bool {
        self.applied.is_some() && self.source.is_some() && self.scores.is_some()
    }

    /// Rebuild every stage and render target for the current configuration
    /// and clipped size. Targets of the previous configuration are released
    /// first.
    pub fn setup(&mut self) -> Result<()> {
        self.config.validate()?;
        let (width, height) = self.output_size()?;
        let effect = self.config.effect;
        let _span = tracing::debug_span!("setup", %effect, width, height).entered();

        // Until this finishes the old targets are gone.
        self.applied = None;
        self.guided.release(&mut self.ctx);
        self.ctx.release_render_targets();
        self.ctx.resize_surface(width, height)?;

        let wanted: Vec<String> = match effect {
            Effect::Label => vec![STAGE_COLORIZE.into()],
            Effect::Fill => vec![STAGE_EXTRACT.into(), STAGE_FILL.into(), STAGE_BLEND.into()],
            Effect::Blur => vec![
                STAGE_EXTRACT.into(),
                blur_stage(self.config.blur_radius),
                STAGE_BLEND.into(),
            ],
        };
        self.ctx
            .retain_stages(|name| name.starts_with("gf/") || wanted.iter().any(|w| w == name));

        match effect {
            Effect::Label => self.setup_colorize()?,
            Effect::Fill | Effect::Blur => {
                self.ctx.release_texture(PALETTE);
                self.ctx.release_texture(PREDICTIONS);
                self.guided.setup(
                    &mut self.ctx,
                    self.config.refine_radius,
                    self.config.epsilon,
                    width,
                    height,
                )?;
                self.setup_extract(width, height)?;
                if effect == Effect::Blur {
                    self.setup_blur(width, height)?;
                } else {
                    self.setup_fill(width, height)?;
                }
                self.setup_blend()?;
            }
        }

        self.applied = Some(self.config.clone());
        self.mask_texture = None;
        self.stale = true;
        tracing::debug!(stages = ?self.ctx.stage_names(), "pipeline ready");
        Ok(())
    }

    fn setup_colorize(&mut self) -> Result<()> {
        self.ctx
            .ensure_stage(STAGE_COLORIZE, || (Colorize::vertex(), Box::new(Colorize)))?;
        let stage = self.ctx.use_stage(STAGE_COLORIZE)?;
        stage.set_sampler("u_image", 0);
        stage.set_sampler("u_predictions", 1);
        stage.set_sampler("u_palette", 2);
        stage.set_i32("u_length", palette::PALETTE.len() as i32);

        let texture = Texture::rgb_from_bytes(
            palette::PALETTE.len(),
            1,
            &palette::palette_bytes(),
            FilterMode::Nearest,
        )?;
        self.ctx.upload_texture(PALETTE, texture)?;
        Ok(())
    }

    fn setup_extract(&mut self, width: usize, height: usize) -> Result<()> {
        self.ctx
            .ensure_stage(STAGE_EXTRACT, || (Extract::vertex(), Box::new(Extract)))?;
        self.ctx.create_render_target(
            EXTRACT,
            &[
                AttachmentDesc::rgba8(FG, width, height),
                AttachmentDesc::rgba8(BG, width, height),
            ],
        )?;
        let stage = self.ctx.use_stage(STAGE_EXTRACT)?;
        stage.set_sampler("u_image", 0);
        stage.set_sampler("u_mask", 1);
        Ok(())
    }

    fn setup_blur(&mut self, width: usize, height: usize) -> Result<()> {
        let radius = self.config.blur_radius;
        self.half_kernel = kernel::half_kernel(radius, self.config.blur_sigma)?;
        self.ctx.ensure_stage(&blur_stage(radius), || {
            (stages::quad(), Box::new(GaussianBlur { taps: radius + 1 }))
        })?;
        self.ctx.create_render_target(
            BLUR_FIRST_PASS,
            &[AttachmentDesc::rgba8(BLUR_FIRST_PASS, width, height)],
        )?;
        self.ctx
            .create_render_target(STYLED_BG, &[AttachmentDesc::rgba8(STYLED_BG, width, height)])
    }

    fn setup_fill(&mut self, width: usize, height: usize) -> Result<()> {
        self.ctx.ensure_stage(STAGE_FILL, || (stages::quad(), Box::new(Fill)))?;
        self.ctx
            .create_render_target(STYLED_BG, &[AttachmentDesc::rgba8(STYLED_BG, width, height)])
    }

    fn setup_blend(&mut self) -> Result<()> {
        self.ctx.ensure_stage(STAGE_BLEND, || (stages::quad(), Box::new(Blend)))?;
        let stage = self.ctx.use_stage(STAGE_BLEND)?;
        stage.set_sampler("fg", 0);
        stage.set_sampler("bg", 1);
        stage.set_sampler("orig", 2);
        Ok(())
    }

    /// Register a new source image. A clipped size different from the last
    /// one rebuilds every render target.
    pub fn upload_source(&mut self, image: RgbaImage, clipped: (usize, usize)) -> Result<()> {
        if clipped.0 == 0 || clipped.1 == 0 {
            return Err(FxError::shape(format!(
                "clipped size {}x{} is empty",
                clipped.0, clipped.1
            )));
        }
        if clipped != self.clipped {
            tracing::debug!(?clipped, previous = ?self.clipped, "clipped size changed");
            self.clipped = clipped;
            if self.applied.is_some() {
                self.setup()?;
            }
        }

        self.ctx
            .upload_texture(IMAGE, Texture::from_rgba_image(&image, FilterMode::Linear))?;
        self.source = Some(image);
        self.stale = true;
        Ok(())
    }

    /// Draw the composited frame to the visible surface.
    ///
    /// A new score map replaces the stored one and derives a new mask;
    /// `None` redraws from the last one. Returns the wall-clock draw time.
    pub fn draw_outputs(&mut self, scores: Option<ClassScoreMap>) -> Result<Duration> {
        let start = Instant::now();
        if self.applied.is_none() {
            return Err(FxError::MissingInput("pipeline has not been set up"));
        }
        if self.source.is_none() {
            return Err(FxError::MissingInput("source image"));
        }
        let _span = tracing::debug_span!("draw_outputs", effect = %self.config.effect).entered();

        if let Some(map) = scores {
            self.scores = Some(map);
            self.stale = true;
        }
        if self.stale {
            self.derive_mask()?;
        }

        match self.config.effect {
            Effect::Label => self.draw_color_label()?,
            Effect::Fill | Effect::Blur => self.draw_person()?,
        }

        let elapsed = start.elapsed();
        tracing::debug!("Draw time: {:.2} ms", elapsed.as_secs_f64() * 1000.0);
        Ok(elapsed)
    }

    fn derive_mask(&mut self) -> Result<()> {
        let map = self
            .scores
            .as_ref()
            .ok_or(FxError::MissingInput("class score map"))?;
        let source = self.source.as_ref().ok_or(FxError::MissingInput("source image"))?;

        let labels = argmax_labels(map, map.mask_extent())?;
        let texture = if self.config.effect.is_matting() {
            let person = labels.select(self.config.target_class);
            self.guided.apply(&mut self.ctx, source, &person)?
        } else {
            let predictions = Texture::alpha_from_bytes(
                labels.width(),
                labels.height(),
                labels.as_bytes(),
                FilterMode::Nearest,
            )?;
            self.ctx.upload_texture(PREDICTIONS, predictions)?
        };

        self.mask_texture = Some(texture);
        self.labels = Some(labels);
        self.stale = false;
        Ok(())
    }

    fn draw_color_label(&mut self) -> Result<()> {
        let _span = tracing::debug_span!("colorize").entered();
        self.ctx
            .use_stage(STAGE_COLORIZE)?
            .set_f32("u_alpha", self.config.color_map_alpha);
        self.ctx.bind_for_write(None)?;
        self.ctx.bind_for_read(&[IMAGE, PREDICTIONS, PALETTE])?;
        self.ctx.draw()?;

        if let (Some(labels), Some(map)) = (&self.labels, &self.scores) {
            self.legend = build_legend(labels, map.labels());
        }
        Ok(())
    }

    fn draw_person(&mut self) -> Result<()> {
        let mask = self
            .mask_texture
            .clone()
            .ok_or(FxError::MissingInput("refined mask"))?;

        {
            let _span = tracing::debug_span!("extract").entered();
            self.ctx.use_stage(STAGE_EXTRACT)?;
            self.ctx.bind_for_write(Some(EXTRACT))?;
            self.ctx.bind_for_read(&[IMAGE, mask.name()])?;
            self.ctx.draw()?;
        }

        if self.config.effect == Effect::Blur {
            let _span = tracing::debug_span!("blur", radius = self.config.blur_radius).entered();
            let name = blur_stage(self.config.blur_radius);
            let stage = self.ctx.use_stage(&name)?;
            stage.set_f32_array("kernel", &self.half_kernel);
            stage.set_bool("first_pass", true);
            self.ctx.bind_for_write(Some(BLUR_FIRST_PASS))?;
            self.ctx.bind_for_read(&[BG])?;
            self.ctx.draw()?;

            self.ctx.use_stage(&name)?.set_bool("first_pass", false);
            self.ctx.bind_for_write(Some(STYLED_BG))?;
            self.ctx.bind_for_read(&[BLUR_FIRST_PASS])?;
            self.ctx.draw()?;
        } else {
            let _span = tracing::debug_span!("fill").entered();
            self.ctx
                .use_stage(STAGE_FILL)?
                .set_vec4("fill_color", self.config.fill_rgba());
            self.ctx.bind_for_write(Some(STYLED_BG))?;
            self.ctx.bind_for_read(&[BG])?;
            self.ctx.draw()?;
        }

        let _span = tracing::debug_span!("blend").entered();
        self.ctx.use_stage(STAGE_BLEND)?;
        self.ctx.bind_for_write(None)?;
        self.ctx.bind_for_read(&[FG, STYLED_BG, IMAGE])?;
        self.ctx.draw()
    }

    /// Class under a viewport position, for hover highlighting. `None`
    /// (pointer left the canvas) clears the highlight.
    pub fn hit_test(&self, position: Option<(f32, f32)>) -> Option<usize> {
        let (px, py) = position?;
        let labels = self.labels.as_ref()?;
        let (width, height) = self.output_size().ok()?;
        if !(0.0..width as f32).contains(&px) || !(0.0..height as f32).contains(&py) {
            return None;
        }
        let zoom = self.config.zoom as f32;
        let x = (MASK_CORRECTION * px / zoom).floor() as usize;
        let y = (MASK_CORRECTION * py / zoom).floor() as usize;
        if x >= labels.width() || y >= labels.height() {
            return None;
        }
        Some(labels.get(x, y) as usize)
    }

    /// Switch to `config`, rebuilding stages and targets only when a
    /// structural field changed. The returned handle draws with it.
    pub fn reconfigure(&mut self, config: PipelineConfig) -> Result<Pipeline<'_>> {
        config.validate()?;
        let rebuild = self
            .applied
            .as_ref()
            .map_or(true, |applied| applied.requires_setup(&config));
        let remask = self.config.requires_remask(&config);
        let previous = std::mem::replace(&mut self.config, config);
        if rebuild {
            if let Err(err) = self.setup() {
                self.config = previous;
                return Err(err);
            }
        } else if remask {
            self.stale = true;
        }
        Ok(Pipeline { compositor: self })
    }

    fn apply_setting(&mut self, config: PipelineConfig) -> Result<Option<Duration>> {
        let mut pipeline = self.reconfigure(config)?;
        if !pipeline.is_drawable() {
            return Ok(None);
        }
        pipeline.draw(None).map(Some)
    }

    /// Each setter reconfigures and, when a frame is available, redraws.
    /// The draw time is returned if a draw happened.
    pub fn set_zoom(&mut self, zoom: usize) -> Result<Option<Duration>> {
        let config = PipelineConfig {
            zoom,
            ..self.config.clone()
        };
        self.apply_setting(config)
    }

    pub fn set_background_color(&mut self, rgb: [u8; 3]) -> Result<Option<Duration>> {
        let config = PipelineConfig {
            fill_color: rgb,
            ..self.config.clone()
        };
        self.apply_setting(config)
    }

    pub fn set_blur_radius(&mut self, radius: usize) -> Result<Option<Duration>> {
        if radius == self.config.blur_radius {
            return Ok(None);
        }
        let config = PipelineConfig {
            blur_radius: radius,
            ..self.config.clone()
        };
        self.apply_setting(config)
    }

    pub fn set_effect(&mut self, effect: Effect) -> Result<Option<Duration>> {
        let config = PipelineConfig {
            effect,
            ..self.config.clone()
        };
        self.apply_setting(config)
    }

    pub fn set_refine_edge_radius(&mut self, radius: usize) -> Result<Option<Duration>> {
        let config = PipelineConfig {
            refine_radius: radius,
            ..self.config.clone()
        };
        self.apply_setting(config)
    }

    pub fn set_color_map_alpha(&mut self, alpha: f32) -> Result<Option<Duration>> {
        let config = PipelineConfig {
            color_map_alpha: alpha,
            ..self.config.clone()
        };
        self.apply_setting(config)
    }
}

/// A compositor configured and ready to draw.
pub struct Pipeline<'a> {
    compositor: &'a mut Compositor,
}

impl Pipeline<'_> {
    pub fn draw(&mut self, scores: Option<ClassScoreMap>) -> Result<Duration> {
        self.compositor.draw_outputs(scores)
    }

    pub fn config(&self) -> &PipelineConfig {
        self.compositor.config()
    }

    pub fn output_size(&self) -> Result<(usize, usize)> {
        self.compositor.output_size()
    }

    pub fn is_drawable(&self) -> bool {
        self.compositor.is_drawable()
    }

    pub fn snapshot(&self) -> Result<RgbaImage> {
        self.compositor.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::Limits;
    use image::Rgba;

    fn compositor(config: PipelineConfig) -> Compositor {
        Compositor::with_config(RenderContext::new(Limits::default()).unwrap(), config).unwrap()
    }

    /// Two classes; class 1 wins where `fg` is true.
    fn scores(w: usize, h: usize, fg: impl Fn(usize, usize) -> bool) -> ClassScoreMap {
        let mut data = Vec::with_capacity(w * h * 2);
        for y in 0..h {
            for x in 0..w {
                if fg(x, y) {
                    data.extend([0.1, 0.9]);
                } else {
                    data.extend([0.9, 0.1]);
                }
            }
        }
        ClassScoreMap::new(
            data,
            [w, h, 2],
            [w, h],
            vec!["background".into(), "subject".into()],
        )
        .unwrap()
    }

    fn small(effect: Effect) -> PipelineConfig {
        PipelineConfig {
            effect,
            zoom: 1,
            blur_radius: 2,
            blur_sigma: 1.0,
            refine_radius: 0,
            target_class: 1,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn draw_before_setup_is_rejected() {
        let mut c = compositor(small(Effect::Fill));
        assert!(matches!(c.draw_outputs(None), Err(FxError::MissingInput(_))));
    }

    #[test]
    fn draw_without_scores_is_rejected() {
        let mut c = compositor(small(Effect::Fill));
        c.setup().unwrap();
        c.upload_source(RgbaImage::new(4, 4), (4, 4)).unwrap();
        assert!(matches!(c.draw_outputs(None), Err(FxError::MissingInput(_))));
    }

    #[test]
    fn setup_evicts_stages_of_other_effects() {
        let mut c = compositor(small(Effect::Blur));
        c.setup().unwrap();
        assert!(c.context().has_stage("blur/r2"));
        c.set_blur_radius(3).unwrap();
        assert!(c.context().has_stage("blur/r3"));
        assert!(!c.context().has_stage("blur/r2"));

        c.set_effect(Effect::Label).unwrap();
        assert!(c.context().has_stage(STAGE_COLORIZE));
        assert!(!c.context().has_stage("blur/r3"));
        assert!(!c.context().has_render_target(STYLED_BG));
    }

    #[test]
    fn blur_mode_keeps_subject_and_softens_background() {
        let (w, h) = (8usize, 8usize);
        let mut c = compositor(small(Effect::Blur));
        c.setup().unwrap();
        let image = RgbaImage::from_fn(w as u32, h as u32, |x, _| {
            if x % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        c.upload_source(image, (w, h)).unwrap();
        c.draw_outputs(Some(scores(w, h, |x, _| x >= 6))).unwrap();

        let out = c.snapshot().unwrap();
        assert_eq!(out.dimensions(), (8, 8));
        // Subject columns are untouched.
        assert_eq!(out.get_pixel(6, 3).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(7, 3).0, [0, 0, 0, 255]);
        // Stripes in the background are averaged toward gray.
        let v = out.get_pixel(2, 3)[0];
        assert!(v > 40 && v < 215, "background stripe {v}");
    }

    #[test]
    fn hit_test_maps_through_zoom() {
        let mut c = compositor(PipelineConfig {
            zoom: 2,
            ..small(Effect::Label)
        });
        c.setup().unwrap();
        c.upload_source(RgbaImage::new(4, 2), (4, 2)).unwrap();
        c.draw_outputs(Some(scores(4, 2, |x, _| x == 3))).unwrap();

        assert_eq!(c.hit_test(None), None);
        assert_eq!(c.hit_test(Some((0.0, 0.0))), Some(0));
        assert_eq!(c.hit_test(Some((7.5, 3.5))), Some(1));
        assert_eq!(c.hit_test(Some((8.0, 0.0))), None);
        assert_eq!(c.hit_test(Some((-1.0, 0.0))), None);
    }

    #[test]
    fn draw_only_setters_do_not_rebuild() {
        let mut c = compositor(small(Effect::Fill));
        c.setup().unwrap();
        c.upload_source(RgbaImage::new(2, 2), (2, 2)).unwrap();
        c.draw_outputs(Some(scores(2, 2, |_, _| false))).unwrap();
        let calls = c.context().draw_calls();

        let elapsed = c.set_background_color([1, 2, 3]).unwrap();
        assert!(elapsed.is_some());
        // extract, fill, blend only: no guided filter passes.
        assert_eq!(c.context().draw_calls() - calls, 3);
        assert_eq!(c.snapshot().unwrap().get_pixel(0, 0).0, [1, 2, 3, 255]);
    }

    #[test]
    fn refine_radius_change_rebuilds_the_filter() {
        let (w, h) = (16usize, 16usize);
        let mut c = compositor(PipelineConfig {
            blur_radius: 4,
            blur_sigma: 2.0,
            ..small(Effect::Blur)
        });
        c.setup().unwrap();
        let image = RgbaImage::from_fn(w as u32, h as u32, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        c.upload_source(image, (w, h)).unwrap();
        c.draw_outputs(Some(scores(w, h, |x, _| x >= 8))).unwrap();
        let sharp = c.snapshot().unwrap();
        assert_eq!(c.guided.sub_radius(), 0);
        assert_eq!(c.guided.working_size(), (16, 16));

        let calls = c.context().draw_calls();
        let elapsed = c.set_refine_edge_radius(8).unwrap();
        assert!(elapsed.is_some());
        assert_eq!(c.applied.as_ref().map(|a| a.refine_radius), Some(8));
        assert_eq!(c.guided.sub_radius(), 2);
        assert_eq!(c.guided.working_size(), (4, 4));
        // A fresh mask went through every guided filter pass again.
        assert!(c.context().draw_calls() - calls > 5);
        assert_ne!(c.snapshot().unwrap(), sharp);
    }

    #[test]
    fn overflowing_zoom_is_a_shape_error() {
        let mut c = compositor(small(Effect::Fill));
        c.setup().unwrap();
        c.upload_source(RgbaImage::new(4, 2), (4, 2)).unwrap();
        let err = c.set_zoom(usize::MAX / 2).unwrap_err();
        assert!(matches!(err, FxError::ShapeMismatch(_)), "{err}");
        // The previous zoom stays in force.
        assert_eq!(c.config().zoom, 1);
        assert_eq!(c.output_size().unwrap(), (4, 2));
        assert!(c.applied.is_some());
    }

    #[test]
    fn matting_setup_releases_label_textures() {
        let mut c = compositor(small(Effect::Label));
        c.setup().unwrap();
        c.upload_source(RgbaImage::new(4, 4), (4, 4)).unwrap();
        c.draw_outputs(Some(scores(4, 4, |x, _| x < 2))).unwrap();
        assert!(c.context().has_texture(PALETTE));
        assert!(c.context().has_texture(PREDICTIONS));

        c.set_effect(Effect::Fill).unwrap();
        assert!(!c.context().has_texture(PALETTE));
        assert!(!c.context().has_texture(PREDICTIONS));
        assert!(c.context().has_texture(IMAGE));

        c.set_effect(Effect::Label).unwrap();
        assert!(c.context().has_texture(PALETTE));
        assert!(c.context().has_texture(PREDICTIONS));
    }

    #[test]
    fn unchanged_blur_radius_is_a_no_op() {
        let mut c = compositor(small(Effect::Blur));
        c.setup().unwrap();
        assert_eq!(c.set_blur_radius(2).unwrap(), None);
    }
}
