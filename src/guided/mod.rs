// guided/mod.rs: edge-aware mask refinement.
//
// Pass graph (sub = working resolution, full = output resolution):
//
//   p, I --hadamard4--> result1 --box H--> pingpong --box V--> result2
//   result2 --hadamard2--> result3
//   result2, result3 --covariance--> result4
//   result4 --box H--> pingpong --box V (upsample)--> result5
//   result5, I --final--> result6 (q)

mod stages;

pub use stages::MASK_CORRECTION;

use crate::error::{FxError, Result};
use crate::gpu::{AttachmentDesc, FilterMode, RenderContext, Texture, TextureHandle};
use crate::segmentation::Mask;
use image::RgbaImage;
use std::time::Instant;
use stages::{BoxFilter, Covariance, Final, Hadamard2, Hadamard4};

/// Working resolution is divided by this when the radius allows it.
pub const SUBSAMPLE: usize = 4;

/// Regularization used when the caller has no preference.
pub const DEFAULT_EPSILON: f32 = 1e-6;

// Stage, target and texture names. Prefixed so they never collide with the
// compositor's own.
const STAGE_HADAMARD4: &str = "gf/hadamard4";
const STAGE_BOX: &str = "gf/box";
const STAGE_HADAMARD2: &str = "gf/hadamard2";
const STAGE_COVARIANCE: &str = "gf/covariance";
const STAGE_FINAL: &str = "gf/final";

const TEX_P: &str = "gf/p";
const TEX_I: &str = "gf/I";
const FBO1: &str = "gf/fbo1";
const RESULT1: &str = "gf/result1";
const PINGPONG: &str = "gf/pingpong";
const PINGPONG_TEX: &str = "gf/pingpongTemp";
const FBO2: &str = "gf/fbo2";
const RESULT2: &str = "gf/result2";
const FBO3: &str = "gf/fbo3";
const RESULT3: &str = "gf/result3";
const FBO4: &str = "gf/fbo4";
const RESULT4: &str = "gf/result4";
const FBO5: &str = "gf/fbo5";
const RESULT5: &str = "gf/result5";
const FBO6: &str = "gf/fbo6";
const RESULT6: &str = "gf/result6";

/// Render targets owned by the filter, for bulk release.
const TARGETS: [&str; 7] = [FBO1, PINGPONG, FBO2, FBO3, FBO4, FBO5, FBO6];

/// Guided image filter running on a [`RenderContext`].
///
/// Refines a hard mask `p` so its edges follow the luminance edges of a
/// guide image `I`. Local statistics are taken with a separable box filter,
/// at a quarter of the output resolution once the radius reaches
/// [`SUBSAMPLE`].
#[derive(Debug, Clone)]
pub struct GuidedFilter {
    radius: usize,
    epsilon: f32,
    width: usize,
    height: usize,
    sub_radius: usize,
    sub_width: usize,
    sub_height: usize,
    ready: bool,
}

impl GuidedFilter {
    /// Check that `ctx` can run the filter.
    ///
    /// Coefficients are signed and need float render targets; the upsampling
    /// box pass needs linear filtering of float textures.
    pub fn new(ctx: &RenderContext) -> Result<Self> {
        let limits = ctx.limits();
        if !limits.float_render_targets {
            return Err(FxError::MissingCapability("float render targets"));
        }
        if !limits.float_linear_filtering {
            return Err(FxError::MissingCapability("linear filtering of float textures"));
        }
        Ok(GuidedFilter {
            radius: 0,
            epsilon: DEFAULT_EPSILON,
            width: 0,
            height: 0,
            sub_radius: 0,
            sub_width: 0,
            sub_height: 0,
            ready: false,
        })
    }

    /// Compile the stages and (re)allocate every intermediate target for a
    /// `width` x `height` output.
    pub fn setup(
        &mut self,
        ctx: &mut RenderContext,
        radius: usize,
        epsilon: f32,
        width: usize,
        height: usize,
    ) -> Result<()> {
        let _span = tracing::debug_span!("guided_filter_setup", radius, width, height).entered();

        self.radius = radius;
        self.epsilon = epsilon;
        self.width = width;
        self.height = height;
        if radius < SUBSAMPLE {
            self.sub_radius = radius;
            self.sub_width = width;
            self.sub_height = height;
        } else {
            self.sub_radius = radius / SUBSAMPLE;
            self.sub_width = (width / SUBSAMPLE).max(1);
            self.sub_height = (height / SUBSAMPLE).max(1);
        }

        ctx.ensure_stage(STAGE_HADAMARD4, || (Hadamard4::vertex(), Box::new(Hadamard4)))?;
        ctx.ensure_stage(STAGE_BOX, || (stages::quad(), Box::new(BoxFilter)))?;
        ctx.ensure_stage(STAGE_HADAMARD2, || (stages::quad(), Box::new(Hadamard2)))?;
        ctx.ensure_stage(STAGE_COVARIANCE, || (stages::quad(), Box::new(Covariance)))?;
        ctx.ensure_stage(STAGE_FINAL, || (Final::vertex(), Box::new(Final)))?;

        let stage = ctx.use_stage(STAGE_HADAMARD4)?;
        stage.set_sampler("u_p", 0);
        stage.set_sampler("u_I", 1);
        let stage = ctx.use_stage(STAGE_COVARIANCE)?;
        stage.set_sampler("result2", 0);
        stage.set_sampler("result3", 1);
        let stage = ctx.use_stage(STAGE_FINAL)?;
        stage.set_sampler("result5", 0);
        stage.set_sampler("u_I", 1);

        let (sw, sh) = (self.sub_width, self.sub_height);
        ctx.create_render_target(FBO1, &[AttachmentDesc::rgba32f(RESULT1, sw, sh, FilterMode::Nearest)])?;
        ctx.create_render_target(
            PINGPONG,
            &[AttachmentDesc::rgba32f(PINGPONG_TEX, sw, sh, FilterMode::Linear)],
        )?;
        ctx.create_render_target(FBO2, &[AttachmentDesc::rgba32f(RESULT2, sw, sh, FilterMode::Linear)])?;
        ctx.create_render_target(
            FBO5,
            &[AttachmentDesc::rgba32f(RESULT5, width, height, FilterMode::Linear)],
        )?;
        ctx.create_render_target(FBO3, &[AttachmentDesc::rgba32f(RESULT3, sw, sh, FilterMode::Nearest)])?;
        ctx.create_render_target(FBO4, &[AttachmentDesc::rgba32f(RESULT4, sw, sh, FilterMode::Nearest)])?;
        ctx.create_render_target(FBO6, &[AttachmentDesc::rgba8(RESULT6, width, height)])?;

        self.ready = true;
        tracing::debug!(
            sub_width = sw,
            sub_height = sh,
            sub_radius = self.sub_radius,
            "guided filter ready"
        );
        Ok(())
    }

    /// Release the filter's render targets. Uploaded inputs stay.
    pub fn release(&mut self, ctx: &mut RenderContext) {
        for name in TARGETS {
            ctx.release_render_target(name);
        }
        self.ready = false;
    }

    /// Refine `mask` against `guide`, returning the full-resolution `q`.
    ///
    /// The mask may be smaller than the output; both inputs are sampled in
    /// normalized coordinates. `q` is stored in every channel of the result.
    pub fn apply(
        &self,
        ctx: &mut RenderContext,
        guide: &RgbaImage,
        mask: &Mask,
    ) -> Result<TextureHandle> {
        if !self.ready {
            return Err(FxError::MissingInput("guided filter has not been set up"));
        }
        let _span = tracing::debug_span!("guided_filter", radius = self.radius).entered();
        let start = Instant::now();

        ctx.upload_texture(
            TEX_P,
            Texture::alpha_from_bytes(mask.width(), mask.height(), mask.as_bytes(), FilterMode::Nearest)?,
        )?;
        ctx.upload_texture(TEX_I, Texture::luminance_from_rgba(guide, FilterMode::Linear))?;

        ctx.use_stage(STAGE_HADAMARD4)?;
        ctx.bind_for_write(Some(FBO1))?;
        ctx.bind_for_read(&[TEX_P, TEX_I])?;
        ctx.draw()?;

        self.box_filter(ctx, RESULT1, FBO2)?;

        ctx.use_stage(STAGE_HADAMARD2)?;
        ctx.bind_for_write(Some(FBO3))?;
        ctx.bind_for_read(&[RESULT2])?;
        ctx.draw()?;

        ctx.use_stage(STAGE_COVARIANCE)?.set_f32("epsilon", self.epsilon);
        ctx.bind_for_write(Some(FBO4))?;
        ctx.bind_for_read(&[RESULT2, RESULT3])?;
        ctx.draw()?;

        // Vertical pass lands in the full-size target, upsampling (a, b).
        self.box_filter(ctx, RESULT4, FBO5)?;

        ctx.use_stage(STAGE_FINAL)?;
        ctx.bind_for_write(Some(FBO6))?;
        ctx.bind_for_read(&[RESULT5, TEX_I])?;
        ctx.draw()?;

        tracing::debug!(
            "Guided filter time: {:.2} ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(TextureHandle::from(RESULT6))
    }

    /// Separable box mean of `source`: horizontal into the ping-pong buffer,
    /// then vertical into `dest_target`.
    pub fn box_filter(&self, ctx: &mut RenderContext, source: &str, dest_target: &str) -> Result<()> {
        let radius = i32::try_from(self.sub_radius)
            .map_err(|_| FxError::shape(format!("box radius {} out of range", self.sub_radius)))?;

        let stage = ctx.use_stage(STAGE_BOX)?;
        stage.set_bool("first_pass", true);
        stage.set_i32("radius", radius);
        ctx.bind_for_write(Some(PINGPONG))?;
        ctx.bind_for_read(&[source])?;
        ctx.draw()?;

        ctx.use_stage(STAGE_BOX)?.set_bool("first_pass", false);
        ctx.bind_for_write(Some(dest_target))?;
        ctx.bind_for_read(&[PINGPONG_TEX])?;
        ctx.draw()
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Box radius actually used at the working resolution.
    pub fn sub_radius(&self) -> usize {
        self.sub_radius
    }

    /// Resolution the local statistics are computed at.
    pub fn working_size(&self) -> (usize, usize) {
        (self.sub_width, self.sub_height)
    }

    pub fn output_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Texture `apply` writes `q` into.
    pub fn output(&self) -> TextureHandle {
        TextureHandle::from(RESULT6)
    }
}
