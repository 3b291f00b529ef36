//! Edge-aware segmentation compositing.
//!
//! A class-score map from a segmentation network is reduced to a mask by
//! arg-max, refined with a guided filter against the source image, and
//! composited over a filled or blurred background. Everything renders
//! through a render-target and shader-stage model ([`gpu`]) backed by a
//! software rasterizer, or by wgpu with the `gpu` feature.

pub mod capture;
pub mod compositor;
pub mod error;
pub mod gpu;
pub mod guided;
pub mod output;
pub mod segmentation;

pub use compositor::{Compositor, Effect, Pipeline, PipelineConfig};
pub use error::{FxError, Result};
pub use guided::GuidedFilter;
