// gpu/backend.rs: storage and execution behind a RenderContext.
//
// The context owns names, bindings, stage parameters and target
// completeness. A backend only holds pixels and runs resolved draws, so the
// software rasterizer and the wgpu device see exactly the same calls.

use super::context::Limits;
use super::shader::ShaderStage;
use super::software::SoftwareBackend;
use super::texture::Texture;
use crate::error::Result;
use image::RgbaImage;

/// One draw with every name already checked by the context.
pub struct DrawCall<'a> {
    pub stage: &'a ShaderStage,
    /// `(output slot, texture)`; `None` is the visible surface.
    pub outputs: &'a [(usize, Option<&'a str>)],
    /// Texture read by each uniform location. Locations that are not
    /// samplers, and samplers on an empty unit, are `None`.
    pub samplers: &'a [Option<&'a str>],
}

/// Pixel storage plus a way to run a [`DrawCall`].
pub trait RenderBackend {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn limits(&self) -> Limits;

    /// Store `texture` under `name`, replacing any previous one.
    fn store_texture(&mut self, name: &str, texture: Texture) -> Result<()>;

    fn release_texture(&mut self, name: &str);

    /// Copy of the texture's current contents.
    fn read_texture(&self, name: &str) -> Result<Texture>;

    /// Resize and clear the visible surface.
    fn resize_surface(&mut self, width: usize, height: usize) -> Result<()>;

    /// The visible surface, top row first.
    fn read_surface(&self) -> Result<RgbaImage>;

    /// Drop whatever was built for stage `name`.
    fn forget_stage(&mut self, _name: &str) {}

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()>;
}

/// Which backend a context renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BackendKind {
    /// Deterministic CPU rasterizer.
    #[default]
    Software,
    /// wgpu device; needs the `gpu` feature.
    Wgpu,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Software => write!(f, "software"),
            BackendKind::Wgpu => write!(f, "wgpu"),
        }
    }
}

pub fn create_backend(kind: BackendKind) -> Result<Box<dyn RenderBackend>> {
    match kind {
        BackendKind::Software => Ok(Box::new(SoftwareBackend::new(Limits::default()))),
        #[cfg(feature = "gpu")]
        BackendKind::Wgpu => Ok(Box::new(super::wgpu_backend::WgpuBackend::new()?)),
        #[cfg(not(feature = "gpu"))]
        BackendKind::Wgpu => Err(crate::error::FxError::ContextUnavailable(
            "built without the `gpu` feature".into(),
        )),
    }
}
