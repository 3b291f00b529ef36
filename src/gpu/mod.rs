// gpu/mod.rs: render backends.
//
// A small GL-like model: named textures, framebuffers pairing textures as
// color attachments, compiled stages with named parameter slots, and a
// full-screen quad draw. All "current" bindings live in RenderContext so
// callers rebind explicitly before every draw.
//
// Pixels live behind the RenderBackend trait. The software backend is
// always built and is the deterministic reference; the `gpu` feature adds
// a wgpu backend running the same stages as WGSL.

pub mod backend;
pub mod context;
pub mod shader;
pub mod software;
pub mod targets;
pub mod texture;

#[cfg(feature = "gpu")]
pub mod device;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;
#[cfg(feature = "gpu")]
pub mod wgsl;

pub use backend::{create_backend, BackendKind, DrawCall, RenderBackend};
pub use context::{Limits, RenderContext};
pub use shader::{
    FragmentInput, FragmentProgram, ProgramInterface, ShaderStage, UniformKind, UniformValue,
    Varying, VertexStage,
};
pub use software::SoftwareBackend;
pub use targets::{AttachmentDesc, TextureHandle};
pub use texture::{FilterMode, Texel, Texture, TextureFormat};
