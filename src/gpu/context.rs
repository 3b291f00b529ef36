use super::backend::{create_backend, BackendKind, DrawCall, RenderBackend};
use super::shader::{FragmentProgram, ShaderStage, VertexStage};
use super::software::SoftwareBackend;
use super::targets::Framebuffer;
use crate::error::{FxError, Result};
use image::RgbaImage;
use std::collections::HashMap;

/// Capabilities and limits of the rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// `Rgba32F` may be used as a color attachment.
    pub float_render_targets: bool,
    /// `Rgba32F` textures may use linear filtering.
    pub float_linear_filtering: bool,
    pub max_texture_units: usize,
    pub max_color_attachments: usize,
    pub max_texture_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            float_render_targets: true,
            float_linear_filtering: true,
            max_texture_units: 16,
            max_color_attachments: 8,
            max_texture_size: 8192,
        }
    }
}

/// All rendering state in one explicit value: textures, render targets,
/// compiled stages, the visible surface and the current bindings.
///
/// Pixels live in the [`RenderBackend`]; the context keeps names and sizes
/// and checks every call before handing it over. Everything runs on the
/// calling thread in program order; a pass's writes are complete before the
/// next call returns.
pub struct RenderContext {
    pub(super) limits: Limits,
    pub(super) lost: bool,
    pub(super) backend: Box<dyn RenderBackend>,
    /// Size of every texture the backend holds.
    pub(super) textures: HashMap<String, (usize, usize)>,
    pub(super) framebuffers: HashMap<String, Framebuffer>,
    /// `None` writes to the visible surface.
    pub(super) write_target: Option<String>,
    pub(super) read_slots: Vec<String>,
    surface_size: (usize, usize),
    stages: HashMap<String, ShaderStage>,
    active_stage: Option<String>,
    draw_calls: u64,
}

impl RenderContext {
    /// A software context reporting `limits`.
    pub fn new(limits: Limits) -> Result<Self> {
        Self::with_backend(Box::new(SoftwareBackend::new(limits)))
    }

    /// A context on the backend `kind` names.
    pub fn for_backend(kind: BackendKind) -> Result<Self> {
        Self::with_backend(create_backend(kind)?)
    }

    pub fn with_backend(backend: Box<dyn RenderBackend>) -> Result<Self> {
        let limits = backend.limits();
        if limits.max_texture_units == 0 || limits.max_texture_size == 0 {
            return Err(FxError::ContextUnavailable(
                "backend reports no texture units".into(),
            ));
        }
        tracing::debug!(backend = backend.name(), ?limits, "created render context");
        Ok(RenderContext {
            limits,
            lost: false,
            backend,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            write_target: None,
            read_slots: Vec::new(),
            surface_size: (1, 1),
            stages: HashMap::new(),
            active_stage: None,
            draw_calls: 0,
        })
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Simulate losing the backend; every later allocation fails.
    pub fn mark_lost(&mut self) {
        tracing::warn!("render context lost");
        self.lost = true;
    }

    pub(super) fn ensure_alive(&self) -> Result<()> {
        if self.lost {
            return Err(FxError::ContextUnavailable("context lost".into()));
        }
        Ok(())
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    // --- Visible surface ---

    /// Resize (and clear) the visible surface.
    pub fn resize_surface(&mut self, width: usize, height: usize) -> Result<()> {
        self.ensure_alive()?;
        if width > self.limits.max_texture_size || height > self.limits.max_texture_size {
            return Err(FxError::shape(format!(
                "surface {width}x{height} exceeds {}",
                self.limits.max_texture_size
            )));
        }
        self.backend.resize_surface(width, height)?;
        self.surface_size = (width, height);
        Ok(())
    }

    pub fn surface_size(&self) -> (usize, usize) {
        self.surface_size
    }

    /// Read the visible surface back, top row first.
    pub fn read_surface(&self) -> Result<RgbaImage> {
        self.backend.read_surface()
    }

    // --- Shader stages ---

    /// Compile a stage and register it under `name`, replacing any stage
    /// already there.
    pub fn compile_stage(
        &mut self,
        name: &str,
        vertex: VertexStage,
        fragment: Box<dyn FragmentProgram>,
    ) -> Result<()> {
        self.ensure_alive()?;
        let stage = ShaderStage::compile(name, vertex, fragment, self.limits.max_texture_units)?;
        if self.active_stage.as_deref() == Some(name) {
            self.active_stage = None;
        }
        if self.stages.insert(name.to_string(), stage).is_some() {
            self.backend.forget_stage(name);
        }
        Ok(())
    }

    /// Compile `name` only if it is not cached yet.
    pub fn ensure_stage<F>(&mut self, name: &str, build: F) -> Result<()>
    where
        F: FnOnce() -> (VertexStage, Box<dyn FragmentProgram>),
    {
        if self.stages.contains_key(name) {
            return Ok(());
        }
        let (vertex, fragment) = build();
        self.compile_stage(name, vertex, fragment)
    }

    /// Drop every cached stage for which `keep` returns false.
    pub fn retain_stages<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        let evicted: Vec<String> = self
            .stages
            .keys()
            .filter(|name| !keep(name.as_str()))
            .cloned()
            .collect();
        for name in &evicted {
            self.stages.remove(name);
            self.backend.forget_stage(name);
        }
        if let Some(active) = &self.active_stage {
            if !self.stages.contains_key(active) {
                self.active_stage = None;
            }
        }
    }

    pub fn has_stage(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Make `name` the active stage and return it for parameter setting.
    pub fn use_stage(&mut self, name: &str) -> Result<&mut ShaderStage> {
        let stage = self
            .stages
            .get_mut(name)
            .ok_or_else(|| FxError::UnknownStage(name.to_string()))?;
        self.active_stage = Some(name.to_string());
        Ok(stage)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut ShaderStage> {
        self.stages.get_mut(name)
    }

    // --- Drawing ---

    /// Run the active stage over every pixel of the bound write target.
    ///
    /// An incomplete render target is skipped with a warning so an
    /// interactive session survives a bad frame.
    pub fn draw(&mut self) -> Result<()> {
        self.ensure_alive()?;
        let stage_name = self.active_stage.as_deref().ok_or(FxError::NoActiveStage)?;
        let stage = self
            .stages
            .get(stage_name)
            .ok_or_else(|| FxError::UnknownStage(stage_name.to_string()))?;

        let outputs: Vec<(usize, Option<&str>)> = match &self.write_target {
            None => vec![(0, None)],
            Some(target) => {
                let fb = self
                    .framebuffers
                    .get(target)
                    .ok_or_else(|| FxError::UnknownTarget(target.clone()))?;
                if let Some(reason) = &fb.incomplete {
                    tracing::warn!(render_target = %target, reason = %reason, "draw to incomplete render target skipped");
                    return Ok(());
                }
                fb.attachments
                    .iter()
                    .map(|(slot, name)| (*slot, Some(name.as_str())))
                    .collect()
            }
        };
        if let Some(missing) = outputs
            .iter()
            .filter_map(|(_, name)| *name)
            .find(|name| !self.textures.contains_key(*name))
        {
            return Err(FxError::UnknownTexture(missing.to_string()));
        }

        // Resolve units to textures once; the backend indexes by location.
        let mut samplers: Vec<Option<&str>> = vec![None; stage.values().len()];
        for (location, unit) in stage.sampler_units() {
            let Some(read) = self.read_slots.get(unit) else {
                continue;
            };
            if outputs.iter().any(|(_, name)| *name == Some(read.as_str())) {
                return Err(FxError::FeedbackLoop(read.clone()));
            }
            if self.textures.contains_key(read) {
                samplers[location] = Some(read.as_str());
            }
        }

        self.backend.draw(&DrawCall {
            stage,
            outputs: &outputs,
            samplers: &samplers,
        })?;
        self.draw_calls += 1;
        Ok(())
    }
}
