use super::texture::{Texel, Texture};
use crate::error::{FxError, Result};
use std::collections::HashMap;

/// Declared type of a uniform parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Int,
    Bool,
    Float,
    /// Fixed-length float array; the length is baked in at compile time.
    FloatArray(usize),
    Vec4,
    /// Texture unit index.
    Sampler,
}

/// Current value of a uniform parameter slot.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Bool(bool),
    Float(f32),
    FloatArray(Vec<f32>),
    Vec4([f32; 4]),
    Sampler(usize),
}

impl UniformValue {
    fn zero(kind: UniformKind) -> Self {
        match kind {
            UniformKind::Int => UniformValue::Int(0),
            UniformKind::Bool => UniformValue::Bool(false),
            UniformKind::Float => UniformValue::Float(0.0),
            UniformKind::FloatArray(n) => UniformValue::FloatArray(vec![0.0; n]),
            UniformKind::Vec4 => UniformValue::Vec4([0.0; 4]),
            UniformKind::Sampler => UniformValue::Sampler(0),
        }
    }
}

/// What a fragment program reads and writes.
#[derive(Debug, Clone, Default)]
pub struct ProgramInterface {
    pub uniforms: Vec<(&'static str, UniformKind)>,
    pub varyings: Vec<&'static str>,
    pub outputs: usize,
}

/// A texture coordinate derived from the full-screen quad position:
/// `(pos * (0.5, ±0.5) + 0.5) * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Varying {
    pub name: &'static str,
    pub flip_y: bool,
    pub scale: f32,
}

impl Varying {
    pub const fn new(name: &'static str) -> Self {
        Varying {
            name,
            flip_y: false,
            scale: 1.0,
        }
    }

    /// Sample uploaded images upright: `t` grows downwards.
    pub const fn flipped(mut self) -> Self {
        self.flip_y = true;
        self
    }

    pub const fn scaled(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    fn eval(&self, pos: [f32; 2]) -> [f32; 2] {
        let y = if self.flip_y { -pos[1] } else { pos[1] };
        [
            (pos[0] * 0.5 + 0.5) * self.scale,
            (y * 0.5 + 0.5) * self.scale,
        ]
    }
}

/// The vertex half of a stage: a full-screen quad emitting varyings.
#[derive(Debug, Clone, Default)]
pub struct VertexStage {
    varyings: Vec<Varying>,
}

impl VertexStage {
    pub fn new(varyings: impl IntoIterator<Item = Varying>) -> Self {
        VertexStage {
            varyings: varyings.into_iter().collect(),
        }
    }

    pub fn varyings(&self) -> &[Varying] {
        &self.varyings
    }
}

/// Per-fragment view of a stage's inputs.
///
/// Everything is addressed by declaration order: varyings by their position
/// in [`ProgramInterface::varyings`], uniforms and samplers by their
/// location in [`ProgramInterface::uniforms`]. The draw resolves texture
/// units once; nothing here looks a name up.
pub struct FragmentInput<'a> {
    varyings: &'a [[f32; 2]],
    values: &'a [UniformValue],
    samplers: &'a [Option<&'a Texture>],
}

impl<'a> FragmentInput<'a> {
    #[inline]
    pub fn varying(&self, index: usize) -> [f32; 2] {
        self.varyings.get(index).copied().unwrap_or([0.0, 0.0])
    }

    #[inline]
    pub fn int(&self, location: usize) -> i32 {
        match self.values.get(location) {
            Some(UniformValue::Int(v)) => *v,
            _ => 0,
        }
    }

    #[inline]
    pub fn bool(&self, location: usize) -> bool {
        matches!(self.values.get(location), Some(UniformValue::Bool(true)))
    }

    #[inline]
    pub fn float(&self, location: usize) -> f32 {
        match self.values.get(location) {
            Some(UniformValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    #[inline]
    pub fn vec4(&self, location: usize) -> [f32; 4] {
        match self.values.get(location) {
            Some(UniformValue::Vec4(v)) => *v,
            _ => [0.0; 4],
        }
    }

    #[inline]
    pub fn float_array(&self, location: usize) -> &'a [f32] {
        let values: &'a [UniformValue] = self.values;
        match values.get(location) {
            Some(UniformValue::FloatArray(v)) => v.as_slice(),
            _ => &[],
        }
    }

    #[inline]
    fn bound(&self, location: usize) -> Option<&'a Texture> {
        self.samplers.get(location).copied().flatten()
    }

    /// Sample the texture bound to the sampler at `location`. An empty unit
    /// reads as opaque black.
    #[inline]
    pub fn texture(&self, location: usize, uv: [f32; 2]) -> Texel {
        match self.bound(location) {
            Some(tex) => tex.sample(uv[0], uv[1]),
            None => [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Size in texels of the texture bound to the sampler at `location`.
    #[inline]
    pub fn texture_size(&self, location: usize) -> [f32; 2] {
        match self.bound(location) {
            Some(tex) => [tex.width() as f32, tex.height() as f32],
            None => [1.0, 1.0],
        }
    }
}

/// Fragment half of a stage, written as Rust instead of shader text.
pub trait FragmentProgram: Send + Sync {
    /// Declared uniforms, consumed varyings and number of color outputs.
    fn interface(&self) -> ProgramInterface;

    /// Compute all color outputs for one fragment.
    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]);

    /// WGSL body of the same program for the wgpu backend: a
    /// `fn shade(v: Varyings) -> Outputs` written against the bindings
    /// generated from [`interface`](Self::interface). Programs without one
    /// only run on the software backend.
    fn wgsl(&self) -> Option<&'static str> {
        None
    }
}

/// A compiled and linked vertex + fragment pair with its parameter slots.
pub struct ShaderStage {
    name: String,
    vertex: VertexStage,
    fragment: Box<dyn FragmentProgram>,
    interface: ProgramInterface,
    locations: HashMap<&'static str, usize>,
    values: Vec<UniformValue>,
    /// Vertex varying feeding each consumed varying, in consumption order.
    varying_slots: Vec<usize>,
}

impl ShaderStage {
    /// Validate the fragment interface and link it against the vertex
    /// stage. `max_texture_units` bounds the number of sampler slots.
    pub fn compile(
        name: impl Into<String>,
        vertex: VertexStage,
        fragment: Box<dyn FragmentProgram>,
        max_texture_units: usize,
    ) -> Result<Self> {
        let name = name.into();
        let interface = fragment.interface();

        if interface.outputs == 0 {
            return Err(FxError::compile(&name, "fragment program declares no outputs"));
        }

        let mut locations = HashMap::with_capacity(interface.uniforms.len());
        let mut values = Vec::with_capacity(interface.uniforms.len());
        for (loc, &(uniform, kind)) in interface.uniforms.iter().enumerate() {
            if locations.insert(uniform, loc).is_some() {
                return Err(FxError::compile(&name, format!("uniform `{uniform}` redeclared")));
            }
            if kind == UniformKind::FloatArray(0) {
                return Err(FxError::compile(&name, format!("array `{uniform}` has zero length")));
            }
            values.push(UniformValue::zero(kind));
        }

        let samplers = interface
            .uniforms
            .iter()
            .filter(|(_, k)| *k == UniformKind::Sampler)
            .count();
        if samplers > max_texture_units {
            return Err(FxError::compile(
                &name,
                format!("{samplers} samplers exceed {max_texture_units} texture units"),
            ));
        }

        for (i, v) in vertex.varyings.iter().enumerate() {
            if vertex.varyings[..i].iter().any(|o| o.name == v.name) {
                return Err(FxError::compile(&name, format!("varying `{}` redeclared", v.name)));
            }
        }
        let mut varying_slots = Vec::with_capacity(interface.varyings.len());
        for wanted in &interface.varyings {
            let Some(slot) = vertex.varyings.iter().position(|v| v.name == *wanted) else {
                return Err(FxError::link(
                    &name,
                    format!("varying `{wanted}` is not written by the vertex stage"),
                ));
            };
            varying_slots.push(slot);
        }

        tracing::debug!(stage = %name, uniforms = values.len(), "compiled shader stage");
        Ok(ShaderStage {
            name,
            vertex,
            fragment,
            interface,
            locations,
            values,
            varying_slots,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outputs(&self) -> usize {
        self.interface.outputs
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    pub fn vertex(&self) -> &VertexStage {
        &self.vertex
    }

    /// Uniform values by location.
    pub fn values(&self) -> &[UniformValue] {
        &self.values
    }

    pub fn wgsl(&self) -> Option<&'static str> {
        self.fragment.wgsl()
    }

    #[inline]
    pub fn location(&self, name: &str) -> Option<usize> {
        self.locations.get(name).copied()
    }

    /// Current value of a uniform, if declared.
    pub fn value(&self, name: &str) -> Option<&UniformValue> {
        self.location(name).map(|loc| &self.values[loc])
    }

    pub fn set_i32(&mut self, name: &str, v: i32) {
        self.set(name, UniformValue::Int(v));
    }

    pub fn set_bool(&mut self, name: &str, v: bool) {
        self.set(name, UniformValue::Bool(v));
    }

    pub fn set_f32(&mut self, name: &str, v: f32) {
        self.set(name, UniformValue::Float(v));
    }

    pub fn set_f32_array(&mut self, name: &str, v: &[f32]) {
        self.set(name, UniformValue::FloatArray(v.to_vec()));
    }

    pub fn set_vec4(&mut self, name: &str, v: [f32; 4]) {
        self.set(name, UniformValue::Vec4(v));
    }

    /// Point a sampler at a texture unit.
    pub fn set_sampler(&mut self, name: &str, unit: usize) {
        self.set(name, UniformValue::Sampler(unit));
    }

    /// Unknown names and incompatible values only warn; stages may leave
    /// optional parameters undeclared.
    fn set(&mut self, name: &str, value: UniformValue) {
        let Some(loc) = self.location(name) else {
            tracing::warn!(stage = %self.name, uniform = name, "uniform not found, ignoring");
            return;
        };
        let kind = self.interface.uniforms[loc].1;
        let coerced = match (kind, value) {
            (UniformKind::Int, v @ UniformValue::Int(_)) => Some(v),
            (UniformKind::Bool, v @ UniformValue::Bool(_)) => Some(v),
            (UniformKind::Bool, UniformValue::Int(i)) => Some(UniformValue::Bool(i != 0)),
            (UniformKind::Float, v @ UniformValue::Float(_)) => Some(v),
            (UniformKind::Vec4, v @ UniformValue::Vec4(_)) => Some(v),
            (UniformKind::Sampler, v @ UniformValue::Sampler(_)) => Some(v),
            (UniformKind::Sampler, UniformValue::Int(i)) if i >= 0 => {
                Some(UniformValue::Sampler(i as usize))
            }
            (UniformKind::FloatArray(len), UniformValue::FloatArray(src)) if src.len() <= len => {
                // Shorter uploads only overwrite the leading elements.
                let mut dst = match &self.values[loc] {
                    UniformValue::FloatArray(cur) => cur.clone(),
                    _ => vec![0.0; len],
                };
                dst[..src.len()].copy_from_slice(&src);
                Some(UniformValue::FloatArray(dst))
            }
            _ => None,
        };
        match coerced {
            Some(v) => self.values[loc] = v,
            None => {
                tracing::warn!(stage = %self.name, uniform = name, ?kind, "uniform type mismatch, ignoring")
            }
        }
    }

    /// `(uniform location, texture unit)` for every declared sampler.
    pub(crate) fn sampler_units(&self) -> Vec<(usize, usize)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(loc, value)| match value {
                UniformValue::Sampler(unit) => Some((loc, *unit)),
                _ => None,
            })
            .collect()
    }

    /// Evaluate the consumed varyings at a quad position, in consumption
    /// order. `out` holds one entry per consumed varying.
    #[inline]
    pub(crate) fn eval_varyings(&self, pos: [f32; 2], out: &mut [[f32; 2]]) {
        for (dst, &slot) in out.iter_mut().zip(&self.varying_slots) {
            *dst = self.vertex.varyings[slot].eval(pos);
        }
    }

    #[inline]
    pub(crate) fn shade(
        &self,
        varyings: &[[f32; 2]],
        samplers: &[Option<&Texture>],
        out: &mut [Texel],
    ) {
        let input = FragmentInput {
            varyings,
            values: &self.values,
            samplers,
        };
        self.fragment.shade(&input, out);
    }
}

impl std::fmt::Debug for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderStage")
            .field("name", &self.name)
            .field("interface", &self.interface)
            .finish()
    }
}
