// gpu/wgsl.rs: WGSL module assembly for the wgpu backend.
//
// A stage's module is a prelude generated from its interface followed by
// the program's own `shade` function.
//
//   @binding(0)        uniform block `params`: one vec4 slot per scalar or
//                      vec4 uniform, one slot per array element (in .x)
//   @binding(1 + 2k)   texture of the k-th declared sampler, `t_<name>`
//   @binding(2 + 2k)   its sampler, `s_<name>`
//
// Accessors: `p_<name>()` for scalars and vec4s, `p_<name>(i)` plus
// `LEN_<name>` for arrays, `sample_<name>(uv)` and `size_<name>()` for
// samplers. `Varyings` has a field per vertex varying and `Outputs` has
// `o0..oN` at locations 0..N.
//
// The vertex stage draws one full-screen triangle. Memory row 0 is at the
// top of a wgpu target, so the quad position is taken with y negated: row
// r gets the same varyings it gets from the software rasterizer and both
// backends share one texture layout.

use super::shader::{ProgramInterface, ShaderStage, UniformKind, UniformValue, Varying};
use std::fmt::Write;

/// Where each uniform location lives in the parameter block. Samplers
/// have no slot.
pub(crate) fn param_slots(interface: &ProgramInterface) -> (Vec<Option<usize>>, usize) {
    let mut next = 0;
    let slots = interface
        .uniforms
        .iter()
        .map(|(_, kind)| {
            let width = match kind {
                UniformKind::Sampler => return None,
                UniformKind::FloatArray(n) => *n,
                _ => 1,
            };
            let slot = next;
            next += width;
            Some(slot)
        })
        .collect();
    (slots, next)
}

/// Pack the stage's current uniform values into vec4 slots. Never empty,
/// since WGSL has no zero-length arrays.
pub(crate) fn pack_params(stage: &ShaderStage) -> Vec<[f32; 4]> {
    let (_, total) = param_slots(stage.interface());
    let mut out = Vec::with_capacity(total.max(1));
    for value in stage.values() {
        match value {
            UniformValue::Int(v) => out.push([*v as f32, 0.0, 0.0, 0.0]),
            UniformValue::Bool(v) => out.push([if *v { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0]),
            UniformValue::Float(v) => out.push([*v, 0.0, 0.0, 0.0]),
            UniformValue::Vec4(v) => out.push(*v),
            UniformValue::FloatArray(v) => out.extend(v.iter().map(|x| [*x, 0.0, 0.0, 0.0])),
            UniformValue::Sampler(_) => {}
        }
    }
    if out.is_empty() {
        out.push([0.0; 4]);
    }
    out
}

/// Names of the declared samplers, in binding order.
pub(crate) fn sampler_names(interface: &ProgramInterface) -> Vec<&'static str> {
    interface
        .uniforms
        .iter()
        .filter(|(_, kind)| *kind == UniformKind::Sampler)
        .map(|(name, _)| *name)
        .collect()
}

/// Full module source for `stage`, or `None` if its program has no WGSL.
pub(crate) fn module_source(stage: &ShaderStage) -> Option<String> {
    let body = stage.wgsl()?;
    let interface = stage.interface();
    let (slots, total) = param_slots(interface);
    let mut src = String::new();

    // fmt::Write into a String cannot fail.
    let _ = writeln!(src, "struct Params {{\n    slots: array<vec4<f32>, {}>,\n}}\n", total.max(1));
    let _ = writeln!(src, "@group(0) @binding(0) var<uniform> params: Params;");
    for (k, name) in sampler_names(interface).iter().enumerate() {
        let binding = 1 + 2 * k;
        let _ = writeln!(src, "@group(0) @binding({binding}) var t_{name}: texture_2d<f32>;");
        let _ = writeln!(src, "@group(0) @binding({}) var s_{name}: sampler;", binding + 1);
        let _ = writeln!(
            src,
            "fn sample_{name}(uv: vec2<f32>) -> vec4<f32> {{ return textureSampleLevel(t_{name}, s_{name}, uv, 0.0); }}"
        );
        let _ = writeln!(
            src,
            "fn size_{name}() -> vec2<f32> {{ return vec2<f32>(textureDimensions(t_{name}, 0)); }}"
        );
    }

    for ((name, kind), slot) in interface.uniforms.iter().zip(&slots) {
        let Some(slot) = slot else { continue };
        let _ = match kind {
            UniformKind::Int => writeln!(src, "fn p_{name}() -> i32 {{ return i32(params.slots[{slot}].x); }}"),
            UniformKind::Bool => writeln!(src, "fn p_{name}() -> bool {{ return params.slots[{slot}].x != 0.0; }}"),
            UniformKind::Float => writeln!(src, "fn p_{name}() -> f32 {{ return params.slots[{slot}].x; }}"),
            UniformKind::Vec4 => writeln!(src, "fn p_{name}() -> vec4<f32> {{ return params.slots[{slot}]; }}"),
            UniformKind::FloatArray(n) => writeln!(
                src,
                "const LEN_{name}: i32 = {n};\nfn p_{name}(i: i32) -> f32 {{ return params.slots[{slot} + i].x; }}"
            ),
            UniformKind::Sampler => Ok(()),
        };
    }

    let varyings = stage.vertex().varyings();
    src.push_str("\nstruct Varyings {\n    @builtin(position) position: vec4<f32>,\n");
    for (i, v) in varyings.iter().enumerate() {
        let _ = writeln!(src, "    @location({i}) {}: vec2<f32>,", v.name);
    }
    src.push_str("}\n\nstruct Outputs {\n");
    for i in 0..interface.outputs {
        let _ = writeln!(src, "    @location({i}) o{i}: vec4<f32>,");
    }
    src.push_str("}\n\n");

    src.push_str(
        "@vertex\nfn vs_main(@builtin(vertex_index) index: u32) -> Varyings {\n    \
         let clip = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u)) * 2.0 - 1.0;\n    \
         let pos = vec2<f32>(clip.x, -clip.y);\n    \
         var v: Varyings;\n    \
         v.position = vec4<f32>(clip, 0.0, 1.0);\n",
    );
    for v in varyings {
        let _ = writeln!(src, "    v.{} = {};", v.name, varying_expr(v));
    }
    src.push_str("    return v;\n}\n");

    src.push_str(body);
    src.push_str("\n@fragment\nfn fs_main(v: Varyings) -> Outputs {\n    return shade(v);\n}\n");
    Some(src)
}

fn varying_expr(v: &Varying) -> String {
    let y = if v.flip_y { "-pos.y" } else { "pos.y" };
    format!(
        "vec2<f32>(pos.x * 0.5 + 0.5, {y} * 0.5 + 0.5) * {:?}",
        v.scale
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::shader::{FragmentInput, FragmentProgram, VertexStage};
    use crate::gpu::Texel;

    struct Mixed;

    impl FragmentProgram for Mixed {
        fn interface(&self) -> ProgramInterface {
            ProgramInterface {
                uniforms: vec![
                    ("src", UniformKind::Sampler),
                    ("gain", UniformKind::Float),
                    ("taps", UniformKind::FloatArray(3)),
                    ("on", UniformKind::Bool),
                    ("tint", UniformKind::Vec4),
                    ("mask", UniformKind::Sampler),
                ],
                varyings: vec!["uv"],
                outputs: 2,
            }
        }

        fn shade(&self, _input: &FragmentInput<'_>, _out: &mut [Texel]) {}

        fn wgsl(&self) -> Option<&'static str> {
            Some("fn shade(v: Varyings) -> Outputs { var out: Outputs; return out; }")
        }
    }

    fn stage() -> ShaderStage {
        let vertex = VertexStage::new([Varying::new("uv").flipped().scaled(0.5)]);
        ShaderStage::compile("mixed", vertex, Box::new(Mixed), 16).unwrap()
    }

    #[test]
    fn arrays_take_one_slot_per_element() {
        let (slots, total) = param_slots(&Mixed.interface());
        assert_eq!(slots, vec![None, Some(0), Some(1), Some(4), Some(5), None]);
        assert_eq!(total, 6);
    }

    #[test]
    fn packed_values_follow_the_slots() {
        let mut stage = stage();
        stage.set_f32("gain", 0.5);
        stage.set_f32_array("taps", &[1.0, 2.0, 3.0]);
        stage.set_bool("on", true);
        stage.set_vec4("tint", [0.1, 0.2, 0.3, 0.4]);
        let packed = pack_params(&stage);
        assert_eq!(packed.len(), 6);
        assert_eq!(packed[0][0], 0.5);
        assert_eq!(packed[2][0], 2.0);
        assert_eq!(packed[4][0], 1.0);
        assert_eq!(packed[5], [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn module_binds_samplers_in_declaration_order() {
        let src = module_source(&stage()).unwrap();
        assert!(src.contains("@group(0) @binding(1) var t_src: texture_2d<f32>;"));
        assert!(src.contains("@group(0) @binding(2) var s_src: sampler;"));
        assert!(src.contains("@group(0) @binding(3) var t_mask: texture_2d<f32>;"));
        assert!(src.contains("const LEN_taps: i32 = 3;"));
        assert!(src.contains("params.slots[1 + i].x"));
        assert!(src.contains("@location(1) o1: vec4<f32>"));
        assert!(src.contains("v.uv = vec2<f32>(pos.x * 0.5 + 0.5, -pos.y * 0.5 + 0.5) * 0.5;"));
        assert!(src.ends_with("return shade(v);\n}\n"));
    }
}
