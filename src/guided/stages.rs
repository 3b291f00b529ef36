// Fragment programs of the guided filter. Each one mirrors one pass of the
// closed-form solution (He et al., "Guided Image Filtering"):
//
//   mean_I  = f(I)      mean_p  = f(p)
//   corr_I  = f(I.*I)   corr_Ip = f(I.*p)
//   var_I   = corr_I  - mean_I.*mean_I
//   cov_Ip  = corr_Ip - mean_I.*mean_p
//   a = cov_Ip ./ (var_I + eps)
//   b = mean_p - a.*mean_I
//   q = f(a).*I + f(b)
//
// where f is a box mean of radius r.

use crate::gpu::{
    FragmentInput, FragmentProgram, ProgramInterface, Texel, UniformKind, Varying, VertexStage,
};

/// Texture coordinates of uploaded mask are pulled in slightly so the last
/// row and column never sample past the valid region.
pub const MASK_CORRECTION: f32 = 0.99;

pub fn quad() -> VertexStage {
    VertexStage::new([Varying::new("v_texcoord")])
}

// Varying indices, in the order each program consumes them.
const TEXCOORD: usize = 0;
const SECOND: usize = 1;

/// `(I, p, I*p, I*I)` from the guide luminance and the mask alpha.
pub struct Hadamard4;

impl Hadamard4 {
    const P: usize = 0;
    const I: usize = 1;

    pub fn vertex() -> VertexStage {
        VertexStage::new([
            Varying::new("v_texcoord").flipped(),
            Varying::new("v_maskcoord").flipped().scaled(MASK_CORRECTION),
        ])
    }
}

impl FragmentProgram for Hadamard4 {
    fn interface(&self) -> ProgramInterface {
        ProgramInterface {
            uniforms: vec![("u_p", UniformKind::Sampler), ("u_I", UniformKind::Sampler)],
            varyings: vec!["v_texcoord", "v_maskcoord"],
            outputs: 1,
        }
    }

    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]) {
        let i = input.texture(Self::I, input.varying(TEXCOORD))[0];
        let p = input.texture(Self::P, input.varying(SECOND))[3];
        out[0] = [i, p, i * p, i * i];
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some(
            r#"
fn shade(v: Varyings) -> Outputs {
    let i = sample_u_I(v.v_texcoord).x;
    let p = sample_u_p(v.v_maskcoord).w;
    var out: Outputs;
    out.o0 = vec4<f32>(i, p, i * p, i * i);
    return out;
}
"#,
        )
    }
}

/// One direction of a separable box mean over `2 * radius + 1` texels.
pub struct BoxFilter;

impl BoxFilter {
    const BG: usize = 0;
    const FIRST_PASS: usize = 1;
    const RADIUS: usize = 2;
}

impl FragmentProgram for BoxFilter {
    fn interface(&self) -> ProgramInterface {
        ProgramInterface {
            uniforms: vec![
                ("bg", UniformKind::Sampler),
                ("first_pass", UniformKind::Bool),
                ("radius", UniformKind::Int),
            ],
            varyings: vec!["v_texcoord"],
            outputs: 1,
        }
    }

    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]) {
        let uv = input.varying(TEXCOORD);
        let size = input.texture_size(Self::BG);
        let radius = input.int(Self::RADIUS).max(0);
        let step = if input.bool(Self::FIRST_PASS) {
            [1.0 / size[0], 0.0]
        } else {
            [0.0, 1.0 / size[1]]
        };

        let mut acc = input.texture(Self::BG, uv);
        for i in 1..=radius {
            let d = i as f32;
            let fwd = input.texture(Self::BG, [uv[0] + step[0] * d, uv[1] + step[1] * d]);
            let back = input.texture(Self::BG, [uv[0] - step[0] * d, uv[1] - step[1] * d]);
            for c in 0..4 {
                acc[c] += fwd[c] + back[c];
            }
        }
        let n = 2.0 * radius as f32 + 1.0;
        out[0] = [acc[0] / n, acc[1] / n, acc[2] / n, acc[3] / n];
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some(
            r#"
fn shade(v: Varyings) -> Outputs {
    let size = size_bg();
    let radius = max(p_radius(), 0);
    var step = vec2<f32>(0.0, 1.0 / size.y);
    if p_first_pass() {
        step = vec2<f32>(1.0 / size.x, 0.0);
    }
    var acc = sample_bg(v.v_texcoord);
    for (var i = 1; i <= radius; i++) {
        let d = step * f32(i);
        acc += sample_bg(v.v_texcoord + d) + sample_bg(v.v_texcoord - d);
    }
    var out: Outputs;
    out.o0 = acc / (2.0 * f32(radius) + 1.0);
    return out;
}
"#,
        )
    }
}

/// `(mean_I * mean_p, mean_I * mean_I)` from the box-filtered products.
pub struct Hadamard2;

impl FragmentProgram for Hadamard2 {
    fn interface(&self) -> ProgramInterface {
        ProgramInterface {
            uniforms: vec![("result2", UniformKind::Sampler)],
            varyings: vec!["v_texcoord"],
            outputs: 1,
        }
    }

    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]) {
        let prev = input.texture(0, input.varying(TEXCOORD));
        let (mean_i, mean_p) = (prev[0], prev[1]);
        out[0] = [mean_i * mean_p, mean_i * mean_i, 0.0, 0.0];
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some(
            r#"
fn shade(v: Varyings) -> Outputs {
    let prev = sample_result2(v.v_texcoord);
    var out: Outputs;
    out.o0 = vec4<f32>(prev.x * prev.y, prev.x * prev.x, 0.0, 0.0);
    return out;
}
"#,
        )
    }
}

/// Linear coefficients `(a, b)` of the local model.
pub struct Covariance;

impl Covariance {
    const RESULT2: usize = 0;
    const RESULT3: usize = 1;
    const EPSILON: usize = 2;
}

impl FragmentProgram for Covariance {
    fn interface(&self) -> ProgramInterface {
        ProgramInterface {
            uniforms: vec![
                ("result2", UniformKind::Sampler),
                ("result3", UniformKind::Sampler),
                ("epsilon", UniformKind::Float),
            ],
            varyings: vec!["v_texcoord"],
            outputs: 1,
        }
    }

    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]) {
        let uv = input.varying(TEXCOORD);
        let [mean_i, mean_p, mean_ip, mean_ii] = input.texture(Self::RESULT2, uv);
        let r3 = input.texture(Self::RESULT3, uv);
        let (mean_i_mean_p, mean_i_mean_i) = (r3[0], r3[1]);

        let cov_ip = mean_ip - mean_i_mean_p;
        let var_i = mean_ii - mean_i_mean_i;
        let a = cov_ip / (var_i + input.float(Self::EPSILON));
        let b = mean_p - a * mean_i;
        out[0] = [a, b, 0.0, 0.0];
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some(
            r#"
fn shade(v: Varyings) -> Outputs {
    let r2 = sample_result2(v.v_texcoord);
    let r3 = sample_result3(v.v_texcoord);
    let cov_ip = r2.z - r3.x;
    let var_i = r2.w - r3.y;
    let a = cov_ip / (var_i + p_epsilon());
    let b = r2.y - a * r2.x;
    var out: Outputs;
    out.o0 = vec4<f32>(a, b, 0.0, 0.0);
    return out;
}
"#,
        )
    }
}

/// `q = mean_a * I + mean_b` at full resolution.
pub struct Final;

impl Final {
    const RESULT5: usize = 0;
    const I: usize = 1;

    pub fn vertex() -> VertexStage {
        VertexStage::new([
            Varying::new("v_texcoord"),
            Varying::new("v_flipcoord").flipped(),
        ])
    }
}

impl FragmentProgram for Final {
    fn interface(&self) -> ProgramInterface {
        ProgramInterface {
            uniforms: vec![("result5", UniformKind::Sampler), ("u_I", UniformKind::Sampler)],
            varyings: vec!["v_texcoord", "v_flipcoord"],
            outputs: 1,
        }
    }

    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]) {
        let r5 = input.texture(Self::RESULT5, input.varying(TEXCOORD));
        let i = input.texture(Self::I, input.varying(SECOND));
        let q = r5[0] * i[2] + r5[1];
        out[0] = [q, q, q, q];
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some(
            r#"
fn shade(v: Varyings) -> Outputs {
    let r5 = sample_result5(v.v_texcoord);
    let i = sample_u_I(v.v_flipcoord);
    let q = r5.x * i.z + r5.y;
    var out: Outputs;
    out.o0 = vec4<f32>(q);
    return out;
}
"#,
        )
    }
}
