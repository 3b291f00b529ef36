use crate::gpu::{
    FragmentInput, FragmentProgram, ProgramInterface, Texel, UniformKind, Varying, VertexStage,
};
use crate::guided::MASK_CORRECTION;

// Uniform locations and varying indices follow declaration order in each
// program's interface.

/// Unflipped texture coordinates, for reading render targets.
pub fn quad() -> VertexStage {
    VertexStage::new([Varying::new("v_texcoord")])
}

const TEXCOORD: usize = 0;
const MASKCOORD: usize = 1;

/// Class overlay: looks each pixel's label up in the palette and mixes it
/// over the source image.
pub struct Colorize;

impl Colorize {
    const IMAGE: usize = 0;
    const PREDICTIONS: usize = 1;
    const PALETTE: usize = 2;
    const LENGTH: usize = 3;
    const ALPHA: usize = 4;

    pub fn vertex() -> VertexStage {
        VertexStage::new([
            Varying::new("v_texcoord").flipped(),
            Varying::new("v_maskcoord").flipped().scaled(MASK_CORRECTION),
        ])
    }
}

impl FragmentProgram for Colorize {
    fn interface(&self) -> ProgramInterface {
        ProgramInterface {
            uniforms: vec![
                ("u_image", UniformKind::Sampler),
                ("u_predictions", UniformKind::Sampler),
                ("u_palette", UniformKind::Sampler),
                ("u_length", UniformKind::Int),
                ("u_alpha", UniformKind::Float),
            ],
            varyings: vec!["v_texcoord", "v_maskcoord"],
            outputs: 1,
        }
    }

    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]) {
        let label = input.texture(Self::PREDICTIONS, input.varying(MASKCOORD))[3] * 255.0;
        let length = input.int(Self::LENGTH).max(1) as f32;
        let label_color = input.texture(Self::PALETTE, [(label + 0.5) / length, 0.5]);
        let image = input.texture(Self::IMAGE, input.varying(TEXCOORD));
        let alpha = input.float(Self::ALPHA);
        out[0] = std::array::from_fn(|c| image[c] * (1.0 - alpha) + label_color[c] * alpha);
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some(
            r#"
fn shade(v: Varyings) -> Outputs {
    let label = sample_u_predictions(v.v_maskcoord).w * 255.0;
    let length = f32(max(p_u_length(), 1));
    let label_color = sample_u_palette(vec2<f32>((label + 0.5) / length, 0.5));
    let image = sample_u_image(v.v_texcoord);
    let alpha = p_u_alpha();
    var out: Outputs;
    out.o0 = image * (1.0 - alpha) + label_color * alpha;
    return out;
}
"#,
        )
    }
}

/// Splits the source into premultiplied foreground and background by the
/// refined mask.
pub struct Extract;

impl Extract {
    const IMAGE: usize = 0;
    const MASK: usize = 1;

    pub fn vertex() -> VertexStage {
        VertexStage::new([
            Varying::new("v_texcoord").flipped(),
            Varying::new("v_maskcoord"),
        ])
    }
}

impl FragmentProgram for Extract {
    fn interface(&self) -> ProgramInterface {
        ProgramInterface {
            uniforms: vec![("u_image", UniformKind::Sampler), ("u_mask", UniformKind::Sampler)],
            varyings: vec!["v_texcoord", "v_maskcoord"],
            outputs: 2,
        }
    }

    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]) {
        let fg_alpha = input.texture(Self::MASK, input.varying(MASKCOORD))[3];
        let bg_alpha = 1.0 - fg_alpha;
        let [r, g, b, _] = input.texture(Self::IMAGE, input.varying(TEXCOORD));
        out[0] = [r * fg_alpha, g * fg_alpha, b * fg_alpha, fg_alpha];
        out[1] = [r * bg_alpha, g * bg_alpha, b * bg_alpha, bg_alpha];
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some(
            r#"
fn shade(v: Varyings) -> Outputs {
    let fg_alpha = sample_u_mask(v.v_maskcoord).w;
    let bg_alpha = 1.0 - fg_alpha;
    let rgb = sample_u_image(v.v_texcoord).rgb;
    var out: Outputs;
    out.o0 = vec4<f32>(rgb * fg_alpha, fg_alpha);
    out.o1 = vec4<f32>(rgb * bg_alpha, bg_alpha);
    return out;
}
"#,
        )
    }
}

/// One direction of a separable Gaussian. The half kernel length is baked
/// in, so each blur radius is its own stage.
pub struct GaussianBlur {
    pub taps: usize,
}

impl GaussianBlur {
    const BG: usize = 0;
    const FIRST_PASS: usize = 1;
    const KERNEL: usize = 2;
}

impl FragmentProgram for GaussianBlur {
    fn interface(&self) -> ProgramInterface {
        ProgramInterface {
            uniforms: vec![
                ("bg", UniformKind::Sampler),
                ("first_pass", UniformKind::Bool),
                ("kernel", UniformKind::FloatArray(self.taps)),
            ],
            varyings: vec!["v_texcoord"],
            outputs: 1,
        }
    }

    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]) {
        let uv = input.varying(TEXCOORD);
        let size = input.texture_size(Self::BG);
        let kernel = input.float_array(Self::KERNEL);
        let step = if input.bool(Self::FIRST_PASS) {
            [1.0 / size[0], 0.0]
        } else {
            [0.0, 1.0 / size[1]]
        };

        let center = input.texture(Self::BG, uv);
        let k0 = kernel.first().copied().unwrap_or(0.0);
        let mut acc = center.map(|v| v * k0);
        for (i, &k) in kernel.iter().enumerate().skip(1) {
            let d = i as f32;
            let fwd = input.texture(Self::BG, [uv[0] + step[0] * d, uv[1] + step[1] * d]);
            let back = input.texture(Self::BG, [uv[0] - step[0] * d, uv[1] - step[1] * d]);
            for c in 0..4 {
                acc[c] += (fwd[c] + back[c]) * k;
            }
        }
        out[0] = acc;
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some(
            r#"
fn shade(v: Varyings) -> Outputs {
    let size = size_bg();
    var step = vec2<f32>(0.0, 1.0 / size.y);
    if p_first_pass() {
        step = vec2<f32>(1.0 / size.x, 0.0);
    }
    var acc = sample_bg(v.v_texcoord) * p_kernel(0);
    for (var i = 1; i < LEN_kernel; i++) {
        let d = step * f32(i);
        acc += (sample_bg(v.v_texcoord + d) + sample_bg(v.v_texcoord - d)) * p_kernel(i);
    }
    var out: Outputs;
    out.o0 = acc;
    return out;
}
"#,
        )
    }
}

/// Solid color over the background's alpha footprint.
pub struct Fill;

impl Fill {
    const BG: usize = 0;
    const COLOR: usize = 1;
}

impl FragmentProgram for Fill {
    fn interface(&self) -> ProgramInterface {
        ProgramInterface {
            uniforms: vec![("bg", UniformKind::Sampler), ("fill_color", UniformKind::Vec4)],
            varyings: vec!["v_texcoord"],
            outputs: 1,
        }
    }

    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]) {
        let coverage = input.texture(Self::BG, input.varying(TEXCOORD))[3];
        let [r, g, b, a] = input.vec4(Self::COLOR);
        let alpha = a * coverage;
        out[0] = [r * alpha, g * alpha, b * alpha, alpha];
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some(
            r#"
fn shade(v: Varyings) -> Outputs {
    let coverage = sample_bg(v.v_texcoord).w;
    let color = p_fill_color();
    let alpha = color.a * coverage;
    var out: Outputs;
    out.o0 = vec4<f32>(color.rgb * alpha, alpha);
    return out;
}
"#,
        )
    }
}

/// Painter's-order composite: foreground over styled background over the
/// original image.
pub struct Blend;

impl Blend {
    const FG: usize = 0;
    const BG: usize = 1;
    const ORIG: usize = 2;
}

impl FragmentProgram for Blend {
    fn interface(&self) -> ProgramInterface {
        ProgramInterface {
            uniforms: vec![
                ("fg", UniformKind::Sampler),
                ("bg", UniformKind::Sampler),
                ("orig", UniformKind::Sampler),
            ],
            varyings: vec!["v_texcoord"],
            outputs: 1,
        }
    }

    fn shade(&self, input: &FragmentInput<'_>, out: &mut [Texel]) {
        let uv = input.varying(TEXCOORD);
        let fg = input.texture(Self::FG, uv);
        let bg = input.texture(Self::BG, uv);
        let orig = input.texture(Self::ORIG, [uv[0], 1.0 - uv[1]]);
        let under: Texel = std::array::from_fn(|c| bg[c] + (1.0 - bg[3]) * orig[c]);
        out[0] = std::array::from_fn(|c| fg[c] + (1.0 - fg[3]) * under[c]);
    }

    fn wgsl(&self) -> Option<&'static str> {
        Some(
            r#"
fn shade(v: Varyings) -> Outputs {
    let fg = sample_fg(v.v_texcoord);
    let bg = sample_bg(v.v_texcoord);
    let orig = sample_orig(vec2<f32>(v.v_texcoord.x, 1.0 - v.v_texcoord.y));
    let under = bg + (1.0 - bg.a) * orig;
    var out: Outputs;
    out.o0 = fg + (1.0 - fg.a) * under;
    return out;
}
"#,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{FilterMode, Limits, RenderContext, Texture, TextureFormat};

    #[test]
    fn every_stage_links() {
        let ctx = RenderContext::new(Limits::default()).unwrap();
        let units = ctx.limits().max_texture_units;
        let stages: Vec<(VertexStage, Box<dyn FragmentProgram>)> = vec![
            (Colorize::vertex(), Box::new(Colorize)),
            (Extract::vertex(), Box::new(Extract)),
            (quad(), Box::new(GaussianBlur { taps: 4 })),
            (quad(), Box::new(Fill)),
            (quad(), Box::new(Blend)),
        ];
        for (i, (vertex, fragment)) in stages.into_iter().enumerate() {
            let stage =
                crate::gpu::ShaderStage::compile(format!("s{i}"), vertex, fragment, units).unwrap();
            assert!(stage.wgsl().is_some(), "stage {i} has no WGSL body");
        }
    }

    #[test]
    fn blur_of_a_flat_field_is_flat() {
        let mut ctx = RenderContext::new(Limits::default()).unwrap();
        ctx.upload_texture(
            "flat",
            Texture::from_texels(6, 4, TextureFormat::Rgba8, FilterMode::Linear, vec![[0.4, 0.4, 0.4, 1.0]; 24])
                .unwrap(),
        )
        .unwrap();
        ctx.create_render_target("out", &[crate::gpu::AttachmentDesc::rgba8("out", 6, 4)])
            .unwrap();
        ctx.compile_stage("blur", quad(), Box::new(GaussianBlur { taps: 3 })).unwrap();
        let kernel = crate::compositor::kernel::half_kernel(2, 1.0).unwrap();
        let stage = ctx.use_stage("blur").unwrap();
        stage.set_f32_array("kernel", &kernel);
        stage.set_bool("first_pass", true);
        ctx.bind_for_write(Some("out")).unwrap();
        ctx.bind_for_read(&["flat"]).unwrap();
        ctx.draw().unwrap();

        let out = ctx.read_texture("out").unwrap();
        for y in 0..4 {
            for x in 0..6 {
                let t = out.texel(x, y);
                assert!((t[0] - 0.4).abs() <= 1.0 / 255.0, "({x},{y}) = {t:?}");
                assert!((t[3] - 1.0).abs() <= 1.0 / 255.0);
            }
        }
    }
}
