// gpu/wgpu_backend.rs: RenderBackend on a wgpu device.
//
// Every named texture is a wgpu texture: Rgba32F as Rgba32Float, every
// 8-bit format as Rgba8Unorm holding the RGBA expansion the software
// backend stores. Render targets are just those textures used as color
// attachments, so a multi-pass chain ping-pongs between textures exactly
// like the software backend does.
//
// Stages compile lazily on first draw: one shader module and bind group
// layout per stage, one pipeline per distinct set of target formats. Each
// draw uploads a fresh parameter buffer, records one render pass over a
// full-screen triangle and submits it, so passes complete in call order.
//
// Readback (read_texture, read_surface) stalls until the copy finishes.
// It is meant for tests and the CLI's final frame.

use super::backend::{DrawCall, RenderBackend};
use super::context::Limits;
use super::device::GpuDevice;
use super::shader::{ShaderStage, UniformKind};
use super::software::to_u8;
use super::texture::{FilterMode, Texel, Texture, TextureFormat};
use super::wgsl;
use crate::error::{FxError, Result};
use image::RgbaImage;
use std::collections::HashMap;
use wgpu::util::DeviceExt;

/// A texture resident on the device. Zero-sized textures have no storage.
struct GpuTexture {
    storage: Option<(wgpu::Texture, wgpu::TextureView)>,
    width: usize,
    height: usize,
    format: TextureFormat,
    filter: FilterMode,
}

/// Target formats by output slot; `None` marks an unused slot.
type TargetKey = Vec<Option<TextureFormat>>;

struct StageModule {
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<TargetKey, wgpu::RenderPipeline>,
}

pub struct WgpuBackend {
    gpu: GpuDevice,
    limits: Limits,
    textures: HashMap<String, GpuTexture>,
    surface: GpuTexture,
    stages: HashMap<String, StageModule>,
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
    /// Bound to sampler slots whose unit is empty; reads as opaque black.
    empty: GpuTexture,
}

impl WgpuBackend {
    pub fn new() -> Result<Self> {
        Self::with_device(GpuDevice::new()?)
    }

    pub fn with_device(gpu: GpuDevice) -> Result<Self> {
        let limits = gpu.render_limits();
        let sampler = |filter: wgpu::FilterMode, label: &str| {
            gpu.device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let nearest = sampler(wgpu::FilterMode::Nearest, "nearest");
        let linear = sampler(wgpu::FilterMode::Linear, "linear");

        let surface = upload(
            &gpu,
            "surface",
            &Texture::new(1, 1, TextureFormat::Rgba8, FilterMode::Nearest),
        );
        let black = Texture::from_texels(
            1,
            1,
            TextureFormat::Rgba8,
            FilterMode::Nearest,
            vec![[0.0, 0.0, 0.0, 1.0]],
        )?;
        let empty = upload(&gpu, "empty unit", &black);

        tracing::info!(device = %gpu, ?limits, "wgpu backend ready");
        Ok(WgpuBackend {
            gpu,
            limits,
            textures: HashMap::new(),
            surface,
            stages: HashMap::new(),
            nearest,
            linear,
            empty,
        })
    }

    fn lookup(&self, name: &str) -> Result<&GpuTexture> {
        self.textures
            .get(name)
            .ok_or_else(|| FxError::UnknownTexture(name.to_string()))
    }

    fn ensure_pipeline(&mut self, stage: &ShaderStage, key: &TargetKey) -> Result<()> {
        if !self.stages.contains_key(stage.name()) {
            let module = build_module(&self.gpu, stage, self.limits.float_linear_filtering)?;
            self.stages.insert(stage.name().to_string(), module);
        }
        let Some(module) = self.stages.get_mut(stage.name()) else {
            return Err(FxError::UnknownStage(stage.name().to_string()));
        };
        if !module.pipelines.contains_key(key) {
            let pipeline = build_pipeline(&self.gpu, stage, module, key)?;
            module.pipelines.insert(key.clone(), pipeline);
        }
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn limits(&self) -> Limits {
        self.limits
    }

    fn store_texture(&mut self, name: &str, texture: Texture) -> Result<()> {
        let gpu_texture = upload(&self.gpu, name, &texture);
        self.textures.insert(name.to_string(), gpu_texture);
        Ok(())
    }

    fn release_texture(&mut self, name: &str) {
        if let Some(GpuTexture {
            storage: Some((texture, _)),
            ..
        }) = self.textures.remove(name)
        {
            texture.destroy();
        }
    }

    fn read_texture(&self, name: &str) -> Result<Texture> {
        let tex = self.lookup(name)?;
        let texels = readback(&self.gpu, tex)?;
        Texture::from_texels(tex.width, tex.height, tex.format, tex.filter, texels)
    }

    fn resize_surface(&mut self, width: usize, height: usize) -> Result<()> {
        let blank = Texture::new(width, height, TextureFormat::Rgba8, FilterMode::Nearest);
        self.surface = upload(&self.gpu, "surface", &blank);
        Ok(())
    }

    fn read_surface(&self) -> Result<RgbaImage> {
        let (w, h) = (self.surface.width, self.surface.height);
        let texels = readback(&self.gpu, &self.surface)?;
        Ok(RgbaImage::from_fn(w as u32, h as u32, |x, y| {
            let t = texels[(h - 1 - y as usize) * w + x as usize];
            image::Rgba([to_u8(t[0]), to_u8(t[1]), to_u8(t[2]), to_u8(t[3])])
        }))
    }

    fn forget_stage(&mut self, name: &str) {
        self.stages.remove(name);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let stage = call.stage;
        let slots = call.outputs.iter().map(|(slot, _)| slot + 1).max().unwrap_or(1);

        let mut key: TargetKey = vec![None; slots];
        for &(slot, name) in call.outputs {
            let tex = match name {
                None => &self.surface,
                Some(name) => self.lookup(name)?,
            };
            if tex.storage.is_none() {
                return Ok(());
            }
            key[slot] = Some(tex.format);
        }
        self.ensure_pipeline(stage, &key)?;

        let module = self
            .stages
            .get(stage.name())
            .ok_or_else(|| FxError::UnknownStage(stage.name().to_string()))?;
        let pipeline = module
            .pipelines
            .get(&key)
            .ok_or_else(|| FxError::UnknownStage(stage.name().to_string()))?;

        let params = wgsl::pack_params(stage);
        let params = self
            .gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(stage.name()),
                contents: bytemuck::cast_slice(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut sources: Vec<(&wgpu::TextureView, &wgpu::Sampler)> = Vec::new();
        for (location, (_, kind)) in stage.interface().uniforms.iter().enumerate() {
            if *kind != UniformKind::Sampler {
                continue;
            }
            let tex = call
                .samplers
                .get(location)
                .copied()
                .flatten()
                .and_then(|name| self.textures.get(name))
                .filter(|t| t.storage.is_some())
                .unwrap_or(&self.empty);
            let Some((_, view)) = &tex.storage else {
                continue;
            };
            let sampler = match tex.filter {
                FilterMode::Linear if self.limits.float_linear_filtering => &self.linear,
                _ => &self.nearest,
            };
            sources.push((view, sampler));
        }

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: params.as_entire_binding(),
        }];
        for (k, (view, sampler)) in sources.iter().enumerate() {
            let binding = 1 + 2 * k as u32;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(stage.name()),
            layout: &module.bind_group_layout,
            entries: &entries,
        });

        let mut attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = vec![None; slots];
        for &(slot, name) in call.outputs {
            let tex = match name {
                None => &self.surface,
                Some(name) => self.lookup(name)?,
            };
            if let Some((_, view)) = &tex.storage {
                attachments[slot] = Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                });
            }
        }

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(stage.name()),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(stage.name()),
                color_attachments: &attachments,
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    if format.is_float() {
        wgpu::TextureFormat::Rgba32Float
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

fn bytes_per_texel(format: TextureFormat) -> u32 {
    if format.is_float() {
        16
    } else {
        4
    }
}

/// Create a device texture holding `texture`'s contents.
fn upload(gpu: &GpuDevice, label: &str, texture: &Texture) -> GpuTexture {
    let (width, height) = (texture.width(), texture.height());
    let format = texture.format();
    let mut out = GpuTexture {
        storage: None,
        width,
        height,
        format,
        filter: texture.filter(),
    };
    if width == 0 || height == 0 {
        return out;
    }

    let size = wgpu::Extent3d {
        width: width as u32,
        height: height as u32,
        depth_or_array_layers: 1,
    };
    let tex = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu_format(format),
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let bytes: Vec<u8> = if format.is_float() {
        bytemuck::cast_slice(texture.texels()).to_vec()
    } else {
        texture.texels().iter().flat_map(|t| t.map(to_u8)).collect()
    };
    gpu.queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &tex,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &bytes,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(width as u32 * bytes_per_texel(format)),
            rows_per_image: Some(height as u32),
        },
        size,
    );

    let view = tex.create_view(&wgpu::TextureViewDescriptor::default());
    out.storage = Some((tex, view));
    out
}

/// Copy a texture back into texels, row 0 first. Blocks until done.
fn readback(gpu: &GpuDevice, tex: &GpuTexture) -> Result<Vec<Texel>> {
    let Some((texture, _)) = &tex.storage else {
        return Ok(Vec::new());
    };
    let bpp = bytes_per_texel(tex.format);
    let row_bytes = tex.width as u32 * bpp;
    let aligned = align_to(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

    let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: aligned as u64 * tex.height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(aligned),
                rows_per_image: Some(tex.height as u32),
            },
        },
        wgpu::Extent3d {
            width: tex.width as u32,
            height: tex.height as u32,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    gpu.device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|_| FxError::Device("readback map callback never fired".into()))?
        .map_err(|e| FxError::Device(format!("readback map failed: {e}")))?;

    let mapped = slice.get_mapped_range();
    let mut texels = Vec::with_capacity(tex.width * tex.height);
    for y in 0..tex.height {
        let start = y * aligned as usize;
        let row = &mapped[start..start + row_bytes as usize];
        if tex.format.is_float() {
            texels.extend(row.chunks_exact(16).map(bytemuck::pod_read_unaligned::<Texel>));
        } else {
            texels.extend(row.chunks_exact(4).map(px_to_texel));
        }
    }
    drop(mapped);
    buffer.unmap();
    Ok(texels)
}

fn px_to_texel(px: &[u8]) -> Texel {
    [
        px[0] as f32 / 255.0,
        px[1] as f32 / 255.0,
        px[2] as f32 / 255.0,
        px[3] as f32 / 255.0,
    ]
}

/// Round `value` up to the next multiple of `alignment`.
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

/// Run `f` inside a validation error scope, turning a captured error into
/// `FxError` via `wrap`.
fn validated<T>(gpu: &GpuDevice, f: impl FnOnce() -> T, wrap: impl FnOnce(String) -> FxError) -> Result<T> {
    gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    match pollster::block_on(gpu.device.pop_error_scope()) {
        Some(err) => Err(wrap(err.to_string())),
        None => Ok(value),
    }
}

fn build_module(gpu: &GpuDevice, stage: &ShaderStage, float_filterable: bool) -> Result<StageModule> {
    let name = stage.name();
    let source = wgsl::module_source(stage)
        .ok_or_else(|| FxError::compile(name, "program has no WGSL body"))?;
    let module = validated(
        gpu,
        || {
            gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        },
        |reason| FxError::compile(name, reason),
    )?;

    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }];
    let sampler_type = if float_filterable {
        wgpu::SamplerBindingType::Filtering
    } else {
        wgpu::SamplerBindingType::NonFiltering
    };
    for k in 0..wgsl::sampler_names(stage.interface()).len() as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 1 + 2 * k,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float {
                    filterable: float_filterable,
                },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 2 + 2 * k,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(sampler_type),
            count: None,
        });
    }

    let bind_group_layout = gpu
        .device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(name),
            entries: &entries,
        });
    let pipeline_layout = gpu
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

    tracing::debug!(stage = name, samplers = entries.len() / 2, "built wgpu shader module");
    Ok(StageModule {
        module,
        bind_group_layout,
        pipeline_layout,
        pipelines: HashMap::new(),
    })
}

fn build_pipeline(
    gpu: &GpuDevice,
    stage: &ShaderStage,
    module: &StageModule,
    key: &TargetKey,
) -> Result<wgpu::RenderPipeline> {
    let name = stage.name();
    let targets: Vec<Option<wgpu::ColorTargetState>> = key
        .iter()
        .enumerate()
        .map(|(slot, format)| {
            format.map(|format| wgpu::ColorTargetState {
                format: wgpu_format(format),
                blend: None,
                write_mask: write_mask(format, slot < stage.outputs()),
            })
        })
        .collect();

    validated(
        gpu,
        || {
            gpu.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(name),
                layout: Some(&module.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module.module,
                    entry_point: "vs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module.module,
                    entry_point: "fs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &targets,
                }),
                multiview: None,
                cache: None,
            })
        },
        |reason| FxError::link(name, reason),
    )
}

/// `Rgb8` keeps its opaque alpha. A slot the program never writes is left
/// untouched.
fn write_mask(format: TextureFormat, written: bool) -> wgpu::ColorWrites {
    match (written, format) {
        (false, _) => wgpu::ColorWrites::empty(),
        (true, TextureFormat::Rgb8) => wgpu::ColorWrites::COLOR,
        (true, _) => wgpu::ColorWrites::ALL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_rounds_up_to_copy_alignment() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        // 513 Rgba32Float texels per row.
        assert_eq!(align_to(513 * 16, 256), 8448);
    }

    #[test]
    fn every_format_maps_to_a_renderable_wgpu_format() {
        assert_eq!(wgpu_format(TextureFormat::Rgba32F), wgpu::TextureFormat::Rgba32Float);
        for format in [
            TextureFormat::Rgba8,
            TextureFormat::Rgb8,
            TextureFormat::Alpha8,
            TextureFormat::Luminance8,
        ] {
            assert_eq!(wgpu_format(format), wgpu::TextureFormat::Rgba8Unorm);
            assert_eq!(bytes_per_texel(format), 4);
        }
    }

    #[test]
    fn opaque_targets_mask_alpha_writes() {
        assert_eq!(write_mask(TextureFormat::Rgb8, true), wgpu::ColorWrites::COLOR);
        assert_eq!(write_mask(TextureFormat::Rgba32F, true), wgpu::ColorWrites::ALL);
        assert_eq!(write_mask(TextureFormat::Rgba8, false), wgpu::ColorWrites::empty());
    }
}
