// gpu/device.rs: wgpu adapter and device selection.
//
// Adapters are enumerated explicitly and ranked: discrete or integrated
// hardware first, then virtual and unclassified devices, then software
// rasterizers (llvmpipe, lavapipe) last so a headless machine can still run
// the backend. The chosen adapter is logged at startup.
//
// FLOAT32_FILTERABLE is requested whenever the adapter offers it. Without
// it Rgba32Float textures can only be sampled with nearest filtering and
// the guided filter refuses to run, which `render_limits` reports.

use super::context::Limits;
use crate::error::{FxError, Result};
use std::fmt;

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Adapter, device and queue for the lifetime of a backend.
///
/// `_instance` is declared last so the instance outlives the device and
/// queue when the struct drops.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    pub features: wgpu::Features,
    pub limits: wgpu::Limits,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Open the best adapter on any primary backend.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::init_async())
    }

    async fn init_async() -> Result<Self> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
        } else {
            wgpu::InstanceFlags::empty()
        };
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        for a in &adapters {
            let info = a.get_info();
            tracing::debug!(adapter = %info.name, backend = ?info.backend, device_type = ?info.device_type, "found adapter");
        }
        let adapter = adapters
            .into_iter()
            .min_by_key(|a| adapter_rank(a.get_info().device_type))
            .ok_or_else(|| FxError::ContextUnavailable("no gpu adapter available".into()))?;

        let raw = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw.name.clone(),
            device_type: raw.device_type,
            backend: raw.backend,
        };
        tracing::info!(adapter = %adapter_info, "selected wgpu adapter");

        let features = adapter.features() & wgpu::Features::FLOAT32_FILTERABLE;
        let limits = wgpu::Limits::default().using_resolution(adapter.limits());

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("edgematte"),
                    required_features: features,
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| FxError::ContextUnavailable(format!("device request failed: {e}")))?;

        Ok(GpuDevice {
            device,
            queue,
            adapter_info,
            features,
            limits,
            _instance: instance,
        })
    }

    /// What the render graph may rely on with this device.
    pub fn render_limits(&self) -> Limits {
        render_limits(self.features, &self.limits)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuDevice {{ adapter: {} }}", self.adapter_info)
    }
}

/// Lower is preferred.
fn adapter_rank(device_type: wgpu::DeviceType) -> u8 {
    match device_type {
        wgpu::DeviceType::DiscreteGpu => 0,
        wgpu::DeviceType::IntegratedGpu => 1,
        wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => 2,
        wgpu::DeviceType::Cpu => 3,
    }
}

pub(crate) fn render_limits(features: wgpu::Features, limits: &wgpu::Limits) -> Limits {
    Limits {
        float_render_targets: true,
        float_linear_filtering: features.contains(wgpu::Features::FLOAT32_FILTERABLE),
        max_texture_units: limits
            .max_sampled_textures_per_shader_stage
            .min(limits.max_samplers_per_shader_stage) as usize,
        max_color_attachments: limits.max_color_attachments as usize,
        max_texture_size: limits.max_texture_dimension_2d as usize,
    }
}
