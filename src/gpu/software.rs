// gpu/software.rs: CPU rasterizer backend.
//
// Every draw shades each pixel of the destination in row order on the
// calling thread. Sampler units are resolved to textures once per draw and
// varyings are evaluated into a fixed buffer, so the inner loop does no
// lookups. This backend is the reference the wgpu one is checked against.

use super::backend::{DrawCall, RenderBackend};
use super::context::Limits;
use super::texture::{FilterMode, Texel, Texture, TextureFormat};
use crate::error::{FxError, Result};
use image::RgbaImage;
use std::collections::HashMap;

pub struct SoftwareBackend {
    limits: Limits,
    textures: HashMap<String, Texture>,
    surface: Texture,
}

impl SoftwareBackend {
    /// `limits` is what the backend reports, so tests can simulate a
    /// device without float targets.
    pub fn new(limits: Limits) -> Self {
        SoftwareBackend {
            limits,
            textures: HashMap::new(),
            surface: Texture::new(1, 1, TextureFormat::Rgba8, FilterMode::Nearest),
        }
    }

    fn detach(&mut self, name: Option<&str>) -> Option<Texture> {
        match name {
            None => Some(std::mem::replace(
                &mut self.surface,
                Texture::new(0, 0, TextureFormat::Rgba8, FilterMode::Nearest),
            )),
            Some(name) => self.textures.remove(name),
        }
    }
}

impl RenderBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn limits(&self) -> Limits {
        self.limits
    }

    fn store_texture(&mut self, name: &str, texture: Texture) -> Result<()> {
        self.textures.insert(name.to_string(), texture);
        Ok(())
    }

    fn release_texture(&mut self, name: &str) {
        self.textures.remove(name);
    }

    fn read_texture(&self, name: &str) -> Result<Texture> {
        self.textures
            .get(name)
            .cloned()
            .ok_or_else(|| FxError::UnknownTexture(name.to_string()))
    }

    fn resize_surface(&mut self, width: usize, height: usize) -> Result<()> {
        self.surface = Texture::new(width, height, TextureFormat::Rgba8, FilterMode::Nearest);
        Ok(())
    }

    fn read_surface(&self) -> Result<RgbaImage> {
        let (w, h) = (self.surface.width(), self.surface.height());
        Ok(RgbaImage::from_fn(w as u32, h as u32, |x, y| {
            let t = self.surface.texel(x as usize, h - 1 - y as usize);
            image::Rgba([to_u8(t[0]), to_u8(t[1]), to_u8(t[2]), to_u8(t[3])])
        }))
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let stage = call.stage;
        if let Some(missing) = call
            .outputs
            .iter()
            .filter_map(|(_, name)| *name)
            .find(|name| !self.textures.contains_key(*name))
        {
            return Err(FxError::UnknownTexture(missing.to_string()));
        }

        // Detach the destinations so the sources can be borrowed alongside.
        let mut dests: Vec<(usize, Option<&str>, Texture)> = Vec::with_capacity(call.outputs.len());
        for &(slot, name) in call.outputs {
            if let Some(tex) = self.detach(name) {
                dests.push((slot, name, tex));
            }
        }
        let Some((width, height)) = dests.first().map(|d| (d.2.width(), d.2.height())) else {
            return Ok(());
        };

        let samplers: Vec<Option<&Texture>> = call
            .samplers
            .iter()
            .map(|name| name.and_then(|n| self.textures.get(n)))
            .collect();

        let n_out = stage
            .outputs()
            .max(dests.iter().map(|d| d.0 + 1).max().unwrap_or(1));
        let mut out: Vec<Texel> = vec![[0.0; 4]; n_out];
        let mut varyings = vec![[0.0f32; 2]; stage.interface().varyings.len()];

        for y in 0..height {
            let py = 2.0 * (y as f32 + 0.5) / height as f32 - 1.0;
            for x in 0..width {
                let px = 2.0 * (x as f32 + 0.5) / width as f32 - 1.0;
                stage.eval_varyings([px, py], &mut varyings);
                out.iter_mut().for_each(|o| *o = [0.0; 4]);
                stage.shade(&varyings, &samplers, &mut out);
                for (slot, _, tex) in dests.iter_mut() {
                    tex.write(x, y, out[*slot]);
                }
            }
        }
        drop(samplers);

        for (_, name, tex) in dests {
            match name {
                None => self.surface = tex,
                Some(name) => {
                    self.textures.insert(name.to_string(), tex);
                }
            }
        }
        Ok(())
    }
}

#[inline]
pub(crate) fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
