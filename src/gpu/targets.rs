use super::context::RenderContext;
use super::texture::{FilterMode, Texture, TextureFormat};
use crate::error::{FxError, Result};

/// Name of a texture held by a [`RenderContext`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureHandle(String);

impl TextureHandle {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TextureHandle {
    fn from(name: &str) -> Self {
        TextureHandle(name.to_string())
    }
}

impl AsRef<str> for TextureHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One color attachment of a render target. The texture is created fresh
/// when the target is allocated.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentDesc {
    pub texture: String,
    pub width: usize,
    pub height: usize,
    pub format: TextureFormat,
    pub filter: FilterMode,
    /// Output slot; defaults to the attachment's position in the list.
    pub slot: Option<usize>,
}

impl AttachmentDesc {
    /// An 8-bit RGBA, linearly filtered attachment.
    pub fn rgba8(texture: &str, width: usize, height: usize) -> Self {
        AttachmentDesc {
            texture: texture.to_string(),
            width,
            height,
            format: TextureFormat::Rgba8,
            filter: FilterMode::Linear,
            slot: None,
        }
    }

    /// A float RGBA attachment.
    pub fn rgba32f(texture: &str, width: usize, height: usize, filter: FilterMode) -> Self {
        AttachmentDesc {
            texture: texture.to_string(),
            width,
            height,
            format: TextureFormat::Rgba32F,
            filter,
            slot: None,
        }
    }
}

/// An off-screen draw destination.
#[derive(Debug, Clone)]
pub(crate) struct Framebuffer {
    /// `(output slot, texture name)`.
    pub(crate) attachments: Vec<(usize, String)>,
    /// Why the backend cannot draw into this target, if it cannot.
    pub(crate) incomplete: Option<String>,
}

impl RenderContext {
    /// Allocate a zero-filled texture under `name`, replacing any previous
    /// one.
    pub fn create_texture(
        &mut self,
        name: &str,
        width: usize,
        height: usize,
        format: TextureFormat,
        filter: FilterMode,
    ) -> Result<TextureHandle> {
        self.upload_texture(name, Texture::new(width, height, format, filter))
    }

    /// Store `texture` under `name`, replacing any previous one.
    pub fn upload_texture(&mut self, name: &str, texture: Texture) -> Result<TextureHandle> {
        self.ensure_alive()?;
        let max = self.limits.max_texture_size;
        if texture.width() > max || texture.height() > max {
            return Err(FxError::shape(format!(
                "texture `{name}` is {}x{}, limit is {max}",
                texture.width(),
                texture.height()
            )));
        }
        if texture.format().is_float()
            && texture.filter() == FilterMode::Linear
            && !self.limits.float_linear_filtering
        {
            tracing::warn!(texture = name, "linear filtering of float texture is unsupported");
        }
        let size = (texture.width(), texture.height());
        self.backend.store_texture(name, texture)?;
        self.textures.insert(name.to_string(), size);
        Ok(TextureHandle(name.to_string()))
    }

    pub fn has_texture(&self, name: &str) -> bool {
        self.textures.contains_key(name)
    }

    /// Copy a texture's current contents out of the backend.
    pub fn read_texture(&self, name: &str) -> Result<Texture> {
        if !self.textures.contains_key(name) {
            return Err(FxError::UnknownTexture(name.to_string()));
        }
        self.backend.read_texture(name)
    }

    /// Free an uploaded texture. Textures attached to a render target go
    /// with the target instead.
    pub fn release_texture(&mut self, name: &str) {
        if self.textures.remove(name).is_some() {
            self.backend.release_texture(name);
            tracing::trace!(texture = name, "released texture");
        }
    }

    /// Allocate a framebuffer with one fresh texture per attachment.
    ///
    /// A target the backend cannot draw into is still created; the problem
    /// is logged here and the target's draws are skipped later. The visible
    /// surface is bound for writing afterwards.
    pub fn create_render_target(&mut self, name: &str, attachments: &[AttachmentDesc]) -> Result<()> {
        self.ensure_alive()?;
        self.release_render_target(name);

        let mut bound = Vec::with_capacity(attachments.len());
        for (i, desc) in attachments.iter().enumerate() {
            self.create_texture(&desc.texture, desc.width, desc.height, desc.format, desc.filter)?;
            bound.push((desc.slot.unwrap_or(i), desc.texture.clone()));
        }

        let incomplete = self.completeness(attachments);
        if let Some(reason) = &incomplete {
            tracing::warn!(render_target = name, reason = %reason, "render target is not complete");
        } else {
            tracing::debug!(render_target = name, attachments = bound.len(), "created render target");
        }

        self.framebuffers.insert(
            name.to_string(),
            Framebuffer {
                attachments: bound,
                incomplete,
            },
        );
        self.write_target = None;
        Ok(())
    }

    fn completeness(&self, attachments: &[AttachmentDesc]) -> Option<String> {
        let first = match attachments.first() {
            Some(first) => first,
            None => return Some("no attachments".into()),
        };
        for (i, desc) in attachments.iter().enumerate() {
            if desc.width == 0 || desc.height == 0 {
                return Some(format!("attachment `{}` has zero size", desc.texture));
            }
            if (desc.width, desc.height) != (first.width, first.height) {
                return Some(format!("attachment `{}` differs in size", desc.texture));
            }
            if !desc.format.is_color_renderable() {
                return Some(format!("format {:?} is not color-renderable", desc.format));
            }
            if desc.format.is_float() && !self.limits.float_render_targets {
                return Some("float render targets unsupported".into());
            }
            let slot = desc.slot.unwrap_or(i);
            if slot >= self.limits.max_color_attachments {
                return Some(format!("attachment slot {slot} out of range"));
            }
            let clash = attachments[..i]
                .iter()
                .enumerate()
                .any(|(j, other)| other.slot.unwrap_or(j) == slot);
            if clash {
                return Some(format!("attachment slot {slot} used twice"));
            }
        }
        None
    }

    /// Release one render target and the textures attached to it.
    pub fn release_render_target(&mut self, name: &str) {
        if let Some(fb) = self.framebuffers.remove(name) {
            for (_, tex) in fb.attachments {
                self.textures.remove(&tex);
                self.backend.release_texture(&tex);
            }
            if self.write_target.as_deref() == Some(name) {
                self.write_target = None;
            }
        }
    }

    /// Release every render target. Uploaded textures stay.
    pub fn release_render_targets(&mut self) {
        let names: Vec<String> = self.framebuffers.keys().cloned().collect();
        for name in names {
            self.release_render_target(&name);
        }
    }

    pub fn has_render_target(&self, name: &str) -> bool {
        self.framebuffers.contains_key(name)
    }

    pub fn render_target_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Size of a render target's attachments.
    pub fn render_target_size(&self, name: &str) -> Option<(usize, usize)> {
        let fb = self.framebuffers.get(name)?;
        let (_, tex) = fb.attachments.first()?;
        self.textures.get(tex).copied()
    }

    /// Select the destination of following draws; `None` is the visible
    /// surface.
    pub fn bind_for_write(&mut self, target: Option<&str>) -> Result<()> {
        match target {
            None => self.write_target = None,
            Some(name) => {
                if !self.framebuffers.contains_key(name) {
                    return Err(FxError::UnknownTarget(name.to_string()));
                }
                self.write_target = Some(name.to_string());
            }
        }
        Ok(())
    }

    /// Bind `names[i]` to texture unit `i`. Units past the list keep their
    /// previous binding.
    pub fn bind_for_read(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            if !self.textures.contains_key(*name) {
                return Err(FxError::UnknownTexture(name.to_string()));
            }
        }
        for (unit, name) in names.iter().enumerate() {
            if unit < self.read_slots.len() {
                self.read_slots[unit] = name.to_string();
            } else {
                self.read_slots.push(name.to_string());
            }
        }
        Ok(())
    }
}
