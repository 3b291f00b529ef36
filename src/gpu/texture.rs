use crate::error::{FxError, Result};
use image::RgbaImage;

/// One RGBA texel, normalized for 8-bit formats and raw for float ones.
pub type Texel = [f32; 4];

/// Minification/magnification filter, fixed when a texture is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Storage format of a texture.
///
/// 8-bit formats quantize every write to 1/255 steps and clamp to [0, 1];
/// `Rgba32F` keeps the full float value, which the guided filter needs for
/// its signed coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Rgb8,
    Alpha8,
    Luminance8,
    Rgba32F,
}

impl TextureFormat {
    pub fn is_float(self) -> bool {
        matches!(self, TextureFormat::Rgba32F)
    }

    /// Whether a framebuffer may use this format as a color attachment.
    pub fn is_color_renderable(self) -> bool {
        matches!(
            self,
            TextureFormat::Rgba8 | TextureFormat::Rgb8 | TextureFormat::Rgba32F
        )
    }

    /// Convert an incoming value into what this format actually stores,
    /// expanded back to RGBA the way a sampler returns it.
    fn store(self, v: Texel) -> Texel {
        match self {
            TextureFormat::Rgba32F => v,
            TextureFormat::Rgba8 => [quantize(v[0]), quantize(v[1]), quantize(v[2]), quantize(v[3])],
            TextureFormat::Rgb8 => [quantize(v[0]), quantize(v[1]), quantize(v[2]), 1.0],
            TextureFormat::Alpha8 => [0.0, 0.0, 0.0, quantize(v[3])],
            TextureFormat::Luminance8 => {
                let l = quantize(v[0]);
                [l, l, l, 1.0]
            }
        }
    }
}

#[inline]
fn quantize(v: f32) -> f32 {
    (v.clamp(0.0, 1.0) * 255.0).round() / 255.0
}

/// Rec. 601 luma, the same weights the YUYV output conversion uses.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// A 2-D image buffer with clamp-to-edge addressing.
///
/// Row 0 lies at `t = 0`. For uploaded images that is the top row; for
/// render targets it is the bottom row of the window, so passes that read
/// uploads use flipped texture coordinates.
#[derive(Clone)]
pub struct Texture {
    width: usize,
    height: usize,
    format: TextureFormat,
    filter: FilterMode,
    data: Vec<Texel>,
}

impl Texture {
    /// Allocate a zero-filled texture.
    pub fn new(width: usize, height: usize, format: TextureFormat, filter: FilterMode) -> Self {
        let zero = format.store([0.0; 4]);
        Texture {
            width,
            height,
            format,
            filter,
            data: vec![zero; width * height],
        }
    }

    /// Build a texture from texels; each one goes through the format's
    /// quantization.
    pub fn from_texels(
        width: usize,
        height: usize,
        format: TextureFormat,
        filter: FilterMode,
        texels: Vec<Texel>,
    ) -> Result<Self> {
        if texels.len() != width * height {
            return Err(FxError::shape(format!(
                "{} texels for a {width}x{height} texture",
                texels.len()
            )));
        }
        let data = texels.into_iter().map(|t| format.store(t)).collect();
        Ok(Texture {
            width,
            height,
            format,
            filter,
            data,
        })
    }

    /// Upload an 8-bit RGBA image.
    pub fn from_rgba_image(img: &RgbaImage, filter: FilterMode) -> Self {
        let data = img
            .pixels()
            .map(|p| {
                [
                    p[0] as f32 / 255.0,
                    p[1] as f32 / 255.0,
                    p[2] as f32 / 255.0,
                    p[3] as f32 / 255.0,
                ]
            })
            .collect();
        Texture {
            width: img.width() as usize,
            height: img.height() as usize,
            format: TextureFormat::Rgba8,
            filter,
            data,
        }
    }

    /// Upload the luminance channel of an RGBA image.
    pub fn luminance_from_rgba(img: &RgbaImage, filter: FilterMode) -> Self {
        let data = img
            .pixels()
            .map(|p| {
                let l = luma(p[0], p[1], p[2]) as f32 / 255.0;
                [l, l, l, 1.0]
            })
            .collect();
        Texture {
            width: img.width() as usize,
            height: img.height() as usize,
            format: TextureFormat::Luminance8,
            filter,
            data,
        }
    }

    /// Upload a single-channel byte buffer into the alpha channel.
    pub fn alpha_from_bytes(
        width: usize,
        height: usize,
        bytes: &[u8],
        filter: FilterMode,
    ) -> Result<Self> {
        if bytes.len() != width * height {
            return Err(FxError::shape(format!(
                "{} bytes for a {width}x{height} alpha texture",
                bytes.len()
            )));
        }
        let data = bytes
            .iter()
            .map(|&a| [0.0, 0.0, 0.0, a as f32 / 255.0])
            .collect();
        Ok(Texture {
            width,
            height,
            format: TextureFormat::Alpha8,
            filter,
            data,
        })
    }

    /// Upload a tightly packed RGB byte buffer.
    pub fn rgb_from_bytes(
        width: usize,
        height: usize,
        bytes: &[u8],
        filter: FilterMode,
    ) -> Result<Self> {
        if bytes.len() != width * height * 3 {
            return Err(FxError::shape(format!(
                "{} bytes for a {width}x{height} RGB texture",
                bytes.len()
            )));
        }
        let data = bytes
            .chunks_exact(3)
            .map(|c| [c[0] as f32 / 255.0, c[1] as f32 / 255.0, c[2] as f32 / 255.0, 1.0])
            .collect();
        Ok(Texture {
            width,
            height,
            format: TextureFormat::Rgb8,
            filter,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[inline]
    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    /// Texel at integer coordinates.
    ///
    /// # Panics
    /// Panics if `(x, y)` is out of bounds.
    #[inline]
    pub fn texel(&self, x: usize, y: usize) -> Texel {
        assert!(
            x < self.width && y < self.height,
            "texel ({x},{y}) out of bounds for {}x{}",
            self.width,
            self.height
        );
        self.data[y * self.width + x]
    }

    #[inline]
    pub(crate) fn write(&mut self, x: usize, y: usize, value: Texel) {
        let idx = y * self.width + x;
        self.data[idx] = self.format.store(value);
    }

    /// Sample at normalized coordinates with this texture's filter.
    pub fn sample(&self, u: f32, v: f32) -> Texel {
        if self.width == 0 || self.height == 0 {
            return [0.0; 4];
        }
        match self.filter {
            FilterMode::Nearest => {
                let x = clamp_index((u * self.width as f32).floor() as isize, self.width);
                let y = clamp_index((v * self.height as f32).floor() as isize, self.height);
                self.data[y * self.width + x]
            }
            FilterMode::Linear => {
                let fx = u * self.width as f32 - 0.5;
                let fy = v * self.height as f32 - 0.5;
                let x0f = fx.floor();
                let y0f = fy.floor();
                let tx = fx - x0f;
                let ty = fy - y0f;
                let x0 = clamp_index(x0f as isize, self.width);
                let x1 = clamp_index(x0f as isize + 1, self.width);
                let y0 = clamp_index(y0f as isize, self.height);
                let y1 = clamp_index(y0f as isize + 1, self.height);

                let t00 = self.data[y0 * self.width + x0];
                let t10 = self.data[y0 * self.width + x1];
                let t01 = self.data[y1 * self.width + x0];
                let t11 = self.data[y1 * self.width + x1];
                let mut out = [0.0f32; 4];
                for c in 0..4 {
                    let top = t00[c] + (t10[c] - t00[c]) * tx;
                    let bottom = t01[c] + (t11[c] - t01[c]) * tx;
                    out[c] = top + (bottom - top) * ty;
                }
                out
            }
        }
    }

    pub fn texels(&self) -> &[Texel] {
        &self.data
    }
}

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("filter", &self.filter)
            .finish()
    }
}
