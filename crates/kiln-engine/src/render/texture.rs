use std::path::Path;

use anyhow::{Context, Result};
use glam::{UVec2, Vec2};

use crate::coords::Rect;
use crate::device::{RenderDevice, TextureDef, TextureFormat, TextureHandle};

/// A sampled device texture.
///
/// Like every device resource it is released explicitly through
/// [`dispose`](Self::dispose); dropping it leaks the GPU texture until the
/// device itself is torn down.
#[derive(Debug, PartialEq, Eq)]
pub struct Texture {
    handle: TextureHandle,
    size: UVec2,
    format: TextureFormat,
}

impl Texture {
    /// Uninitialized texture of `size` texels.
    pub fn new(device: &mut dyn RenderDevice, size: UVec2, format: TextureFormat) -> Result<Self> {
        let handle = device.create_texture(&TextureDef {
            size,
            format,
            ..TextureDef::default()
        })?;
        Ok(Self { handle, size, format })
    }

    /// RGBA8 texture initialized from tightly packed rows.
    pub fn with_pixels(device: &mut dyn RenderDevice, size: UVec2, pixels: &[u8]) -> Result<Self> {
        let format = TextureFormat::R8G8B8A8;
        let handle = device.create_texture(&TextureDef {
            size,
            format,
            data: pixels,
            ..TextureDef::default()
        })?;
        Ok(Self { handle, size, format })
    }

    /// Decodes an encoded image (PNG, JPEG, ...) into an RGBA8 texture.
    pub fn from_bytes(device: &mut dyn RenderDevice, bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decoding texture image")?.to_rgba8();
        let size = UVec2::new(image.width(), image.height());
        Self::with_pixels(device, size, image.as_raw())
    }

    pub fn load(device: &mut dyn RenderDevice, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("loading texture {}", path.display()))?
            .to_rgba8();
        let size = UVec2::new(image.width(), image.height());
        log::debug!("loaded texture {} ({}x{})", path.display(), size.x, size.y);
        Self::with_pixels(device, size, image.as_raw())
    }

    /// Replaces this texture's GPU state with `other`'s.
    ///
    /// Waits for the device to go idle first so that no in-flight frame still
    /// samples the old texture when it is released.
    pub fn reload(&mut self, device: &mut dyn RenderDevice, other: Texture) -> Result<()> {
        device.wait_idle()?;
        let old = std::mem::replace(self, other);
        old.dispose(device);
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> UVec2 {
        self.size
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.size.y
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Bytes of texel storage.
    #[inline]
    pub fn memory_size(&self) -> u64 {
        self.size.x as u64 * self.size.y as u64 * self.format.size() as u64
    }

    pub fn dispose(self, device: &mut dyn RenderDevice) {
        device.dispose_texture(self.handle);
    }
}

/// A rectangular region of a texture, ready to be drawn.
///
/// `frame` places the region inside a larger logical image: a negative frame
/// origin offsets the drawn quad, which is how trimmed atlas sprites keep
/// their original bounds.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct SubTexture {
    pub texture: TextureHandle,
    pub texture_size: UVec2,
    pub source: Rect,
    pub frame: Rect,
    pub tex_coords: [Vec2; 4],
    pub draw_coords: [Vec2; 4],
}

impl SubTexture {
    /// The whole of `texture`.
    pub fn new(texture: &Texture) -> Self {
        let full = Rect::new(0.0, 0.0, texture.width() as f32, texture.height() as f32);
        Self::from_parts(texture.handle(), texture.size(), full, full)
    }

    /// `source` of `texture`, framed by its own size.
    pub fn with_source(texture: &Texture, source: Rect) -> Self {
        Self::with_frame(texture, source, Rect::new(0.0, 0.0, source.w, source.h))
    }

    pub fn with_frame(texture: &Texture, source: Rect, frame: Rect) -> Self {
        Self::from_parts(texture.handle(), texture.size(), source, frame)
    }

    pub fn from_parts(texture: TextureHandle, texture_size: UVec2, source: Rect, frame: Rect) -> Self {
        let origin = Vec2::new(-frame.x, -frame.y);
        let draw_coords = [
            origin,
            origin + Vec2::new(source.w, 0.0),
            origin + Vec2::new(source.w, source.h),
            origin + Vec2::new(0.0, source.h),
        ];

        let mut tex_coords = [Vec2::ZERO; 4];
        if texture_size.x > 0 && texture_size.y > 0 {
            let extent = texture_size.as_vec2();
            let min = source.top_left() / extent;
            let max = source.bottom_right() / extent;
            tex_coords = [min, Vec2::new(max.x, min.y), max, Vec2::new(min.x, max.y)];
        }

        Self {
            texture,
            texture_size,
            source,
            frame,
            tex_coords,
            draw_coords,
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.frame.w
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.frame.h
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        self.frame.size()
    }

    /// Source and frame rectangles of the part of this region inside `clip`,
    /// with `clip` relative to the region.
    pub fn clip(&self, clip: Rect) -> (Rect, Rect) {
        let moved = Rect::from_pos_size(clip.position() + self.source.position(), clip.size());
        let source = moved.intersect(self.source).unwrap_or_default();
        let frame = Rect::new(
            (self.frame.x + clip.x).min(0.0),
            (self.frame.y + clip.y).min(0.0),
            clip.w,
            clip.h,
        );
        (source, frame)
    }

    pub fn clip_sub_texture(&self, clip: Rect) -> SubTexture {
        let (source, frame) = self.clip(clip);
        Self::from_parts(self.texture, self.texture_size, source, frame)
    }
}
