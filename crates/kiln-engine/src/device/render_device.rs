use anyhow::Result;
use glam::UVec2;

use crate::render::{DrawCommand, Target};

use super::registry::{BufferHandle, ShaderHandle, TextureHandle};
use super::types::{BufferDef, ClearInfo, SampleCount, ShaderDef, TextureDef, TextureFormat};

/// Public description of a live texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    pub size: UVec2,
    pub format: TextureFormat,
    pub sample_count: SampleCount,
    pub is_target_attachment: bool,
}

impl TextureInfo {
    /// Bytes occupied by one sample of every texel.
    #[inline]
    pub fn memory_size(&self) -> u64 {
        self.size.x as u64 * self.size.y as u64 * self.format.size() as u64
    }
}

/// GPU-facing interface used by textures, meshes, targets and the batcher.
///
/// Every resource is addressed by a handle. Disposing a stale or null handle
/// is a no-op. Backend failures are fatal and surface as errors; expected
/// transient conditions (no swapchain image, zero-sized buffers) are logged
/// and skipped.
pub trait RenderDevice {
    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self, def: &TextureDef<'_>) -> Result<TextureHandle>;

    /// Replaces the whole contents of `texture` with tightly packed rows.
    fn set_texture_data(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()>;

    fn dispose_texture(&mut self, texture: TextureHandle);

    fn texture_info(&self, texture: TextureHandle) -> Option<TextureInfo>;

    /// 1×1 opaque white texture owned by the device.
    fn default_texture(&self) -> TextureHandle;

    // ── shaders ───────────────────────────────────────────────────────────

    fn create_shader(&mut self, def: &ShaderDef<'_>) -> Result<ShaderHandle>;

    /// Also evicts every cached pipeline built from `shader`.
    fn dispose_shader(&mut self, shader: ShaderHandle);

    // ── buffers ───────────────────────────────────────────────────────────

    /// Returns the null handle, with a warning, for a zero-sized request.
    fn create_buffer(&mut self, def: &BufferDef<'_>) -> Result<BufferHandle>;

    /// Writes `data` at byte `offset`, reallocating the buffer to exactly
    /// `offset + data.len()` bytes when it is too small.
    fn set_buffer_data(&mut self, buffer: BufferHandle, data: &[u8], offset: u32) -> Result<()>;

    fn dispose_buffer(&mut self, buffer: BufferHandle);

    // ── frame ─────────────────────────────────────────────────────────────

    /// Clears `target` (the framebuffer when `None`).
    fn clear(&mut self, target: Option<&Target>, info: ClearInfo) -> Result<()>;

    fn submit(&mut self, command: &DrawCommand<'_>) -> Result<()>;

    /// Blits the framebuffer to the swapchain and advances the frame.
    fn present(&mut self) -> Result<()>;

    /// Blocks until the GPU has finished every submitted command.
    fn wait_idle(&mut self) -> Result<()>;

    fn framebuffer(&self) -> &Target;
}
