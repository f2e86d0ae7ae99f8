use glam::UVec2;

use crate::pool::{Handle, Pool};

use super::backend::GpuBackend;
use super::types::{BufferUsage, SampleCount, TextureFormat};

/// Handle marker for device textures.
pub enum GpuTexture {}
/// Handle marker for device shaders.
pub enum GpuShader {}
/// Handle marker for device buffers.
pub enum GpuBuffer {}

pub type TextureHandle = Handle<GpuTexture>;
pub type ShaderHandle = Handle<GpuShader>;
pub type BufferHandle = Handle<GpuBuffer>;

pub struct TextureEntry<T> {
    pub raw: T,
    pub format: TextureFormat,
    pub size: UVec2,
    pub sample_count: SampleCount,
    pub is_target_attachment: bool,
    /// Single-sampled companion of a multisampled attachment, or null.
    pub resolve: TextureHandle,
}

/// Binding counts a shader declares per stage.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ShaderLayout {
    pub vertex_samplers: u32,
    pub fragment_samplers: u32,
    pub vertex_uniforms: u32,
    pub fragment_uniforms: u32,
}

pub struct ShaderEntry<S> {
    pub raw: S,
    pub layout: ShaderLayout,
    /// Cache keys of every pipeline built from this shader.
    pub pso_hashes: Vec<u64>,
}

pub struct BufferEntry<B> {
    pub raw: B,
    pub usage: BufferUsage,
    pub size: u32,
    /// Set on upload; forces a rebind even if the handle is already bound.
    pub dirty: bool,
    /// CPU copy of the contents. Unaligned writes fill their edge words from it.
    pub shadow: Vec<u8>,
}

/// The three resource pools of a device.
pub struct ResourceRegistry<B: GpuBackend> {
    pub textures: Pool<TextureEntry<B::Texture>, GpuTexture>,
    pub shaders: Pool<ShaderEntry<B::Shader>, GpuShader>,
    pub buffers: Pool<BufferEntry<B::Buffer>, GpuBuffer>,
}

impl<B: GpuBackend> ResourceRegistry<B> {
    pub fn new() -> Self {
        Self {
            textures: Pool::new(),
            shaders: Pool::new(),
            buffers: Pool::new(),
        }
    }

    /// Texture actually sampled for `handle`: its resolve texture when it has one.
    pub fn sampled_texture(&self, handle: TextureHandle) -> Option<&TextureEntry<B::Texture>> {
        let entry = self.textures.get(handle)?;
        if entry.resolve.is_null() {
            Some(entry)
        } else {
            self.textures.get(entry.resolve).or(Some(entry))
        }
    }
}

impl<B: GpuBackend> Default for ResourceRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}
