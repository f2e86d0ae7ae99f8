use anyhow::Result;
use glam::UVec2;

use crate::coords::RectI;
use crate::paint::Color;

use super::pipeline::PipelineKey;
use super::types::{
    BufferUsage, IndexFormat, SampleCount, ShaderDef, ShaderStage, TextureFilter, TextureFormat,
    TextureSampler,
};

/// Backend texture creation parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub size: UVec2,
    pub format: TextureFormat,
    pub sample_count: SampleCount,
    pub is_target_attachment: bool,
}

/// Color attachment of a render pass.
pub struct ColorAttachment<'a, B: GpuBackend + ?Sized> {
    pub texture: &'a B::Texture,
    /// Single-sampled texture the pass resolves into.
    pub resolve: Option<&'a B::Texture>,
    /// `Some` clears, `None` loads.
    pub clear: Option<Color>,
}

/// Depth/stencil attachment of a render pass.
pub struct DepthAttachment<'a, B: GpuBackend + ?Sized> {
    pub texture: &'a B::Texture,
    pub clear_depth: Option<f32>,
    pub clear_stencil: Option<u8>,
}

pub struct RenderPassDesc<'a, B: GpuBackend + ?Sized> {
    pub size: UVec2,
    pub colors: Vec<ColorAttachment<'a, B>>,
    pub depth: Option<DepthAttachment<'a, B>>,
}

/// Low-level GPU interface driven by [`Device`](super::Device).
///
/// A backend owns raw API objects and records commands; it does not track
/// handles, cache pipelines or manage staging space. Those policies live in
/// the device so that every backend gets them identically.
///
/// Command recording is split in two streams. Copies go to a transfer stream
/// and render passes to a render stream; [`submit`](Self::submit) executes the
/// transfer stream first.
pub trait GpuBackend {
    type Texture;
    type Buffer;
    type Shader;
    type Pipeline: Clone;
    type Sampler: Clone;
    type TransferBuffer;
    type Fence;

    /// Required alignment of staging offsets and copy sizes, in bytes.
    fn copy_alignment(&self) -> u32 {
        4
    }

    /// Bytes per row the backend expects when copying `width` texels of
    /// `format` from a transfer buffer.
    fn texture_row_pitch(&self, format: TextureFormat, width: u32) -> u32 {
        format.size() * width
    }

    // ── resources ─────────────────────────────────────────────────────────

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Self::Texture>;
    fn destroy_texture(&mut self, texture: Self::Texture);

    /// The allocation may be rounded up to [`copy_alignment`](Self::copy_alignment).
    fn create_buffer(&mut self, usage: BufferUsage, size: u32) -> Result<Self::Buffer>;
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    fn create_shader(&mut self, def: &ShaderDef<'_>) -> Result<Self::Shader>;
    fn destroy_shader(&mut self, shader: Self::Shader);

    fn create_pipeline(&mut self, shader: &Self::Shader, key: &PipelineKey) -> Result<Self::Pipeline>;
    fn destroy_pipeline(&mut self, pipeline: Self::Pipeline);

    fn create_sampler(&mut self, sampler: TextureSampler) -> Result<Self::Sampler>;
    fn destroy_sampler(&mut self, sampler: Self::Sampler);

    fn create_transfer_buffer(&mut self, size: u32) -> Result<Self::TransferBuffer>;
    fn destroy_transfer_buffer(&mut self, buffer: Self::TransferBuffer);

    /// Writes `data` at `offset`. With `cycle` set, the backend first swaps in
    /// a fresh allocation so that copies already recorded keep reading the
    /// previous contents.
    fn write_transfer_buffer(
        &mut self,
        buffer: &mut Self::TransferBuffer,
        offset: u32,
        data: &[u8],
        cycle: bool,
    ) -> Result<()>;

    // ── transfer stream ───────────────────────────────────────────────────

    fn copy_to_buffer(
        &mut self,
        src: &Self::TransferBuffer,
        src_offset: u32,
        dst: &Self::Buffer,
        dst_offset: u32,
        size: u32,
    );

    fn copy_to_texture(
        &mut self,
        src: &Self::TransferBuffer,
        src_offset: u32,
        row_pitch: u32,
        dst: &Self::Texture,
        size: UVec2,
    );

    /// Copies the first `size` bytes of `src` into `dst`.
    fn copy_buffer(&mut self, src: &Self::Buffer, dst: &Self::Buffer, size: u32);

    // ── render stream ─────────────────────────────────────────────────────

    fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_, Self>);
    fn end_render_pass(&mut self);

    fn set_viewport(&mut self, viewport: RectI);
    fn set_scissor(&mut self, scissor: RectI);
    fn bind_pipeline(&mut self, pipeline: &Self::Pipeline);
    fn bind_index_buffer(&mut self, buffer: &Self::Buffer, format: IndexFormat);
    fn bind_vertex_buffers(&mut self, buffers: &[&Self::Buffer]);
    fn bind_samplers(&mut self, stage: ShaderStage, bindings: &[(&Self::Texture, &Self::Sampler)]);
    fn push_uniform_data(&mut self, stage: ShaderStage, slot: u32, data: &[u8]);

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32);
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32);

    // ── presentation & sync ───────────────────────────────────────────────

    /// Copies the top-left `min(source_size, swapchain_size)` region of
    /// `source` into the swapchain image, unscaled.
    ///
    /// Returns the swapchain size, or `None` when no image is available this
    /// frame. Unavailability is not an error.
    fn blit_to_swapchain(
        &mut self,
        source: &Self::Texture,
        source_size: UVec2,
        filter: TextureFilter,
    ) -> Result<Option<UVec2>>;

    /// Ends any open pass, executes the transfer stream then the render
    /// stream, and presents a blitted swapchain image.
    fn submit(&mut self) -> Result<Self::Fence>;

    fn wait_for_fence(&mut self, fence: Self::Fence) -> Result<()>;

    fn wait_idle(&mut self) -> Result<()>;
}
