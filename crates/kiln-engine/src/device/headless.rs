//! CPU-only backend.
//!
//! Nothing is drawn. Resources are plain byte vectors, draw-side calls are
//! recorded as [`RenderCommand`]s and every call bumps a [`HeadlessStats`]
//! counter. Copies are deferred until [`submit`](GpuBackend::submit), like
//! on a real GPU, and read the transfer memory that was current when they
//! were recorded. Writing over staging memory that a pending copy still
//! needs therefore shows up as corrupted contents in
//! [`read_buffer`](HeadlessBackend::read_buffer).

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, bail, ensure};
use glam::UVec2;

use crate::coords::RectI;
use crate::paint::Color;

use super::backend::{GpuBackend, RenderPassDesc, TextureDesc};
use super::pipeline::PipelineKey;
use super::staging::align_up;
use super::types::{
    BufferUsage, IndexFormat, ShaderDef, ShaderStage, TextureFilter, TextureFormat, TextureSampler,
};

type Bytes = Rc<RefCell<Vec<u8>>>;

fn bytes(len: usize) -> Bytes {
    Rc::new(RefCell::new(vec![0; len]))
}

/// Call counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessStats {
    pub textures_created: u32,
    pub textures_destroyed: u32,
    pub buffers_created: u32,
    pub buffers_destroyed: u32,
    pub shaders_created: u32,
    pub shaders_destroyed: u32,
    pub pipelines_created: u32,
    pub pipelines_destroyed: u32,
    pub samplers_created: u32,
    pub samplers_destroyed: u32,
    pub transfer_buffers_created: u32,
    pub transfer_buffers_destroyed: u32,
    /// Transfer writes that asked for a fresh allocation.
    pub staging_cycles: u32,
    pub copies: u32,
    pub submits: u32,
    pub fence_waits: u32,
    pub idle_waits: u32,
    pub passes: u32,
    pub draws: u32,
    pub blits: u32,
}

/// Draw-side call as seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    BeginPass {
        size: UVec2,
        colors: usize,
        depth: bool,
        clear_color: Option<Color>,
        clear_depth: Option<f32>,
        clear_stencil: Option<u8>,
    },
    EndPass,
    SetViewport(RectI),
    SetScissor(RectI),
    BindPipeline(u64),
    BindIndexBuffer { buffer: u64, format: IndexFormat },
    BindVertexBuffers(Vec<u64>),
    BindSamplers { stage: ShaderStage, textures: Vec<u64> },
    PushUniform { stage: ShaderStage, slot: u32, data: Vec<u8> },
    DrawIndexed { index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32 },
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32 },
    Blit { source: u64, size: UVec2 },
}

pub struct HeadlessTexture {
    pub id: u64,
    pub desc: TextureDesc,
    data: Bytes,
}

pub struct HeadlessBuffer {
    pub id: u64,
    pub usage: BufferUsage,
    data: Bytes,
}

pub struct HeadlessShader {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct HeadlessPipeline {
    pub id: u64,
    pub key: PipelineKey,
}

#[derive(Debug, Clone)]
pub struct HeadlessSampler {
    pub id: u64,
    pub sampler: TextureSampler,
}

pub struct HeadlessTransferBuffer {
    size: u32,
    data: Bytes,
}

#[derive(Debug)]
pub struct HeadlessFence(u64);

enum PendingCopy {
    ToBuffer {
        src: Bytes,
        src_offset: u32,
        dst: Bytes,
        dst_offset: u32,
        size: u32,
    },
    ToTexture {
        src: Bytes,
        src_offset: u32,
        row_pitch: u32,
        dst: Bytes,
        row: u32,
        rows: u32,
    },
    Buffer {
        src: Bytes,
        dst: Bytes,
        size: u32,
    },
}

impl PendingCopy {
    fn execute(self) {
        match self {
            PendingCopy::ToBuffer { src, src_offset, dst, dst_offset, size } => {
                let src = src.borrow();
                let mut dst = dst.borrow_mut();
                let (s, d, n) = (src_offset as usize, dst_offset as usize, size as usize);
                if dst.len() < d + n {
                    dst.resize(d + n, 0);
                }
                dst[d..d + n].copy_from_slice(&src[s..s + n]);
            }
            PendingCopy::ToTexture { src, src_offset, row_pitch, dst, row, rows } => {
                let src = src.borrow();
                let mut dst = dst.borrow_mut();
                for y in 0..rows as usize {
                    let s = src_offset as usize + y * row_pitch as usize;
                    let d = y * row as usize;
                    dst[d..d + row as usize].copy_from_slice(&src[s..s + row as usize]);
                }
            }
            PendingCopy::Buffer { src, dst, size } => {
                let n = size as usize;
                let src = src.borrow();
                let mut dst = dst.borrow_mut();
                if dst.len() < n {
                    dst.resize(n, 0);
                }
                dst[..n].copy_from_slice(&src[..n]);
            }
        }
    }
}

/// [`GpuBackend`] that runs on the CPU. Used by tests and tools.
pub struct HeadlessBackend {
    stats: HeadlessStats,
    next_id: u64,
    submitted: u64,
    pending: Vec<PendingCopy>,
    commands: Vec<RenderCommand>,
    in_pass: bool,
    swapchain: Option<UVec2>,
    fail_pipelines: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            stats: HeadlessStats::default(),
            next_id: 1,
            submitted: 0,
            pending: Vec::new(),
            commands: Vec::new(),
            in_pass: false,
            swapchain: Some(UVec2::new(1280, 720)),
            fail_pipelines: false,
        }
    }

    #[inline]
    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    /// Recorded draw-side calls since the last [`take_commands`](Self::take_commands).
    #[inline]
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Size reported for the swapchain; `None` simulates a minimized window.
    pub fn set_swapchain_size(&mut self, size: Option<UVec2>) {
        self.swapchain = size;
    }

    /// Makes every subsequent pipeline creation fail.
    pub fn fail_pipeline_creation(&mut self, fail: bool) {
        self.fail_pipelines = fail;
    }

    /// Contents of `buffer` as of the last submit.
    pub fn read_buffer(&self, buffer: &HeadlessBuffer) -> Vec<u8> {
        buffer.data.borrow().clone()
    }

    /// Tightly packed texels of `texture` as of the last submit.
    pub fn read_texture(&self, texture: &HeadlessTexture) -> Vec<u8> {
        texture.data.borrow().clone()
    }

    fn id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for HeadlessBackend {
    type Texture = HeadlessTexture;
    type Buffer = HeadlessBuffer;
    type Shader = HeadlessShader;
    type Pipeline = HeadlessPipeline;
    type Sampler = HeadlessSampler;
    type TransferBuffer = HeadlessTransferBuffer;
    type Fence = HeadlessFence;

    // ── resources ─────────────────────────────────────────────────────────

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Self::Texture> {
        self.stats.textures_created += 1;
        let len = desc.size.x as usize * desc.size.y as usize * desc.format.size() as usize;
        Ok(HeadlessTexture {
            id: self.id(),
            desc: *desc,
            data: bytes(len),
        })
    }

    fn destroy_texture(&mut self, _texture: Self::Texture) {
        self.stats.textures_destroyed += 1;
    }

    fn create_buffer(&mut self, usage: BufferUsage, size: u32) -> Result<Self::Buffer> {
        self.stats.buffers_created += 1;
        Ok(HeadlessBuffer {
            id: self.id(),
            usage,
            data: bytes(align_up(size, self.copy_alignment()) as usize),
        })
    }

    fn destroy_buffer(&mut self, _buffer: Self::Buffer) {
        self.stats.buffers_destroyed += 1;
    }

    fn create_shader(&mut self, def: &ShaderDef<'_>) -> Result<Self::Shader> {
        self.stats.shaders_created += 1;
        Ok(HeadlessShader {
            id: self.id(),
            name: def.name.to_owned(),
        })
    }

    fn destroy_shader(&mut self, _shader: Self::Shader) {
        self.stats.shaders_destroyed += 1;
    }

    fn create_pipeline(&mut self, shader: &Self::Shader, key: &PipelineKey) -> Result<Self::Pipeline> {
        if self.fail_pipelines {
            bail!("pipeline creation disabled for shader '{}'", shader.name);
        }
        self.stats.pipelines_created += 1;
        Ok(HeadlessPipeline {
            id: self.id(),
            key: key.clone(),
        })
    }

    fn destroy_pipeline(&mut self, _pipeline: Self::Pipeline) {
        self.stats.pipelines_destroyed += 1;
    }

    fn create_sampler(&mut self, sampler: TextureSampler) -> Result<Self::Sampler> {
        self.stats.samplers_created += 1;
        Ok(HeadlessSampler { id: self.id(), sampler })
    }

    fn destroy_sampler(&mut self, _sampler: Self::Sampler) {
        self.stats.samplers_destroyed += 1;
    }

    fn create_transfer_buffer(&mut self, size: u32) -> Result<Self::TransferBuffer> {
        self.stats.transfer_buffers_created += 1;
        Ok(HeadlessTransferBuffer { size, data: bytes(0) })
    }

    fn destroy_transfer_buffer(&mut self, _buffer: Self::TransferBuffer) {
        self.stats.transfer_buffers_destroyed += 1;
    }

    fn write_transfer_buffer(
        &mut self,
        buffer: &mut Self::TransferBuffer,
        offset: u32,
        data: &[u8],
        cycle: bool,
    ) -> Result<()> {
        let end = offset as usize + data.len();
        ensure!(
            end <= buffer.size as usize,
            "transfer write of {} bytes at {offset} overflows a {} byte buffer",
            data.len(),
            buffer.size
        );

        if cycle {
            self.stats.staging_cycles += 1;
            buffer.data = bytes(0);
        }

        let mut contents = buffer.data.borrow_mut();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    // ── transfer stream ───────────────────────────────────────────────────

    fn copy_to_buffer(
        &mut self,
        src: &Self::TransferBuffer,
        src_offset: u32,
        dst: &Self::Buffer,
        dst_offset: u32,
        size: u32,
    ) {
        self.stats.copies += 1;
        self.pending.push(PendingCopy::ToBuffer {
            src: src.data.clone(),
            src_offset,
            dst: dst.data.clone(),
            dst_offset,
            size,
        });
    }

    fn copy_to_texture(
        &mut self,
        src: &Self::TransferBuffer,
        src_offset: u32,
        row_pitch: u32,
        dst: &Self::Texture,
        size: UVec2,
    ) {
        self.stats.copies += 1;
        self.pending.push(PendingCopy::ToTexture {
            src: src.data.clone(),
            src_offset,
            row_pitch,
            dst: dst.data.clone(),
            row: size.x * dst.desc.format.size(),
            rows: size.y,
        });
    }

    fn copy_buffer(&mut self, src: &Self::Buffer, dst: &Self::Buffer, size: u32) {
        self.stats.copies += 1;
        self.pending.push(PendingCopy::Buffer {
            src: src.data.clone(),
            dst: dst.data.clone(),
            size,
        });
    }

    // ── render stream ─────────────────────────────────────────────────────

    fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_, Self>) {
        debug_assert!(!self.in_pass, "render pass already open");
        self.in_pass = true;
        self.stats.passes += 1;
        self.commands.push(RenderCommand::BeginPass {
            size: desc.size,
            colors: desc.colors.len(),
            depth: desc.depth.is_some(),
            clear_color: desc.colors.first().and_then(|c| c.clear),
            clear_depth: desc.depth.as_ref().and_then(|d| d.clear_depth),
            clear_stencil: desc.depth.as_ref().and_then(|d| d.clear_stencil),
        });
    }

    fn end_render_pass(&mut self) {
        self.in_pass = false;
        self.commands.push(RenderCommand::EndPass);
    }

    fn set_viewport(&mut self, viewport: RectI) {
        self.commands.push(RenderCommand::SetViewport(viewport));
    }

    fn set_scissor(&mut self, scissor: RectI) {
        self.commands.push(RenderCommand::SetScissor(scissor));
    }

    fn bind_pipeline(&mut self, pipeline: &Self::Pipeline) {
        self.commands.push(RenderCommand::BindPipeline(pipeline.id));
    }

    fn bind_index_buffer(&mut self, buffer: &Self::Buffer, format: IndexFormat) {
        self.commands.push(RenderCommand::BindIndexBuffer { buffer: buffer.id, format });
    }

    fn bind_vertex_buffers(&mut self, buffers: &[&Self::Buffer]) {
        self.commands
            .push(RenderCommand::BindVertexBuffers(buffers.iter().map(|b| b.id).collect()));
    }

    fn bind_samplers(&mut self, stage: ShaderStage, bindings: &[(&Self::Texture, &Self::Sampler)]) {
        self.commands.push(RenderCommand::BindSamplers {
            stage,
            textures: bindings.iter().map(|(t, _)| t.id).collect(),
        });
    }

    fn push_uniform_data(&mut self, stage: ShaderStage, slot: u32, data: &[u8]) {
        self.commands.push(RenderCommand::PushUniform {
            stage,
            slot,
            data: data.to_vec(),
        });
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32) {
        debug_assert!(self.in_pass, "draw outside a render pass");
        self.stats.draws += 1;
        self.commands.push(RenderCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            base_vertex,
        });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32) {
        debug_assert!(self.in_pass, "draw outside a render pass");
        self.stats.draws += 1;
        self.commands.push(RenderCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
        });
    }

    // ── presentation & sync ───────────────────────────────────────────────

    fn blit_to_swapchain(
        &mut self,
        source: &Self::Texture,
        source_size: UVec2,
        _filter: TextureFilter,
    ) -> Result<Option<UVec2>> {
        let Some(swapchain) = self.swapchain else {
            return Ok(None);
        };
        self.stats.blits += 1;
        self.commands.push(RenderCommand::Blit {
            source: source.id,
            size: source_size.min(swapchain),
        });
        Ok(Some(swapchain))
    }

    fn submit(&mut self) -> Result<Self::Fence> {
        if self.in_pass {
            self.end_render_pass();
        }
        for copy in self.pending.drain(..) {
            copy.execute();
        }
        self.stats.submits += 1;
        self.submitted += 1;
        Ok(HeadlessFence(self.submitted))
    }

    fn wait_for_fence(&mut self, fence: Self::Fence) -> Result<()> {
        ensure!(fence.0 <= self.submitted, "fence {} was never submitted", fence.0);
        self.stats.fence_waits += 1;
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.stats.idle_waits += 1;
        Ok(())
    }
}

impl HeadlessTexture {
    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }
}
