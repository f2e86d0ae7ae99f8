use std::borrow::Cow;
use std::collections::HashMap;

use anyhow::{Context, Result, bail, ensure};
use glam::UVec2;

use crate::coords::RectI;
use crate::render::{DrawCommand, MaterialStage, Target};

use super::backend::{ColorAttachment, DepthAttachment, GpuBackend, RenderPassDesc, TextureDesc};
use super::config::DeviceConfig;
use super::pipeline::{AttachmentInfo, Lookup, PipelineCache, PipelineKey, VertexLayout};
use super::registry::{
    BufferEntry, BufferHandle, ResourceRegistry, ShaderEntry, ShaderHandle, ShaderLayout,
    TextureEntry, TextureHandle,
};
use super::render_device::{RenderDevice, TextureInfo};
use super::staging::{Reserve, StagingRing, StagingSlot, align_up};
use super::types::{
    BufferDef, ClearInfo, IndexFormat, SampleCount, ShaderDef, ShaderStage, TextureDef,
    TextureFormat, TextureSampler,
};

/// One staging ring and the transfer buffer backing it.
struct Staging<T> {
    ring: StagingRing,
    buffer: Option<T>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum StagingKind {
    Buffer,
    Texture,
}

/// Where staged bytes ended up.
enum Staged<T> {
    Ring { offset: u32 },
    Temporary(T),
}

/// Bindings of the render pass currently being recorded.
#[derive(Default)]
struct PassState {
    active: bool,
    /// First attachment of the pass target.
    target: TextureHandle,
    size: UVec2,
    pipeline: Option<u64>,
    viewport: Option<RectI>,
    scissor: Option<RectI>,
    index_buffer: BufferHandle,
    vertex_buffers: Vec<BufferHandle>,
    /// Texture and sampler bound per slot, vertex stage first.
    samplers: [Vec<(TextureHandle, TextureSampler)>; 2],
}

/// [`RenderDevice`] over any [`GpuBackend`].
///
/// Owns the resource pools, the pipeline and sampler caches, the staging
/// rings, frame fences and the framebuffer. Dropping the device waits for
/// the GPU and releases everything it still owns.
pub struct Device<B: GpuBackend> {
    backend: B,
    config: DeviceConfig,
    resources: ResourceRegistry<B>,
    pipelines: PipelineCache<B::Pipeline>,
    samplers: HashMap<TextureSampler, B::Sampler>,
    buffer_staging: Staging<B::TransferBuffer>,
    texture_staging: Staging<B::TransferBuffer>,
    pass: PassState,
    frame: usize,
    fences: Vec<Option<B::Fence>>,
    framebuffer: Target,
    default_texture: TextureHandle,
}

impl<B: GpuBackend> Device<B> {
    /// Creates the staging buffers, the default texture and a framebuffer of
    /// `framebuffer_size` (clamped to at least 1×1).
    pub fn new(mut backend: B, config: DeviceConfig, framebuffer_size: UVec2) -> Result<Self> {
        let buffer_staging = backend
            .create_transfer_buffer(config.staging_buffer_size)
            .context("failed to create buffer staging memory")?;
        let texture_staging = backend
            .create_transfer_buffer(config.staging_buffer_size)
            .context("failed to create texture staging memory")?;

        let frames = config.frames_in_flight.max(1);

        let mut device = Self {
            backend,
            config,
            resources: ResourceRegistry::new(),
            pipelines: PipelineCache::new(),
            samplers: HashMap::new(),
            buffer_staging: Staging {
                ring: StagingRing::new(config.staging_buffer_size, config.max_staging_cycles),
                buffer: Some(buffer_staging),
            },
            texture_staging: Staging {
                ring: StagingRing::new(config.staging_buffer_size, config.max_staging_cycles),
                buffer: Some(texture_staging),
            },
            pass: PassState::default(),
            frame: 0,
            fences: (0..frames).map(|_| None).collect(),
            framebuffer: Target::from_parts(UVec2::ZERO, Vec::new()),
            default_texture: TextureHandle::NULL,
        };

        device.default_texture = device
            .create_texture(&TextureDef {
                size: UVec2::ONE,
                data: &[0xff; 4],
                ..TextureDef::default()
            })
            .context("failed to create default texture")?;

        let size = framebuffer_size.max(UVec2::ONE);
        let attachments = device.create_framebuffer_attachments(size)?;
        device.framebuffer = Target::from_parts(size, attachments);

        log::info!(
            "render device ready: framebuffer {}x{}, {} frames in flight, {} KiB staging",
            size.x,
            size.y,
            frames,
            config.staging_buffer_size / 1024
        );

        Ok(device)
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Index of the frame-in-flight slot being recorded.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame
    }

    #[inline]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Byte size the device tracks for `buffer`.
    pub fn buffer_size(&self, buffer: BufferHandle) -> Option<u32> {
        self.resources.buffers.get(buffer).map(|b| b.size)
    }

    /// Single-sampled companion of a multisampled attachment.
    pub fn resolve_texture(&self, texture: TextureHandle) -> Option<TextureHandle> {
        self.resources
            .textures
            .get(texture)
            .map(|t| t.resolve)
            .filter(|r| !r.is_null())
    }

    /// Raw backend texture for `texture`.
    pub fn raw_texture(&self, texture: TextureHandle) -> Option<&B::Texture> {
        self.resources.textures.get(texture).map(|t| &t.raw)
    }

    /// Raw backend buffer for `buffer`.
    pub fn raw_buffer(&self, buffer: BufferHandle) -> Option<&B::Buffer> {
        self.resources.buffers.get(buffer).map(|b| &b.raw)
    }

    /// Resolves the pipeline object `command` would draw with, building and
    /// caching it on a miss.
    pub fn pipeline(&mut self, command: &DrawCommand<'_>) -> Result<B::Pipeline> {
        self.get_pipeline(command).map(|(_, p)| p)
    }

    // ── pipelines ─────────────────────────────────────────────────────────

    fn pipeline_key(&self, cmd: &DrawCommand<'_>) -> PipelineKey {
        let target = cmd.target.unwrap_or(&self.framebuffer);
        let targets = target
            .attachments()
            .iter()
            .filter_map(|h| self.resources.textures.get(*h))
            .map(|t| AttachmentInfo {
                format: t.format.canonical(),
                sample_count: t.sample_count,
            })
            .collect();

        PipelineKey {
            shader: cmd.material.shader,
            cull_mode: cmd.cull_mode,
            depth_compare: cmd.depth_compare,
            depth_test: cmd.depth_test_enabled,
            depth_write: cmd.depth_write_enabled,
            blend: cmd.blend_mode,
            index_size: (!cmd.index_buffer.is_null()).then_some(cmd.index_size),
            vertex_layouts: cmd
                .vertex_buffers
                .iter()
                .map(|b| VertexLayout {
                    format: b.format.clone(),
                    instanced: b.instanced,
                })
                .collect(),
            targets,
        }
    }

    fn get_pipeline(&mut self, cmd: &DrawCommand<'_>) -> Result<(u64, B::Pipeline)> {
        let key = self.pipeline_key(cmd);
        let hash = key.hash64();

        match self.pipelines.lookup(hash, &key) {
            Lookup::Hit(pipeline) => return Ok((hash, pipeline)),
            Lookup::Miss => {}
            Lookup::Collision { previous } => {
                log::warn!(
                    "pipeline hash {hash:#018x} collides with a different state (shader {previous:?}); rebuilding"
                );
                if let Some(old) = self.pipelines.remove(hash) {
                    self.backend.destroy_pipeline(old);
                }
                if let Some(shader) = self.resources.shaders.get_mut(previous) {
                    shader.pso_hashes.retain(|h| *h != hash);
                }
                if self.pass.pipeline == Some(hash) {
                    self.pass.pipeline = None;
                }
            }
        }

        let shader = self
            .resources
            .shaders
            .get_mut(key.shader)
            .with_context(|| format!("draw uses shader {:?}, which is not alive", key.shader))?;

        let pipeline = self
            .backend
            .create_pipeline(&shader.raw, &key)
            .with_context(|| format!("failed to create pipeline for shader {:?}", key.shader))?;

        shader.pso_hashes.push(hash);
        log::trace!("pipeline cache miss {hash:#018x}: built for shader {:?}", key.shader);

        self.pipelines.insert(hash, key, pipeline.clone());
        Ok((hash, pipeline))
    }

    fn ensure_sampler(&mut self, sampler: TextureSampler) -> Result<()> {
        if !self.samplers.contains_key(&sampler) {
            let raw = self
                .backend
                .create_sampler(sampler)
                .with_context(|| format!("failed to create sampler {sampler:?}"))?;
            self.samplers.insert(sampler, raw);
        }
        Ok(())
    }

    // ── staging ───────────────────────────────────────────────────────────

    /// Copies `data` (already padded to the copy alignment) into staging memory.
    fn stage(&mut self, kind: StagingKind, data: &[u8], alignment: u32) -> Result<Staged<B::TransferBuffer>> {
        let size = data.len() as u32;

        let ring = match kind {
            StagingKind::Buffer => &mut self.buffer_staging.ring,
            StagingKind::Texture => &mut self.texture_staging.ring,
        };
        let cycles_before = ring.cycles();

        let slot = match ring.reserve(size, alignment) {
            Reserve::Ready(slot) => slot,
            Reserve::Stall => {
                log::debug!(
                    "{kind:?} staging used {} cycles this frame; stalling for the GPU",
                    cycles_before
                );
                self.flush_and_stall()?;
                let ring = match kind {
                    StagingKind::Buffer => &mut self.buffer_staging.ring,
                    StagingKind::Texture => &mut self.texture_staging.ring,
                };
                match ring.reserve(size, alignment) {
                    Reserve::Ready(slot) => slot,
                    Reserve::Stall => bail!("{kind:?} staging refused {size} bytes after a stall"),
                }
            }
        };

        match slot {
            StagingSlot::Temporary => {
                log::debug!("{kind:?} upload of {size} bytes exceeds staging; using a temporary buffer");
                let mut temp = self
                    .backend
                    .create_transfer_buffer(size)
                    .context("failed to create temporary transfer buffer")?;
                self.backend
                    .write_transfer_buffer(&mut temp, 0, data, false)
                    .context("failed to write temporary transfer buffer")?;
                Ok(Staged::Temporary(temp))
            }
            StagingSlot::Ring { offset, cycle } => {
                let staging = match kind {
                    StagingKind::Buffer => &mut self.buffer_staging,
                    StagingKind::Texture => &mut self.texture_staging,
                };
                if staging.ring.cycles() > cycles_before {
                    log::debug!("{kind:?} staging cycled ({}/{})", staging.ring.cycles(), self.config.max_staging_cycles);
                }

                let buffer = staging.buffer.as_mut().context("staging memory already released")?;
                self.backend
                    .write_transfer_buffer(buffer, offset, data, cycle)
                    .context("failed to write staging memory")?;
                Ok(Staged::Ring { offset })
            }
        }
    }

    /// Submits everything recorded so far and blocks until the GPU is done.
    fn flush_and_stall(&mut self) -> Result<()> {
        self.end_pass();
        let fence = self.backend.submit().context("failed to flush commands")?;
        self.backend.wait_for_fence(fence).context("failed to wait for flushed commands")?;
        self.buffer_staging.ring.reset();
        self.texture_staging.ring.reset();
        Ok(())
    }

    fn grow_buffer(&mut self, handle: BufferHandle, required: u32) -> Result<()> {
        let align = self.backend.copy_alignment();
        let Some(entry) = self.resources.buffers.get_mut(handle) else {
            return Ok(());
        };

        let grown = self
            .backend
            .create_buffer(entry.usage, required)
            .with_context(|| format!("failed to grow buffer {handle:?} to {required} bytes"))?;

        log::trace!("resizing buffer {handle:?} from {} to {required} bytes", entry.size);

        self.backend.copy_buffer(&entry.raw, &grown, align_up(entry.size, align));
        let old = std::mem::replace(&mut entry.raw, grown);
        self.backend.destroy_buffer(old);
        entry.size = required;
        entry.shadow.resize(required as usize, 0);
        Ok(())
    }

    // ── render passes ─────────────────────────────────────────────────────

    fn begin_pass(&mut self, target: Option<&Target>, clear: Option<&ClearInfo>) -> Result<()> {
        let (size, attachments) = match target {
            Some(t) => (t.size(), t.attachments()),
            None => (self.framebuffer.size(), self.framebuffer.attachments()),
        };
        let key = attachments.first().copied().unwrap_or_default();

        if self.pass.active && self.pass.target == key && clear.is_none() {
            return Ok(());
        }

        let attachments = attachments.to_vec();
        self.end_pass();

        let Self { backend, resources, pass, .. } = self;

        let mut colors = Vec::with_capacity(attachments.len());
        let mut depth = None;

        for handle in &attachments {
            let entry = resources
                .textures
                .get(*handle)
                .with_context(|| format!("render target attachment {handle:?} is not alive"))?;

            if entry.format.is_depth() {
                depth = Some(DepthAttachment {
                    texture: &entry.raw,
                    clear_depth: clear.filter(|c| c.clears_depth()).map(|c| c.depth),
                    clear_stencil: clear.filter(|c| c.clears_stencil()).map(|c| c.stencil),
                });
            } else {
                colors.push(ColorAttachment {
                    texture: &entry.raw,
                    resolve: resources.textures.get(entry.resolve).map(|r| &r.raw),
                    clear: clear.filter(|c| c.clears_color()).map(|c| c.color),
                });
            }
        }

        backend.begin_render_pass(&RenderPassDesc { size, colors, depth });

        *pass = PassState {
            active: true,
            target: key,
            size,
            ..PassState::default()
        };
        Ok(())
    }

    fn end_pass(&mut self) {
        if self.pass.active {
            self.backend.end_render_pass();
        }
        self.pass = PassState::default();
    }

    fn bind_samplers(&mut self, stage: ShaderStage, bindings: &MaterialStage, count: u32) -> Result<()> {
        let count = (count as usize).min(MaterialStage::MAX_SAMPLERS);
        if count == 0 {
            return Ok(());
        }

        let bound = &bindings.samplers[..count];
        for b in bound {
            self.ensure_sampler(b.sampler)?;
        }

        let default = self.default_texture;
        let Self { backend, resources, samplers, pass, .. } = self;

        let resolved: Vec<(TextureHandle, TextureSampler)> = bound
            .iter()
            .map(|b| {
                let texture = if resources.textures.contains(b.texture) { b.texture } else { default };
                (texture, b.sampler)
            })
            .collect();

        let current = match stage {
            ShaderStage::Vertex => &mut pass.samplers[0],
            ShaderStage::Fragment => &mut pass.samplers[1],
        };
        if *current == resolved {
            return Ok(());
        }

        let raw: Vec<(&B::Texture, &B::Sampler)> = resolved
            .iter()
            .filter_map(|(texture, sampler)| {
                Some((&resources.sampled_texture(*texture)?.raw, samplers.get(sampler)?))
            })
            .collect();

        backend.bind_samplers(stage, &raw);
        *current = resolved;
        Ok(())
    }

    // ── framebuffer ───────────────────────────────────────────────────────

    fn framebuffer_formats(&self) -> Vec<TextureFormat> {
        let mut formats = vec![self.config.framebuffer_format];
        if self.config.framebuffer_depth {
            formats.push(TextureFormat::Depth24Stencil8);
        }
        formats
    }

    fn create_framebuffer_attachments(&mut self, size: UVec2) -> Result<Vec<TextureHandle>> {
        let mut attachments = Vec::new();
        for format in self.framebuffer_formats() {
            let created = self.create_texture(&TextureDef {
                size,
                format,
                is_target_attachment: true,
                ..TextureDef::default()
            });

            match created {
                Ok(handle) => attachments.push(handle),
                Err(e) => {
                    for handle in attachments {
                        self.dispose_texture(handle);
                    }
                    return Err(e.context("failed to create framebuffer"));
                }
            }
        }
        Ok(attachments)
    }

    fn resize_framebuffer(&mut self, size: UVec2) -> Result<()> {
        let attachments = self.create_framebuffer_attachments(size)?;
        let old = std::mem::replace(&mut self.framebuffer, Target::from_parts(size, attachments));

        if size.x > old.size().x || size.y > old.size().y {
            log::trace!("framebuffer grown to {}x{}", size.x, size.y);
        } else {
            log::trace!("framebuffer shrunk to {}x{}", size.x, size.y);
        }

        for handle in old.attachments() {
            self.dispose_texture(*handle);
        }
        Ok(())
    }
}

/// Framebuffer size to switch to after presenting into a swapchain of
/// `swapchain` pixels, if any.
///
/// Grows past the swapchain by `grow_margin` as soon as it is too small in
/// either dimension; shrinks to the swapchain only once it is larger by more
/// than `shrink_threshold`.
pub fn framebuffer_resize(current: UVec2, swapchain: UVec2, grow_margin: u32, shrink_threshold: u32) -> Option<UVec2> {
    if swapchain.x == 0 || swapchain.y == 0 {
        return None;
    }

    if current.x < swapchain.x || current.y < swapchain.y {
        Some(swapchain + UVec2::splat(grow_margin))
    } else if current.x > swapchain.x + shrink_threshold || current.y > swapchain.y + shrink_threshold {
        Some(swapchain)
    } else {
        None
    }
}

impl<B: GpuBackend> RenderDevice for Device<B> {
    fn create_texture(&mut self, def: &TextureDef<'_>) -> Result<TextureHandle> {
        ensure!(
            def.size.x > 0 && def.size.y > 0,
            "texture size must be non-zero, got {}x{}",
            def.size.x,
            def.size.y
        );

        let raw = self
            .backend
            .create_texture(&TextureDesc {
                size: def.size,
                format: def.format,
                sample_count: def.sample_count,
                is_target_attachment: def.is_target_attachment,
            })
            .with_context(|| {
                format!("failed to create {}x{} {:?} texture", def.size.x, def.size.y, def.format)
            })?;

        let handle = self.resources.textures.insert(TextureEntry {
            raw,
            format: def.format,
            size: def.size,
            sample_count: def.sample_count,
            is_target_attachment: def.is_target_attachment,
            resolve: TextureHandle::NULL,
        });

        log::trace!(
            "created texture {handle:?}: {}x{} {:?} x{}",
            def.size.x,
            def.size.y,
            def.format,
            def.sample_count.count()
        );

        if def.sample_count != SampleCount::One && def.is_target_attachment && !def.format.is_depth() {
            let resolve = self.create_texture(&TextureDef {
                sample_count: SampleCount::One,
                data: &[],
                ..*def
            });

            match resolve {
                Ok(resolve) => {
                    if let Some(entry) = self.resources.textures.get_mut(handle) {
                        entry.resolve = resolve;
                    }
                }
                Err(e) => {
                    self.dispose_texture(handle);
                    return Err(e.context("failed to create MSAA resolve texture"));
                }
            }
        }

        if !def.data.is_empty() {
            if let Err(e) = self.set_texture_data(handle, def.data) {
                self.dispose_texture(handle);
                return Err(e);
            }
        }

        Ok(handle)
    }

    fn set_texture_data(&mut self, texture: TextureHandle, data: &[u8]) -> Result<()> {
        let entry = self
            .resources
            .textures
            .get(texture)
            .with_context(|| format!("texture {texture:?} is not alive"))?;

        let (size, format) = (entry.size, entry.format);
        ensure!(
            entry.sample_count == SampleCount::One,
            "cannot upload pixels into multisampled texture {texture:?}"
        );

        let row = size.x * format.size();
        let expected = row as usize * size.y as usize;
        ensure!(
            data.len() == expected,
            "texture {texture:?} expects {expected} bytes ({}x{} {:?}), got {}",
            size.x,
            size.y,
            format,
            data.len()
        );

        let align = self.backend.copy_alignment();
        let pitch = self.backend.texture_row_pitch(format, size.x);

        let bytes: Cow<'_, [u8]> = if pitch == row {
            Cow::Borrowed(data)
        } else {
            let mut padded = vec![0u8; pitch as usize * size.y as usize];
            for (dst, src) in padded.chunks_exact_mut(pitch as usize).zip(data.chunks_exact(row as usize)) {
                dst[..row as usize].copy_from_slice(src);
            }
            Cow::Owned(padded)
        };
        let bytes = pad_to(bytes, align);

        let staged = self.stage(StagingKind::Texture, &bytes, format.size().max(align))?;

        let entry = self
            .resources
            .textures
            .get(texture)
            .with_context(|| format!("texture {texture:?} is not alive"))?;

        match &staged {
            Staged::Ring { offset } => {
                let src = match &self.texture_staging.buffer {
                    Some(b) => b,
                    None => bail!("staging memory already released"),
                };
                self.backend.copy_to_texture(src, *offset, pitch, &entry.raw, size);
            }
            Staged::Temporary(temp) => {
                self.backend.copy_to_texture(temp, 0, pitch, &entry.raw, size);
            }
        }

        if let Staged::Temporary(temp) = staged {
            self.backend.destroy_transfer_buffer(temp);
        }
        Ok(())
    }

    fn dispose_texture(&mut self, texture: TextureHandle) {
        if let Some(entry) = self.resources.textures.remove(texture) {
            log::trace!("destroying texture {texture:?}");
            self.backend.destroy_texture(entry.raw);
            if !entry.resolve.is_null() {
                self.dispose_texture(entry.resolve);
            }
        }
    }

    fn texture_info(&self, texture: TextureHandle) -> Option<TextureInfo> {
        self.resources.textures.get(texture).map(|t| TextureInfo {
            size: t.size,
            format: t.format,
            sample_count: t.sample_count,
            is_target_attachment: t.is_target_attachment,
        })
    }

    #[inline]
    fn default_texture(&self) -> TextureHandle {
        self.default_texture
    }

    fn create_shader(&mut self, def: &ShaderDef<'_>) -> Result<ShaderHandle> {
        let raw = self
            .backend
            .create_shader(def)
            .with_context(|| format!("failed to compile shader '{}'", def.name))?;

        let handle = self.resources.shaders.insert(ShaderEntry {
            raw,
            layout: ShaderLayout {
                vertex_samplers: def.vertex.num_samplers,
                fragment_samplers: def.fragment.num_samplers,
                vertex_uniforms: def.vertex.num_uniform_buffers,
                fragment_uniforms: def.fragment.num_uniform_buffers,
            },
            pso_hashes: Vec::new(),
        });

        log::trace!("created shader '{}' {handle:?}", def.name);
        Ok(handle)
    }

    fn dispose_shader(&mut self, shader: ShaderHandle) {
        let Some(entry) = self.resources.shaders.remove(shader) else {
            return;
        };

        for hash in &entry.pso_hashes {
            if let Some(pipeline) = self.pipelines.remove(*hash) {
                self.backend.destroy_pipeline(pipeline);
            }
            if self.pass.pipeline == Some(*hash) {
                self.pass.pipeline = None;
            }
        }

        log::trace!("destroying shader {shader:?} and {} pipelines", entry.pso_hashes.len());
        self.backend.destroy_shader(entry.raw);
    }

    fn create_buffer(&mut self, def: &BufferDef<'_>) -> Result<BufferHandle> {
        if def.size == 0 && def.data.is_empty() {
            log::warn!("ignoring request for a zero-sized {:?} buffer", def.usage);
            return Ok(BufferHandle::NULL);
        }

        let size = def.size.max(def.data.len() as u32);
        let raw = self
            .backend
            .create_buffer(def.usage, size)
            .with_context(|| format!("failed to create {size} byte {:?} buffer", def.usage))?;

        let handle = self.resources.buffers.insert(BufferEntry {
            raw,
            usage: def.usage,
            size,
            dirty: false,
            shadow: vec![0; size as usize],
        });

        log::trace!("created {:?} buffer {handle:?}: {size} bytes", def.usage);

        if !def.data.is_empty() {
            if let Err(e) = self.set_buffer_data(handle, def.data, 0) {
                self.dispose_buffer(handle);
                return Err(e);
            }
        }

        Ok(handle)
    }

    fn set_buffer_data(&mut self, buffer: BufferHandle, data: &[u8], offset: u32) -> Result<()> {
        let Some(entry) = self.resources.buffers.get(buffer) else {
            return Ok(());
        };
        if data.is_empty() {
            return Ok(());
        }

        let align = self.backend.copy_alignment();
        let required = u32::try_from(data.len())
            .ok()
            .and_then(|len| offset.checked_add(len))
            .with_context(|| format!("buffer write of {} bytes at {offset} overflows", data.len()))?;
        if required > entry.size {
            self.grow_buffer(buffer, required)?;
        }

        let entry = self
            .resources
            .buffers
            .get_mut(buffer)
            .with_context(|| format!("buffer {buffer:?} is not alive"))?;
        entry.shadow[offset as usize..required as usize].copy_from_slice(data);

        // Copies move whole words; partial edge words keep their current bytes.
        let start = offset - offset % align;
        let end = align_up(required, align);
        let window: Cow<'_, [u8]> = if start == offset && end == required {
            Cow::Borrowed(data)
        } else {
            let mut bytes = entry.shadow[start as usize..(end as usize).min(entry.shadow.len())].to_vec();
            bytes.resize((end - start) as usize, 0);
            Cow::Owned(bytes)
        };

        let staged = self.stage(StagingKind::Buffer, &window, align)?;
        let len = window.len() as u32;

        let entry = self
            .resources
            .buffers
            .get(buffer)
            .with_context(|| format!("buffer {buffer:?} is not alive"))?;

        match &staged {
            Staged::Ring { offset: src } => {
                let staging = match &self.buffer_staging.buffer {
                    Some(b) => b,
                    None => bail!("staging memory already released"),
                };
                self.backend.copy_to_buffer(staging, *src, &entry.raw, start, len);
            }
            Staged::Temporary(temp) => {
                self.backend.copy_to_buffer(temp, 0, &entry.raw, start, len);
            }
        }

        if let Staged::Temporary(temp) = staged {
            self.backend.destroy_transfer_buffer(temp);
        }

        if let Some(entry) = self.resources.buffers.get_mut(buffer) {
            entry.dirty = true;
        }
        Ok(())
    }

    fn dispose_buffer(&mut self, buffer: BufferHandle) {
        if let Some(entry) = self.resources.buffers.remove(buffer) {
            log::trace!("destroying buffer {buffer:?}");
            self.backend.destroy_buffer(entry.raw);
        }
    }

    fn clear(&mut self, target: Option<&Target>, info: ClearInfo) -> Result<()> {
        if info.mask.is_empty() {
            return Ok(());
        }
        self.begin_pass(target, Some(&info))
    }

    fn submit(&mut self, cmd: &DrawCommand<'_>) -> Result<()> {
        self.begin_pass(cmd.target, None)?;

        let full = RectI::from_size(self.pass.size.as_ivec2());
        let viewport = cmd.viewport.unwrap_or(full);
        if self.pass.viewport != Some(viewport) {
            self.backend.set_viewport(viewport);
            self.pass.viewport = Some(viewport);
        }

        let scissor = cmd.scissor.unwrap_or(viewport);
        if self.pass.scissor != Some(scissor) {
            self.backend.set_scissor(scissor);
            self.pass.scissor = Some(scissor);
        }

        let (hash, pipeline) = self.get_pipeline(cmd)?;
        if self.pass.pipeline != Some(hash) {
            self.backend.bind_pipeline(&pipeline);
            self.pass.pipeline = Some(hash);
            self.pass.samplers = Default::default();
        }

        // Index buffer.
        if cmd.index_buffer.is_null() {
            self.pass.index_buffer = BufferHandle::NULL;
        } else {
            let Some(entry) = self.resources.buffers.get_mut(cmd.index_buffer) else {
                log::warn!("draw skipped: index buffer {:?} is not alive", cmd.index_buffer);
                return Ok(());
            };

            if self.pass.index_buffer != cmd.index_buffer || entry.dirty {
                entry.dirty = false;
                let format = if cmd.index_size == IndexFormat::Sixteen.size() {
                    IndexFormat::Sixteen
                } else {
                    IndexFormat::ThirtyTwo
                };
                self.backend.bind_index_buffer(&entry.raw, format);
                self.pass.index_buffer = cmd.index_buffer;
            }
        }

        // Vertex buffers.
        if let Some(dead) = cmd.vertex_buffers.iter().find(|b| !self.resources.buffers.contains(b.buffer)) {
            log::warn!("draw skipped: vertex buffer {:?} is not alive", dead.buffer);
            return Ok(());
        }

        let rebind = self.pass.vertex_buffers.len() != cmd.vertex_buffers.len()
            || cmd.vertex_buffers.iter().zip(&self.pass.vertex_buffers).any(|(b, bound)| {
                b.buffer != *bound || self.resources.buffers.get(b.buffer).is_some_and(|e| e.dirty)
            });

        if rebind {
            self.pass.vertex_buffers.clear();
            for binding in &cmd.vertex_buffers {
                if let Some(entry) = self.resources.buffers.get_mut(binding.buffer) {
                    entry.dirty = false;
                }
                self.pass.vertex_buffers.push(binding.buffer);
            }

            let raw: Vec<&B::Buffer> = self
                .pass
                .vertex_buffers
                .iter()
                .filter_map(|h| self.resources.buffers.get(*h).map(|e| &e.raw))
                .collect();
            if !raw.is_empty() {
                self.backend.bind_vertex_buffers(&raw);
            }
        }

        // Samplers and uniforms, up to what the shader declares.
        let layout = self
            .resources
            .shaders
            .get(cmd.material.shader)
            .map(|s| s.layout)
            .with_context(|| format!("draw uses shader {:?}, which is not alive", cmd.material.shader))?;
        self.bind_samplers(ShaderStage::Vertex, &cmd.material.vertex, layout.vertex_samplers)?;
        self.bind_samplers(ShaderStage::Fragment, &cmd.material.fragment, layout.fragment_samplers)?;

        for (stage, bindings, declared) in [
            (ShaderStage::Vertex, &cmd.material.vertex, layout.vertex_uniforms),
            (ShaderStage::Fragment, &cmd.material.fragment, layout.fragment_uniforms),
        ] {
            for (slot, data) in bindings.uniform_buffers() {
                if data.is_empty() {
                    continue;
                }
                if slot as u32 >= declared {
                    log::trace!("{stage:?} uniform slot {slot} ignored: shader declares {declared}");
                    continue;
                }
                self.backend.push_uniform_data(stage, slot as u32, data);
            }
        }

        let instances = cmd.instance_count.max(1);
        if cmd.index_buffer.is_null() {
            self.backend.draw(cmd.vertex_count, instances, cmd.vertex_offset);
        } else {
            self.backend
                .draw_indexed(cmd.index_count, instances, cmd.index_offset, cmd.vertex_offset as i32);
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.end_pass();

        let slot = self.frame;
        if let Some(fence) = self.fences[slot].take() {
            self.backend
                .wait_for_fence(fence)
                .context("failed to wait for frame fence")?;
        }

        let mut resize = None;
        let color = self.framebuffer.color();
        match self.resources.sampled_texture(color) {
            Some(entry) => {
                let blitted = self
                    .backend
                    .blit_to_swapchain(&entry.raw, entry.size, self.config.present_filter)
                    .context("failed to blit framebuffer")?;

                match blitted {
                    Some(swapchain) => {
                        resize = framebuffer_resize(
                            self.framebuffer.size(),
                            swapchain,
                            self.config.framebuffer_grow_margin,
                            self.config.framebuffer_shrink_threshold,
                        );
                    }
                    None => log::trace!("no swapchain image this frame; skipping blit"),
                }
            }
            None => log::warn!("framebuffer color attachment {color:?} is not alive"),
        }

        let fence = self.backend.submit().context("failed to submit frame")?;
        self.fences[slot] = Some(fence);
        self.buffer_staging.ring.reset();
        self.texture_staging.ring.reset();

        if let Some(size) = resize {
            self.resize_framebuffer(size)?;
        }

        self.frame = (self.frame + 1) % self.fences.len();
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.backend.wait_idle()
    }

    #[inline]
    fn framebuffer(&self) -> &Target {
        &self.framebuffer
    }
}

impl<B: GpuBackend> Drop for Device<B> {
    fn drop(&mut self) {
        self.end_pass();

        match self.backend.submit() {
            Ok(fence) => {
                if let Err(e) = self.backend.wait_for_fence(fence) {
                    log::error!("device teardown: waiting for final submit failed: {e:#}");
                }
            }
            Err(e) => log::error!("device teardown: final submit failed: {e:#}"),
        }
        self.fences.clear();
        if let Err(e) = self.backend.wait_idle() {
            log::error!("device teardown: wait idle failed: {e:#}");
        }

        for pipeline in self.pipelines.drain() {
            self.backend.destroy_pipeline(pipeline);
        }
        for (_, sampler) in self.samplers.drain() {
            self.backend.destroy_sampler(sampler);
        }
        for staging in [&mut self.buffer_staging, &mut self.texture_staging] {
            if let Some(buffer) = staging.buffer.take() {
                self.backend.destroy_transfer_buffer(buffer);
            }
        }

        let framebuffer = std::mem::replace(&mut self.framebuffer, Target::from_parts(UVec2::ZERO, Vec::new()));
        for handle in framebuffer.attachments() {
            self.dispose_texture(*handle);
        }

        let leaked = (
            self.resources.shaders.len(),
            self.resources.textures.len(),
            self.resources.buffers.len(),
        );
        for shader in self.resources.shaders.drain() {
            self.backend.destroy_shader(shader.raw);
        }
        for texture in self.resources.textures.drain() {
            self.backend.destroy_texture(texture.raw);
        }
        for buffer in self.resources.buffers.drain() {
            self.backend.destroy_buffer(buffer.raw);
        }

        log::info!(
            "render device shut down (released {} shaders, {} textures, {} buffers still in pools)",
            leaked.0,
            leaked.1,
            leaked.2
        );
    }
}

/// Zero-pads `bytes` to a multiple of `align`.
fn pad_to(bytes: Cow<'_, [u8]>, align: u32) -> Cow<'_, [u8]> {
    let padded = align_up(bytes.len() as u32, align) as usize;
    if padded == bytes.len() {
        return bytes;
    }
    let mut owned = bytes.into_owned();
    owned.resize(padded, 0);
    Cow::Owned(owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::headless::{HeadlessBackend, RenderCommand};
    use crate::device::types::{
        BufferUsage, ClearMask, CullMode, ShaderStageDef, VertexElement, VertexFormat, VertexType,
    };
    use crate::paint::{BlendMode, Color};
    use crate::render::{BoundSampler, Material, VertexBufferBinding};

    fn device_with(config: DeviceConfig) -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(), config, UVec2::new(1280, 720)).unwrap()
    }

    fn device() -> Device<HeadlessBackend> {
        device_with(DeviceConfig::default())
    }

    fn shader(device: &mut Device<HeadlessBackend>) -> ShaderHandle {
        device
            .create_shader(&ShaderDef {
                name: "test",
                vertex: ShaderStageDef {
                    code: b"vs",
                    num_uniform_buffers: 1,
                    ..ShaderStageDef::default()
                },
                fragment: ShaderStageDef {
                    code: b"fs",
                    num_samplers: 1,
                    ..ShaderStageDef::default()
                },
            })
            .unwrap()
    }

    fn format() -> VertexFormat {
        VertexFormat::new(&[
            VertexElement::new(0, VertexType::Float2, false),
            VertexElement::new(1, VertexType::UByte4, true),
        ])
    }

    fn vertex_buffer(device: &mut Device<HeadlessBackend>, data: &[u8]) -> BufferHandle {
        device
            .create_buffer(&BufferDef {
                usage: BufferUsage::Vertex,
                size: data.len() as u32,
                data,
            })
            .unwrap()
    }

    fn read(device: &Device<HeadlessBackend>, buffer: BufferHandle) -> Vec<u8> {
        device.backend().read_buffer(device.raw_buffer(buffer).unwrap())
    }

    // ── pipeline cache ────────────────────────────────────────────────────

    #[test]
    fn identical_state_hits_cache() {
        let mut d = device();
        let material = Material::new(shader(&mut d));
        let format = format();
        let mut cmd = DrawCommand::new(&material);
        cmd.vertex_buffers.push(VertexBufferBinding {
            buffer: BufferHandle::NULL,
            format: &format,
            instanced: false,
        });

        let a = d.pipeline(&cmd).unwrap();
        let b = d.pipeline(&cmd).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(d.backend().stats().pipelines_created, 1);
        assert_eq!(d.pipeline_count(), 1);
    }

    #[test]
    fn each_hashed_field_builds_a_new_pipeline() {
        let mut d = device();
        let material = Material::new(shader(&mut d));
        let format = format();
        let target = Target::new(&mut d, UVec2::new(8, 8), &[TextureFormat::R8]).unwrap();

        let base = || {
            let mut cmd = DrawCommand::new(&material);
            cmd.vertex_buffers.push(VertexBufferBinding {
                buffer: BufferHandle::NULL,
                format: &format,
                instanced: false,
            });
            cmd
        };

        let first = d.pipeline(&base()).unwrap().id;
        let mut ids = vec![first];

        let mut cmd = base();
        cmd.cull_mode = CullMode::Back;
        ids.push(d.pipeline(&cmd).unwrap().id);

        let mut cmd = base();
        cmd.blend_mode = BlendMode::ADD;
        ids.push(d.pipeline(&cmd).unwrap().id);

        let mut cmd = base();
        cmd.depth_test_enabled = true;
        ids.push(d.pipeline(&cmd).unwrap().id);

        let mut cmd = base();
        cmd.index_buffer = BufferHandle::new(0, 0);
        cmd.index_size = 2;
        ids.push(d.pipeline(&cmd).unwrap().id);

        let mut cmd = base();
        cmd.vertex_buffers[0].instanced = true;
        ids.push(d.pipeline(&cmd).unwrap().id);

        let mut cmd = base();
        cmd.target = Some(&target);
        ids.push(d.pipeline(&cmd).unwrap().id);

        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(d.backend().stats().pipelines_created, ids.len() as u32);

        // Nothing above evicted the first entry.
        assert_eq!(d.pipeline(&base()).unwrap().id, first);
    }

    #[test]
    fn disposing_shader_sweeps_its_pipelines() {
        let mut d = device();
        let keep = Material::new(shader(&mut d));
        let doomed = Material::new(shader(&mut d));

        let mut cmd = DrawCommand::new(&doomed);
        d.pipeline(&cmd).unwrap();
        cmd.cull_mode = CullMode::Front;
        d.pipeline(&cmd).unwrap();
        d.pipeline(&DrawCommand::new(&keep)).unwrap();
        assert_eq!(d.pipeline_count(), 3);

        d.dispose_shader(doomed.shader);
        assert_eq!(d.pipeline_count(), 1);
        assert_eq!(d.backend().stats().pipelines_destroyed, 2);

        // The shader is gone, so the identical request can no longer be served.
        assert!(d.pipeline(&DrawCommand::new(&doomed)).is_err());

        // A fresh shader gets fresh pipelines.
        let again = Material::new(shader(&mut d));
        d.pipeline(&DrawCommand::new(&again)).unwrap();
        assert_eq!(d.backend().stats().pipelines_created, 4);

        d.dispose_shader(doomed.shader);
        assert_eq!(d.backend().stats().shaders_destroyed, 1);
    }

    #[test]
    fn pipeline_failure_is_an_error() {
        let mut d = device();
        let material = Material::new(shader(&mut d));
        d.backend_mut().fail_pipeline_creation(true);
        let err = d.submit(&DrawCommand::new(&material)).unwrap_err();
        assert!(format!("{err:#}").contains("failed to create pipeline"));
    }

    // ── staging ───────────────────────────────────────────────────────────

    #[test]
    fn exhausted_cycles_stall_exactly_once() {
        let mut d = device_with(DeviceConfig {
            staging_buffer_size: 100,
            max_staging_cycles: 2,
            ..DeviceConfig::default()
        });

        let buffers: Vec<BufferHandle> = (0..5)
            .map(|_| {
                d.create_buffer(&BufferDef {
                    usage: BufferUsage::Vertex,
                    size: 60,
                    data: &[],
                })
                .unwrap()
            })
            .collect();

        let payload = |i: usize| -> Vec<u8> { (0..60).map(|b| (b * 7 + i * 31) as u8).collect() };

        for (i, b) in buffers.iter().enumerate() {
            d.set_buffer_data(*b, &payload(i), 0).unwrap();
        }
        assert_eq!(d.backend().stats().fence_waits, 1);

        d.present().unwrap();

        let stats = d.backend().stats();
        assert_eq!(stats.fence_waits, 1);
        // Every buffer upload landed in a fresh generation; one more for the default texture.
        assert_eq!(stats.staging_cycles, 6);
        for (i, b) in buffers.iter().enumerate() {
            let checksum: u32 = read(&d, *b).iter().map(|x| *x as u32).sum();
            let expected: u32 = payload(i).iter().map(|x| *x as u32).sum();
            assert_eq!(read(&d, *b), payload(i));
            assert_eq!(checksum, expected);
        }
    }

    #[test]
    fn appends_share_one_staging_generation() {
        let mut d = device();
        let a = vertex_buffer(&mut d, &[1; 16]);
        let b = vertex_buffer(&mut d, &[2; 16]);
        d.present().unwrap();

        // The first write of each ring cycles, later ones append.
        assert_eq!(d.backend().stats().staging_cycles, 2);
        assert_eq!(read(&d, a), vec![1; 16]);
        assert_eq!(read(&d, b), vec![2; 16]);
    }

    #[test]
    fn oversized_upload_uses_temporary_buffer() {
        let mut d = device_with(DeviceConfig {
            staging_buffer_size: 64,
            ..DeviceConfig::default()
        });
        let data: Vec<u8> = (0..100).collect();
        let b = vertex_buffer(&mut d, &data);
        d.present().unwrap();

        let stats = d.backend().stats();
        assert_eq!(stats.transfer_buffers_created, 3);
        assert_eq!(stats.transfer_buffers_destroyed, 1);
        assert_eq!(read(&d, b), data);
    }

    // ── buffers ───────────────────────────────────────────────────────────

    #[test]
    fn growth_reallocates_exactly_and_keeps_prefix() {
        let mut d = device();
        let b = vertex_buffer(&mut d, &[1, 2, 3, 4, 5, 6, 7, 8]);
        d.set_buffer_data(b, &[9; 8], 8).unwrap();
        assert_eq!(d.buffer_size(b), Some(16));
        d.present().unwrap();

        assert_eq!(read(&d, b), vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 9, 9, 9, 9, 9, 9, 9]);
        assert_eq!(d.backend().stats().buffers_destroyed, 1);
    }

    #[test]
    fn partial_writes_keep_neighbouring_bytes() {
        let mut d = device();
        let b = vertex_buffer(&mut d, &[1, 2, 3, 4, 5, 6, 7, 8]);
        d.present().unwrap();

        d.set_buffer_data(b, &[9, 9], 0).unwrap();
        d.present().unwrap();
        assert_eq!(read(&d, b), vec![9, 9, 3, 4, 5, 6, 7, 8]);

        d.set_buffer_data(b, &[7, 7], 2).unwrap();
        d.present().unwrap();
        assert_eq!(read(&d, b), vec![9, 9, 7, 7, 5, 6, 7, 8]);

        // Straddles a word boundary.
        d.set_buffer_data(b, &[0, 0, 0], 3).unwrap();
        d.present().unwrap();
        assert_eq!(read(&d, b), vec![9, 9, 7, 0, 0, 0, 7, 8]);
    }

    #[test]
    fn unaligned_write_past_the_end_grows() {
        let mut d = device();
        let b = vertex_buffer(&mut d, &[1, 2, 3, 4]);
        d.set_buffer_data(b, &[5, 6], 4).unwrap();
        assert_eq!(d.buffer_size(b), Some(6));
        d.present().unwrap();

        assert_eq!(read(&d, b)[..6], [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn zero_sized_buffer_is_null_and_harmless() {
        let mut d = device();
        let b = d
            .create_buffer(&BufferDef {
                usage: BufferUsage::Index,
                size: 0,
                data: &[],
            })
            .unwrap();
        assert!(b.is_null());
        d.set_buffer_data(b, &[1, 2, 3, 4], 0).unwrap();
        d.dispose_buffer(b);
        assert_eq!(d.backend().stats().buffers_created, 0);
    }

    #[test]
    fn double_dispose_is_a_no_op() {
        let mut d = device();
        let b = vertex_buffer(&mut d, &[0; 4]);
        d.dispose_buffer(b);
        d.dispose_buffer(b);
        assert_eq!(d.backend().stats().buffers_destroyed, 1);

        // The slot is reused under a new generation; the old handle stays dead.
        let c = vertex_buffer(&mut d, &[0; 4]);
        assert_eq!(c.index, b.index);
        assert_eq!(d.buffer_size(b), None);
        assert_eq!(d.buffer_size(c), Some(4));
    }

    // ── textures ──────────────────────────────────────────────────────────

    #[test]
    fn texture_pixels_round_trip_through_staging() {
        let mut d = device();
        let pixels: Vec<u8> = (0..16).collect();
        let t = d
            .create_texture(&TextureDef {
                size: UVec2::new(2, 2),
                data: &pixels,
                ..TextureDef::default()
            })
            .unwrap();
        d.present().unwrap();

        assert_eq!(d.backend().read_texture(d.raw_texture(t).unwrap()), pixels);
        assert!(d.set_texture_data(t, &[0; 3]).is_err());
    }

    #[test]
    fn default_texture_is_opaque_white() {
        let mut d = device();
        d.present().unwrap();
        let white = d.default_texture();
        assert_eq!(d.backend().read_texture(d.raw_texture(white).unwrap()), vec![0xff; 4]);
        assert_eq!(d.texture_info(white).unwrap().size, UVec2::ONE);
    }

    #[test]
    fn msaa_attachment_owns_a_resolve_texture() {
        let mut d = device();
        let t = d
            .create_texture(&TextureDef {
                size: UVec2::new(4, 4),
                sample_count: SampleCount::Four,
                is_target_attachment: true,
                ..TextureDef::default()
            })
            .unwrap();
        let resolve = d.resolve_texture(t).unwrap();
        assert_eq!(d.texture_info(resolve).unwrap().sample_count, SampleCount::One);
        assert!(d.set_texture_data(t, &[0; 64]).is_err());

        let before = d.backend().stats().textures_destroyed;
        d.dispose_texture(t);
        assert_eq!(d.backend().stats().textures_destroyed, before + 2);
        assert!(d.texture_info(resolve).is_none());
    }

    #[test]
    fn target_creates_and_disposes_attachments() {
        let mut d = device();
        let target = Target::new(
            &mut d,
            UVec2::new(16, 8),
            &[TextureFormat::Color, TextureFormat::Depth24Stencil8],
        )
        .unwrap();
        assert_eq!(target.attachments().len(), 2);
        assert!(target.attachments().iter().all(|h| d.texture_info(*h).unwrap().is_target_attachment));

        let handles = target.attachments().to_vec();
        target.dispose(&mut d);
        assert!(handles.iter().all(|h| d.texture_info(*h).is_none()));
    }

    #[test]
    #[should_panic(expected = "at least one attachment")]
    fn target_without_attachments_panics() {
        let mut d = device();
        let _ = Target::new(&mut d, UVec2::new(4, 4), &[]);
    }

    // ── submission ────────────────────────────────────────────────────────

    #[test]
    fn redundant_state_is_not_rebound() {
        let mut d = device();
        let material = Material::new(shader(&mut d));
        let format = format();
        let vb = vertex_buffer(&mut d, &[0; 48]);

        let mut cmd = DrawCommand::new(&material);
        cmd.vertex_buffers.push(VertexBufferBinding {
            buffer: vb,
            format: &format,
            instanced: false,
        });
        cmd.vertex_count = 3;

        d.submit(&cmd).unwrap();
        d.submit(&cmd).unwrap();

        let count = |d: &Device<HeadlessBackend>, f: fn(&RenderCommand) -> bool| {
            d.backend().commands().iter().filter(|c| f(c)).count()
        };
        assert_eq!(count(&d, |c| matches!(c, RenderCommand::BeginPass { .. })), 1);
        assert_eq!(count(&d, |c| matches!(c, RenderCommand::SetViewport(_))), 1);
        assert_eq!(count(&d, |c| matches!(c, RenderCommand::SetScissor(_))), 1);
        assert_eq!(count(&d, |c| matches!(c, RenderCommand::BindPipeline(_))), 1);
        assert_eq!(count(&d, |c| matches!(c, RenderCommand::BindVertexBuffers(_))), 1);
        assert_eq!(count(&d, |c| matches!(c, RenderCommand::BindSamplers { .. })), 1);
        assert_eq!(d.backend().stats().draws, 2);

        // Re-uploading marks the buffer dirty and forces a rebind.
        d.set_buffer_data(vb, &[1; 48], 0).unwrap();
        d.submit(&cmd).unwrap();
        assert_eq!(count(&d, |c| matches!(c, RenderCommand::BindVertexBuffers(_))), 2);
        assert_eq!(count(&d, |c| matches!(c, RenderCommand::BindSamplers { .. })), 1);
    }

    #[test]
    fn samplers_rebind_when_the_binding_changes() {
        let mut d = device();
        let mut material = Material::new(shader(&mut d));
        let t = d.create_texture(&TextureDef::default()).unwrap();

        d.submit(&DrawCommand::new(&material)).unwrap();
        material.fragment.samplers[0] = BoundSampler::new(t, Default::default());
        d.submit(&DrawCommand::new(&material)).unwrap();
        d.submit(&DrawCommand::new(&material)).unwrap();

        let bound: Vec<_> = d
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                RenderCommand::BindSamplers { textures, .. } => Some(textures.clone()),
                _ => None,
            })
            .collect();
        let white = d.raw_texture(d.default_texture()).unwrap().id;
        let texture = d.raw_texture(t).unwrap().id;
        assert_eq!(bound, vec![vec![white], vec![texture]]);
    }

    #[test]
    fn dead_vertex_buffer_skips_the_draw() {
        let mut d = device();
        let material = Material::new(shader(&mut d));
        let format = format();
        let vb = vertex_buffer(&mut d, &[0; 48]);
        d.dispose_buffer(vb);

        let mut cmd = DrawCommand::new(&material);
        cmd.vertex_buffers.push(VertexBufferBinding {
            buffer: vb,
            format: &format,
            instanced: false,
        });
        cmd.vertex_count = 3;

        d.submit(&cmd).unwrap();
        d.submit(&cmd).unwrap();

        assert_eq!(d.backend().stats().draws, 0);
        assert!(!d
            .backend()
            .commands()
            .iter()
            .any(|c| matches!(c, RenderCommand::BindVertexBuffers(_))));
    }

    #[test]
    fn viewport_and_scissor_defaults() {
        let mut d = device();
        let material = Material::new(shader(&mut d));
        let mut cmd = DrawCommand::new(&material);
        d.submit(&cmd).unwrap();

        let full = RectI::new(0, 0, 1280, 720);
        let cmds = d.backend_mut().take_commands();
        assert!(cmds.contains(&RenderCommand::SetViewport(full)));
        assert!(cmds.contains(&RenderCommand::SetScissor(full)));

        cmd.scissor = Some(RectI::new(10, 10, 20, 20));
        d.submit(&cmd).unwrap();
        let cmds = d.backend_mut().take_commands();
        assert!(!cmds.iter().any(|c| matches!(c, RenderCommand::SetViewport(_))));
        assert!(cmds.contains(&RenderCommand::SetScissor(RectI::new(10, 10, 20, 20))));
    }

    #[test]
    fn stale_sampler_texture_falls_back_to_default() {
        let mut d = device();
        let mut material = Material::new(shader(&mut d));
        let t = d.create_texture(&TextureDef::default()).unwrap();
        d.dispose_texture(t);
        material.fragment.samplers[0] = BoundSampler::new(t, Default::default());

        d.submit(&DrawCommand::new(&material)).unwrap();

        let white = d.raw_texture(d.default_texture()).unwrap().id;
        assert!(d.backend().commands().contains(&RenderCommand::BindSamplers {
            stage: ShaderStage::Fragment,
            textures: vec![white],
        }));
        // The shader declares no vertex samplers.
        assert!(!d.backend().commands().iter().any(|c| matches!(
            c,
            RenderCommand::BindSamplers { stage: ShaderStage::Vertex, .. }
        )));
        assert_eq!(d.backend().stats().samplers_created, 1);
    }

    #[test]
    fn uniforms_are_pushed_per_slot() {
        let mut d = device();
        let mut material = Material::new(shader(&mut d));
        material.vertex.set_uniform(&[1.0f32, 2.0], 0);
        d.submit(&DrawCommand::new(&material)).unwrap();

        let pushed: Vec<_> = d
            .backend()
            .commands()
            .iter()
            .filter(|c| matches!(c, RenderCommand::PushUniform { .. }))
            .collect();
        assert_eq!(pushed.len(), 1);
        assert!(matches!(
            pushed[0],
            RenderCommand::PushUniform { stage: ShaderStage::Vertex, slot: 0, data } if data.len() == 8
        ));
    }

    #[test]
    fn uniforms_beyond_the_shader_layout_are_ignored() {
        let mut d = device();
        let mut material = Material::new(shader(&mut d));
        material.vertex.set_uniform(&1.0f32, 0);
        material.vertex.set_uniform(&2.0f32, 1);
        // The shader declares no fragment uniforms.
        material.fragment.set_uniform(&3.0f32, 0);
        d.submit(&DrawCommand::new(&material)).unwrap();

        let slots: Vec<_> = d
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                RenderCommand::PushUniform { stage, slot, .. } => Some((*stage, *slot)),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![(ShaderStage::Vertex, 0)]);
    }

    #[test]
    fn indexed_draw_uses_index_format_and_min_one_instance() {
        let mut d = device();
        let material = Material::new(shader(&mut d));
        let ib = d
            .create_buffer(&BufferDef {
                usage: BufferUsage::Index,
                size: 12,
                data: bytemuck::cast_slice(&[0u16, 1, 2, 2, 3, 0]),
            })
            .unwrap();

        let mut cmd = DrawCommand::new(&material);
        cmd.index_buffer = ib;
        cmd.index_size = 2;
        cmd.index_count = 6;
        cmd.instance_count = 0;
        d.submit(&cmd).unwrap();

        let cmds = d.backend().commands();
        assert!(cmds.iter().any(|c| matches!(
            c,
            RenderCommand::BindIndexBuffer { format: IndexFormat::Sixteen, .. }
        )));
        assert!(cmds.contains(&RenderCommand::DrawIndexed {
            index_count: 6,
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
        }));
    }

    // ── clear & present ───────────────────────────────────────────────────

    #[test]
    fn clear_begins_a_clearing_pass_and_empty_mask_is_a_no_op() {
        let mut d = device();
        d.clear(None, ClearInfo { mask: ClearMask::empty(), ..ClearInfo::default() })
            .unwrap();
        assert_eq!(d.backend().stats().passes, 0);

        d.clear(None, ClearInfo::color(Color::CORNFLOWER_BLUE)).unwrap();
        assert!(d.backend().commands().iter().any(|c| matches!(
            c,
            RenderCommand::BeginPass { clear_color: Some(Color::CORNFLOWER_BLUE), .. }
        )));

        // Drawing right after reuses the cleared pass.
        let material = Material::new(shader(&mut d));
        d.submit(&DrawCommand::new(&material)).unwrap();
        assert_eq!(d.backend().stats().passes, 1);
    }

    #[test]
    fn framebuffer_resizes_with_hysteresis() {
        let mut d = device();
        let first = d.framebuffer().color();

        d.present().unwrap();
        assert_eq!(d.framebuffer().color(), first);

        d.backend_mut().set_swapchain_size(Some(UVec2::new(2000, 1000)));
        d.present().unwrap();
        assert_eq!(d.framebuffer().size(), UVec2::new(2064, 1064));
        assert!(d.texture_info(first).is_none());

        // Slightly smaller than the framebuffer: kept.
        d.backend_mut().set_swapchain_size(Some(UVec2::new(1990, 1000)));
        d.present().unwrap();
        assert_eq!(d.framebuffer().size(), UVec2::new(2064, 1064));

        d.backend_mut().set_swapchain_size(Some(UVec2::new(800, 600)));
        d.present().unwrap();
        assert_eq!(d.framebuffer().size(), UVec2::new(800, 600));
    }

    #[test]
    fn missing_swapchain_image_is_not_an_error() {
        let mut d = device();
        d.backend_mut().set_swapchain_size(None);
        d.present().unwrap();
        assert_eq!(d.backend().stats().blits, 0);
        assert_eq!(d.backend().stats().submits, 1);
        assert_eq!(d.framebuffer().size(), UVec2::new(1280, 720));
    }

    #[test]
    fn present_waits_on_the_reused_frame_slot() {
        let mut d = device();
        for _ in 0..3 {
            d.present().unwrap();
        }
        assert_eq!(d.backend().stats().fence_waits, 0);
        assert_eq!(d.frame_index(), 0);

        d.present().unwrap();
        assert_eq!(d.backend().stats().fence_waits, 1);
        assert_eq!(d.frame_index(), 1);
    }

    #[test]
    fn resize_policy() {
        let cur = UVec2::new(1000, 800);
        assert_eq!(framebuffer_resize(cur, UVec2::new(1001, 800), 64, 128), Some(UVec2::new(1065, 864)));
        assert_eq!(framebuffer_resize(cur, UVec2::new(900, 700), 64, 128), None);
        assert_eq!(framebuffer_resize(cur, UVec2::new(871, 800), 64, 128), Some(UVec2::new(871, 800)));
        assert_eq!(framebuffer_resize(cur, UVec2::new(0, 0), 64, 128), None);
    }

    #[test]
    fn teardown_releases_live_resources() {
        let mut d = device();
        let s = shader(&mut d);
        let material = Material::new(s);
        d.submit(&DrawCommand::new(&material)).unwrap();
        vertex_buffer(&mut d, &[0; 8]);
        drop(d);
    }
}
