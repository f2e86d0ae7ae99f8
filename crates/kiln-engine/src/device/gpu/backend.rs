use std::borrow::Cow;

use anyhow::{Context, Result, bail, ensure};
use glam::UVec2;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::coords::RectI;
use crate::device::backend::{GpuBackend, RenderPassDesc, TextureDesc};
use crate::device::pipeline::PipelineKey;
use crate::device::staging::align_up;
use crate::device::types::{
    BufferUsage, IndexFormat, SampleCount, ShaderDef, ShaderStage, ShaderStageDef, TextureFilter, TextureFormat,
    TextureSampler,
};

use super::blit::Blitter;
use super::convert;
use super::init::GpuInit;
use super::surface::{self, SurfaceErrorAction};

/// Bind group index of each stage's samplers and uniforms.
const VERTEX_SAMPLERS: u32 = 0;
const VERTEX_UNIFORMS: u32 = 1;
const FRAGMENT_SAMPLERS: u32 = 2;
const FRAGMENT_UNIFORMS: u32 = 3;
const GROUP_COUNT: usize = 4;

/// Bound for uniform slots a material leaves empty.
const ZERO_UNIFORM_SIZE: u64 = 1024;
const INITIAL_UNIFORM_ARENA: u64 = 64 * 1024;

pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
}

impl WgpuTexture {
    #[inline]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    #[inline]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
}

pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
}

impl WgpuBuffer {
    #[inline]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

#[derive(Debug, Copy, Clone, Default)]
struct StageBindings {
    samplers: u32,
    uniforms: u32,
}

impl StageBindings {
    fn of(def: &ShaderStageDef<'_>) -> Self {
        Self { samplers: def.num_samplers, uniforms: def.num_uniform_buffers }
    }
}

pub struct WgpuShader {
    name: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    vertex_entry: String,
    fragment_entry: String,
    groups: [wgpu::BindGroupLayout; GROUP_COUNT],
    layout: wgpu::PipelineLayout,
    empty_groups: [Option<wgpu::BindGroup>; GROUP_COUNT],
    uniform_slots: [u32; 2],
}

/// A render pipeline plus the bind group layouts draws need to build groups.
#[derive(Clone)]
pub struct WgpuPipeline {
    pipeline: wgpu::RenderPipeline,
    groups: [wgpu::BindGroupLayout; GROUP_COUNT],
    empty_groups: [Option<wgpu::BindGroup>; GROUP_COUNT],
    uniform_slots: [u32; 2],
    blend_constant: Option<wgpu::Color>,
}

pub struct WgpuTransferBuffer {
    buffer: wgpu::Buffer,
    size: u32,
}

/// Pending uniform binding for one slot.
#[derive(Clone)]
struct UniformBinding {
    buffer: wgpu::Buffer,
    offset: u64,
    size: u64,
}

/// Per-submit uniform storage. Draws write their bytes at aligned offsets and
/// bind sub-ranges; the write cursor resets after each submit.
struct UniformArena {
    buffer: wgpu::Buffer,
    capacity: u64,
    offset: u64,
    alignment: u64,
}

impl UniformArena {
    fn new(device: &wgpu::Device, alignment: u64) -> Self {
        Self {
            buffer: Self::allocate(device, INITIAL_UNIFORM_ARENA),
            capacity: INITIAL_UNIFORM_ARENA,
            offset: 0,
            alignment: alignment.max(wgpu::COPY_BUFFER_ALIGNMENT),
        }
    }

    fn allocate(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kiln uniform arena"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn push(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8]) -> UniformBinding {
        let size = (data.len() as u64).next_multiple_of(16);
        let start = self.offset.next_multiple_of(self.alignment);

        if start + size > self.capacity {
            // Bind groups already recorded keep the old allocation alive.
            let capacity = (self.capacity * 2).max(size.next_multiple_of(self.alignment));
            log::trace!("uniform arena grown {} -> {capacity} bytes", self.capacity);
            self.buffer = Self::allocate(device, capacity);
            self.capacity = capacity;
            self.offset = 0;
            return self.push(device, queue, data);
        }

        let bytes: Cow<'_, [u8]> = if data.len() as u64 == size {
            Cow::Borrowed(data)
        } else {
            let mut padded = data.to_vec();
            padded.resize(size as usize, 0);
            Cow::Owned(padded)
        };
        queue.write_buffer(&self.buffer, start, &bytes);

        self.offset = start + size;
        UniformBinding { buffer: self.buffer.clone(), offset: start, size }
    }

    fn reset(&mut self) {
        self.offset = 0;
    }
}

/// [`GpuBackend`] over wgpu, presenting into a window surface.
///
/// Copies are recorded into a transfer encoder and passes into a render
/// encoder; `submit` hands both to the queue in that order. Transfer buffers
/// are written through `Queue::write_buffer`, and cycling swaps in a fresh
/// `wgpu::Buffer` so that copies already recorded keep their source.
pub struct WgpuBackend<'w> {
    /// Kept alive for as long as the surface created from it.
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'w>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,

    transfer: Option<wgpu::CommandEncoder>,
    render: Option<wgpu::CommandEncoder>,
    pass: Option<wgpu::RenderPass<'static>>,
    pass_size: UVec2,

    bound: Option<WgpuPipeline>,
    uniforms: UniformArena,
    pending_uniforms: [Vec<Option<UniformBinding>>; 2],
    zero_uniform: wgpu::Buffer,

    blitter: Blitter,
    frame: Option<wgpu::SurfaceTexture>,
}

impl<'w> WgpuBackend<'w> {
    /// Creates the wgpu context bound to a window and configures its surface.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let GpuInit {
            prefer_srgb,
            present_mode,
            alpha_mode,
            required_features,
            required_limits,
            desired_maximum_frame_latency,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("kiln-engine device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&caps, prefer_srgb).context("no supported surface formats")?;
        let alpha_mode = surface::choose_alpha_mode(&caps, alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        let info = adapter.get_info();
        log::info!("wgpu backend on {} ({:?}), surface {format:?}", info.name, info.backend);

        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let zero_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kiln zero uniform"),
            size: ZERO_UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        });

        Ok(Self {
            uniforms: UniformArena::new(&device, alignment),
            blitter: Blitter::new(&device),
            zero_uniform,
            _instance: instance,
            surface,
            adapter,
            device,
            queue,
            config,
            size,
            transfer: None,
            render: None,
            pass: None,
            pass_size: UVec2::ZERO,
            bound: None,
            pending_uniforms: [Vec::new(), Vec::new()],
            frame: None,
        })
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    #[inline]
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Returns the active surface format.
    #[inline]
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Returns the current drawable size (physical pixels).
    #[inline]
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Reconfigures the surface after a window resize.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        surface::apply_resize(&self.surface, &self.device, &mut self.config, &mut self.size, new_size);
    }

    fn transfer_encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.transfer.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("kiln transfer") })
        })
    }

    fn render_encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.render.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("kiln render") })
        })
    }

    fn sampler_layout(&self, stage: wgpu::ShaderStages, count: u32) -> wgpu::BindGroupLayout {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..count)
            .flat_map(|i| {
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: 2 * i,
                        visibility: stage,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2 * i + 1,
                        visibility: stage,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();

        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln sampler layout"),
            entries: &entries,
        })
    }

    fn uniform_layout(&self, stage: wgpu::ShaderStages, count: u32) -> wgpu::BindGroupLayout {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..count)
            .map(|i| wgpu::BindGroupLayoutEntry {
                binding: i,
                visibility: stage,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln uniform layout"),
            entries: &entries,
        })
    }

    fn shader_module(&self, name: &str, stage: &ShaderStageDef<'_>) -> Result<wgpu::ShaderModule> {
        let source = std::str::from_utf8(stage.code).with_context(|| format!("shader '{name}' is not UTF-8 WGSL"))?;

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            bail!("shader '{name}' failed to compile: {}", errors.join("; "));
        }

        Ok(module)
    }

    /// Builds and binds the uniform groups of the bound pipeline.
    fn flush_uniforms(&mut self) {
        let Some(bound) = &self.bound else {
            return;
        };
        let Some(pass) = self.pass.as_mut() else {
            return;
        };

        for (stage, group) in [(0usize, VERTEX_UNIFORMS), (1usize, FRAGMENT_UNIFORMS)] {
            let slots = bound.uniform_slots[stage];
            if slots == 0 {
                continue;
            }

            let pending = &self.pending_uniforms[stage];
            let entries: Vec<wgpu::BindGroupEntry<'_>> = (0..slots)
                .map(|slot| {
                    let resource = match pending.get(slot as usize).and_then(Option::as_ref) {
                        Some(u) => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &u.buffer,
                            offset: u.offset,
                            size: wgpu::BufferSize::new(u.size),
                        }),
                        None => self.zero_uniform.as_entire_binding(),
                    };
                    wgpu::BindGroupEntry { binding: slot, resource }
                })
                .collect();

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kiln uniforms"),
                layout: &bound.groups[group as usize],
                entries: &entries,
            });
            pass.set_bind_group(group, &bind_group, &[]);
        }

        for pending in &mut self.pending_uniforms {
            pending.clear();
        }
    }
}

fn stage_index(stage: ShaderStage) -> usize {
    match stage {
        ShaderStage::Vertex => 0,
        ShaderStage::Fragment => 1,
    }
}

impl GpuBackend for WgpuBackend<'_> {
    type Texture = WgpuTexture;
    type Buffer = WgpuBuffer;
    type Shader = WgpuShader;
    type Pipeline = WgpuPipeline;
    type Sampler = wgpu::Sampler;
    type TransferBuffer = WgpuTransferBuffer;
    type Fence = wgpu::SubmissionIndex;

    fn copy_alignment(&self) -> u32 {
        wgpu::COPY_BUFFER_ALIGNMENT as u32
    }

    fn texture_row_pitch(&self, format: TextureFormat, width: u32) -> u32 {
        align_up(format.size() * width, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
    }

    // ── resources ─────────────────────────────────────────────────────────

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Self::Texture> {
        let multisampled = desc.sample_count != SampleCount::One;
        let usage = if multisampled {
            wgpu::TextureUsages::RENDER_ATTACHMENT
        } else if desc.format.is_depth() {
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        } else if desc.is_target_attachment {
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
        } else {
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("kiln texture"),
            size: wgpu::Extent3d { width: desc.size.x, height: desc.size.y, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: convert::sample_count(desc.sample_count),
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(desc.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(WgpuTexture { texture, view, desc: *desc })
    }

    // Dropping defers the release until recorded commands no longer use the
    // resource. `destroy()` would invalidate copies recorded this frame.
    fn destroy_texture(&mut self, _texture: Self::Texture) {}

    fn create_buffer(&mut self, usage: BufferUsage, size: u32) -> Result<Self::Buffer> {
        let kind = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
        };

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kiln buffer"),
            size: align_up(size, self.copy_alignment()) as u64,
            usage: kind | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Ok(WgpuBuffer { buffer })
    }

    fn destroy_buffer(&mut self, _buffer: Self::Buffer) {}

    fn create_shader(&mut self, def: &ShaderDef<'_>) -> Result<Self::Shader> {
        let vertex = self.shader_module(def.name, &def.vertex)?;
        let fragment = self.shader_module(def.name, &def.fragment)?;

        let vs = StageBindings::of(&def.vertex);
        let fs = StageBindings::of(&def.fragment);
        let groups = [
            self.sampler_layout(wgpu::ShaderStages::VERTEX, vs.samplers),
            self.uniform_layout(wgpu::ShaderStages::VERTEX, vs.uniforms),
            self.sampler_layout(wgpu::ShaderStages::FRAGMENT, fs.samplers),
            self.uniform_layout(wgpu::ShaderStages::FRAGMENT, fs.uniforms),
        ];

        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(def.name),
            bind_group_layouts: &[&groups[0], &groups[1], &groups[2], &groups[3]],
            immediate_size: 0,
        });

        // Groups without entries still have to be set before drawing.
        let counts = [vs.samplers, vs.uniforms, fs.samplers, fs.uniforms];
        let empty_groups = std::array::from_fn(|i| {
            (counts[i] == 0).then(|| {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("kiln empty group"),
                    layout: &groups[i],
                    entries: &[],
                })
            })
        });

        Ok(WgpuShader {
            name: def.name.to_owned(),
            vertex,
            fragment,
            vertex_entry: def.vertex.entrypoint.to_owned(),
            fragment_entry: def.fragment.entrypoint.to_owned(),
            groups,
            layout,
            empty_groups,
            uniform_slots: [vs.uniforms, fs.uniforms],
        })
    }

    fn destroy_shader(&mut self, _shader: Self::Shader) {}

    fn create_pipeline(&mut self, shader: &Self::Shader, key: &PipelineKey) -> Result<Self::Pipeline> {
        let attributes: Vec<Vec<wgpu::VertexAttribute>> =
            key.vertex_layouts.iter().map(|l| convert::vertex_attributes(&l.format)).collect();

        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .vertex_layouts
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.format.stride() as u64,
                step_mode: if layout.instanced {
                    wgpu::VertexStepMode::Instance
                } else {
                    wgpu::VertexStepMode::Vertex
                },
                attributes,
            })
            .collect();

        let blend = convert::blend_state(&key.blend);
        let write_mask = convert::color_writes(key.blend.mask);
        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .targets
            .iter()
            .filter(|t| !t.format.is_depth())
            .map(|t| {
                Some(wgpu::ColorTargetState {
                    format: convert::texture_format(t.format),
                    blend: Some(blend),
                    write_mask,
                })
            })
            .collect();

        let depth_stencil = key
            .targets
            .iter()
            .find(|t| t.format.is_depth())
            .map(|t| wgpu::DepthStencilState {
                format: convert::texture_format(t.format),
                depth_write_enabled: key.depth_write,
                depth_compare: if key.depth_test {
                    convert::compare(key.depth_compare)
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&shader.name),
            layout: Some(&shader.layout),
            vertex: wgpu::VertexState {
                module: &shader.vertex,
                entry_point: Some(&shader.vertex_entry),
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader.fragment,
                entry_point: Some(&shader.fragment_entry),
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: convert::cull_mode(key.cull_mode),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: convert::sample_count(key.sample_count()),
                ..Default::default()
            },
            multiview_mask: None,
            cache: None,
        });

        Ok(WgpuPipeline {
            pipeline,
            groups: shader.groups.clone(),
            empty_groups: shader.empty_groups.clone(),
            uniform_slots: shader.uniform_slots,
            blend_constant: Some(convert::color(key.blend.color)),
        })
    }

    fn destroy_pipeline(&mut self, _pipeline: Self::Pipeline) {}

    fn create_sampler(&mut self, sampler: TextureSampler) -> Result<Self::Sampler> {
        Ok(self.device.create_sampler(&convert::sampler_descriptor(sampler)))
    }

    fn destroy_sampler(&mut self, _sampler: Self::Sampler) {}

    fn create_transfer_buffer(&mut self, size: u32) -> Result<Self::TransferBuffer> {
        let size = align_up(size, self.copy_alignment());
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kiln transfer buffer"),
            size: size as u64,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(WgpuTransferBuffer { buffer, size })
    }

    fn destroy_transfer_buffer(&mut self, _buffer: Self::TransferBuffer) {}

    fn write_transfer_buffer(
        &mut self,
        buffer: &mut Self::TransferBuffer,
        offset: u32,
        data: &[u8],
        cycle: bool,
    ) -> Result<()> {
        ensure!(
            offset as u64 + data.len() as u64 <= buffer.size as u64,
            "transfer write of {} bytes at {offset} overflows a {} byte buffer",
            data.len(),
            buffer.size
        );

        if cycle {
            // Recorded copies hold a reference to the previous allocation.
            buffer.buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("kiln transfer buffer"),
                size: buffer.size as u64,
                usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }

        self.queue.write_buffer(&buffer.buffer, offset as u64, data);
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
        self.transfer_encoder().copy_buffer_to_buffer(
            &src.buffer,
            src_offset as u64,
            &dst.buffer,
            dst_offset as u64,
            size as u64,
        );
    }

    fn copy_to_texture(
        &mut self,
        src: &Self::TransferBuffer,
        src_offset: u32,
        row_pitch: u32,
        dst: &Self::Texture,
        size: UVec2,
    ) {
        self.transfer_encoder().copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: &src.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: src_offset as u64,
                    bytes_per_row: Some(row_pitch),
                    rows_per_image: Some(size.y),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d { width: size.x, height: size.y, depth_or_array_layers: 1 },
        );
    }

    fn copy_buffer(&mut self, src: &Self::Buffer, dst: &Self::Buffer, size: u32) {
        self.transfer_encoder()
            .copy_buffer_to_buffer(&src.buffer, 0, &dst.buffer, 0, size as u64);
    }

    // ── render stream ─────────────────────────────────────────────────────

    fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_, Self>) {
        self.end_render_pass();

        let colors: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = desc
            .colors
            .iter()
            .map(|c| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &c.texture.view,
                    depth_slice: None,
                    resolve_target: c.resolve.map(|r| &r.view),
                    ops: wgpu::Operations {
                        load: match c.clear {
                            Some(color) => wgpu::LoadOp::Clear(convert::color(color)),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let depth = desc.depth.as_ref().map(|d| wgpu::RenderPassDepthStencilAttachment {
            view: &d.texture.view,
            depth_ops: Some(wgpu::Operations {
                load: match d.clear_depth {
                    Some(depth) => wgpu::LoadOp::Clear(depth),
                    None => wgpu::LoadOp::Load,
                },
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: Some(wgpu::Operations {
                load: match d.clear_stencil {
                    Some(stencil) => wgpu::LoadOp::Clear(stencil as u32),
                    None => wgpu::LoadOp::Load,
                },
                store: wgpu::StoreOp::Store,
            }),
        });

        let pass = self
            .render_encoder()
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln pass"),
                color_attachments: &colors,
                depth_stencil_attachment: depth,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();

        self.pass = Some(pass);
        self.pass_size = desc.size;
        self.bound = None;
    }

    fn end_render_pass(&mut self) {
        self.pass = None;
        self.bound = None;
    }

    fn set_viewport(&mut self, viewport: RectI) {
        if let Some(pass) = self.pass.as_mut() {
            pass.set_viewport(
                viewport.x as f32,
                viewport.y as f32,
                viewport.w.max(0) as f32,
                viewport.h.max(0) as f32,
                0.0,
                1.0,
            );
        }
    }

    fn set_scissor(&mut self, scissor: RectI) {
        let bounds = RectI::from_size(self.pass_size.as_ivec2());
        let clipped = scissor.intersect(bounds);
        if let Some(pass) = self.pass.as_mut() {
            pass.set_scissor_rect(
                clipped.x.max(0) as u32,
                clipped.y.max(0) as u32,
                clipped.w.max(0) as u32,
                clipped.h.max(0) as u32,
            );
        }
    }

    fn bind_pipeline(&mut self, pipeline: &Self::Pipeline) {
        let Some(pass) = self.pass.as_mut() else {
            return;
        };

        pass.set_pipeline(&pipeline.pipeline);
        for (group, empty) in pipeline.empty_groups.iter().enumerate() {
            if let Some(empty) = empty {
                pass.set_bind_group(group as u32, empty, &[]);
            }
        }
        if let Some(constant) = pipeline.blend_constant {
            pass.set_blend_constant(constant);
        }
        self.bound = Some(pipeline.clone());
    }

    fn bind_index_buffer(&mut self, buffer: &Self::Buffer, format: IndexFormat) {
        if let Some(pass) = self.pass.as_mut() {
            pass.set_index_buffer(buffer.buffer.slice(..), convert::index_format(format));
        }
    }

    fn bind_vertex_buffers(&mut self, buffers: &[&Self::Buffer]) {
        if let Some(pass) = self.pass.as_mut() {
            for (slot, buffer) in buffers.iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, buffer.buffer.slice(..));
            }
        }
    }

    fn bind_samplers(&mut self, stage: ShaderStage, bindings: &[(&Self::Texture, &Self::Sampler)]) {
        let (Some(bound), Some(pass)) = (&self.bound, self.pass.as_mut()) else {
            return;
        };

        let group = match stage {
            ShaderStage::Vertex => VERTEX_SAMPLERS,
            ShaderStage::Fragment => FRAGMENT_SAMPLERS,
        };

        let entries: Vec<wgpu::BindGroupEntry<'_>> = bindings
            .iter()
            .enumerate()
            .flat_map(|(i, (texture, sampler))| {
                [
                    wgpu::BindGroupEntry {
                        binding: 2 * i as u32,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2 * i as u32 + 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ]
            })
            .collect();

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln samplers"),
            layout: &bound.groups[group as usize],
            entries: &entries,
        });
        pass.set_bind_group(group, &bind_group, &[]);
    }

    fn push_uniform_data(&mut self, stage: ShaderStage, slot: u32, data: &[u8]) {
        let binding = self.uniforms.push(&self.device, &self.queue, data);
        let pending = &mut self.pending_uniforms[stage_index(stage)];
        let slot = slot as usize;
        if pending.len() <= slot {
            pending.resize(slot + 1, None);
        }
        pending[slot] = Some(binding);
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32) {
        self.flush_uniforms();
        if let Some(pass) = self.pass.as_mut() {
            pass.draw_indexed(first_index..first_index + index_count, base_vertex, 0..instance_count);
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32) {
        self.flush_uniforms();
        if let Some(pass) = self.pass.as_mut() {
            pass.draw(first_vertex..first_vertex + vertex_count, 0..instance_count);
        }
    }

    // ── presentation & sync ───────────────────────────────────────────────

    fn blit_to_swapchain(
        &mut self,
        source: &Self::Texture,
        source_size: UVec2,
        filter: TextureFilter,
    ) -> Result<Option<UVec2>> {
        self.end_render_pass();

        if self.size.width == 0 || self.size.height == 0 {
            return Ok(None);
        }

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                log::debug!("surface image unavailable: {err}");
                return match surface::map_surface_error(&self.surface, &self.device, &self.config, self.size, err) {
                    SurfaceErrorAction::Fatal => bail!("surface is out of memory"),
                    SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => Ok(None),
                };
            }
        };

        let swapchain = UVec2::new(self.config.width, self.config.height);
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let format = self.config.format;

        let mut encoder = self.render.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("kiln render") })
        });
        self.blitter.record(
            &self.device,
            &self.queue,
            &mut encoder,
            &view,
            format,
            &source.view,
            source_size,
            source_size.min(swapchain),
            filter,
        );
        self.render = Some(encoder);
        self.frame = Some(frame);

        Ok(Some(swapchain))
    }

    fn submit(&mut self) -> Result<Self::Fence> {
        self.end_render_pass();

        let buffers = [self.transfer.take(), self.render.take()]
            .into_iter()
            .flatten()
            .map(|encoder| encoder.finish());
        let index = self.queue.submit(buffers);

        if let Some(frame) = self.frame.take() {
            frame.present();
        }

        self.uniforms.reset();
        Ok(index)
    }

    fn wait_for_fence(&mut self, fence: Self::Fence) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait { submission_index: Some(fence), timeout: None })
            .context("failed waiting for submission")?;
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .context("failed waiting for device idle")?;
        Ok(())
    }
}
