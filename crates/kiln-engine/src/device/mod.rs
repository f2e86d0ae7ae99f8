//! GPU device layer.
//!
//! [`RenderDevice`] is the object-safe interface the rest of the engine draws
//! through. [`Device`] implements it once on top of a [`GpuBackend`] and owns
//! every policy a backend should not reimplement:
//! - handle registry for textures, shaders and buffers
//! - pipeline cache keyed by render state
//! - staging rings with bounded cycling
//! - render-pass and binding deduplication
//! - the framebuffer and its resize hysteresis
//!
//! Backends: [`WgpuBackend`] for windows, [`HeadlessBackend`] for tests
//! and offscreen use.

mod backend;
mod config;
mod device;
mod gpu;
mod headless;
mod pipeline;
mod registry;
mod render_device;
mod staging;
mod types;

pub use backend::{ColorAttachment, DepthAttachment, GpuBackend, RenderPassDesc, TextureDesc};
pub use config::DeviceConfig;
pub use device::{Device, framebuffer_resize};
pub use gpu::{GpuInit, SurfaceErrorAction, WgpuBackend, WgpuBuffer, WgpuTexture};
pub use headless::{
    HeadlessBackend, HeadlessBuffer, HeadlessFence, HeadlessPipeline, HeadlessSampler, HeadlessShader,
    HeadlessStats, HeadlessTexture, HeadlessTransferBuffer, RenderCommand,
};
pub use pipeline::{AttachmentInfo, PipelineKey, VertexLayout, hash_combine, hash_of};
pub use registry::{BufferHandle, GpuBuffer, GpuShader, GpuTexture, ShaderHandle, TextureHandle};
pub use render_device::{RenderDevice, TextureInfo};
pub use types::{
    BufferDef, BufferUsage, ClearInfo, ClearMask, CullMode, DepthCompare, IndexElement, IndexFormat,
    SampleCount, ShaderDef, ShaderStage, ShaderStageDef, TextureDef, TextureFilter, TextureFormat,
    TextureSampler, TextureWrap, VertexElement, VertexFormat, VertexType,
};
