//! wgpu backend.
//!
//! Owns the wgpu Instance/Adapter/Device/Queue and the window surface, and
//! implements [`GpuBackend`](super::GpuBackend) on top of them.
//!
//! Shader convention: `ShaderDef` code is WGSL. Bind groups are
//! - group 0: vertex samplers
//! - group 1: vertex uniforms
//! - group 2: fragment samplers
//! - group 3: fragment uniforms
//!
//! Sampler `i` uses texture binding `2i` and sampler binding `2i + 1`;
//! uniform slot `i` uses binding `i`.

mod backend;
mod blit;
mod convert;
mod init;
mod surface;

pub use backend::{WgpuBackend, WgpuBuffer, WgpuPipeline, WgpuShader, WgpuTexture, WgpuTransferBuffer};
pub use init::GpuInit;
pub use surface::SurfaceErrorAction;
