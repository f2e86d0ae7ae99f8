//! Device-backed rendering helpers.
//!
//! Everything here talks to the GPU through `&mut dyn RenderDevice` and owns
//! device resources that must be disposed explicitly, before the device.
//!
//! Convention:
//! - CPU geometry is in pixels (top-left origin, +Y down).
//! - Projection into clip space is a vertex uniform supplied per draw.

mod batcher;
mod draw;
mod material;
mod mesh;
mod target;
mod texture;

pub use batcher::{Batch, Batcher, BatcherMode, BatcherVertex};
pub use draw::{DrawCommand, VertexBufferBinding};
pub use material::{BoundSampler, Material, MaterialStage};
pub use mesh::{Mesh, Vertex, VertexBuffer};
pub use target::Target;
pub use texture::{SubTexture, Texture};
