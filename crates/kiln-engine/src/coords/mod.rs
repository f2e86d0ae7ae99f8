//! Geometry types shared by the device and the batcher.
//!
//! Canonical CPU space:
//! - Pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! Vectors and matrices are `glam` types; this module only adds the
//! rectangle and quad shapes the renderer needs.

mod quad;
mod rect;

pub use glam::{IVec2, Mat4, UVec2, Vec2, Vec3};
pub use quad::Quad;
pub use rect::{Rect, RectI};
