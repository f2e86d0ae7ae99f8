//! Color and blend state shared by the batcher and the device.

mod blend;
mod color;

pub use blend::{BlendFactor, BlendMask, BlendMode, BlendOp};
pub use color::Color;
