//! Window + runtime loop.
//!
//! Owns the `winit` event loop and the window, and the wgpu-backed device
//! that borrows it.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
pub use winit::event::{ElementState, WindowEvent};
pub use winit::keyboard::{KeyCode, PhysicalKey};
