//! Kiln engine crate.
//!
//! The rendering and resource-lifetime core of a small 2D engine:
//! - [`pool`]: generational slot pools behind every resource handle
//! - [`device`]: the render device, its pipeline cache and staging rings,
//!   with a wgpu backend and a headless one
//! - [`render`]: textures, meshes, targets and the sprite [`render::Batcher`]
//! - [`window`]: the winit runtime that drives a [`core::App`]

pub mod pool;
pub mod device;
pub mod window;
pub mod time;
pub mod core;

pub mod logging;
pub mod coords;
pub mod render;
pub mod paint;
