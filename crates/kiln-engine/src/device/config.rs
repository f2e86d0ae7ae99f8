use super::types::{TextureFilter, TextureFormat};

/// Device policy knobs. Backend-independent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceConfig {
    /// Frames the CPU may run ahead of the GPU.
    pub frames_in_flight: usize,

    /// Size of each staging ring (one for buffers, one for textures).
    pub staging_buffer_size: u32,

    /// Ring cycles allowed between submits before an upload stalls.
    pub max_staging_cycles: u32,

    /// Extra pixels added when the framebuffer has to grow.
    pub framebuffer_grow_margin: u32,

    /// The framebuffer shrinks only once it exceeds the swapchain by more
    /// than this many pixels in a dimension.
    pub framebuffer_shrink_threshold: u32,

    pub present_filter: TextureFilter,
    pub framebuffer_format: TextureFormat,

    /// Adds a depth/stencil attachment to the framebuffer.
    pub framebuffer_depth: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            staging_buffer_size: 16 * 1024 * 1024,
            max_staging_cycles: 4,
            framebuffer_grow_margin: 64,
            framebuffer_shrink_threshold: 128,
            present_filter: TextureFilter::Linear,
            framebuffer_format: TextureFormat::Color,
            framebuffer_depth: false,
        }
    }
}
