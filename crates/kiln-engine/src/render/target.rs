use anyhow::Result;
use glam::UVec2;

use crate::device::{RenderDevice, SampleCount, TextureDef, TextureFormat, TextureHandle};

/// A set of same-sized attachment textures to render into.
///
/// The target does not release its textures on drop; call
/// [`dispose`](Self::dispose) before the device goes away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    size: UVec2,
    attachments: Vec<TextureHandle>,
}

impl Target {
    /// Creates one attachment per entry of `formats`.
    ///
    /// Panics on an empty format list or a zero-sized target.
    pub fn new(device: &mut dyn RenderDevice, size: UVec2, formats: &[TextureFormat]) -> Result<Self> {
        Self::multisampled(device, size, formats, SampleCount::One)
    }

    /// Like [`new`](Self::new), with every attachment using `sample_count`.
    /// Multisampled color attachments get a resolve texture from the device.
    pub fn multisampled(
        device: &mut dyn RenderDevice,
        size: UVec2,
        formats: &[TextureFormat],
        sample_count: SampleCount,
    ) -> Result<Self> {
        assert!(!formats.is_empty(), "target needs at least one attachment");
        assert!(size.x > 0 && size.y > 0, "target size must be non-zero, got {size}");

        let mut attachments = Vec::with_capacity(formats.len());
        for &format in formats {
            let created = device.create_texture(&TextureDef {
                size,
                format,
                sample_count,
                is_target_attachment: true,
                ..TextureDef::default()
            });

            match created {
                Ok(handle) => attachments.push(handle),
                Err(e) => {
                    for handle in attachments {
                        device.dispose_texture(handle);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self { size, attachments })
    }

    pub(crate) fn from_parts(size: UVec2, attachments: Vec<TextureHandle>) -> Self {
        Self { size, attachments }
    }

    #[inline]
    pub fn size(&self) -> UVec2 {
        self.size
    }

    #[inline]
    pub fn attachments(&self) -> &[TextureHandle] {
        &self.attachments
    }

    /// First attachment, the one presented for the framebuffer.
    #[inline]
    pub fn color(&self) -> TextureHandle {
        self.attachments.first().copied().unwrap_or_default()
    }

    pub fn dispose(self, device: &mut dyn RenderDevice) {
        for handle in self.attachments {
            device.dispose_texture(handle);
        }
    }
}
