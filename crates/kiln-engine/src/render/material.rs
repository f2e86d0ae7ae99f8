use bytemuck::Pod;

use crate::device::{ShaderHandle, TextureHandle, TextureSampler};

/// Texture and sampler bound to one sampler slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct BoundSampler {
    pub texture: TextureHandle,
    pub sampler: TextureSampler,
}

impl BoundSampler {
    #[inline]
    pub const fn new(texture: TextureHandle, sampler: TextureSampler) -> Self {
        Self { texture, sampler }
    }
}

/// Per-stage bindings of a [`Material`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MaterialStage {
    pub samplers: [BoundSampler; MaterialStage::MAX_SAMPLERS],
    uniforms: [Vec<u8>; MaterialStage::MAX_UNIFORM_BUFFERS],
}

impl MaterialStage {
    pub const MAX_SAMPLERS: usize = 16;
    pub const MAX_UNIFORM_BUFFERS: usize = 8;

    /// Replaces the bytes of uniform `slot`. Out-of-range slots are ignored.
    pub fn set_uniform_buffer(&mut self, data: &[u8], slot: usize) {
        if let Some(buffer) = self.uniforms.get_mut(slot) {
            buffer.clear();
            buffer.extend_from_slice(data);
        }
    }

    pub fn set_uniform<T: Pod>(&mut self, value: &T, slot: usize) {
        self.set_uniform_buffer(bytemuck::bytes_of(value), slot);
    }

    /// Bytes of uniform `slot`; empty for unset or out-of-range slots.
    pub fn uniform_buffer(&self, slot: usize) -> &[u8] {
        self.uniforms.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reads uniform `slot` back as `T`, if it holds exactly `size_of::<T>()` bytes.
    pub fn uniform<T: Pod>(&self, slot: usize) -> Option<T> {
        let bytes = self.uniform_buffer(slot);
        (bytes.len() == size_of::<T>()).then(|| bytemuck::pod_read_unaligned(bytes))
    }

    pub fn uniform_buffers(&self) -> impl Iterator<Item = (usize, &[u8])> + '_ {
        self.uniforms.iter().enumerate().map(|(i, b)| (i, b.as_slice()))
    }
}

/// Shader plus the sampler and uniform state it is drawn with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Material {
    pub shader: ShaderHandle,
    pub vertex: MaterialStage,
    pub fragment: MaterialStage,
}

impl Material {
    pub fn new(shader: ShaderHandle) -> Self {
        Self {
            shader,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    #[test]
    fn out_of_range_slot_is_ignored() {
        let mut stage = MaterialStage::default();
        stage.set_uniform_buffer(&[1, 2, 3], MaterialStage::MAX_UNIFORM_BUFFERS);
        assert!(stage.uniform_buffers().all(|(_, b)| b.is_empty()));
        assert!(stage.uniform_buffer(99).is_empty());
    }

    #[test]
    fn typed_uniform_round_trip() {
        let mut stage = MaterialStage::default();
        let m = Mat4::from_scale(glam::Vec3::new(2.0, 3.0, 1.0));
        stage.set_uniform(&m, 0);
        assert_eq!(stage.uniform_buffer(0).len(), 64);
        assert_eq!(stage.uniform::<Mat4>(0), Some(m));
        assert_eq!(stage.uniform::<u32>(0), None);
    }

    #[test]
    fn equality_covers_uniform_bytes() {
        let mut a = Material::new(ShaderHandle::new(1, 0));
        let b = a.clone();
        assert_eq!(a, b);
        a.fragment.set_uniform(&1.0f32, 2);
        assert_ne!(a, b);
    }
}
