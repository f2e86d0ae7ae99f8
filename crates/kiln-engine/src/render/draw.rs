use crate::coords::RectI;
use crate::device::{BufferHandle, CullMode, DepthCompare, IndexElement, VertexFormat};
use crate::paint::BlendMode;

use super::material::Material;
use super::mesh::{Mesh, Vertex};
use super::target::Target;

/// A vertex buffer bound to a draw, with its input rate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexBufferBinding<'a> {
    pub buffer: BufferHandle,
    pub format: &'a VertexFormat,
    pub instanced: bool,
}

/// Everything needed to issue one draw.
#[derive(Debug, Clone)]
pub struct DrawCommand<'a> {
    /// `None` draws into the device framebuffer.
    pub target: Option<&'a Target>,
    pub material: &'a Material,
    pub vertex_buffers: Vec<VertexBufferBinding<'a>>,

    /// Null for non-indexed draws.
    pub index_buffer: BufferHandle,
    pub index_offset: u32,
    /// Indices per instance, for indexed draws.
    pub index_count: u32,
    /// Bytes per index.
    pub index_size: u32,
    /// Added to every index when indexed, otherwise the first vertex.
    pub vertex_offset: u32,
    /// Vertices per instance, for non-indexed draws.
    pub vertex_count: u32,
    pub instance_count: u32,

    pub blend_mode: BlendMode,
    pub cull_mode: CullMode,
    pub depth_compare: DepthCompare,
    pub depth_test_enabled: bool,
    pub depth_write_enabled: bool,

    /// Defaults to the whole target.
    pub viewport: Option<RectI>,
    /// Defaults to the viewport.
    pub scissor: Option<RectI>,
}

impl<'a> DrawCommand<'a> {
    /// A draw with default render state and nothing bound.
    pub fn new(material: &'a Material) -> Self {
        Self {
            target: None,
            material,
            vertex_buffers: Vec::new(),
            index_buffer: BufferHandle::NULL,
            index_offset: 0,
            index_count: 0,
            index_size: 0,
            vertex_offset: 0,
            vertex_count: 0,
            instance_count: 1,
            blend_mode: BlendMode::PREMULTIPLY,
            cull_mode: CullMode::None,
            depth_compare: DepthCompare::Less,
            depth_test_enabled: false,
            depth_write_enabled: false,
            viewport: None,
            scissor: None,
        }
    }

    /// Draws the whole of `mesh`, instanced when it has an instance buffer.
    pub fn from_mesh<V: Vertex, I: IndexElement, Inst: Vertex>(
        target: Option<&'a Target>,
        mesh: &'a Mesh<V, I, Inst>,
        material: &'a Material,
    ) -> Self {
        let mut cmd = Self::new(material);
        cmd.target = target;

        let vertices = mesh.vertex_buffer();
        cmd.vertex_buffers.push(VertexBufferBinding {
            buffer: vertices.handle,
            format: &vertices.format,
            instanced: false,
        });

        if let Some(instances) = mesh.instance_buffer() {
            cmd.vertex_buffers.push(VertexBufferBinding {
                buffer: instances.handle,
                format: &instances.format,
                instanced: true,
            });
            cmd.instance_count = mesh.instance_count();
        }

        if mesh.index_buffer().is_null() {
            cmd.vertex_count = mesh.vertex_count();
        } else {
            cmd.index_buffer = mesh.index_buffer();
            cmd.index_count = mesh.index_count();
            cmd.index_size = size_of::<I>() as u32;
        }

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceConfig, HeadlessBackend, ShaderHandle, VertexElement, VertexType};
    use bytemuck::{Pod, Zeroable};
    use glam::UVec2;

    #[repr(C)]
    #[derive(Debug, Copy, Clone, Pod, Zeroable)]
    struct Point {
        pos: [f32; 2],
    }

    impl Vertex for Point {
        fn format() -> VertexFormat {
            VertexFormat::new(&[VertexElement::new(0, VertexType::Float2, false)])
        }
    }

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(), DeviceConfig::default(), UVec2::new(32, 32)).unwrap()
    }

    #[test]
    fn indexed_mesh_binds_indices() {
        let mut d = device();
        let mut mesh: Mesh<Point, u16> = Mesh::new(&mut d).unwrap();
        mesh.set_vertices(&mut d, &[Point { pos: [0.0, 0.0] }; 3], 0).unwrap();
        mesh.set_indices(&mut d, &[0, 1, 2], 0).unwrap();

        let material = Material::new(ShaderHandle::NULL);
        let cmd = DrawCommand::from_mesh(None, &mesh, &material);

        assert_eq!(cmd.index_buffer, mesh.index_buffer());
        assert_eq!(cmd.index_count, 3);
        assert_eq!(cmd.index_size, 2);
        assert_eq!(cmd.vertex_buffers.len(), 1);
        assert!(!cmd.vertex_buffers[0].instanced);
        assert_eq!(cmd.instance_count, 1);
    }

    #[test]
    fn instance_buffer_is_bound_per_instance() {
        let mut d = device();
        let mut mesh: Mesh<Point, u32, Point> = Mesh::new(&mut d).unwrap();
        mesh.set_instances(&mut d, &[Point { pos: [1.0, 1.0] }; 5], 0).unwrap();

        let material = Material::new(ShaderHandle::NULL);
        let cmd = DrawCommand::from_mesh(None, &mesh, &material);

        assert_eq!(cmd.vertex_buffers.len(), 2);
        assert!(cmd.vertex_buffers[1].instanced);
        assert_eq!(cmd.instance_count, 5);
    }

    #[test]
    fn defaults_draw_to_framebuffer_with_premultiplied_blend() {
        let material = Material::default();
        let cmd = DrawCommand::new(&material);
        assert!(cmd.target.is_none());
        assert_eq!(cmd.blend_mode, BlendMode::PREMULTIPLY);
        assert!(!cmd.depth_test_enabled);
    }
}
