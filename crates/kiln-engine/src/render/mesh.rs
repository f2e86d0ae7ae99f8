use std::marker::PhantomData;

use anyhow::{Result, bail};
use bytemuck::Pod;

use crate::device::{BufferDef, BufferHandle, BufferUsage, IndexElement, RenderDevice, VertexFormat};

/// A vertex (or per-instance) struct with a fixed GPU layout.
pub trait Vertex {
    fn format() -> VertexFormat;
}

/// Stands in for "no instance data".
impl Vertex for () {
    fn format() -> VertexFormat {
        VertexFormat::default()
    }
}

/// Buffer handle plus the layout of its elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBuffer {
    pub handle: BufferHandle,
    pub format: VertexFormat,
}

/// Vertex, index and optional instance buffers drawn together.
///
/// `Inst = ()` means the mesh has no instance buffer. Buffers start at a
/// minimal size and are grown by the device as data is written. Like every
/// device resource, a mesh has to be [`dispose`](Self::dispose)d explicitly.
pub struct Mesh<V: Vertex, I: IndexElement = u32, Inst: Vertex = ()> {
    vertex_buffer: VertexBuffer,
    index_buffer: BufferHandle,
    instance_buffer: Option<VertexBuffer>,
    vertex_count: u32,
    index_count: u32,
    instance_count: u32,
    _marker: PhantomData<fn() -> (V, I, Inst)>,
}

// Some backends reject zero-sized buffers.
const INITIAL_BUFFER_SIZE: u32 = 4;

impl<V: Vertex, I: IndexElement, Inst: Vertex> Mesh<V, I, Inst> {
    pub fn new(device: &mut dyn RenderDevice) -> Result<Self> {
        let vertex = device.create_buffer(&BufferDef {
            usage: BufferUsage::Vertex,
            size: INITIAL_BUFFER_SIZE,
            data: &[],
        })?;

        let index = device.create_buffer(&BufferDef {
            usage: BufferUsage::Index,
            size: INITIAL_BUFFER_SIZE,
            data: &[],
        })?;

        let instance = if size_of::<Inst>() > 0 {
            let handle = device.create_buffer(&BufferDef {
                usage: BufferUsage::Vertex,
                size: INITIAL_BUFFER_SIZE,
                data: &[],
            })?;
            Some(VertexBuffer { handle, format: Inst::format() })
        } else {
            None
        };

        Ok(Self {
            vertex_buffer: VertexBuffer { handle: vertex, format: V::format() },
            index_buffer: index,
            instance_buffer: instance,
            vertex_count: 0,
            index_count: 0,
            instance_count: 1,
            _marker: PhantomData,
        })
    }

    /// Writes `data` starting at vertex `offset`.
    pub fn set_vertices(&mut self, device: &mut dyn RenderDevice, data: &[V], offset: u32) -> Result<()>
    where
        V: Pod,
    {
        self.vertex_count = self.vertex_count.max(offset + data.len() as u32);
        device.set_buffer_data(
            self.vertex_buffer.handle,
            bytemuck::cast_slice(data),
            offset * size_of::<V>() as u32,
        )
    }

    /// Writes `data` starting at index `offset`.
    pub fn set_indices(&mut self, device: &mut dyn RenderDevice, data: &[I], offset: u32) -> Result<()> {
        self.index_count = self.index_count.max(offset + data.len() as u32);
        device.set_buffer_data(self.index_buffer, bytemuck::cast_slice(data), offset * size_of::<I>() as u32)
    }

    /// Writes `data` starting at instance `offset`.
    pub fn set_instances(&mut self, device: &mut dyn RenderDevice, data: &[Inst], offset: u32) -> Result<()>
    where
        Inst: Pod,
    {
        let Some(instances) = &self.instance_buffer else {
            bail!("mesh was created without an instance buffer");
        };

        self.instance_count = self.instance_count.max(offset + data.len() as u32);
        device.set_buffer_data(
            instances.handle,
            bytemuck::cast_slice(data),
            offset * size_of::<Inst>() as u32,
        )
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    #[inline]
    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.vertex_buffer
    }

    #[inline]
    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    #[inline]
    pub fn instance_buffer(&self) -> Option<&VertexBuffer> {
        self.instance_buffer.as_ref()
    }

    /// Resets the element counts. GPU memory is kept.
    pub fn clear(&mut self) {
        self.vertex_count = 0;
        self.index_count = 0;
        self.instance_count = 1;
    }

    pub fn dispose(self, device: &mut dyn RenderDevice) {
        device.dispose_buffer(self.vertex_buffer.handle);
        device.dispose_buffer(self.index_buffer);
        if let Some(instances) = self.instance_buffer {
            device.dispose_buffer(instances.handle);
        }
    }
}
