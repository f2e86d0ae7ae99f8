//! Plain render-state vocabulary shared by the device, its backends and the
//! render helpers.

use glam::UVec2;

use crate::paint::Color;

/// Pixel format of a texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    R8G8B8A8,
    R8,
    Depth24Stencil8,
    /// Shorthand for [`TextureFormat::R8G8B8A8`].
    #[default]
    Color,
}

impl TextureFormat {
    /// Bytes per texel.
    #[inline]
    pub const fn size(self) -> u32 {
        match self {
            TextureFormat::R8G8B8A8 | TextureFormat::Color => 4,
            TextureFormat::R8 => 1,
            TextureFormat::Depth24Stencil8 => 4,
        }
    }

    #[inline]
    pub const fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth24Stencil8)
    }

    /// Collapses aliases so that equal formats compare equal.
    #[inline]
    pub const fn canonical(self) -> Self {
        match self {
            TextureFormat::Color => TextureFormat::R8G8B8A8,
            other => other,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum SampleCount {
    #[default]
    One,
    Two,
    Four,
    Eight,
}

impl SampleCount {
    #[inline]
    pub const fn count(self) -> u32 {
        match self {
            SampleCount::One => 1,
            SampleCount::Two => 2,
            SampleCount::Four => 4,
            SampleCount::Eight => 8,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    #[default]
    Repeat,
    MirroredRepeat,
    Clamp,
}

/// Sampling state. One backend sampler exists per distinct value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextureSampler {
    pub filter: TextureFilter,
    pub wrap_x: TextureWrap,
    pub wrap_y: TextureWrap,
}

impl TextureSampler {
    #[inline]
    pub const fn new(filter: TextureFilter, wrap_x: TextureWrap, wrap_y: TextureWrap) -> Self {
        Self { filter, wrap_x, wrap_y }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Sixteen,
    ThirtyTwo,
}

impl IndexFormat {
    #[inline]
    pub const fn size(self) -> u32 {
        match self {
            IndexFormat::Sixteen => 2,
            IndexFormat::ThirtyTwo => 4,
        }
    }
}

/// Integer types usable as mesh indices.
pub trait IndexElement: bytemuck::Pod {
    const FORMAT: IndexFormat;
}

impl IndexElement for u16 {
    const FORMAT: IndexFormat = IndexFormat::Sixteen;
}

impl IndexElement for u32 {
    const FORMAT: IndexFormat = IndexFormat::ThirtyTwo;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum DepthCompare {
    Always,
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
}

bitflags::bitflags! {
    /// Aspects of a target affected by a clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u8 {
        const COLOR = 0b001;
        const DEPTH = 0b010;
        const STENCIL = 0b100;
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits() | Self::STENCIL.bits();
    }
}

/// Clear request for a render target.
///
/// Only the aspects named by `mask` are cleared; the others are loaded.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClearInfo {
    pub color: Color,
    pub depth: f32,
    pub stencil: u8,
    pub mask: ClearMask,
}

impl ClearInfo {
    pub fn color(color: Color) -> Self {
        Self { color, mask: ClearMask::COLOR, ..Self::default() }
    }

    #[inline]
    pub fn clears_color(&self) -> bool {
        self.mask.contains(ClearMask::COLOR)
    }

    #[inline]
    pub fn clears_depth(&self) -> bool {
        self.mask.contains(ClearMask::DEPTH)
    }

    #[inline]
    pub fn clears_stencil(&self) -> bool {
        self.mask.contains(ClearMask::STENCIL)
    }
}

impl Default for ClearInfo {
    fn default() -> Self {
        Self {
            color: Color::TRANSPARENT,
            depth: 1.0,
            stencil: 0,
            mask: ClearMask::ALL,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexType {
    Float,
    Float2,
    Float3,
    Float4,
    Byte4,
    UByte4,
    Short2,
    UShort2,
    Short4,
    UShort4,
}

impl VertexType {
    #[inline]
    pub const fn size(self) -> u32 {
        match self {
            VertexType::Float => 4,
            VertexType::Float2 => 8,
            VertexType::Float3 => 12,
            VertexType::Float4 => 16,
            VertexType::Byte4 | VertexType::UByte4 => 4,
            VertexType::Short2 | VertexType::UShort2 => 4,
            VertexType::Short4 | VertexType::UShort4 => 8,
        }
    }
}

/// One attribute of a vertex layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexElement {
    /// Shader location.
    pub index: u32,
    pub ty: VertexType,
    pub normalized: bool,
}

impl VertexElement {
    #[inline]
    pub const fn new(index: u32, ty: VertexType, normalized: bool) -> Self {
        Self { index, ty, normalized }
    }
}

/// Immutable vertex layout: tightly packed elements plus a stride.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexFormat {
    elements: Vec<VertexElement>,
    stride: u32,
}

impl VertexFormat {
    /// Layout whose stride is the sum of the element sizes.
    pub fn new(elements: &[VertexElement]) -> Self {
        let stride = elements.iter().map(|e| e.ty.size()).sum();
        Self { elements: elements.to_vec(), stride }
    }

    /// Layout whose stride is the size of the vertex struct `V`.
    pub fn of<V>(elements: &[VertexElement]) -> Self {
        Self::with_stride(elements, size_of::<V>() as u32)
    }

    pub fn with_stride(elements: &[VertexElement], stride: u32) -> Self {
        Self { elements: elements.to_vec(), stride }
    }

    #[inline]
    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Byte offset of each element, in declaration order.
    pub fn offsets(&self) -> impl Iterator<Item = (VertexElement, u32)> + '_ {
        self.elements.iter().scan(0u32, |offset, e| {
            let at = *offset;
            *offset += e.ty.size();
            Some((*e, at))
        })
    }
}

/// Texture creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct TextureDef<'a> {
    pub size: UVec2,
    pub format: TextureFormat,
    pub sample_count: SampleCount,
    /// Optional initial pixels, tightly packed rows.
    pub data: &'a [u8],
    pub is_target_attachment: bool,
}

impl Default for TextureDef<'_> {
    fn default() -> Self {
        Self {
            size: UVec2::ONE,
            format: TextureFormat::Color,
            sample_count: SampleCount::One,
            data: &[],
            is_target_attachment: false,
        }
    }
}

/// Buffer creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct BufferDef<'a> {
    pub usage: BufferUsage,
    pub size: u32,
    pub data: &'a [u8],
}

/// One programmable stage of a shader.
///
/// `code` is opaque to the device and handed to the backend as-is.
#[derive(Debug, Clone, Copy)]
pub struct ShaderStageDef<'a> {
    pub code: &'a [u8],
    pub entrypoint: &'a str,
    pub num_samplers: u32,
    pub num_uniform_buffers: u32,
}

impl Default for ShaderStageDef<'_> {
    fn default() -> Self {
        Self {
            code: &[],
            entrypoint: "main",
            num_samplers: 0,
            num_uniform_buffers: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShaderDef<'a> {
    pub name: &'a str,
    pub vertex: ShaderStageDef<'a>,
    pub fragment: ShaderStageDef<'a>,
}

/// Programmable stage a binding belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_sums_element_sizes() {
        let f = VertexFormat::new(&[
            VertexElement::new(0, VertexType::Float2, false),
            VertexElement::new(1, VertexType::UByte4, true),
        ]);
        assert_eq!(f.stride(), 12);
        let offsets: Vec<u32> = f.offsets().map(|(_, o)| o).collect();
        assert_eq!(offsets, vec![0, 8]);
    }

    #[test]
    fn explicit_stride_overrides() {
        #[allow(dead_code)]
        struct Padded([f32; 4]);
        let f = VertexFormat::of::<Padded>(&[VertexElement::new(0, VertexType::Float2, false)]);
        assert_eq!(f.stride(), 16);
        assert_ne!(f, VertexFormat::new(&[VertexElement::new(0, VertexType::Float2, false)]));
    }

    #[test]
    fn color_alias_is_rgba8() {
        assert_eq!(TextureFormat::Color.canonical(), TextureFormat::R8G8B8A8);
        assert_eq!(TextureFormat::Color.size(), 4);
        assert!(TextureFormat::Depth24Stencil8.is_depth());
    }

    #[test]
    fn clear_info_mask_queries() {
        let c = ClearInfo::color(Color::RED);
        assert!(c.clears_color());
        assert!(!c.clears_depth());
        assert!(ClearInfo::default().clears_stencil());
    }
}
