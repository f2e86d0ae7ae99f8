//! Engine render-state vocabulary to wgpu types.

use crate::device::types::{
    CullMode, DepthCompare, IndexFormat, SampleCount, TextureFilter, TextureFormat, TextureSampler,
    TextureWrap, VertexFormat, VertexType,
};
use crate::paint::{BlendFactor, BlendMask, BlendMode, BlendOp, Color};

pub fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format.canonical() {
        TextureFormat::R8 => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        _ => wgpu::TextureFormat::Rgba8Unorm,
    }
}

#[inline]
pub fn sample_count(count: SampleCount) -> u32 {
    count.count()
}

pub fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Sixteen => wgpu::IndexFormat::Uint16,
        IndexFormat::ThirtyTwo => wgpu::IndexFormat::Uint32,
    }
}

pub fn cull_mode(mode: CullMode) -> Option<wgpu::Face> {
    match mode {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

pub fn compare(compare: DepthCompare) -> wgpu::CompareFunction {
    match compare {
        DepthCompare::Always => wgpu::CompareFunction::Always,
        DepthCompare::Never => wgpu::CompareFunction::Never,
        DepthCompare::Less => wgpu::CompareFunction::Less,
        DepthCompare::Equal => wgpu::CompareFunction::Equal,
        DepthCompare::LessOrEqual => wgpu::CompareFunction::LessEqual,
        DepthCompare::Greater => wgpu::CompareFunction::Greater,
        DepthCompare::NotEqual => wgpu::CompareFunction::NotEqual,
        DepthCompare::GreaterOrEqual => wgpu::CompareFunction::GreaterEqual,
    }
}

pub fn vertex_type(ty: VertexType, normalized: bool) -> wgpu::VertexFormat {
    use wgpu::VertexFormat as F;
    match (ty, normalized) {
        (VertexType::Float, _) => F::Float32,
        (VertexType::Float2, _) => F::Float32x2,
        (VertexType::Float3, _) => F::Float32x3,
        (VertexType::Float4, _) => F::Float32x4,
        (VertexType::Byte4, true) => F::Snorm8x4,
        (VertexType::Byte4, false) => F::Sint8x4,
        (VertexType::UByte4, true) => F::Unorm8x4,
        (VertexType::UByte4, false) => F::Uint8x4,
        (VertexType::Short2, true) => F::Snorm16x2,
        (VertexType::Short2, false) => F::Sint16x2,
        (VertexType::UShort2, true) => F::Unorm16x2,
        (VertexType::UShort2, false) => F::Uint16x2,
        (VertexType::Short4, true) => F::Snorm16x4,
        (VertexType::Short4, false) => F::Sint16x4,
        (VertexType::UShort4, true) => F::Unorm16x4,
        (VertexType::UShort4, false) => F::Uint16x4,
    }
}

pub fn vertex_attributes(format: &VertexFormat) -> Vec<wgpu::VertexAttribute> {
    format
        .offsets()
        .map(|(element, offset)| wgpu::VertexAttribute {
            format: vertex_type(element.ty, element.normalized),
            offset: offset as u64,
            shader_location: element.index,
        })
        .collect()
}

fn blend_op(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::ConstantColor => wgpu::BlendFactor::Constant,
        BlendFactor::OneMinusConstantColor => wgpu::BlendFactor::OneMinusConstant,
        BlendFactor::SrcAlphaSaturate => wgpu::BlendFactor::SrcAlphaSaturated,
    }
}

pub fn blend_state(mode: &BlendMode) -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(mode.color_src),
            dst_factor: blend_factor(mode.color_dst),
            operation: blend_op(mode.color_op),
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(mode.alpha_src),
            dst_factor: blend_factor(mode.alpha_dst),
            operation: blend_op(mode.alpha_op),
        },
    }
}

pub fn color_writes(mask: BlendMask) -> wgpu::ColorWrites {
    let mut writes = wgpu::ColorWrites::empty();
    if mask.contains(BlendMask::RED) {
        writes |= wgpu::ColorWrites::RED;
    }
    if mask.contains(BlendMask::GREEN) {
        writes |= wgpu::ColorWrites::GREEN;
    }
    if mask.contains(BlendMask::BLUE) {
        writes |= wgpu::ColorWrites::BLUE;
    }
    if mask.contains(BlendMask::ALPHA) {
        writes |= wgpu::ColorWrites::ALPHA;
    }
    writes
}

pub fn color(color: Color) -> wgpu::Color {
    let [r, g, b, a] = color.to_f32();
    wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: a as f64 }
}

fn filter(filter: TextureFilter) -> wgpu::FilterMode {
    match filter {
        TextureFilter::Nearest => wgpu::FilterMode::Nearest,
        TextureFilter::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(wrap: TextureWrap) -> wgpu::AddressMode {
    match wrap {
        TextureWrap::Repeat => wgpu::AddressMode::Repeat,
        TextureWrap::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        TextureWrap::Clamp => wgpu::AddressMode::ClampToEdge,
    }
}

pub fn sampler_descriptor(sampler: TextureSampler) -> wgpu::SamplerDescriptor<'static> {
    let filter = filter(sampler.filter);
    wgpu::SamplerDescriptor {
        label: Some("kiln sampler"),
        address_mode_u: address_mode(sampler.wrap_x),
        address_mode_v: address_mode(sampler.wrap_y),
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    }
}
