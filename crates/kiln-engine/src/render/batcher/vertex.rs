use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::device::{VertexElement, VertexFormat, VertexType};
use crate::paint::Color;
use crate::render::Vertex;

/// How the fragment shader combines texture and vertex color.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum BatcherMode {
    /// texture × color
    #[default]
    Normal,
    /// texture alpha × color
    Wash,
    /// color only, texture ignored
    Fill,
}

impl BatcherMode {
    /// Weights of the three shader terms, one per byte.
    #[inline]
    pub const fn weights(self) -> [u8; 4] {
        match self {
            BatcherMode::Normal => [255, 0, 0, 0],
            BatcherMode::Wash => [0, 255, 0, 0],
            BatcherMode::Fill => [0, 0, 255, 0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct BatcherVertex {
    pub pos: [f32; 2],
    pub tex: [f32; 2],
    pub color: [u8; 4],
    pub mode: [u8; 4],
}

impl BatcherVertex {
    #[inline]
    pub fn new(pos: Vec2, tex: Vec2, color: Color, mode: BatcherMode) -> Self {
        Self {
            pos: pos.to_array(),
            tex: tex.to_array(),
            color: [color.r, color.g, color.b, color.a],
            mode: mode.weights(),
        }
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::from_array(self.pos)
    }
}

impl Vertex for BatcherVertex {
    fn format() -> VertexFormat {
        VertexFormat::of::<BatcherVertex>(&[
            VertexElement::new(0, VertexType::Float2, false),
            VertexElement::new(1, VertexType::Float2, false),
            VertexElement::new(2, VertexType::UByte4, true),
            VertexElement::new(3, VertexType::UByte4, true),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_tightly_packed() {
        let format = BatcherVertex::format();
        assert_eq!(format.stride(), 24);
        assert_eq!(format.stride(), VertexFormat::new(format.elements()).stride());
        let offsets: Vec<u32> = format.offsets().map(|(_, o)| o).collect();
        assert_eq!(offsets, vec![0, 8, 16, 20]);
    }

    #[test]
    fn mode_weights_select_one_term() {
        let v = BatcherVertex::new(Vec2::ZERO, Vec2::ZERO, Color::RED, BatcherMode::Fill);
        assert_eq!(v.mode, [0, 0, 255, 0]);
        assert_eq!(v.color, [255, 0, 0, 255]);
    }
}
