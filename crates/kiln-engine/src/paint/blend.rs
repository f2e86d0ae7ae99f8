use super::Color;

/// Blend equation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend factor applied to the source or destination term.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

bitflags::bitflags! {
    /// Color channels written by a draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BlendMask: u8 {
        const RED = 0b0001;
        const GREEN = 0b0010;
        const BLUE = 0b0100;
        const ALPHA = 0b1000;
        const RGB = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits();
        const RGBA = Self::RGB.bits() | Self::ALPHA.bits();
    }
}

/// Full fixed-function blend state.
///
/// Every field participates in pipeline identity, including the constant
/// `color` used by the `ConstantColor` factors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlendMode {
    pub color_op: BlendOp,
    pub color_src: BlendFactor,
    pub color_dst: BlendFactor,
    pub alpha_op: BlendOp,
    pub alpha_src: BlendFactor,
    pub alpha_dst: BlendFactor,
    pub mask: BlendMask,
    pub color: Color,
}

impl BlendMode {
    pub const PREMULTIPLY: BlendMode = BlendMode::simple(BlendOp::Add, BlendFactor::One, BlendFactor::OneMinusSrcAlpha);
    pub const NON_PREMULTIPLIED: BlendMode =
        BlendMode::simple(BlendOp::Add, BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
    pub const ADD: BlendMode = BlendMode::simple(BlendOp::Add, BlendFactor::One, BlendFactor::DstAlpha);
    pub const SUBTRACT: BlendMode = BlendMode::simple(BlendOp::ReverseSubtract, BlendFactor::One, BlendFactor::One);
    pub const MULTIPLY: BlendMode = BlendMode::simple(BlendOp::Add, BlendFactor::DstColor, BlendFactor::OneMinusSrcAlpha);
    pub const SCREEN: BlendMode = BlendMode::simple(BlendOp::Add, BlendFactor::One, BlendFactor::OneMinusSrcColor);

    /// Same equation for color and alpha, all channels written, white constant.
    pub const fn simple(op: BlendOp, src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            color_op: op,
            color_src: src,
            color_dst: dst,
            alpha_op: op,
            alpha_src: src,
            alpha_dst: dst,
            mask: BlendMask::RGBA,
            color: Color::WHITE,
        }
    }
}

impl Default for BlendMode {
    fn default() -> Self {
        Self::PREMULTIPLY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_composites() {
        assert_eq!(BlendMask::RGBA.bits(), 0b1111);
        assert!(BlendMask::RGBA.contains(BlendMask::RGB));
        assert!(!BlendMask::RGB.contains(BlendMask::ALPHA));
    }

    #[test]
    fn simple_mirrors_color_into_alpha() {
        let b = BlendMode::SUBTRACT;
        assert_eq!(b.alpha_op, BlendOp::ReverseSubtract);
        assert_eq!(b.alpha_src, b.color_src);
        assert_eq!(b.alpha_dst, b.color_dst);
    }

    #[test]
    fn presets_are_distinct() {
        let presets = [
            BlendMode::PREMULTIPLY,
            BlendMode::NON_PREMULTIPLIED,
            BlendMode::ADD,
            BlendMode::SUBTRACT,
            BlendMode::MULTIPLY,
            BlendMode::SCREEN,
        ];
        for (i, a) in presets.iter().enumerate() {
            for b in &presets[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
