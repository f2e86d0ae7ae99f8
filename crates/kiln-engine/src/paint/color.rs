use bytemuck::{Pod, Zeroable};

/// 8-bit straight-alpha RGBA color.
///
/// Layout is `[r, g, b, a]`, so the type can be written into vertex data as-is
/// (`Unorm8x4`).
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const LIGHT_GRAY: Color = Color::rgb(192, 192, 192);
    pub const GRAY: Color = Color::rgb(128, 128, 128);
    pub const DARK_GRAY: Color = Color::rgb(64, 64, 64);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const AQUA: Color = Color::rgb(0, 255, 255);
    pub const CYAN: Color = Color::rgb(0, 255, 255);
    pub const MAGENTA: Color = Color::rgb(255, 0, 255);
    pub const CORNFLOWER_BLUE: Color = Color::rgb(100, 149, 237);
    pub const PURPLE: Color = Color::rgb(120, 81, 169);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color.
    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Unpacks `0xRRGGBBAA`.
    #[inline]
    pub const fn from_rgba(rgba: u32) -> Self {
        Self::new((rgba >> 24) as u8, (rgba >> 16) as u8, (rgba >> 8) as u8, rgba as u8)
    }

    /// Creates a color from `[0, 1]` float channels. Out-of-range values saturate.
    #[inline]
    pub fn from_f32(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::new((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8, (a * 255.0) as u8)
    }

    /// Packs as `0xRRGGBBAA`.
    #[inline]
    pub const fn rgba(self) -> u32 {
        (self.r as u32) << 24 | (self.g as u32) << 16 | (self.b as u32) << 8 | self.a as u32
    }

    /// Packs as `0xAABBGGRR`, which is the in-memory order of `[r, g, b, a]`
    /// read as a little-endian `u32`.
    #[inline]
    pub const fn abgr(self) -> u32 {
        (self.a as u32) << 24 | (self.b as u32) << 16 | (self.g as u32) << 8 | self.r as u32
    }

    /// Multiplies RGB by alpha, rounding to nearest.
    #[inline]
    pub fn premultiply(self) -> Self {
        let alpha = self.a as f32 / 255.0;
        Self::new(
            (self.r as f32 * alpha).round() as u8,
            (self.g as f32 * alpha).round() as u8,
            (self.b as f32 * alpha).round() as u8,
            self.a,
        )
    }

    /// Per-channel linear interpolation; `amount` is clamped to `[0, 1]`.
    pub fn lerp(a: Color, b: Color, amount: f32) -> Self {
        let t = amount.clamp(0.0, 1.0);
        let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t) as u8;
        Self::new(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b), mix(a.a, b.a))
    }

    /// Channels as `[0, 1]` floats.
    #[inline]
    pub fn to_f32(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

impl From<u32> for Color {
    fn from(rgba: u32) -> Self {
        Self::from_rgba(rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_orders() {
        let c = Color::new(0x11, 0x22, 0x33, 0x44);
        assert_eq!(c.rgba(), 0x1122_3344);
        assert_eq!(c.abgr(), 0x4433_2211);
        assert_eq!(Color::from_rgba(0x1122_3344), c);
        assert_eq!(u32::from_le_bytes(bytemuck::cast(c)), c.abgr());
    }

    #[test]
    fn premultiply_rounds() {
        let c = Color::new(255, 128, 0, 128).premultiply();
        assert_eq!(c, Color::new(128, 64, 0, 128));
        assert_eq!(Color::WHITE.premultiply(), Color::WHITE);
    }

    #[test]
    fn lerp_clamps_amount() {
        assert_eq!(Color::lerp(Color::BLACK, Color::WHITE, 2.0), Color::WHITE);
        assert_eq!(Color::lerp(Color::BLACK, Color::WHITE, -1.0), Color::BLACK);
        assert_eq!(Color::lerp(Color::BLACK, Color::WHITE, 0.5), Color::rgb(127, 127, 127));
    }

    #[test]
    fn float_constructor_saturates() {
        assert_eq!(Color::from_f32(2.0, 0.0, -1.0, 1.0), Color::new(255, 0, 0, 255));
    }
}
