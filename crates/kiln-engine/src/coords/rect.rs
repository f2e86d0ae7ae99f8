use glam::{IVec2, Vec2};

/// Axis-aligned rectangle in pixels (top-left origin).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub fn from_pos_size(pos: Vec2, size: Vec2) -> Self {
        Self::new(pos.x, pos.y, size.x, size.y)
    }

    #[inline]
    pub fn position(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    #[inline]
    pub fn size(self) -> Vec2 {
        Vec2::new(self.w, self.h)
    }

    #[inline]
    pub fn left(self) -> f32 {
        self.x
    }

    #[inline]
    pub fn right(self) -> f32 {
        self.x + self.w
    }

    #[inline]
    pub fn top(self) -> f32 {
        self.y
    }

    #[inline]
    pub fn bottom(self) -> f32 {
        self.y + self.h
    }

    #[inline]
    pub fn top_left(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    #[inline]
    pub fn top_right(self) -> Vec2 {
        Vec2::new(self.x + self.w, self.y)
    }

    #[inline]
    pub fn bottom_right(self) -> Vec2 {
        Vec2::new(self.x + self.w, self.y + self.h)
    }

    #[inline]
    pub fn bottom_left(self) -> Vec2 {
        Vec2::new(self.x, self.y + self.h)
    }

    #[inline]
    pub fn center(self) -> Vec2 {
        Vec2::new(self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    /// Grows the rectangle by `amount` on every side (shrinks for negative values).
    #[inline]
    pub fn inflate(self, amount: f32) -> Self {
        Self::new(self.x - amount, self.y - amount, self.w + amount * 2.0, self.h + amount * 2.0)
    }

    /// Half-open containment: [min, max).
    #[inline]
    pub fn contains(self, p: Vec2) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    #[inline]
    pub fn overlaps(self, other: Rect) -> bool {
        self.right() > other.x && self.bottom() > other.y && self.x < other.right() && self.y < other.bottom()
    }

    /// Overlapping region, or `None` when the rectangles only touch or are disjoint.
    pub fn intersect(self, other: Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());

        (x1 > x0 && y1 > y0).then(|| Rect::new(x0, y0, x1 - x0, y1 - y0))
    }
}

/// Integer rectangle used for viewports and scissors.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct RectI {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl RectI {
    #[inline]
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub fn from_size(size: IVec2) -> Self {
        Self::new(0, 0, size.x, size.y)
    }

    #[inline]
    pub fn position(self) -> IVec2 {
        IVec2::new(self.x, self.y)
    }

    #[inline]
    pub fn size(self) -> IVec2 {
        IVec2::new(self.w, self.h)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Overlapping region; empty (zero-size) when disjoint.
    pub fn intersect(self, other: RectI) -> RectI {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.w).min(other.x + other.w);
        let y1 = (self.y + self.h).min(other.y + other.h);

        if x1 <= x0 || y1 <= y0 {
            RectI::new(x0, y0, 0, 0)
        } else {
            RectI::new(x0, y0, x1 - x0, y1 - y0)
        }
    }
}

impl From<RectI> for Rect {
    fn from(r: RectI) -> Self {
        Rect::new(r.x as f32, r.y as f32, r.w as f32, r.h as f32)
    }
}
