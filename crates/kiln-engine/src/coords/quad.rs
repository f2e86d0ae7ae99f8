use glam::Vec2;

use super::Rect;

/// Four-cornered polygon, corners in drawing order `a -> b -> c -> d`.
///
/// Built from a [`Rect`] the corners run top-left, top-right, bottom-right,
/// bottom-left, so the edge normals point outward in y-down space.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Quad {
    pub a: Vec2,
    pub b: Vec2,
    pub c: Vec2,
    pub d: Vec2,
}

impl Quad {
    #[inline]
    pub const fn new(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> Self {
        Self { a, b, c, d }
    }

    #[inline]
    pub fn points(self) -> [Vec2; 4] {
        [self.a, self.b, self.c, self.d]
    }

    #[inline]
    pub fn center(self) -> Vec2 {
        (self.a + self.b + self.c + self.d) * 0.25
    }

    #[inline]
    pub fn translate(self, amount: Vec2) -> Self {
        Self::new(self.a + amount, self.b + amount, self.c + amount, self.d + amount)
    }

    #[inline]
    pub fn normal_ab(self) -> Vec2 {
        edge_normal(self.a, self.b)
    }

    #[inline]
    pub fn normal_bc(self) -> Vec2 {
        edge_normal(self.b, self.c)
    }

    #[inline]
    pub fn normal_cd(self) -> Vec2 {
        edge_normal(self.c, self.d)
    }

    #[inline]
    pub fn normal_da(self) -> Vec2 {
        edge_normal(self.d, self.a)
    }

    pub fn bounding_rect(self) -> Rect {
        let min = self.a.min(self.b).min(self.c).min(self.d);
        let max = self.a.max(self.b).max(self.c).max(self.d);
        Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }
}

impl From<Rect> for Quad {
    fn from(r: Rect) -> Self {
        Self::new(r.top_left(), r.top_right(), r.bottom_right(), r.bottom_left())
    }
}

/// Unit perpendicular of the edge `from -> to`, rotated a quarter turn
/// counter-clockwise in y-down space. Zero for degenerate edges.
#[inline]
fn edge_normal(from: Vec2, to: Vec2) -> Vec2 {
    let dir = (to - from).normalize_or_zero();
    Vec2::new(dir.y, -dir.x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_quad_normals_point_outward() {
        let q = Quad::from(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(q.normal_ab(), Vec2::new(0.0, -1.0));
        assert_eq!(q.normal_bc(), Vec2::new(1.0, 0.0));
        assert_eq!(q.normal_cd(), Vec2::new(0.0, 1.0));
        assert_eq!(q.normal_da(), Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn bounding_rect_covers_all_corners() {
        let q = Quad::new(
            Vec2::new(5.0, 0.0),
            Vec2::new(10.0, 5.0),
            Vec2::new(5.0, 10.0),
            Vec2::new(0.0, 5.0),
        );
        assert_eq!(q.bounding_rect(), Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(q.center(), Vec2::new(5.0, 5.0));
    }

    #[test]
    fn degenerate_edge_has_zero_normal() {
        let p = Vec2::new(1.0, 1.0);
        assert_eq!(Quad::new(p, p, p, p).normal_ab(), Vec2::ZERO);
    }
}
