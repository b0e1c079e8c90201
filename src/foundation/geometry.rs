//! Integer pixel geometry.
//!
//! Damage, clip and output rectangles are integer-aligned so that unions and intersections are
//! exact. Float geometry goes through `kurbo` and is snapped back with the `from_kurbo_*`
//! constructors.

/// Integer size in pixels. Negative extents are clamped to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Size {
    /// Build a size, clamping negative extents to zero.
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width: width.max(0),
            height: height.max(0),
        }
    }

    /// Return `true` when either extent is zero.
    pub fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Integer axis-aligned rectangle `[x, x + width) x [y, y + height)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    /// Build a rect, clamping negative extents to zero.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width: width.max(0),
            height: height.max(0),
        }
    }

    /// Rect at the origin with the given size.
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Build a rect from its left/top/right/bottom edges.
    pub fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(
            left,
            top,
            right.saturating_sub(left),
            bottom.saturating_sub(top),
        )
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Size of the rect.
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Return `true` when the rect covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Return `true` when `other` lies fully inside `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Return `true` when both rects are non-empty and overlap.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.is_empty()
            || other.is_empty()
            || other.x >= self.right()
            || other.right() <= self.x
            || other.y >= self.bottom()
            || other.bottom() <= self.y)
    }

    /// Shrink `self` to the overlap with `other`. A disjoint result becomes the empty rect at
    /// the origin.
    pub fn intersect(&mut self, other: &Rect) {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if left >= right || top >= bottom {
            *self = Rect::default();
            return;
        }
        *self = Rect::from_ltrb(left, top, right, bottom);
    }

    /// Overlap of two rects.
    pub fn intersection(mut self, other: &Rect) -> Rect {
        self.intersect(other);
        self
    }

    /// Grow `self` to the bounding box of `self` and `other`. Empty rects are ignored.
    pub fn union(&mut self, other: &Rect) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        *self = Rect::from_ltrb(left, top, right, bottom);
    }

    /// Bounding box of two rects.
    pub fn union_with(mut self, other: &Rect) -> Rect {
        self.union(other);
        self
    }

    /// Compare edges with a per-edge pixel tolerance.
    /// A negative tolerance matches nothing.
    pub fn approximately_equal(&self, other: &Rect, tolerance: i32) -> bool {
        let Ok(tolerance) = u32::try_from(tolerance) else {
            return false;
        };
        self.x.abs_diff(other.x) <= tolerance
            && self.y.abs_diff(other.y) <= tolerance
            && self.right().abs_diff(other.right()) <= tolerance
            && self.bottom().abs_diff(other.bottom()) <= tolerance
    }

    /// Move the rect by `(dx, dy)`.
    pub fn offset(self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Move each edge inwards by the given amounts. Negative amounts grow the rect.
    pub fn inset(self, top: i32, left: i32, bottom: i32, right: i32) -> Rect {
        Rect::from_ltrb(
            self.x.saturating_add(left),
            self.y.saturating_add(top),
            self.right().saturating_sub(right),
            self.bottom().saturating_sub(bottom),
        )
    }

    /// Scale the edges and return the smallest integer rect containing the result.
    pub fn scale_to_enclosing(self, sx: f32, sy: f32) -> Rect {
        if sx == 1.0 && sy == 1.0 {
            return self;
        }
        let r = kurbo::Rect::new(
            f64::from(self.x) * f64::from(sx),
            f64::from(self.y) * f64::from(sy),
            f64::from(self.right()) * f64::from(sx),
            f64::from(self.bottom()) * f64::from(sy),
        );
        Rect::from_kurbo_enclosing(r)
    }

    /// Float view of the rect.
    pub fn to_kurbo(self) -> kurbo::Rect {
        kurbo::Rect::new(
            f64::from(self.x),
            f64::from(self.y),
            f64::from(self.right()),
            f64::from(self.bottom()),
        )
    }

    /// Smallest integer rect containing `r`.
    pub fn from_kurbo_enclosing(r: kurbo::Rect) -> Rect {
        Self::from_float_edges(r.x0.floor(), r.y0.floor(), r.x1.ceil(), r.y1.ceil())
    }

    /// Smallest integer rect containing `r`, ignoring edge overshoot up to `epsilon`.
    ///
    /// Float transforms turn exact integer edges into values like `9.0000001`; snapping those
    /// outwards would grow damage by a pixel on every hop.
    pub fn from_kurbo_enclosing_ignoring_error(r: kurbo::Rect, epsilon: f64) -> Rect {
        Self::from_float_edges(
            (r.x0 + epsilon).floor(),
            (r.y0 + epsilon).floor(),
            (r.x1 - epsilon).ceil(),
            (r.y1 - epsilon).ceil(),
        )
    }

    /// Largest integer rect contained in `r`.
    pub fn from_kurbo_enclosed(r: kurbo::Rect) -> Rect {
        Self::from_float_edges(r.x0.ceil(), r.y0.ceil(), r.x1.floor(), r.y1.floor())
    }

    fn from_float_edges(left: f64, top: f64, right: f64, bottom: f64) -> Rect {
        if !(left.is_finite() && top.is_finite() && right.is_finite() && bottom.is_finite()) {
            return Rect::default();
        }
        let clamp = |v: f64| v.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
        let (left, top, right, bottom) = (clamp(left), clamp(top), clamp(right), clamp(bottom));
        if right <= left || bottom <= top {
            return Rect::new(left, top, 0, 0);
        }
        Rect::from_ltrb(left, top, right, bottom)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

impl std::str::FromStr for Rect {
    type Err = String;

    /// Parse `x,y,w,h`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid rect '{s}': {e}"))?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(Rect::new(*x, *y, *w, *h)),
            _ => Err(format!("invalid rect '{s}': expected x,y,w,h")),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/geometry.rs"]
mod tests;
