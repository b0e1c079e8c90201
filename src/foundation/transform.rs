//! Helpers over [`kurbo::Affine`] for mapping integer rects between coordinate spaces.
//!
//! Composition order follows kurbo: `a * b` applies `b` first, then `a`.

use kurbo::Affine;

use crate::foundation::geometry::Rect;

/// Return `true` when `t` is exactly the identity.
pub fn is_identity(t: &Affine) -> bool {
    *t == Affine::IDENTITY
}

/// Return `true` when `t` has no scale, rotation or skew component.
pub fn is_identity_or_translation(t: &Affine) -> bool {
    let [a, b, c, d, _, _] = t.as_coeffs();
    a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0
}

fn is_integer_translation(t: &Affine) -> bool {
    let [_, _, _, _, e, f] = t.as_coeffs();
    is_identity_or_translation(t) && e.fract() == 0.0 && f.fract() == 0.0
}

/// Return `true` when axis-aligned rects stay axis-aligned under `t` (scales, flips and
/// multiples of 90 degree rotations).
pub fn preserves_2d_axis_alignment(t: &Affine) -> bool {
    let [a, b, c, d, _, _] = t.as_coeffs();
    (b == 0.0 && c == 0.0) || (a == 0.0 && d == 0.0)
}

/// Inverse of `t`, or `None` when it is singular.
pub fn try_inverse(t: &Affine) -> Option<Affine> {
    let det = t.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    Some(t.inverse())
}

/// Smallest integer rect containing `rect` mapped through `t`.
pub fn map_enclosing_rect(t: &Affine, rect: Rect) -> Rect {
    if is_integer_translation(t) {
        let [_, _, _, _, e, f] = t.as_coeffs();
        return rect.offset(e as i32, f as i32);
    }
    Rect::from_kurbo_enclosing(t.transform_rect_bbox(rect.to_kurbo()))
}

/// Like [`map_enclosing_rect`], but edges within `epsilon` of an integer snap to it.
pub fn map_enclosing_rect_ignoring_error(t: &Affine, rect: Rect, epsilon: f64) -> Rect {
    if is_integer_translation(t) {
        return map_enclosing_rect(t, rect);
    }
    Rect::from_kurbo_enclosing_ignoring_error(t.transform_rect_bbox(rect.to_kurbo()), epsilon)
}

/// Largest integer rect contained in `rect` mapped through an axis-aligned `t`.
pub fn map_enclosed_rect_axis_aligned(t: &Affine, rect: Rect) -> Rect {
    debug_assert!(preserves_2d_axis_alignment(t));
    if is_integer_translation(t) {
        return map_enclosing_rect(t, rect);
    }
    Rect::from_kurbo_enclosed(t.transform_rect_bbox(rect.to_kurbo()))
}

/// Skew along the y axis by `degrees`, as applied by de-jelly.
pub fn skew_y_degrees(degrees: f32) -> Affine {
    Affine::skew(0.0, f64::from(degrees).to_radians().tan())
}

/// Output rotation/flip the display applies after composition.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DisplayTransform {
    /// No rotation.
    #[default]
    None,
    /// Mirror along the vertical axis.
    FlipHorizontal,
    /// Mirror along the horizontal axis.
    FlipVertical,
    /// Rotate 90 degrees clockwise.
    Rotate90,
    /// Rotate 180 degrees.
    Rotate180,
    /// Rotate 270 degrees clockwise.
    Rotate270,
}

impl DisplayTransform {
    /// Transform mapping a viewport of `viewport` size into the rotated/flipped output.
    pub fn to_affine(self, viewport: kurbo::Size) -> Affine {
        let (w, h) = (viewport.width, viewport.height);
        match self {
            DisplayTransform::None => Affine::IDENTITY,
            DisplayTransform::FlipHorizontal => Affine::new([-1.0, 0.0, 0.0, 1.0, w, 0.0]),
            DisplayTransform::FlipVertical => Affine::new([1.0, 0.0, 0.0, -1.0, 0.0, h]),
            DisplayTransform::Rotate90 => Affine::new([0.0, 1.0, -1.0, 0.0, h, 0.0]),
            DisplayTransform::Rotate180 => Affine::new([-1.0, 0.0, 0.0, -1.0, w, h]),
            DisplayTransform::Rotate270 => Affine::new([0.0, -1.0, 1.0, 0.0, 0.0, w]),
        }
    }
}

impl std::str::FromStr for DisplayTransform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "flip_horizontal" => Ok(Self::FlipHorizontal),
            "flip_vertical" => Ok(Self::FlipVertical),
            "rotate90" => Ok(Self::Rotate90),
            "rotate180" => Ok(Self::Rotate180),
            "rotate270" => Ok(Self::Rotate270),
            other => Err(format!("unknown display transform '{other}'")),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/transform.rs"]
mod tests;
