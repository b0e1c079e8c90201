use kurbo::Affine;

use crate::foundation::{core::Color, geometry::Rect, transform::map_enclosing_rect};

/// One entry of a render pass filter chain.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterOperation {
    Opacity {
        amount: f32,
    },
    Grayscale {
        amount: f32,
    },
    Brightness {
        amount: f32,
    },
    Blur {
        sigma: f32,
    },
    DropShadow {
        offset_x: i32,
        offset_y: i32,
        sigma: f32,
        color: Color,
    },
    /// Magnifier: content within `inset` pixels of the edge is pulled inwards.
    Zoom {
        amount: f32,
        inset: i32,
    },
}

impl FilterOperation {
    /// Return `true` when an output pixel depends on input pixels at other positions.
    pub fn moves_pixels(&self) -> bool {
        matches!(
            self,
            FilterOperation::Blur { .. }
                | FilterOperation::DropShadow { .. }
                | FilterOperation::Zoom { .. }
        )
    }

    /// Largest distance, in pixels, that content may travel through this filter.
    pub fn max_pixel_movement(&self) -> f32 {
        match *self {
            FilterOperation::Blur { sigma } => 3.0 * sigma.abs(),
            FilterOperation::DropShadow {
                offset_x,
                offset_y,
                sigma,
                ..
            } => offset_x.unsigned_abs().max(offset_y.unsigned_abs()) as f32 + 3.0 * sigma.abs(),
            FilterOperation::Zoom { inset, .. } => inset.max(0) as f32,
            FilterOperation::Opacity { .. }
            | FilterOperation::Grayscale { .. }
            | FilterOperation::Brightness { .. } => 0.0,
        }
    }
}

/// Ordered filter chain applied to a render pass (foreground or backdrop).
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FilterOperations(pub Vec<FilterOperation>);

impl FilterOperations {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_filter_that_moves_pixels(&self) -> bool {
        self.0.iter().any(FilterOperation::moves_pixels)
    }

    /// Largest pixel movement across the chain.
    pub fn maximum_pixel_movement(&self) -> f32 {
        self.0
            .iter()
            .map(FilterOperation::max_pixel_movement)
            .fold(0.0, f32::max)
    }

    /// Grow `rect` by the chain's maximum pixel movement.
    pub fn expand_rect(&self, rect: Rect) -> Rect {
        let movement = f64::from(self.maximum_pixel_movement());
        if movement <= 0.0 {
            return rect;
        }
        Rect::from_kurbo_enclosing(rect.to_kurbo().inflate(movement, movement))
    }
}

/// Rect in target space that a render pass quad with pixel-moving foreground `filters` may
/// touch: the quad rect grown by the filters' reach, then mapped by `quad_to_target`.
pub fn expanded_rect_with_pixel_moving_foreground_filter(
    quad_rect: Rect,
    quad_to_target: &Affine,
    filters: &FilterOperations,
) -> Rect {
    map_enclosing_rect(quad_to_target, filters.expand_rect(quad_rect))
}

#[cfg(test)]
#[path = "../../tests/unit/quads/filters.rs"]
mod tests;
