use kurbo::Affine;

use crate::foundation::{geometry::Rect, transform::preserves_2d_axis_alignment};

/// How a quad's pixels combine with what is already in the target.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    SrcOver,
    Src,
    DstIn,
    Multiply,
    Screen,
}

/// Rounded-rect (and optional gradient) mask applied to quads, in target space.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MaskFilterInfo {
    /// Mask bounds. A zero-area rect means no mask.
    pub bounds: kurbo::Rect,
    /// Uniform corner radius of the mask.
    pub corner_radius: f64,
    /// Whether a gradient mask is attached.
    pub has_gradient_mask: bool,
}

impl MaskFilterInfo {
    pub fn is_empty(&self) -> bool {
        self.bounds.area() <= 0.0 && !self.has_gradient_mask
    }

    pub fn has_rounded_corners(&self) -> bool {
        !self.is_empty() && self.corner_radius > 0.0
    }

    /// Map the mask through `t`. Only axis-preserving transforms keep a rounded rect a
    /// rounded rect; anything else returns `None`.
    pub fn transformed(&self, t: &Affine) -> Option<MaskFilterInfo> {
        if self.is_empty() {
            return Some(*self);
        }
        if !preserves_2d_axis_alignment(t) {
            return None;
        }
        let [a, b, c, d, _, _] = t.as_coeffs();
        let scale = a.hypot(b).min(c.hypot(d));
        Some(MaskFilterInfo {
            bounds: t.transform_rect_bbox(self.bounds),
            corner_radius: self.corner_radius * scale,
            has_gradient_mask: self.has_gradient_mask,
        })
    }
}

/// State shared by a run of consecutive quads in a render pass.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SharedQuadState {
    /// Maps quad space into the render pass (target) space.
    pub quad_to_target_transform: Affine,
    /// Bounds of the layer the quads came from, in quad space.
    pub quad_layer_rect: Rect,
    /// Visible part of `quad_layer_rect`.
    pub visible_quad_layer_rect: Rect,
    pub mask_filter_info: MaskFilterInfo,
    /// Clip in target space.
    pub clip_rect: Option<Rect>,
    pub are_contents_opaque: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub sorting_context_id: i32,
    /// The mask can be drawn with the fast rounded-corner path.
    pub is_fast_rounded_corner: bool,
    /// Vertical scroll delta used by the de-jelly pass to skew content.
    pub de_jelly_delta_y: f32,
    /// Index into the aggregated frame's surface damage rect list, for overlay promotion.
    pub overlay_damage_index: Option<usize>,
}

impl Default for SharedQuadState {
    fn default() -> Self {
        Self {
            quad_to_target_transform: Affine::IDENTITY,
            quad_layer_rect: Rect::default(),
            visible_quad_layer_rect: Rect::default(),
            mask_filter_info: MaskFilterInfo::default(),
            clip_rect: None,
            are_contents_opaque: true,
            opacity: 1.0,
            blend_mode: BlendMode::SrcOver,
            sorting_context_id: 0,
            is_fast_rounded_corner: false,
            de_jelly_delta_y: 0.0,
            overlay_damage_index: None,
        }
    }
}

impl SharedQuadState {
    /// State for quads covering `rect` with an identity transform.
    pub fn with_rect(rect: Rect) -> Self {
        Self {
            quad_layer_rect: rect,
            visible_quad_layer_rect: rect,
            ..Self::default()
        }
    }
}
