use std::collections::HashSet;

use kurbo::Point;

use crate::{
    foundation::{
        color::ContentColorUsage,
        core::{Color, DisplayTime},
        error::{StratumError, StratumResult},
        geometry::{Rect, Size},
    },
    quads::render_pass::CompositorRenderPass,
    surfaces::ids::SurfaceRange,
};

/// Resource id. Producers allocate ids in their own namespace; the display resource provider
/// maps them into a display-global namespace.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct ResourceId(pub u32);

/// A texture or buffer handed from a producer to the display.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransferableResource {
    pub id: ResourceId,
    #[serde(default)]
    pub size: Size,
    #[serde(default)]
    pub is_software: bool,
}

impl TransferableResource {
    pub fn new(id: ResourceId, size: Size) -> Self {
        Self {
            id,
            size,
            is_software: false,
        }
    }
}

/// Request to read back the pixels of a render pass. Completion happens outside the
/// aggregator; it only attaches the request to the emitted pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CopyOutputRequest {
    /// Who asked, for diagnostics.
    #[serde(default)]
    pub source: String,
    /// Optional sub-area of the pass to copy.
    #[serde(default)]
    pub area: Option<Rect>,
}

impl CopyOutputRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            area: None,
        }
    }
}

/// Low-latency ink trail parameters, drawn by the display directly on top of the frame.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DelegatedInkMetadata {
    pub point: Point,
    pub diameter: f32,
    pub color: Color,
    pub timestamp: DisplayTime,
    pub presentation_area: kurbo::Rect,
    #[serde(default)]
    pub frame_time: DisplayTime,
    #[serde(default)]
    pub is_hovering: bool,
}

/// Input-to-display latency tracking record.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LatencyInfo {
    pub trace_id: u64,
}

/// Frame-level metadata supplied by the producer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompositorFrameMetadata {
    pub device_scale_factor: f32,
    /// Color of the area behind the root pass; also used for gutters when this frame is a
    /// fallback.
    pub root_background_color: Color,
    /// Surfaces this frame depends on, whether or not a quad draws them.
    pub referenced_surfaces: Vec<SurfaceRange>,
    pub content_color_usage: ContentColorUsage,
    pub top_controls_visible_height: Option<f32>,
    pub delegated_ink_metadata: Option<DelegatedInkMetadata>,
    /// Moved onto the surface when the frame is submitted.
    pub latency_info: Vec<LatencyInfo>,
}

impl Default for CompositorFrameMetadata {
    fn default() -> Self {
        Self {
            device_scale_factor: 1.0,
            root_background_color: Color::WHITE,
            referenced_surfaces: Vec::new(),
            content_color_usage: ContentColorUsage::Srgb,
            top_controls_visible_height: None,
            delegated_ink_metadata: None,
            latency_info: Vec::new(),
        }
    }
}

/// Immutable snapshot of one producer's output: render passes in draw order (the last one is
/// the root), the resources they use, and metadata.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CompositorFrame {
    #[serde(default)]
    pub metadata: CompositorFrameMetadata,
    #[serde(default)]
    pub resource_list: Vec<TransferableResource>,
    pub render_pass_list: Vec<CompositorRenderPass>,
}

impl CompositorFrame {
    pub fn root_pass(&self) -> Option<&CompositorRenderPass> {
        self.render_pass_list.last()
    }

    /// Size of the root pass output.
    pub fn size_in_pixels(&self) -> Size {
        self.root_pass()
            .map(|p| p.output_rect.size())
            .unwrap_or_default()
    }

    pub fn device_scale_factor(&self) -> f32 {
        self.metadata.device_scale_factor
    }

    /// Check the frame structure the aggregator relies on.
    pub fn validate(&self) -> StratumResult<()> {
        if self.render_pass_list.is_empty() {
            return Err(StratumError::validation("frame has no render passes"));
        }
        let dsf = self.metadata.device_scale_factor;
        if !(dsf.is_finite() && dsf > 0.0) {
            return Err(StratumError::validation(format!(
                "invalid device scale factor {dsf}"
            )));
        }
        if self.size_in_pixels().is_empty() {
            return Err(StratumError::validation("root pass output rect is empty"));
        }

        let mut seen = HashSet::new();
        for (pass_index, pass) in self.render_pass_list.iter().enumerate() {
            let mut last_sqs = 0usize;
            for (quad_index, quad) in pass.quad_list.iter().enumerate() {
                if quad.shared_quad_state >= pass.shared_quad_state_list.len() {
                    return Err(StratumError::validation(format!(
                        "pass {pass_index} quad {quad_index}: shared quad state {} out of range",
                        quad.shared_quad_state
                    )));
                }
                if quad.shared_quad_state < last_sqs {
                    return Err(StratumError::validation(format!(
                        "pass {pass_index} quad {quad_index}: shared quad states out of order"
                    )));
                }
                last_sqs = quad.shared_quad_state;

                if let Some(child) = quad.compositor_render_pass_id() {
                    if !seen.contains(&child) {
                        return Err(StratumError::validation(format!(
                            "pass {pass_index} quad {quad_index}: render pass {} is not drawn before it",
                            child.0
                        )));
                    }
                }
                if quad.aggregated_render_pass_id().is_some() {
                    return Err(StratumError::validation(format!(
                        "pass {pass_index} quad {quad_index}: aggregated render pass quads cannot be submitted"
                    )));
                }
            }
            if !seen.insert(pass.id) {
                return Err(StratumError::validation(format!(
                    "duplicate render pass id {}",
                    pass.id.0
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/quads/frame.rs"]
mod tests;
