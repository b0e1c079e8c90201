use crate::{
    foundation::{color::ContentColorUsage, geometry::Rect},
    quads::{
        frame::{DelegatedInkMetadata, LatencyInfo},
        render_pass::{AggregatedRenderPass, AggregatedRenderPassId},
    },
};

/// Result of one aggregation: every surface reachable from the root flattened into one
/// ordered pass list. The last pass is the root.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AggregatedFrame {
    pub render_pass_list: Vec<AggregatedRenderPass>,
    /// Per-surface damage in root target space, indexed by `overlay_damage_index`.
    pub surface_damage_rect_list: Vec<Rect>,
    pub content_color_usage: ContentColorUsage,
    pub delegated_ink_metadata: Option<DelegatedInkMetadata>,
    pub latency_info: Vec<LatencyInfo>,
    pub has_copy_requests: bool,
    pub video_capture_enabled: bool,
    pub page_fullscreen_mode: bool,
    pub top_controls_visible_height: Option<f32>,
}

impl AggregatedFrame {
    pub fn root_pass(&self) -> Option<&AggregatedRenderPass> {
        self.render_pass_list.last()
    }

    pub fn is_empty(&self) -> bool {
        self.render_pass_list.is_empty()
    }

    pub fn pass(&self, id: AggregatedRenderPassId) -> Option<&AggregatedRenderPass> {
        self.render_pass_list.iter().find(|p| p.id == id)
    }
}

/// Hook run on every non-empty aggregated frame before it is returned, e.g. to draw debug
/// overlays.
pub trait FrameAnnotator {
    fn annotate_aggregated_frame(&mut self, frame: &mut AggregatedFrame);
}
