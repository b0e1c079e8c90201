use kurbo::Affine;

use crate::{
    foundation::{color::ContentColorUsage, geometry::Rect},
    quads::{
        draw_quad::{DrawQuad, Material},
        filters::FilterOperations,
        frame::CopyOutputRequest,
        shared_quad_state::SharedQuadState,
    },
};

/// Render pass id chosen by a producer, unique within one compositor frame.
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
pub struct CompositorRenderPassId(pub u64);

/// Render pass id in aggregated output, unique within one aggregated frame.
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
pub struct AggregatedRenderPassId(pub u64);

/// Monotonic source of [`AggregatedRenderPassId`]s. Ids are never reused.
#[derive(Debug)]
pub struct AggregatedRenderPassIdGenerator {
    next: u64,
}

impl Default for AggregatedRenderPassIdGenerator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl AggregatedRenderPassIdGenerator {
    pub fn generate_next_id(&mut self) -> AggregatedRenderPassId {
        let id = AggregatedRenderPassId(self.next);
        self.next += 1;
        id
    }
}

/// A drawing target in a producer-submitted frame.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompositorRenderPass {
    pub id: CompositorRenderPassId,
    pub output_rect: Rect,
    /// Damage since the producer's previous frame, in this pass's space.
    pub damage_rect: Rect,
    pub transform_to_root_target: Affine,
    pub filters: FilterOperations,
    pub backdrop_filters: FilterOperations,
    pub backdrop_filter_bounds: Option<Rect>,
    pub has_transparent_background: bool,
    /// The backend should keep this pass's output across frames.
    pub cache_render_pass: bool,
    pub has_damage_from_contributing_content: bool,
    pub generate_mipmap: bool,
    /// Some quads carry their own damage rect.
    pub has_per_quad_damage: bool,
    /// Requests attached by the producer. Moved onto the surface when the frame is submitted.
    pub copy_requests: Vec<CopyOutputRequest>,
    pub shared_quad_state_list: Vec<SharedQuadState>,
    pub quad_list: Vec<DrawQuad>,
}

impl CompositorRenderPass {
    /// Empty pass with full damage.
    pub fn new(id: CompositorRenderPassId, output_rect: Rect) -> Self {
        Self {
            id,
            output_rect,
            damage_rect: output_rect,
            ..Self::default()
        }
    }

    /// Append a shared quad state and return its index.
    pub fn push_shared_quad_state(&mut self, sqs: SharedQuadState) -> usize {
        self.shared_quad_state_list.push(sqs);
        self.shared_quad_state_list.len() - 1
    }

    /// Append `quad`, pointing it at the most recent shared quad state.
    pub fn push_quad(&mut self, mut quad: DrawQuad) {
        quad.shared_quad_state = self.shared_quad_state_list.len().saturating_sub(1);
        self.quad_list.push(quad);
    }

    /// Shared quad state of `quad`.
    pub fn sqs(&self, quad: &DrawQuad) -> &SharedQuadState {
        &self.shared_quad_state_list[quad.shared_quad_state]
    }
}

/// A drawing target in aggregated output.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AggregatedRenderPass {
    pub id: AggregatedRenderPassId,
    pub output_rect: Rect,
    pub damage_rect: Rect,
    pub transform_to_root_target: Affine,
    pub filters: FilterOperations,
    pub backdrop_filters: FilterOperations,
    pub backdrop_filter_bounds: Option<Rect>,
    pub content_color_usage: ContentColorUsage,
    pub has_transparent_background: bool,
    pub cache_render_pass: bool,
    pub has_damage_from_contributing_content: bool,
    pub generate_mipmap: bool,
    /// Converts the root output into the display color space.
    pub is_color_conversion_pass: bool,
    pub copy_requests: Vec<CopyOutputRequest>,
    pub shared_quad_state_list: Vec<SharedQuadState>,
    pub quad_list: Vec<DrawQuad>,
}

impl AggregatedRenderPass {
    pub fn new(
        id: AggregatedRenderPassId,
        output_rect: Rect,
        damage_rect: Rect,
        transform_to_root_target: Affine,
    ) -> Self {
        Self {
            id,
            output_rect,
            damage_rect,
            transform_to_root_target,
            ..Self::default()
        }
    }

    /// Copy of the pass properties with empty quad and state lists.
    pub fn copy_without_quads(&self, id: AggregatedRenderPassId) -> Self {
        Self {
            id,
            output_rect: self.output_rect,
            damage_rect: self.damage_rect,
            transform_to_root_target: self.transform_to_root_target,
            filters: self.filters.clone(),
            backdrop_filters: self.backdrop_filters.clone(),
            backdrop_filter_bounds: self.backdrop_filter_bounds,
            content_color_usage: self.content_color_usage,
            has_transparent_background: self.has_transparent_background,
            cache_render_pass: self.cache_render_pass,
            has_damage_from_contributing_content: self.has_damage_from_contributing_content,
            generate_mipmap: self.generate_mipmap,
            is_color_conversion_pass: self.is_color_conversion_pass,
            copy_requests: Vec::new(),
            shared_quad_state_list: Vec::new(),
            quad_list: Vec::new(),
        }
    }

    /// Append a shared quad state and return its index.
    pub fn push_shared_quad_state(&mut self, sqs: SharedQuadState) -> usize {
        self.shared_quad_state_list.push(sqs);
        self.shared_quad_state_list.len() - 1
    }

    /// Append `quad`, pointing it at the most recent shared quad state.
    pub fn push_quad(&mut self, mut quad: DrawQuad) {
        debug_assert!(!self.shared_quad_state_list.is_empty());
        quad.shared_quad_state = self.shared_quad_state_list.len().saturating_sub(1);
        self.quad_list.push(quad);
    }

    /// Shared quad state of `quad`.
    pub fn sqs(&self, quad: &DrawQuad) -> &SharedQuadState {
        &self.shared_quad_state_list[quad.shared_quad_state]
    }

    /// Ids of aggregated passes drawn by quads of this pass.
    pub fn embedded_pass_ids(&self) -> impl Iterator<Item = AggregatedRenderPassId> + '_ {
        self.quad_list.iter().filter_map(|q| match q.material {
            Material::AggregatedRenderPass { render_pass_id, .. } => Some(render_pass_id),
            _ => None,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/quads/render_pass.rs"]
mod tests;
