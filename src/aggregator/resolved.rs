use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
    sync::Arc,
};

use crate::{
    foundation::geometry::Rect,
    quads::{
        draw_quad::{Material, QuadResources},
        frame::{CompositorFrame, ResourceId},
        render_pass::{
            AggregatedRenderPassId, AggregatedRenderPassIdGenerator, CompositorRenderPass,
            CompositorRenderPassId,
        },
    },
    resources::provider::{ChildId, DisplayResourceProvider},
    surfaces::{client::SurfaceClient, ids::SurfaceId, surface::Surface},
};

/// Identifies one source render pass of one surface during an aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PassKey {
    pub surface_id: SurfaceId,
    pub pass_index: usize,
}

/// Per-quad data computed once per frame.
#[derive(Clone, Debug, Default)]
pub(crate) struct ResolvedQuadData {
    /// Quad resources mapped into the display namespace.
    pub remapped_resources: QuadResources,
}

/// Per-pass data computed once per frame.
#[derive(Clone, Debug)]
pub(crate) struct ResolvedPassData {
    pub remapped_id: AggregatedRenderPassId,
    pub is_root: bool,
    /// One entry per quad of the source pass.
    pub draw_quads: Vec<ResolvedQuadData>,
    /// Indices of the quads the damage walk has to look at: embeds, and quads carrying their
    /// own damage.
    pub prewalk_quads: Vec<usize>,
}

/// Resolved passes of a frame plus the id lookup table.
#[derive(Debug, Default)]
pub(crate) struct ResolvedPasses {
    pub passes: Vec<ResolvedPassData>,
    index_by_id: HashMap<CompositorRenderPassId, usize>,
}

impl ResolvedPasses {
    pub(crate) fn index_for(&self, id: CompositorRenderPassId) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }
}

/// Flags a pass picks up during one aggregation. Most are inherited by embedded passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PassAggregationFlags {
    pub will_draw: bool,
    pub in_cached_render_pass: bool,
    pub in_copy_request_pass: bool,
    pub in_pixel_moving_filter_pass: bool,
    pub has_damage_from_contributing_content: bool,
}

impl PassAggregationFlags {
    /// The pass output is saved or filtered as a whole, so partial redraw is not allowed.
    pub(crate) fn needs_full_damage(&self) -> bool {
        self.in_cached_render_pass || self.in_copy_request_pass || self.in_pixel_moving_filter_pass
    }
}

/// Aggregation-scoped data of one pass; cleared after every aggregation.
#[derive(Clone, Debug, Default)]
pub(crate) struct AggregationPassData {
    pub flags: PassAggregationFlags,
    /// Passes drawn by this pass, including root passes of embedded surfaces.
    pub embedded_passes: Vec<PassKey>,
    /// Render pass quads (by index) with damage underneath them.
    pub intersects_damage_under: HashSet<usize>,
}

impl AggregationPassData {
    pub(crate) fn add_embedded_pass(&mut self, key: PassKey) {
        if !self.embedded_passes.contains(&key) {
            self.embedded_passes.push(key);
        }
    }
}

/// How the current frame relates to the one used in the previous aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrameDamageType {
    /// Unknown relation; the whole output is damaged.
    Full,
    /// Direct successor; the root pass damage rect is accurate.
    Frame,
    /// Same frame; nothing changed.
    None,
}

/// Cheap clone of the parts of a [`ResolvedFrameData`] the tree walks read while they also
/// mutate the cache.
#[derive(Clone, Debug)]
pub(crate) struct FrameSnapshot {
    pub surface_id: SurfaceId,
    pub frame: Arc<CompositorFrame>,
    pub passes: Arc<ResolvedPasses>,
    pub valid: bool,
    pub damage_type: FrameDamageType,
}

impl FrameSnapshot {
    pub(crate) fn root_index(&self) -> usize {
        self.frame.render_pass_list.len().saturating_sub(1)
    }

    pub(crate) fn root_key(&self) -> PassKey {
        self.key(self.root_index())
    }

    pub(crate) fn key(&self, pass_index: usize) -> PassKey {
        PassKey {
            surface_id: self.surface_id,
            pass_index,
        }
    }

    pub(crate) fn pass(&self, pass_index: usize) -> &CompositorRenderPass {
        &self.frame.render_pass_list[pass_index]
    }

    pub(crate) fn resolved_pass(&self, pass_index: usize) -> &ResolvedPassData {
        &self.passes.passes[pass_index]
    }

    pub(crate) fn output_rect(&self) -> Rect {
        self.frame
            .root_pass()
            .map(|p| p.output_rect)
            .unwrap_or_default()
    }

    /// Damage of the surface since the previous aggregation, in root pass space.
    pub(crate) fn surface_damage(&self) -> Rect {
        match self.damage_type {
            FrameDamageType::Full => self.output_rect(),
            FrameDamageType::Frame => self
                .frame
                .root_pass()
                .map(|p| p.damage_rect.intersection(&p.output_rect))
                .unwrap_or_default(),
            FrameDamageType::None => Rect::default(),
        }
    }

    pub(crate) fn is_same_frame_as_last_aggregation(&self) -> bool {
        self.damage_type == FrameDamageType::None
    }

    /// Per-quad damage is only meaningful relative to the immediately preceding frame.
    pub(crate) fn is_next_frame_since_last_aggregation(&self) -> bool {
        self.damage_type == FrameDamageType::Frame
    }
}

/// The aggregator's cache for one surface: remapped pass ids, resolved resources and
/// aggregation flags of its active frame.
pub(crate) struct ResolvedFrameData {
    surface_id: SurfaceId,
    child_id: ChildId,
    client: Option<Rc<dyn SurfaceClient>>,
    frame: Arc<CompositorFrame>,
    passes: Arc<ResolvedPasses>,
    aggregation: Vec<AggregationPassData>,
    /// Persisted across frames so ids stay stable while a pass keeps its source id.
    id_map: HashMap<CompositorRenderPassId, AggregatedRenderPassId>,
    valid: bool,
    frame_index: u64,
    previous_frame_index: u64,
    previous_output_rect: Rect,
    damage_type: FrameDamageType,
    used_in_aggregation: bool,
}

impl std::fmt::Debug for ResolvedFrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedFrameData")
            .field("surface_id", &self.surface_id)
            .field("valid", &self.valid)
            .field("frame_index", &self.frame_index)
            .field("previous_frame_index", &self.previous_frame_index)
            .finish_non_exhaustive()
    }
}

impl ResolvedFrameData {
    /// Cache entry for `surface`, or `None` when it has no active frame.
    ///
    /// `previous` carries the frame index and output rect last aggregated for the surface's
    /// predecessor in the same frame sink, so its first frame can still report partial damage.
    pub(crate) fn new(
        provider: &mut DisplayResourceProvider,
        surface: &Surface,
        previous: Option<(u64, Rect)>,
    ) -> Option<Self> {
        let (previous_frame_index, previous_output_rect) = previous.unwrap_or_default();
        let frame = surface.active_frame()?.clone();
        Some(Self {
            surface_id: surface.id(),
            child_id: provider.create_child(),
            client: surface.client().cloned(),
            frame,
            passes: Arc::default(),
            aggregation: Vec::new(),
            id_map: HashMap::new(),
            valid: false,
            frame_index: 0,
            previous_frame_index,
            previous_output_rect,
            damage_type: FrameDamageType::Full,
            used_in_aggregation: false,
        })
    }

    pub(crate) fn child_id(&self) -> ChildId {
        self.child_id
    }

    pub(crate) fn client(&self) -> Option<&Rc<dyn SurfaceClient>> {
        self.client.as_ref()
    }

    pub(crate) fn previous_frame_index(&self) -> u64 {
        self.previous_frame_index
    }

    pub(crate) fn previous_output_rect(&self) -> Rect {
        self.previous_output_rect
    }

    pub(crate) fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            surface_id: self.surface_id,
            frame: Arc::clone(&self.frame),
            passes: Arc::clone(&self.passes),
            valid: self.valid,
            damage_type: self.damage_type,
        }
    }

    pub(crate) fn aggregation(&self, pass_index: usize) -> Option<&AggregationPassData> {
        self.aggregation.get(pass_index)
    }

    pub(crate) fn aggregation_mut(&mut self, pass_index: usize) -> Option<&mut AggregationPassData> {
        self.aggregation.get_mut(pass_index)
    }

    pub(crate) fn was_used_in_aggregation(&self) -> bool {
        self.used_in_aggregation
    }

    pub(crate) fn mark_as_used_in_aggregation(&mut self) {
        debug_assert!(!self.used_in_aggregation);
        self.used_in_aggregation = true;
    }

    /// Whether the cached data must be rebuilt from the surface's active frame.
    pub(crate) fn needs_update(&self, surface: &Surface) -> bool {
        self.previous_frame_index != surface.active_frame_index()
            || surface.has_surface_animation_damage()
    }

    /// Rebuild pass and resource data for the surface's active frame.
    ///
    /// Returns the child resource ids the provider released, which go back to the producer.
    pub(crate) fn update_for_active_frame(
        &mut self,
        surface: &Surface,
        provider: &mut DisplayResourceProvider,
        id_generator: &mut AggregatedRenderPassIdGenerator,
    ) -> Vec<ResourceId> {
        let Some(frame) = surface.active_frame().cloned() else {
            self.valid = false;
            return Vec::new();
        };
        // Only a frame that was actually aggregated can be compared against.
        let aggregated_frame_index = (self.frame_index != 0
            && self.frame_index == self.previous_frame_index)
            .then_some(self.frame_index);
        let previous_frame = std::mem::replace(&mut self.frame, frame);
        self.frame_index = surface.active_frame_index();
        debug_assert_ne!(self.frame_index, 0);

        provider.receive_from_child(self.child_id, &self.frame.resource_list);
        let empty = HashMap::new();
        let resource_map = provider
            .get_child_to_parent_map(self.child_id)
            .unwrap_or(&empty);

        let mut valid = true;
        let mut resolved = ResolvedPasses::default();
        let mut id_map = HashMap::with_capacity(self.frame.render_pass_list.len());
        let last = self.frame.render_pass_list.len().saturating_sub(1);

        for (pass_index, pass) in self.frame.render_pass_list.iter().enumerate() {
            let remapped_id = self
                .id_map
                .get(&pass.id)
                .copied()
                .unwrap_or_else(|| id_generator.generate_next_id());
            id_map.insert(pass.id, remapped_id);

            let mut draw_quads = Vec::with_capacity(pass.quad_list.len());
            let mut prewalk_quads = Vec::new();
            for (quad_index, quad) in pass.quad_list.iter().enumerate() {
                match &quad.material {
                    Material::SurfaceContent(_) => prewalk_quads.push(quad_index),
                    Material::CompositorRenderPass { render_pass_id } => {
                        if resolved.index_for(*render_pass_id).is_none() {
                            tracing::warn!(
                                surface = %self.surface_id,
                                pass = pass.id.0,
                                embedded = render_pass_id.0,
                                "render pass quad references a pass that is not drawn before it"
                            );
                            valid = false;
                        }
                        prewalk_quads.push(quad_index);
                    }
                    _ if pass.has_per_quad_damage && quad.per_quad_damage().is_some() => {
                        prewalk_quads.push(quad_index)
                    }
                    _ => {}
                }

                let mut remapped_resources = QuadResources::new();
                for id in &quad.resources {
                    match resource_map.get(id) {
                        Some(mapped) => remapped_resources.push(*mapped),
                        None => {
                            tracing::warn!(
                                surface = %self.surface_id,
                                resource = id.0,
                                "quad references a resource missing from the frame"
                            );
                            valid = false;
                        }
                    }
                }
                draw_quads.push(ResolvedQuadData { remapped_resources });
            }

            resolved.index_by_id.insert(pass.id, pass_index);
            resolved.passes.push(ResolvedPassData {
                remapped_id,
                is_root: pass_index == last,
                draw_quads,
                prewalk_quads,
            });
        }

        self.id_map = id_map;
        self.aggregation = vec![AggregationPassData::default(); resolved.passes.len()];
        self.passes = Arc::new(resolved);
        self.valid = valid && !self.passes.passes.is_empty();

        let used: HashSet<ResourceId> = if self.valid {
            self.frame.resource_list.iter().map(|r| r.id).collect()
        } else {
            HashSet::new()
        };
        let released = provider.declare_used_resources_from_child(self.child_id, &used);

        let output_rect = self.frame.root_pass().map(|p| p.output_rect).unwrap_or_default();
        self.damage_type = if !self.valid || surface.has_surface_animation_damage() {
            FrameDamageType::Full
        } else if self.previous_frame_index == self.frame_index {
            FrameDamageType::None
        } else if self.previous_frame_index + 1 == self.frame_index
            && self.previous_output_rect == output_rect
        {
            // A resubmitted copy of the last aggregated frame changes nothing.
            if aggregated_frame_index == Some(self.previous_frame_index)
                && *previous_frame == *self.frame
            {
                FrameDamageType::None
            } else {
                FrameDamageType::Frame
            }
        } else {
            FrameDamageType::Full
        };
        self.previous_output_rect = output_rect;

        released
    }

    /// Make the next aggregation treat the whole surface as damaged.
    pub(crate) fn set_full_damage_for_next_aggregation(&mut self) {
        self.previous_frame_index = 0;
    }

    /// Release every resource held for this surface.
    pub(crate) fn force_release_resources(
        &mut self,
        provider: &mut DisplayResourceProvider,
    ) -> Vec<ResourceId> {
        // The cached quads reference the released resources; rebuild on next use.
        self.set_full_damage_for_next_aggregation();
        provider.declare_used_resources_from_child(self.child_id, &HashSet::new())
    }

    pub(crate) fn reset_after_aggregation(&mut self) {
        for data in &mut self.aggregation {
            *data = AggregationPassData::default();
        }
        if self.used_in_aggregation {
            self.previous_frame_index = self.frame_index;
            self.damage_type = FrameDamageType::None;
        }
        self.used_in_aggregation = false;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aggregator/resolved.rs"]
mod tests;
