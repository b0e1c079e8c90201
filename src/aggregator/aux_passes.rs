//! Passes appended after the copy walk that wrap the current root pass.

use kurbo::Affine;

use crate::{
    aggregator::{Aggregation, ExtraPassForReadback},
    foundation::{
        color::ContentColorUsage, geometry::Rect, transform::map_enclosed_rect_axis_aligned,
    },
    quads::{
        draw_quad::{DrawQuad, Material},
        render_pass::{AggregatedRenderPass, AggregatedRenderPassId, AggregatedRenderPassIdGenerator},
        shared_quad_state::{BlendMode, SharedQuadState},
    },
};

/// Properties of a pass that draws the current root pass as a single quad.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AuxPass {
    pub id: AggregatedRenderPassId,
    pub output_rect: Rect,
    pub damage_rect: Rect,
    pub content_color_usage: ContentColorUsage,
    pub has_transparent_background: bool,
    pub is_color_conversion_pass: bool,
    pub quad_to_target_transform: Affine,
    pub are_contents_opaque: bool,
    pub blend_mode: BlendMode,
}

/// Id kept for an auxiliary pass across aggregations, generated on first use.
fn aux_pass_id(
    slot: &mut Option<AggregatedRenderPassId>,
    generator: &mut AggregatedRenderPassIdGenerator,
) -> AggregatedRenderPassId {
    *slot.get_or_insert_with(|| generator.generate_next_id())
}

impl Aggregation<'_> {
    /// Append `pass` drawing the pass `quad_pass_id`, which becomes a non-root pass.
    fn add_render_pass_helper(&mut self, pass: AuxPass, quad_pass_id: AggregatedRenderPassId) {
        let Some(current_output_rect) = self.dest_pass_list.last().map(|p| p.output_rect) else {
            return;
        };
        let mut render_pass = AggregatedRenderPass {
            content_color_usage: pass.content_color_usage,
            has_transparent_background: pass.has_transparent_background,
            is_color_conversion_pass: pass.is_color_conversion_pass,
            ..AggregatedRenderPass::new(
                pass.id,
                pass.output_rect,
                pass.damage_rect,
                Affine::IDENTITY,
            )
        };
        render_pass.push_shared_quad_state(SharedQuadState {
            quad_to_target_transform: pass.quad_to_target_transform,
            are_contents_opaque: pass.are_contents_opaque,
            blend_mode: pass.blend_mode,
            ..SharedQuadState::with_rect(current_output_rect)
        });
        render_pass.push_quad(DrawQuad::new(
            0,
            current_output_rect,
            Material::AggregatedRenderPass {
                render_pass_id: quad_pass_id,
                intersects_damage_under: false,
            },
        ));
        self.dest_pass_list.push(render_pass);
    }

    /// Blend in a space the display can blend in when its output space cannot.
    pub(crate) fn add_color_conversion_pass(&mut self) {
        let Some(root) = self.dest_pass_list.last_mut() else {
            return;
        };
        let output_rect = root.output_rect;
        let needs_pass = !self
            .agg
            .display_color_spaces
            .output_color_space(root.content_color_usage, root.has_transparent_background)
            .is_suitable_for_blending();

        // Adding or removing the pass changes what the root draws into.
        if needs_pass != self.agg.last_frame_had_color_conversion_pass {
            root.damage_rect = output_rect;
        }
        self.agg.last_frame_had_color_conversion_pass = needs_pass;
        if !needs_pass {
            return;
        }
        debug_assert_eq!(root.transform_to_root_target, Affine::IDENTITY);

        let root_id = root.id;
        let damage_rect = root.damage_rect;
        let has_transparent_background = root.has_transparent_background;
        let id = aux_pass_id(
            &mut self.agg.color_conversion_render_pass_id,
            &mut self.agg.id_generator,
        );
        tracing::trace!(pass = id.0, "adding color conversion pass");
        self.add_render_pass_helper(
            AuxPass {
                id,
                output_rect,
                damage_rect,
                content_color_usage: self.agg.root_content_color_usage,
                has_transparent_background,
                is_color_conversion_pass: true,
                quad_to_target_transform: Affine::IDENTITY,
                are_contents_opaque: false,
                blend_mode: BlendMode::Src,
            },
            root_id,
        );
    }

    /// Give the backend a root it can read back while drawing backdrop filters into it.
    pub(crate) fn add_root_readback_pass(&mut self) {
        let option = self.agg.settings.extra_pass_for_readback;
        if option == ExtraPassForReadback::None {
            return;
        }
        let Some(root) = self.dest_pass_list.last() else {
            return;
        };
        debug_assert_eq!(root.transform_to_root_target, Affine::IDENTITY);

        let drawn_by_root: Vec<AggregatedRenderPassId> = root.embedded_pass_ids().collect();
        let needs_pass = option == ExtraPassForReadback::AlwaysAddPass
            || (!drawn_by_root.is_empty()
                && self
                    .dest_pass_list
                    .iter()
                    .any(|p| drawn_by_root.contains(&p.id) && !p.backdrop_filters.is_empty()));

        let Some(root) = self.dest_pass_list.last_mut() else {
            return;
        };
        let output_rect = root.output_rect;
        if needs_pass != self.agg.last_frame_had_readback_pass {
            root.damage_rect = output_rect;
        }
        self.agg.last_frame_had_readback_pass = needs_pass;
        if !needs_pass {
            return;
        }

        // The old root is cleared to transparent before it is drawn into the new one.
        let has_transparent_background = root.has_transparent_background;
        root.has_transparent_background = true;
        let root_id = root.id;
        let damage_rect = root.damage_rect;
        let id = aux_pass_id(&mut self.agg.readback_render_pass_id, &mut self.agg.id_generator);
        self.add_render_pass_helper(
            AuxPass {
                id,
                output_rect,
                damage_rect,
                content_color_usage: self.agg.root_content_color_usage,
                has_transparent_background,
                is_color_conversion_pass: false,
                quad_to_target_transform: Affine::IDENTITY,
                are_contents_opaque: false,
                blend_mode: BlendMode::SrcOver,
            },
            root_id,
        );
    }

    /// Apply the display transform to a root pass that had to stay in its own space.
    pub(crate) fn add_display_transform_pass(&mut self) {
        let Some(root) = self.dest_pass_list.last() else {
            return;
        };
        debug_assert_eq!(root.transform_to_root_target, self.root_surface_transform);

        let are_contents_opaque = root
            .shared_quad_state_list
            .iter()
            .all(|sqs| sqs.are_contents_opaque);
        let transform = self.root_surface_transform;
        let pass = AuxPass {
            id: AggregatedRenderPassId::default(),
            output_rect: map_enclosed_rect_axis_aligned(&transform, root.output_rect),
            damage_rect: map_enclosed_rect_axis_aligned(&transform, root.damage_rect),
            content_color_usage: root.content_color_usage,
            has_transparent_background: root.has_transparent_background,
            is_color_conversion_pass: false,
            quad_to_target_transform: transform,
            are_contents_opaque,
            blend_mode: BlendMode::SrcOver,
        };
        let root_id = root.id;
        let id = aux_pass_id(
            &mut self.agg.display_transform_render_pass_id,
            &mut self.agg.id_generator,
        );
        self.add_render_pass_helper(AuxPass { id, ..pass }, root_id);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aggregator/aux_passes.rs"]
mod tests;
