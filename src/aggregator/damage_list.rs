//! Surface damage rect list used by the output for overlay promotion.

use kurbo::Affine;

use crate::{
    aggregator::{Aggregation, resolved::FrameSnapshot},
    foundation::{geometry::Rect, transform::map_enclosing_rect},
    quads::{draw_quad::DrawQuad, shared_quad_state::SharedQuadState},
};

impl Aggregation<'_> {
    /// Record the damage of one embedded surface in root target space.
    ///
    /// Without `source` the embed has no usable frame and `default_damage` (in the parent's
    /// target space) stands in. Empty damage is not recorded; the next overlay candidate
    /// backfills it. Returns `true` when an entry was pushed.
    pub(crate) fn add_surface_damage_to_damage_list(
        &mut self,
        default_damage: Rect,
        source: Option<&FrameSnapshot>,
        parent_target_transform: &Affine,
        dest_root_target_clip_rect: Option<Rect>,
        dest_to_root_target: &Affine,
    ) -> bool {
        let damage = match source {
            None => default_damage,
            Some(frame) => {
                let needs_full_damage = self
                    .pass_data(frame.root_key())
                    .is_some_and(|d| d.flags.needs_full_damage());
                if needs_full_damage {
                    frame.output_rect()
                } else {
                    frame.surface_damage()
                }
            }
        };

        if damage.is_empty() {
            self.current_zero_damage_rect_is_not_recorded = true;
            return false;
        }
        self.current_zero_damage_rect_is_not_recorded = false;

        let mut damage = map_enclosing_rect(
            &(*dest_to_root_target * *parent_target_transform),
            damage,
        );
        if let Some(clip) = dest_root_target_clip_rect {
            damage.intersect(&clip);
        }
        self.surface_damage_rect_list.push(damage);
        true
    }

    /// Passes with pixel-moving filters spread damage beyond their quad, so the whole quad is
    /// recorded.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_render_pass_filter_damage_to_damage_list(
        &mut self,
        frame: &FrameSnapshot,
        child_pass_index: usize,
        quad: &DrawQuad,
        sqs: &SharedQuadState,
        parent_target_transform: &Affine,
        dest_root_target_clip_rect: Option<Rect>,
        dest_to_root_target: &Affine,
    ) {
        let child = frame.pass(child_pass_index);
        if !child.filters.has_filter_that_moves_pixels()
            && !child.backdrop_filters.has_filter_that_moves_pixels()
        {
            return;
        }

        let mut in_target = map_enclosing_rect(&sqs.quad_to_target_transform, quad.rect);
        if let Some(clip) = sqs.clip_rect {
            in_target.intersect(&clip);
        }
        let mut in_root = map_enclosing_rect(
            &(*dest_to_root_target * *parent_target_transform),
            in_target,
        );
        if let Some(clip) = dest_root_target_clip_rect {
            in_root.intersect(&clip);
        }
        self.surface_damage_rect_list.push(in_root);
    }

    /// Find the single quad of a surface's root pass that the latest damage list entry
    /// describes, returning its index and the entry index.
    ///
    /// Any other quad in the pass could be damaged too, so the association only holds when
    /// the pass has exactly one quad without its own damage.
    pub(crate) fn find_quad_with_overlay_damage(
        &mut self,
        frame: &FrameSnapshot,
        pass_index: usize,
    ) -> Option<(usize, usize)> {
        // Animation damage is synthetic.
        let animating = self
            .manager
            .get_surface_for_id(&frame.surface_id)
            .is_some_and(|s| s.has_surface_animation_damage());
        if animating || pass_index != frame.root_index() {
            return None;
        }

        let source = frame.pass(pass_index);
        let mut target = None;
        for (quad_index, quad) in source.quad_list.iter().enumerate() {
            if source.has_per_quad_damage && quad.per_quad_damage().is_some() {
                continue;
            }
            if target.is_some() {
                return None;
            }
            target = Some(quad_index);
        }
        let target = target?;

        // Damage of an embedded pass or surface is tracked separately from its embedder's.
        if source.quad_list[target].is_embedding() {
            return None;
        }

        if self.current_zero_damage_rect_is_not_recorded {
            self.current_zero_damage_rect_is_not_recorded = false;
            self.surface_damage_rect_list.push(Rect::default());
        }
        let damage_index = self.surface_damage_rect_list.len().checked_sub(1)?;
        Some((target, damage_index))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aggregator/damage_list.rs"]
mod tests;
