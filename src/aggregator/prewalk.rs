//! Damage walk: computes per-pass damage, discovers the reference graph and propagates pass
//! flags before anything is copied.

use std::collections::BTreeSet;

use kurbo::Affine;

use crate::{
    aggregator::{
        Aggregation, DAMAGE_EPSILON, FULLSCREEN_TOLERANCE, can_potentially_merge_pass,
        extra_content_scale,
        resolved::{FrameSnapshot, PassKey},
    },
    foundation::{
        color::ContentColorUsage,
        geometry::Rect,
        transform::{
            map_enclosed_rect_axis_aligned, map_enclosing_rect, map_enclosing_rect_ignoring_error,
            try_inverse,
        },
    },
    quads::{
        draw_quad::{DrawQuad, Material},
        filters::expanded_rect_with_pixel_moving_foreground_filter,
        shared_quad_state::SharedQuadState,
    },
    surfaces::ids::SurfaceId,
};

/// What the damage walk learned about the tree besides damage.
#[derive(Debug, Default)]
pub(crate) struct PrewalkResult {
    /// Surfaces referenced by frame metadata but not embedded by any quad.
    pub undrawn_surfaces: BTreeSet<SurfaceId>,
    pub video_capture_enabled: bool,
    pub frame_sinks_changed: bool,
    pub page_fullscreen_mode: bool,
    pub content_color_usage: ContentColorUsage,
}

/// Quad rect in target space, clipped.
pub(crate) fn clipped_quad_rect(quad: &DrawQuad, sqs: &SharedQuadState) -> Rect {
    let mut rect = map_enclosing_rect(&sqs.quad_to_target_transform, quad.rect);
    if let Some(clip) = sqs.clip_rect {
        rect.intersect(&clip);
    }
    rect
}

impl Aggregation<'_> {
    /// Walk `frame` and everything it embeds. Returns the surface damage in its root pass
    /// space; for the root surface the display transform is already applied.
    #[tracing::instrument(level = "trace", skip_all, fields(surface = %frame.surface_id))]
    pub(crate) fn prewalk_surface(
        &mut self,
        frame: &FrameSnapshot,
        parent: Option<PassKey>,
        damage_from_parent: Rect,
        result: &mut PrewalkResult,
    ) -> Rect {
        result.frame_sinks_changed |= self.check_frame_sinks_changed(frame.surface_id);
        if !frame.valid {
            return Rect::default();
        }
        self.visit_surface(frame.surface_id, |this| {
            this.prewalk_visited_surface(frame, parent, damage_from_parent, result)
        })
        .unwrap_or_default()
    }

    fn prewalk_visited_surface(
        &mut self,
        frame: &FrameSnapshot,
        parent: Option<PassKey>,
        damage_from_parent: Rect,
        result: &mut PrewalkResult,
    ) -> Rect {
        let surface_id = frame.surface_id;
        let root_key = frame.root_key();
        self.stats.prewalked_surface_count += 1;

        if let Some(parent) = parent {
            if let Some(data) = self.pass_data_mut(parent) {
                data.add_embedded_pass(root_key);
            }
        }

        let mut damage = frame.surface_damage();
        let pass_damage = self.prewalk_render_pass(
            frame,
            frame.root_index(),
            damage_from_parent,
            Affine::IDENTITY,
            parent,
            result,
        );
        damage.union(&pass_damage);

        let root_flags = self.pass_data(root_key).map(|d| d.flags).unwrap_or_default();
        tracing::debug!(
            depth = self.referenced_surfaces.len(),
            surface = %surface_id,
            size = ?frame.frame.size_in_pixels(),
            will_draw = root_flags.will_draw,
            "prewalk surface"
        );
        if root_flags.has_damage_from_contributing_content {
            if let Some(data) = parent.and_then(|p| self.pass_data_mut(p)) {
                data.flags.has_damage_from_contributing_content = true;
            }
        }

        if !damage.is_empty() {
            let mut damage_in_surface_space = damage;
            if self.is_root_surface(surface_id) {
                // Clients do not know about the display transform; they get pre-transform
                // damage.
                damage = map_enclosed_rect_axis_aligned(&self.root_surface_transform, damage);
                if let Some(inverse) = try_inverse(&self.root_surface_transform) {
                    damage_in_surface_space = map_enclosed_rect_axis_aligned(&inverse, damage);
                }
            }
            // May queue copy requests on the client. A surface embedded more than once is
            // notified on its first visit only.
            if self.notified_surfaces.insert(surface_id) {
                if let Some(surface) = self.manager.get_surface_for_id(&surface_id) {
                    surface
                        .notify_aggregated_damage(damage_in_surface_space, self.expected_display_time);
                }
            }
        }

        let track_new_surfaces = self.agg.settings.de_jelly.is_some();
        if let Some(surface) = self.manager.get_surface_for_id_mut(&surface_id) {
            surface.take_copy_output_requests_from_client();
            if surface.is_video_capture_on_from_client() {
                result.video_capture_enabled = true;
            }
            if track_new_surfaces && surface.has_undrawn_active_frame() {
                self.new_surfaces.insert(surface_id);
            }
            if root_flags.will_draw {
                surface.on_will_be_drawn();
            }
        }

        for range in &frame.frame.metadata.referenced_surfaces {
            self.agg
                .damage_ranges
                .entry(range.end.frame_sink_id)
                .or_default()
                .push(*range);
            if range.has_different_frame_sink_ids() {
                if let Some(start) = range.start {
                    self.agg
                        .damage_ranges
                        .entry(start.frame_sink_id)
                        .or_default()
                        .push(*range);
                }
            }
        }

        for referenced in self.manager.active_referenced_surfaces(&surface_id) {
            if self.contained_surfaces.contains(&referenced) {
                continue;
            }
            result.undrawn_surfaces.insert(referenced);
            if let Some(undrawn) = self.resolve_surface(referenced) {
                self.prewalk_surface(&undrawn, None, Rect::default(), result);
            }
        }

        // Copy requests can arrive during the damage notification above, so look for them
        // only now.
        for (pass_index, pass) in frame.frame.render_pass_list.iter().enumerate() {
            let has_requests = self
                .manager
                .get_surface_for_id(&surface_id)
                .is_some_and(|s| s.has_copy_requests_for_pass(pass.id));
            if has_requests {
                self.has_copy_requests = true;
                self.mark_and_propagate_copy_request_passes(frame.key(pass_index));
            }
        }

        result.content_color_usage = result
            .content_color_usage
            .max(frame.frame.metadata.content_color_usage);
        damage
    }

    /// Accumulate damage of one pass back to front. The returned rect is in the pass's own
    /// space and clipped to its output rect.
    fn prewalk_render_pass(
        &mut self,
        frame: &FrameSnapshot,
        pass_index: usize,
        damage_from_parent: Rect,
        target_to_root: Affine,
        parent: Option<PassKey>,
        result: &mut PrewalkResult,
    ) -> Rect {
        let key = frame.key(pass_index);
        let pass = frame.pass(pass_index);
        let resolved_pass = frame.resolved_pass(pass_index);

        if pass.backdrop_filters.has_filter_that_moves_pixels() {
            self.has_pixel_moving_backdrop_filter = true;
        }

        // Cached and filtered state applies to everything the pass embeds.
        let parent_flags = parent
            .and_then(|p| self.pass_data(p))
            .map(|d| d.flags)
            .unwrap_or_default();
        let same_frame = frame.is_same_frame_as_last_aggregation();
        if let Some(data) = self.pass_data_mut(key) {
            data.flags.will_draw |= parent_flags.will_draw;
            data.flags.in_cached_render_pass |=
                pass.cache_render_pass || parent_flags.in_cached_render_pass;
            data.flags.in_pixel_moving_filter_pass |= pass.filters.has_filter_that_moves_pixels()
                || parent_flags.in_pixel_moving_filter_pass;
            if pass.has_damage_from_contributing_content && !same_frame {
                data.flags.has_damage_from_contributing_content = true;
            }
        }

        let mut surface_root_damage = frame.surface_damage();
        if !surface_root_damage.is_empty() {
            if let Some(root_to_target) = try_inverse(&target_to_root) {
                surface_root_damage = map_enclosing_rect(&root_to_target, surface_root_damage);
            }
        }

        // Everything known to be dirty below the quad being looked at.
        let mut damage_rect = Rect::default();
        for &quad_index in resolved_pass.prewalk_quads.iter().rev() {
            let quad = &pass.quad_list[quad_index];
            let sqs = pass.sqs(quad);
            let mut quad_damage = Rect::default();
            let mut target_damage = Rect::default();

            match &quad.material {
                Material::SurfaceContent(surface_quad) => {
                    let child = self.resolve_range(&surface_quad.surface_range);

                    // Without the primary surface there may be gutter, so the whole quad is
                    // damaged.
                    if child
                        .as_ref()
                        .is_none_or(|c| c.surface_id != surface_quad.surface_range.end)
                    {
                        quad_damage = quad.rect;
                    }

                    if let Some(child) = child {
                        let (scale_x, scale_y) = extra_content_scale(
                            surface_quad,
                            quad.rect,
                            frame.frame.device_scale_factor(),
                            &child.frame,
                        );

                        // Damage under a quad that may merge has to be redrawn by the child.
                        let mut accumulated = Rect::default();
                        if can_potentially_merge_pass(surface_quad, sqs) {
                            accumulated.union(&damage_rect);
                            accumulated.union(&damage_from_parent);
                            accumulated.union(&surface_root_damage);
                            if !accumulated.is_empty() {
                                if let Some(inverse) = try_inverse(&sqs.quad_to_target_transform) {
                                    let to_child = Affine::scale_non_uniform(
                                        1.0 / f64::from(scale_x),
                                        1.0 / f64::from(scale_y),
                                    ) * inverse;
                                    accumulated = map_enclosing_rect(&to_child, accumulated);
                                }
                            }
                        }

                        let child_damage =
                            self.prewalk_surface(&child, Some(key), accumulated, result);
                        quad_damage.union(&child_damage.scale_to_enclosing(scale_x, scale_y));
                    }

                    if !quad_damage.is_empty() {
                        if let Some(data) = self.pass_data_mut(key) {
                            data.flags.has_damage_from_contributing_content = true;
                        }
                    }

                    if parent.is_none()
                        && resolved_pass.is_root
                        && !result.page_fullscreen_mode
                        && self.is_root_surface(frame.surface_id)
                        && clipped_quad_rect(quad, sqs)
                            .approximately_equal(&pass.output_rect, FULLSCREEN_TOLERANCE)
                    {
                        result.page_fullscreen_mode = true;
                    }
                }
                Material::CompositorRenderPass { render_pass_id } => {
                    let Some(child_index) = frame.passes.index_for(*render_pass_id) else {
                        continue;
                    };
                    let child_pass = frame.pass(child_index);
                    let rect_in_target = map_enclosing_rect(&sqs.quad_to_target_transform, quad.rect);

                    let intersects_current = rect_in_target.intersects(&damage_rect);
                    let intersects_parent = rect_in_target.intersects(&damage_from_parent);
                    let intersects_surface = rect_in_target.intersects(&surface_root_damage);
                    if intersects_current || intersects_parent || intersects_surface {
                        if let Some(data) = self.pass_data_mut(key) {
                            data.intersects_damage_under.insert(quad_index);
                        }
                        // A backdrop filter samples what is under the quad.
                        if child_pass.backdrop_filters.has_filter_that_moves_pixels() {
                            damage_rect.union(&rect_in_target);
                            if intersects_parent {
                                damage_rect.union(&damage_from_parent);
                            }
                            if intersects_surface {
                                damage_rect.union(&surface_root_damage);
                            }
                        }
                    }

                    // A foreground filter can push pixels past the quad rect.
                    if child_pass.filters.has_filter_that_moves_pixels() {
                        let expanded = expanded_rect_with_pixel_moving_foreground_filter(
                            quad.rect,
                            &sqs.quad_to_target_transform,
                            &child_pass.filters,
                        );
                        if expanded.intersects(&damage_rect)
                            || expanded.intersects(&damage_from_parent)
                            || expanded.intersects(&surface_root_damage)
                        {
                            damage_rect.union(&expanded);
                        }
                    }

                    let child_key = frame.key(child_index);
                    if let Some(data) = self.pass_data_mut(key) {
                        data.add_embedded_pass(child_key);
                    }

                    quad_damage = self.prewalk_render_pass(
                        frame,
                        child_index,
                        Rect::default(),
                        target_to_root * sqs.quad_to_target_transform,
                        Some(key),
                        result,
                    );

                    let child_contributes = self
                        .pass_data(child_key)
                        .is_some_and(|d| d.flags.has_damage_from_contributing_content);
                    if child_contributes {
                        if let Some(data) = self.pass_data_mut(key) {
                            data.flags.has_damage_from_contributing_content = true;
                        }
                    }
                }
                _ => {
                    // Per-quad damage is relative to the previous frame; it is stale or
                    // redundant otherwise. It is already in target space.
                    if frame.is_next_frame_since_last_aggregation() {
                        if let Some(per_quad) = quad.per_quad_damage() {
                            target_damage = per_quad;
                        }
                    }
                }
            }

            // Filter expansion went straight into `damage_rect`; this only clips what the quad
            // itself draws.
            quad_damage.intersect(&quad.visible_rect);
            if !quad_damage.is_empty() {
                target_damage = map_enclosing_rect_ignoring_error(
                    &sqs.quad_to_target_transform,
                    quad_damage,
                    DAMAGE_EPSILON,
                );
            }
            if !target_damage.is_empty() {
                if let Some(clip) = sqs.clip_rect {
                    target_damage.intersect(&clip);
                }
                damage_rect.union(&target_damage);
            }
        }

        if !damage_rect.is_empty() {
            if pass.filters.has_filter_that_moves_pixels() {
                damage_rect.union(&pass.output_rect);
            }
            damage_rect.intersect(&pass.output_rect);
        }
        damage_rect
    }

    /// Mark `key` and everything it embeds, across surfaces, as drawn for a copy request.
    pub(crate) fn mark_and_propagate_copy_request_passes(&mut self, key: PassKey) {
        let mut stack = vec![key];
        while let Some(key) = stack.pop() {
            let Some(data) = self.pass_data_mut(key) else {
                continue;
            };
            if data.flags.in_copy_request_pass {
                continue;
            }
            data.flags.in_copy_request_pass = true;
            stack.extend(data.embedded_passes.iter().copied());
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aggregator/prewalk.rs"]
mod tests;
