//! Copy walk: emits the aggregated pass list, merging embedded root passes where allowed.

use kurbo::Affine;

use crate::{
    aggregator::{
        Aggregation, can_potentially_merge_pass, extra_content_scale,
        prewalk::PrewalkResult,
        resolved::{FrameSnapshot, PassKey},
    },
    foundation::{
        core::Color,
        geometry::Rect,
        transform::{
            is_identity, is_identity_or_translation, map_enclosed_rect_axis_aligned,
            map_enclosing_rect, preserves_2d_axis_alignment, try_inverse,
        },
    },
    quads::{
        draw_quad::{DrawQuad, Material, SurfaceQuadMaterial},
        frame::{CopyOutputRequest, DelegatedInkMetadata},
        render_pass::{AggregatedRenderPass, CompositorRenderPass, CompositorRenderPassId},
        shared_quad_state::{MaskFilterInfo, SharedQuadState},
    },
    surfaces::surface::CopyRequestsMap,
};

/// Mask filter of the embedding quad, carried into merged content.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct MaskFilterContext {
    pub mask_filter_info: MaskFilterInfo,
    pub is_fast_rounded_corner: bool,
}

impl MaskFilterContext {
    /// Mask of a source quad state, mapped into the destination by `target_transform`.
    ///
    /// Merging only happens under axis-aligned transforms, so a mask that cannot be mapped is
    /// dropped.
    pub(crate) fn new(
        mask_filter_info: MaskFilterInfo,
        is_fast_rounded_corner: bool,
        target_transform: &Affine,
    ) -> Self {
        let mask_filter_info = mask_filter_info
            .transformed(target_transform)
            .unwrap_or_default();
        Self {
            mask_filter_info,
            is_fast_rounded_corner,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.mask_filter_info.is_empty()
    }

    /// Whether `root_pass` can be drawn straight into a target using this mask.
    pub(crate) fn can_merge(&self, root_pass: &CompositorRenderPass) -> bool {
        if self.is_empty() {
            return true;
        }
        if self.mask_filter_info.has_rounded_corners() && !self.is_fast_rounded_corner {
            return false;
        }
        // Nested masks cannot be expressed on one quad state.
        root_pass
            .shared_quad_state_list
            .iter()
            .all(|sqs| sqs.mask_filter_info.is_empty())
    }
}

/// Where copied quads land in their destination pass.
#[derive(Clone, Copy, Debug)]
pub(crate) struct QuadPlacement {
    /// Source pass space to destination pass space.
    pub target_transform: Affine,
    /// Extra clip in destination space.
    pub clip_rect: Option<Rect>,
    /// Clip in root target space, used for damage list entries.
    pub dest_root_target_clip_rect: Option<Rect>,
    pub mask_filter: MaskFilterContext,
}

impl Default for QuadPlacement {
    fn default() -> Self {
        Self {
            target_transform: Affine::IDENTITY,
            clip_rect: None,
            dest_root_target_clip_rect: None,
            mask_filter: MaskFilterContext::default(),
        }
    }
}

/// A surface quad being resolved, with its state and material.
#[derive(Clone, Copy)]
pub(crate) struct SurfaceEmbed<'q> {
    pub quad: &'q DrawQuad,
    pub sqs: &'q SharedQuadState,
    pub material: &'q SurfaceQuadMaterial,
}

/// Clip for a copied quad: the surface clip intersected with the quad's own clip mapped into
/// the destination.
pub(crate) fn calculate_clip_rect(
    surface_clip: Option<Rect>,
    quad_clip: Option<Rect>,
    target_transform: &Affine,
) -> Option<Rect> {
    let Some(quad_clip) = quad_clip else {
        return surface_clip;
    };
    let mapped = map_enclosing_rect(target_transform, quad_clip);
    Some(match surface_clip {
        Some(surface_clip) => surface_clip.intersection(&mapped),
        None => mapped,
    })
}

/// Append a copy of `source` to `dest` with replaced geometry and return its index.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_and_scale_shared_quad_state(
    source: &SharedQuadState,
    quad_to_target_transform: &Affine,
    target_transform: &Affine,
    quad_layer_rect: Rect,
    visible_quad_layer_rect: Rect,
    added_clip_rect: Option<Rect>,
    mask_filter: &MaskFilterContext,
    dest: &mut AggregatedRenderPass,
) -> usize {
    let clip_rect = calculate_clip_rect(added_clip_rect, source.clip_rect, target_transform);
    dest.push_shared_quad_state(SharedQuadState {
        quad_to_target_transform: *target_transform * *quad_to_target_transform,
        quad_layer_rect,
        visible_quad_layer_rect,
        mask_filter_info: mask_filter.mask_filter_info,
        clip_rect,
        is_fast_rounded_corner: mask_filter.is_fast_rounded_corner,
        overlay_damage_index: None,
        ..source.clone()
    })
}

pub(crate) fn copy_shared_quad_state(
    source: &SharedQuadState,
    target_transform: &Affine,
    added_clip_rect: Option<Rect>,
    mask_filter: &MaskFilterContext,
    dest: &mut AggregatedRenderPass,
) -> usize {
    copy_and_scale_shared_quad_state(
        source,
        &source.quad_to_target_transform,
        target_transform,
        source.quad_layer_rect,
        source.visible_quad_layer_rect,
        added_clip_rect,
        mask_filter,
        dest,
    )
}

/// Where `quad` may draw in its target: its visible rect mapped and clipped. This also bounds
/// the damage it can cause, ignoring filters.
pub(crate) fn compute_drawable_rect_for_quad(quad: &DrawQuad, sqs: &SharedQuadState) -> Rect {
    let mut rect = map_enclosing_rect(&sqs.quad_to_target_transform, quad.visible_rect);
    if let Some(clip) = sqs.clip_rect {
        rect.intersect(&clip);
    }
    rect
}

/// Map `rect` from a source target space through the destination pass into root target space.
pub(crate) fn transform_rect_to_dest_root_target_space(
    rect_in_target_space: Rect,
    target_to_dest: &Affine,
    dest_to_root_target: &Affine,
    dest_root_target_clip_rect: Option<Rect>,
) -> Rect {
    let mut rect = map_enclosing_rect(&(*dest_to_root_target * *target_to_dest), rect_in_target_space);
    if let Some(clip) = dest_root_target_clip_rect {
        rect.intersect(&clip);
    }
    rect
}

/// Root damage mapped into quad space, or `None` when the quad transform is singular.
pub(crate) fn calculate_quad_space_damage_rect(
    quad_to_target: &Affine,
    target_to_root: &Affine,
    root_damage_rect: Rect,
) -> Option<Rect> {
    let inverse = try_inverse(&(*target_to_root * *quad_to_target))?;
    Some(map_enclosing_rect(&inverse, root_damage_rect))
}

pub(crate) fn move_matching_requests(
    pass_id: CompositorRenderPassId,
    requests: &mut CopyRequestsMap,
    out: &mut Vec<CopyOutputRequest>,
) {
    if let Some(mut matching) = requests.remove(&pass_id) {
        out.append(&mut matching);
    }
}

/// Stand-in for an embed with no surface at all.
pub(crate) fn emit_default_background_color_quad(
    embed: SurfaceEmbed<'_>,
    target_transform: &Affine,
    clip_rect: Option<Rect>,
    dest: &mut AggregatedRenderPass,
    mask_filter: &MaskFilterContext,
) {
    tracing::debug!(
        range = ?embed.material.surface_range,
        "no surface for embed; emitting default background"
    );
    let sqs_index = copy_shared_quad_state(embed.sqs, target_transform, clip_rect, mask_filter, dest);
    let mut quad = DrawQuad::solid_color(
        sqs_index,
        embed.quad.rect,
        embed.material.default_background_color,
    );
    quad.visible_rect = embed.quad.visible_rect;
    dest.push_quad(quad);
}

/// Fill the parts of `primary_rect` a smaller fallback leaves uncovered.
#[allow(clippy::too_many_arguments)]
pub(crate) fn emit_gutter_quads_if_necessary(
    primary_rect: Rect,
    fallback_rect: Rect,
    primary_sqs: &SharedQuadState,
    target_transform: &Affine,
    clip_rect: Option<Rect>,
    background_color: Color,
    dest: &mut AggregatedRenderPass,
    mask_filter: &MaskFilterContext,
) {
    if background_color.is_transparent() {
        return;
    }

    let emit = |rect: Rect, dest: &mut AggregatedRenderPass| {
        let sqs_index = copy_and_scale_shared_quad_state(
            primary_sqs,
            &primary_sqs.quad_to_target_transform,
            target_transform,
            rect,
            rect,
            clip_rect,
            mask_filter,
            dest,
        );
        dest.push_quad(DrawQuad::solid_color(sqs_index, rect, background_color));
    };

    if fallback_rect.width < primary_rect.width {
        // Includes the bottom right corner.
        emit(
            Rect::new(
                fallback_rect.right(),
                primary_rect.y,
                primary_rect.width - fallback_rect.width,
                primary_rect.height,
            ),
            dest,
        );
    }
    if fallback_rect.height < primary_rect.height {
        emit(
            Rect::new(
                primary_rect.x,
                fallback_rect.bottom(),
                fallback_rect.width,
                primary_rect.height - fallback_rect.height,
            ),
            dest,
        );
    }
}

impl Aggregation<'_> {
    /// Emit every pass of `frame` as its own destination pass. Used for the root surface and
    /// for undrawn surfaces carrying copy requests.
    #[tracing::instrument(level = "debug", skip_all, fields(surface = %frame.surface_id))]
    pub(crate) fn copy_passes(&mut self, frame: &FrameSnapshot) {
        let mut copy_requests = self.take_surface_copy_requests(frame);
        if !frame.valid {
            return;
        }
        self.stats.copied_surface_count += 1;

        let surface_transform = if self.is_root_surface(frame.surface_id) {
            self.root_surface_transform
        } else {
            Affine::IDENTITY
        };

        if let Some(ink) = &frame.frame.metadata.delegated_ink_metadata {
            let root_pass_to_root = frame.pass(frame.root_index()).transform_to_root_target;
            self.transform_and_store_delegated_ink_metadata(
                &(root_pass_to_root * surface_transform),
                ink,
            );
        }

        let mut apply_surface_transform_to_root_pass = true;
        for (pass_index, source) in frame.frame.render_pass_list.iter().enumerate() {
            let mut requests = Vec::new();
            move_matching_requests(source.id, &mut copy_requests, &mut requests);

            // A root pass with copy requests keeps its own space; a separate pass applies the
            // display transform.
            let is_root = frame.resolved_pass(pass_index).is_root;
            apply_surface_transform_to_root_pass =
                is_root && (requests.is_empty() || is_identity(&surface_transform));

            let (output_rect, transform_to_root_target) = if apply_surface_transform_to_root_pass {
                (
                    map_enclosed_rect_axis_aligned(&surface_transform, source.output_rect),
                    source.transform_to_root_target,
                )
            } else {
                (
                    source.output_rect,
                    surface_transform * source.transform_to_root_target,
                )
            };

            let mut copy_pass =
                self.new_copy_pass(frame, pass_index, output_rect, transform_to_root_target);
            copy_pass.copy_requests = requests;

            if self.agg.settings.needs_surface_damage_rect_list && is_root {
                let dest_to_root = copy_pass.transform_to_root_target;
                self.add_surface_damage_to_damage_list(
                    Rect::default(),
                    Some(frame),
                    &surface_transform,
                    None,
                    &dest_to_root,
                );
            }

            let placement = QuadPlacement {
                target_transform: if apply_surface_transform_to_root_pass {
                    surface_transform
                } else {
                    Affine::IDENTITY
                },
                ..QuadPlacement::default()
            };
            self.copy_quads_to_pass(frame, pass_index, &mut copy_pass, &placement);
            self.restrict_to_root_damage(frame.key(pass_index), &mut copy_pass);
            self.dest_pass_list.push(copy_pass);
        }

        if !apply_surface_transform_to_root_pass {
            self.add_display_transform_pass();
        }
    }

    /// Copy surfaces that nothing draws but that hold copy requests, directly or through
    /// surfaces they reference.
    pub(crate) fn copy_undrawn_surfaces(&mut self, prewalk: &mut PrewalkResult) {
        debug_assert!(self.referenced_surfaces.is_empty());
        let mut to_copy: Vec<_> = prewalk.undrawn_surfaces.iter().copied().collect();
        let mut next = 0;
        while next < to_copy.len() {
            let surface_id = to_copy[next];
            next += 1;
            let Some(frame) = self.resolve_surface(surface_id) else {
                continue;
            };
            let has_requests = self
                .manager
                .get_surface_for_id(&surface_id)
                .is_some_and(|s| s.has_copy_output_requests());
            if has_requests {
                prewalk.undrawn_surfaces.remove(&surface_id);
                self.visit_surface(surface_id, |this| this.copy_passes(&frame));
            } else {
                for child in self.manager.active_referenced_surfaces(&surface_id) {
                    if prewalk.undrawn_surfaces.insert(child) {
                        to_copy.push(child);
                    }
                }
            }
        }
    }

    /// Copy the quads of one source pass into `dest`.
    pub(crate) fn copy_quads_to_pass(
        &mut self,
        frame: &FrameSnapshot,
        pass_index: usize,
        dest: &mut AggregatedRenderPass,
        placement: &QuadPlacement,
    ) {
        let key = frame.key(pass_index);
        let source = frame.pass(pass_index);
        let resolved_pass = frame.resolved_pass(pass_index);
        let flags = self.pass_data(key).map(|d| d.flags).unwrap_or_default();
        let needs_damage_list = self.agg.settings.needs_surface_damage_rect_list;
        let de_jelly_enabled = self.agg.settings.de_jelly.is_some();

        // Quads outside the root damage can only be dropped when nothing needs the complete
        // picture.
        let ignore_undamaged = self.agg.settings.aggregate_only_damaged
            && !self.has_copy_requests
            && !self.has_pixel_moving_backdrop_filter
            && !flags.in_cached_render_pass
            && !flags.in_pixel_moving_filter_pass;

        let overlay = if needs_damage_list && flags.will_draw {
            self.find_quad_with_overlay_damage(frame, pass_index)
        } else {
            None
        };

        let mut mask_filter = placement.mask_filter;
        let mut last_copied_sqs: Option<usize> = None;
        // Root damage in the quad space of the last copied state; `None` when unknown.
        let mut damage_in_quad_space: Option<Rect> = None;

        for (quad_index, quad) in source.quad_list.iter().enumerate() {
            let sqs = source.sqs(quad);

            if let Material::SurfaceContent(material) = &quad.material {
                // Surface content brings its own quad states.
                last_copied_sqs = None;
                if !material.surface_range.end.is_valid() {
                    continue;
                }
                if placement.mask_filter.is_empty() {
                    mask_filter = MaskFilterContext::new(
                        sqs.mask_filter_info,
                        sqs.is_fast_rounded_corner,
                        &placement.target_transform,
                    );
                }
                let embed = SurfaceEmbed { quad, sqs, material };
                let surface_placement = QuadPlacement {
                    mask_filter,
                    ..*placement
                };
                self.handle_surface_quad(
                    frame,
                    pass_index,
                    embed,
                    dest,
                    &surface_placement,
                    ignore_undamaged,
                );
                continue;
            }

            if last_copied_sqs != Some(quad.shared_quad_state) {
                if placement.mask_filter.is_empty() {
                    mask_filter = MaskFilterContext::new(
                        sqs.mask_filter_info,
                        sqs.is_fast_rounded_corner,
                        &placement.target_transform,
                    );
                }
                let dest_sqs = copy_shared_quad_state(
                    sqs,
                    &placement.target_transform,
                    placement.clip_rect,
                    &mask_filter,
                    dest,
                );

                let per_quad_damage = quad.per_quad_damage().filter(|_| {
                    source.has_per_quad_damage && needs_damage_list && flags.will_draw
                });
                if let Some(per_quad_damage) = per_quad_damage {
                    let dest_to_root = dest.transform_to_root_target;
                    let pushed = self.add_surface_damage_to_damage_list(
                        per_quad_damage,
                        None,
                        &placement.target_transform,
                        placement.dest_root_target_clip_rect,
                        &dest_to_root,
                    );
                    if pushed {
                        dest.shared_quad_state_list[dest_sqs].overlay_damage_index =
                            Some(self.surface_damage_rect_list.len() - 1);
                    }
                } else if let Some((overlay_quad, damage_index)) = overlay {
                    if overlay_quad == quad_index {
                        dest.shared_quad_state_list[dest_sqs].overlay_damage_index =
                            Some(damage_index);
                    }
                }

                // Skew only applies the first time a surface draws.
                if de_jelly_enabled && !self.new_surfaces.contains(&frame.surface_id) {
                    dest.shared_quad_state_list[dest_sqs].de_jelly_delta_y = 0.0;
                }

                last_copied_sqs = Some(quad.shared_quad_state);
                if ignore_undamaged {
                    damage_in_quad_space = calculate_quad_space_damage_rect(
                        &dest.shared_quad_state_list[dest_sqs].quad_to_target_transform,
                        &dest.transform_to_root_target,
                        self.root_damage_rect,
                    );
                }
            }

            if ignore_undamaged
                && damage_in_quad_space.is_some_and(|damage| !damage.intersects(&quad.visible_rect))
            {
                continue;
            }

            let dest_quad = match &quad.material {
                Material::CompositorRenderPass { render_pass_id } => {
                    let Some(child_index) = frame.passes.index_for(*render_pass_id) else {
                        continue;
                    };
                    let intersects_damage_under = self
                        .pass_data(key)
                        .is_some_and(|d| d.intersects_damage_under.contains(&quad_index));
                    if needs_damage_list && flags.will_draw {
                        let dest_to_root = dest.transform_to_root_target;
                        self.add_render_pass_filter_damage_to_damage_list(
                            frame,
                            child_index,
                            quad,
                            sqs,
                            &placement.target_transform,
                            placement.dest_root_target_clip_rect,
                            &dest_to_root,
                        );
                    }
                    DrawQuad {
                        resources: resolved_pass.draw_quads[quad_index].remapped_resources.clone(),
                        material: Material::AggregatedRenderPass {
                            render_pass_id: frame.resolved_pass(child_index).remapped_id,
                            intersects_damage_under,
                        },
                        ..quad.clone()
                    }
                }
                Material::Texture {
                    secure_output_only: true,
                    ..
                } if !self.agg.settings.output_is_secure || flags.in_copy_request_pass => {
                    let mut black = DrawQuad::solid_color(0, quad.rect, Color::BLACK);
                    black.visible_rect = quad.visible_rect;
                    black
                }
                _ => DrawQuad {
                    resources: resolved_pass.draw_quads[quad_index].remapped_resources.clone(),
                    ..quad.clone()
                },
            };
            dest.push_quad(dest_quad);
        }
    }

    fn handle_surface_quad(
        &mut self,
        frame: &FrameSnapshot,
        pass_index: usize,
        embed: SurfaceEmbed<'_>,
        dest: &mut AggregatedRenderPass,
        placement: &QuadPlacement,
        ignore_undamaged: bool,
    ) {
        debug_assert!(preserves_2d_axis_alignment(&placement.target_transform));
        let source_pass = frame.pass(pass_index);
        let primary = embed.material.surface_range.end;
        let child = self.resolve_range(&embed.material.surface_range);
        let using_primary = child.as_ref().is_some_and(|c| c.surface_id == primary);

        // Content of the embed never leaves the pass that holds it.
        let surface_clip = calculate_clip_rect(
            placement.clip_rect,
            Some(source_pass.output_rect),
            &placement.target_transform,
        );

        let mut combined_clip = None;
        if self.agg.settings.needs_surface_damage_rect_list {
            let mut in_target = compute_drawable_rect_for_quad(embed.quad, embed.sqs);
            in_target.intersect(&source_pass.output_rect);
            let dest_to_root = dest.transform_to_root_target;
            if !using_primary {
                // Fallback or missing content has no frame-to-frame damage.
                self.add_surface_damage_to_damage_list(
                    in_target,
                    None,
                    &placement.target_transform,
                    placement.dest_root_target_clip_rect,
                    &dest_to_root,
                );
            }
            combined_clip = Some(transform_rect_to_dest_root_target_space(
                in_target,
                &placement.target_transform,
                &dest_to_root,
                placement.dest_root_target_clip_rect,
            ));
        }

        let Some(child) = child else {
            emit_default_background_color_quad(
                embed,
                &placement.target_transform,
                surface_clip,
                dest,
                &placement.mask_filter,
            );
            return;
        };

        let parent_device_scale_factor = frame.frame.device_scale_factor();
        if !using_primary && !embed.material.stretch_content_to_fill_bounds {
            let fallback = &child.frame;
            let ratio = parent_device_scale_factor / fallback.device_scale_factor();
            let fallback_rect = Rect::from_size(fallback.size_in_pixels())
                .scale_to_enclosing(ratio, ratio)
                .intersection(&embed.quad.visible_rect);
            emit_gutter_quads_if_necessary(
                embed.quad.visible_rect,
                fallback_rect,
                embed.sqs,
                &placement.target_transform,
                surface_clip,
                fallback.metadata.root_background_color,
                dest,
                &placement.mask_filter,
            );
        }

        let child_placement = QuadPlacement {
            clip_rect: surface_clip,
            dest_root_target_clip_rect: combined_clip,
            ..*placement
        };
        self.emit_surface_content(
            &child,
            parent_device_scale_factor,
            embed,
            dest,
            &child_placement,
            ignore_undamaged,
        );
    }

    fn emit_surface_content(
        &mut self,
        child: &FrameSnapshot,
        parent_device_scale_factor: f32,
        embed: SurfaceEmbed<'_>,
        dest: &mut AggregatedRenderPass,
        placement: &QuadPlacement,
        ignore_undamaged: bool,
    ) {
        let aggregated = self.visit_surface(child.surface_id, |this| {
            this.stats.copied_surface_count += 1;

            let (scale_x, scale_y) = extra_content_scale(
                embed.material,
                embed.quad.rect,
                parent_device_scale_factor,
                &child.frame,
            );
            let scaled_quad_to_target = embed.sqs.quad_to_target_transform
                * Affine::scale_non_uniform(f64::from(scale_x), f64::from(scale_y));

            if ignore_undamaged {
                let quad_to_target =
                    placement.target_transform * embed.sqs.quad_to_target_transform;
                let damage = calculate_quad_space_damage_rect(
                    &quad_to_target,
                    &dest.transform_to_root_target,
                    this.root_damage_rect,
                );
                if damage.is_some_and(|d| !d.intersects(&embed.quad.visible_rect)) {
                    return false;
                }
            }

            let copy_requests = this.take_surface_copy_requests(child);
            if !child.valid {
                if !copy_requests.is_empty() {
                    tracing::debug!(surface = %child.surface_id, "dropping copy requests of invalid frame");
                }
                return false;
            }

            this.emit_visited_surface_content(
                child,
                embed,
                dest,
                placement,
                scaled_quad_to_target,
                (scale_x, scale_y),
                copy_requests,
            );
            true
        });
        if aggregated == Some(true) {
            if let Some(surface) = self.manager.get_surface_for_id_mut(&child.surface_id) {
                surface.did_aggregate();
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_visited_surface_content(
        &mut self,
        child: &FrameSnapshot,
        embed: SurfaceEmbed<'_>,
        dest: &mut AggregatedRenderPass,
        placement: &QuadPlacement,
        scaled_quad_to_target: Affine,
        (scale_x, scale_y): (f32, f32),
        mut copy_requests: CopyRequestsMap,
    ) {
        let combined_transform = placement.target_transform * scaled_quad_to_target;
        let root_index = child.root_index();
        let root_pass = child.pass(root_index);

        // Reflections that get scaled keep their pass so they can be drawn with AA.
        let reflected_and_scaled =
            embed.material.is_reflection && !is_identity_or_translation(&scaled_quad_to_target);
        let merge_pass = can_potentially_merge_pass(embed.material, embed.sqs)
            && !reflected_and_scaled
            && copy_requests.is_empty()
            && preserves_2d_axis_alignment(&combined_transform)
            && placement.mask_filter.can_merge(root_pass);

        // Merged content must not draw outside where the embed would have drawn.
        let surface_quad_clip = if merge_pass {
            calculate_clip_rect(
                placement.clip_rect,
                Some(compute_drawable_rect_for_quad(embed.quad, embed.sqs)),
                &placement.target_transform,
            )
        } else {
            None
        };

        let will_draw = self
            .pass_data(child.root_key())
            .is_some_and(|d| d.flags.will_draw);
        if self.agg.settings.needs_surface_damage_rect_list && will_draw {
            let dest_to_root = dest.transform_to_root_target;
            self.add_surface_damage_to_damage_list(
                Rect::default(),
                Some(child),
                &combined_transform,
                placement.dest_root_target_clip_rect,
                &dest_to_root,
            );
        }

        if let Some(ink) = &child.frame.metadata.delegated_ink_metadata {
            let to_root = dest.transform_to_root_target * combined_transform;
            self.transform_and_store_delegated_ink_metadata(&to_root, ink);
        }

        let pass_count = child.frame.render_pass_list.len();
        let passes_to_copy = if merge_pass {
            pass_count.saturating_sub(1)
        } else {
            pass_count
        };
        let max_size = self.agg.settings.max_render_target_size;
        for pass_index in 0..passes_to_copy {
            let source = child.pass(pass_index);
            let mut output_rect = source.output_rect;
            if max_size > 0 {
                output_rect.width = output_rect.width.min(max_size);
                output_rect.height = output_rect.height.min(max_size);
            }
            let transform_to_root_target =
                dest.transform_to_root_target * combined_transform * source.transform_to_root_target;
            let mut copy_pass =
                self.new_copy_pass(child, pass_index, output_rect, transform_to_root_target);
            move_matching_requests(source.id, &mut copy_requests, &mut copy_pass.copy_requests);

            let pass_placement = QuadPlacement {
                dest_root_target_clip_rect: placement.dest_root_target_clip_rect,
                ..QuadPlacement::default()
            };
            self.copy_quads_to_pass(child, pass_index, &mut copy_pass, &pass_placement);
            self.restrict_to_root_damage(child.key(pass_index), &mut copy_pass);
            self.dest_pass_list.push(copy_pass);
        }

        if merge_pass {
            let merge_placement = QuadPlacement {
                target_transform: combined_transform,
                clip_rect: surface_quad_clip,
                dest_root_target_clip_rect: placement.dest_root_target_clip_rect,
                mask_filter: placement.mask_filter,
            };
            self.copy_quads_to_pass(child, root_index, dest, &merge_placement);
            return;
        }

        let (inverse_x, inverse_y) = (1.0 / scale_x, 1.0 / scale_y);
        let sqs_index = copy_and_scale_shared_quad_state(
            embed.sqs,
            &scaled_quad_to_target,
            &placement.target_transform,
            embed.sqs.quad_layer_rect.scale_to_enclosing(inverse_x, inverse_y),
            embed
                .sqs
                .visible_quad_layer_rect
                .scale_to_enclosing(inverse_x, inverse_y),
            placement.clip_rect,
            &placement.mask_filter,
            dest,
        );

        // The embed may be clipped tighter than the child's root pass.
        let quad_rect = root_pass.output_rect;
        let visible_rect = embed
            .quad
            .visible_rect
            .scale_to_enclosing(inverse_x, inverse_y)
            .intersection(&quad_rect);
        let remapped_id = child.resolved_pass(root_index).remapped_id;
        if visible_rect.is_empty() {
            self.dest_pass_list.retain(|p| p.id != remapped_id);
            return;
        }
        let mut pass_quad = DrawQuad::new(
            sqs_index,
            quad_rect,
            Material::AggregatedRenderPass {
                render_pass_id: remapped_id,
                intersects_damage_under: true,
            },
        );
        pass_quad.visible_rect = visible_rect;
        pass_quad.needs_blending = true;
        dest.push_quad(pass_quad);
    }

    /// Destination pass for a source pass, with full damage over `output_rect`.
    fn new_copy_pass(
        &self,
        frame: &FrameSnapshot,
        pass_index: usize,
        output_rect: Rect,
        transform_to_root_target: Affine,
    ) -> AggregatedRenderPass {
        let source = frame.pass(pass_index);
        let has_damage_from_contributing_content = self
            .pass_data(frame.key(pass_index))
            .is_some_and(|d| d.flags.has_damage_from_contributing_content);
        AggregatedRenderPass {
            filters: source.filters.clone(),
            backdrop_filters: source.backdrop_filters.clone(),
            backdrop_filter_bounds: source.backdrop_filter_bounds,
            content_color_usage: self.agg.root_content_color_usage,
            has_transparent_background: source.has_transparent_background,
            cache_render_pass: source.cache_render_pass,
            has_damage_from_contributing_content,
            generate_mipmap: source.generate_mipmap,
            ..AggregatedRenderPass::new(
                frame.resolved_pass(pass_index).remapped_id,
                output_rect,
                output_rect,
                transform_to_root_target,
            )
        }
    }

    /// Cut a copied pass's damage down to the root damage, unless it must be drawn whole.
    fn restrict_to_root_damage(&self, key: PassKey, pass: &mut AggregatedRenderPass) {
        let needs_full_damage = self
            .pass_data(key)
            .is_some_and(|d| d.flags.needs_full_damage());
        if needs_full_damage {
            return;
        }
        if let Some(inverse) = try_inverse(&pass.transform_to_root_target) {
            pass.damage_rect
                .intersect(&map_enclosing_rect(&inverse, self.root_damage_rect));
        }
    }

    fn take_surface_copy_requests(&mut self, frame: &FrameSnapshot) -> CopyRequestsMap {
        if !self.agg.settings.take_copy_requests {
            return CopyRequestsMap::new();
        }
        self.manager
            .get_surface_for_id_mut(&frame.surface_id)
            .map(|s| s.take_copy_output_requests())
            .unwrap_or_default()
    }

    /// Keep ink metadata in root target space. The newest timestamp wins.
    pub(crate) fn transform_and_store_delegated_ink_metadata(
        &mut self,
        to_root_target: &Affine,
        ink: &DelegatedInkMetadata,
    ) {
        if self
            .delegated_ink_metadata
            .as_ref()
            .is_some_and(|stored| ink.timestamp < stored.timestamp)
        {
            return;
        }
        self.delegated_ink_metadata = Some(DelegatedInkMetadata {
            point: *to_root_target * ink.point,
            presentation_area: to_root_target.transform_rect_bbox(ink.presentation_area),
            ..ink.clone()
        });
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aggregator/copy.rs"]
mod tests;
