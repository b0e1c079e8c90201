//! De-jelly: skews root content that scrolled since it was rastered, so it lines up with
//! content that moved with the scroll.

use crate::{
    aggregator::Aggregation,
    foundation::{
        geometry::Rect,
        transform::{map_enclosing_rect, skew_y_degrees},
    },
    quads::{
        draw_quad::{DrawQuad, Material},
        render_pass::AggregatedRenderPass,
        shared_quad_state::{BlendMode, SharedQuadState},
    },
};

/// Skewed pass collecting a run of clipped quads. Non-default blending is applied when the
/// pass is drawn rather than per quad.
struct SubPass {
    pass: AggregatedRenderPass,
    opacity: f32,
    blend_mode: BlendMode,
}

/// Copy a run of quads sharing one state into `dest` under a copy of `state`.
fn append_quads_for_shared_quad_state(
    state: SharedQuadState,
    quads: &[DrawQuad],
    dest: &mut AggregatedRenderPass,
) {
    dest.push_shared_quad_state(state);
    for quad in quads {
        debug_assert!(!matches!(quad.material, Material::CompositorRenderPass { .. }));
        dest.push_quad(quad.clone());
    }
}

fn create_de_jelly_normal_quads(
    state: &SharedQuadState,
    quads: &[DrawQuad],
    root: &mut AggregatedRenderPass,
    skew: f32,
) {
    let mut new_state = state.clone();
    if skew != 0.0 {
        new_state.quad_to_target_transform = skew_y_degrees(skew) * new_state.quad_to_target_transform;
    }
    append_quads_for_shared_quad_state(new_state, quads, root);
}

impl Aggregation<'_> {
    /// Rebuild the root pass with skew applied to every state carrying a scroll delta.
    ///
    /// All skewed content uses the largest skew so neighbouring quads do not tear apart.
    /// Runs clipped tighter than the union of skewed clips are drawn through sub-passes that
    /// may extend past their clip.
    #[tracing::instrument(level = "debug", skip_all)]
    pub(crate) fn handle_de_jelly(&mut self) {
        let Some(settings) = self.agg.settings.de_jelly else {
            return;
        };
        let Some(root) = self.dest_pass_list.last() else {
            return;
        };

        let mut jelly_clip = Rect::default();
        let mut max_skew = 0.0_f32;
        for state in &root.shared_quad_state_list {
            let delta_y = state.de_jelly_delta_y;
            if delta_y == 0.0 {
                continue;
            }
            if let Some(clip) = state.clip_rect {
                jelly_clip.union(&clip);
            }
            let angle = delta_y.atan2(settings.screen_width).to_degrees();
            max_skew = angle.abs().max(max_skew.abs()) * angle.signum();
        }

        if max_skew == 0.0 {
            self.set_last_frame_had_jelly(false);
            return;
        }
        self.set_last_frame_had_jelly(true);
        tracing::debug!(max_skew, %jelly_clip, "skewing root pass");

        let Some(mut old_root) = self.dest_pass_list.pop() else {
            return;
        };
        let mut new_root = old_root.copy_without_quads(old_root.id);
        new_root.copy_requests = std::mem::take(&mut old_root.copy_requests);

        let mut sub_pass: Option<SubPass> = None;
        let mut start = 0;
        while start < old_root.quad_list.len() {
            let sqs_index = old_root.quad_list[start].shared_quad_state;
            let run = old_root.quad_list[start..]
                .iter()
                .take_while(|q| q.shared_quad_state == sqs_index)
                .count();
            let quads = &old_root.quad_list[start..start + run];
            start += run;

            let state = &old_root.shared_quad_state_list[sqs_index];
            let has_skew = state.de_jelly_delta_y != 0.0;

            let incompatible = sub_pass.as_ref().is_some_and(|sub| {
                !has_skew
                    || sub.blend_mode != state.blend_mode
                    || state.blend_mode != BlendMode::SrcOver
            });
            if incompatible {
                if let Some(sub) = sub_pass.take() {
                    self.append_de_jelly_render_pass(max_skew, jelly_clip, sub, &mut new_root);
                }
            }

            let create_sub_pass = has_skew && state.clip_rect.is_some_and(|c| c != jelly_clip);
            if sub_pass.is_none() && create_sub_pass {
                let (opacity, blend_mode) = if state.blend_mode != BlendMode::SrcOver {
                    (state.opacity, state.blend_mode)
                } else {
                    (1.0, BlendMode::SrcOver)
                };
                // Rects grow as quads are added.
                let pass = AggregatedRenderPass::new(
                    self.agg.id_generator.generate_next_id(),
                    Rect::default(),
                    Rect::default(),
                    skew_y_degrees(max_skew),
                );
                sub_pass = Some(SubPass {
                    pass,
                    opacity,
                    blend_mode,
                });
            }

            match sub_pass.as_mut() {
                Some(sub) => self.create_de_jelly_render_pass_quads(
                    state,
                    quads,
                    jelly_clip,
                    settings.max_de_jelly_height,
                    &mut sub.pass,
                ),
                None => create_de_jelly_normal_quads(
                    state,
                    quads,
                    &mut new_root,
                    if has_skew { max_skew } else { 0.0 },
                ),
            }
        }
        if let Some(sub) = sub_pass.take() {
            self.append_de_jelly_render_pass(max_skew, jelly_clip, sub, &mut new_root);
        }

        self.dest_pass_list.push(new_root);
    }

    fn create_de_jelly_render_pass_quads(
        &self,
        state: &SharedQuadState,
        quads: &[DrawQuad],
        jelly_clip: Rect,
        max_de_jelly_height: i32,
        sub_pass: &mut AggregatedRenderPass,
    ) {
        let clip = state.clip_rect.unwrap_or(jelly_clip);

        // Content clipped at an edge of the jelly clip may have been over-clipped.
        let un_clip_top = if clip.y <= jelly_clip.y {
            max_de_jelly_height
        } else {
            0
        };
        let un_clip_bottom = if clip.bottom() >= jelly_clip.bottom() {
            max_de_jelly_height
        } else {
            0
        };

        let mut visible = state.visible_quad_layer_rect;
        if let Some(pass_id) = quads.first().and_then(DrawQuad::aggregated_render_pass_id) {
            if let Some(pass) = self.dest_pass_list.iter().find(|p| p.id == pass_id) {
                visible = pass.filters.expand_rect(visible);
            }
        }
        let visible = map_enclosing_rect(&state.quad_to_target_transform, visible).inset(
            -un_clip_top,
            0,
            -un_clip_bottom,
            0,
        );

        sub_pass.output_rect.union(&visible);
        sub_pass.damage_rect = sub_pass.output_rect;

        let mut new_state = state.clone();
        if state.blend_mode != BlendMode::SrcOver {
            new_state.opacity = 1.0;
            new_state.blend_mode = BlendMode::SrcOver;
        }
        new_state.clip_rect = Some(clip.inset(-un_clip_top, 0, -un_clip_bottom, 0));
        append_quads_for_shared_quad_state(new_state, quads, sub_pass);
    }

    fn append_de_jelly_render_pass(
        &mut self,
        skew: f32,
        jelly_clip: Rect,
        sub: SubPass,
        root: &mut AggregatedRenderPass,
    ) {
        let output_rect = sub.pass.output_rect;
        root.push_shared_quad_state(SharedQuadState {
            quad_to_target_transform: skew_y_degrees(skew),
            clip_rect: Some(jelly_clip),
            are_contents_opaque: false,
            opacity: sub.opacity,
            blend_mode: sub.blend_mode,
            ..SharedQuadState::with_rect(output_rect)
        });
        root.push_quad(DrawQuad::new(
            0,
            output_rect,
            Material::AggregatedRenderPass {
                render_pass_id: sub.pass.id,
                intersects_damage_under: false,
            },
        ));
        self.dest_pass_list.push(sub.pass);
    }

    /// A frame without jelly after one with jelly redraws the whole root; the skew may have
    /// been removed from otherwise unchanged content.
    pub(crate) fn set_last_frame_had_jelly(&mut self, had_jelly: bool) {
        if self.agg.last_frame_had_jelly && !had_jelly {
            if let Some(root) = self.dest_pass_list.last_mut() {
                root.damage_rect = root.output_rect;
            }
        }
        self.agg.last_frame_had_jelly = had_jelly;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aggregator/de_jelly.rs"]
mod tests;
