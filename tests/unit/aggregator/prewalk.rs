use std::{cell::RefCell, rc::Rc};

use super::*;
use crate::{
    aggregator::{AggregatorSettings, SurfaceAggregator, frame::AggregatedFrame},
    foundation::{core::Color, core::DisplayTime, transform::DisplayTransform},
    quads::{
        builder::{FrameBuilder, PassBuilder},
        filters::{FilterOperation, FilterOperations},
        frame::{CompositorFrame, TransferableResource},
    },
    surfaces::{client::SurfaceClient, ids::SurfaceRange, manager::SurfaceManager},
};

#[derive(Default)]
struct DamageRecorder {
    damage: RefCell<Vec<(SurfaceId, Rect)>>,
}

impl SurfaceClient for DamageRecorder {
    fn ref_resources(&self, _resources: &[TransferableResource]) {}

    fn on_surface_aggregated_damage(
        &self,
        surface_id: SurfaceId,
        damage: Rect,
        _expected_display_time: DisplayTime,
    ) {
        self.damage.borrow_mut().push((surface_id, damage));
    }
}

fn sid(sink: u32) -> SurfaceId {
    SurfaceId::from_parts(sink, 1, 1)
}

fn child_frame(damage: Rect) -> CompositorFrame {
    let full = Rect::new(0, 0, 50, 50);
    FrameBuilder::new()
        .pass(PassBuilder::new(1, full).damage(damage).solid(full, Color::BLACK).build())
        .build()
        .unwrap()
}

fn embedding_frame(embed_rect: Rect, transform: Affine, child: SurfaceId) -> CompositorFrame {
    let full = Rect::new(0, 0, 100, 100);
    FrameBuilder::new()
        .pass(PassBuilder::new(1, full).surface(embed_rect, transform, child).build())
        .build()
        .unwrap()
}

fn aggregate(
    aggregator: &mut SurfaceAggregator,
    manager: &mut SurfaceManager,
) -> AggregatedFrame {
    aggregator.aggregate(
        manager,
        sid(1),
        DisplayTime::from_millis(16),
        DisplayTransform::None,
        Rect::default(),
    )
}

#[test]
fn clipped_quad_rect_maps_then_clips() {
    let quad = DrawQuad::solid_color(0, Rect::new(0, 0, 20, 20), Color::WHITE);
    let sqs = SharedQuadState {
        quad_to_target_transform: Affine::translate((5.0, 5.0)),
        clip_rect: Some(Rect::new(0, 0, 15, 30)),
        ..SharedQuadState::default()
    };
    assert_eq!(clipped_quad_rect(&quad, &sqs), Rect::new(5, 5, 10, 20));
}

#[test]
fn child_damage_reaches_the_root_in_target_space() {
    let recorder = Rc::new(DamageRecorder::default());
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(1), None).unwrap();
    manager
        .create_surface(sid(2), Some(recorder.clone() as Rc<dyn SurfaceClient>))
        .unwrap();
    manager
        .submit_frame(sid(2), child_frame(Rect::new(0, 0, 50, 50)))
        .unwrap();
    manager
        .submit_frame(
            sid(1),
            embedding_frame(Rect::new(0, 0, 50, 50), Affine::translate((10.0, 10.0)), sid(2)),
        )
        .unwrap();

    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    aggregate(&mut aggregator, &mut manager);
    recorder.damage.borrow_mut().clear();

    manager
        .submit_frame(sid(2), child_frame(Rect::new(0, 0, 5, 5)))
        .unwrap();
    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(
        frame.root_pass().unwrap().damage_rect,
        Rect::new(10, 10, 5, 5)
    );
    // Clients get damage in their own space.
    assert_eq!(
        recorder.damage.borrow().as_slice(),
        &[(sid(2), Rect::new(0, 0, 5, 5))]
    );
}

#[test]
fn unchanged_tree_notifies_nobody() {
    let recorder = Rc::new(DamageRecorder::default());
    let mut manager = SurfaceManager::new();
    manager
        .create_surface(sid(1), Some(recorder.clone() as Rc<dyn SurfaceClient>))
        .unwrap();
    manager
        .submit_frame(sid(1), child_frame(Rect::new(0, 0, 50, 50)))
        .unwrap();
    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();

    aggregate(&mut aggregator, &mut manager);
    assert_eq!(recorder.damage.borrow().len(), 1);
    aggregate(&mut aggregator, &mut manager);
    assert_eq!(recorder.damage.borrow().len(), 1);
}

#[test]
fn near_full_root_embed_sets_fullscreen_mode() {
    let mut manager = SurfaceManager::new();
    for sink in [1, 2] {
        manager.create_surface(sid(sink), None).unwrap();
    }
    manager
        .submit_frame(sid(2), child_frame(Rect::new(0, 0, 50, 50)))
        .unwrap();
    manager
        .submit_frame(
            sid(1),
            embedding_frame(Rect::new(0, 0, 50, 50), Affine::scale_non_uniform(1.9, 2.0), sid(2)),
        )
        .unwrap();
    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    assert!(aggregate(&mut aggregator, &mut manager).page_fullscreen_mode);

    manager
        .submit_frame(
            sid(1),
            embedding_frame(Rect::new(0, 0, 50, 50), Affine::IDENTITY, sid(2)),
        )
        .unwrap();
    assert!(!aggregate(&mut aggregator, &mut manager).page_fullscreen_mode);
}

#[test]
fn referenced_but_undrawn_surfaces_are_walked() {
    let mut manager = SurfaceManager::new();
    for sink in [1, 2] {
        manager.create_surface(sid(sink), None).unwrap();
    }
    manager
        .submit_frame(sid(2), child_frame(Rect::new(0, 0, 50, 50)))
        .unwrap();
    let full = Rect::new(0, 0, 100, 100);
    let root = FrameBuilder::new()
        .referenced_surface(SurfaceRange::single(sid(2)))
        .pass(PassBuilder::new(1, full).solid(full, Color::WHITE).build())
        .build()
        .unwrap();
    manager.submit_frame(sid(1), root).unwrap();

    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(frame.render_pass_list.len(), 1);
    assert_eq!(aggregator.last_stats().prewalked_surface_count, 2);
    assert_eq!(aggregator.last_stats().copied_surface_count, 1);
    assert!(aggregator.previous_contained_surfaces().contains(&sid(2)));
}

#[test]
fn wider_content_color_usage_is_reported() {
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(1), None).unwrap();
    let full = Rect::new(0, 0, 10, 10);
    let frame = FrameBuilder::new()
        .content_color_usage(ContentColorUsage::WideColorGamut)
        .pass(PassBuilder::new(1, full).solid(full, Color::WHITE).build())
        .build()
        .unwrap();
    manager.submit_frame(sid(1), frame).unwrap();
    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(frame.content_color_usage, ContentColorUsage::WideColorGamut);
    assert_eq!(
        frame.root_pass().unwrap().content_color_usage,
        ContentColorUsage::WideColorGamut
    );
}

const CHILD_PASS: u64 = 2;

fn two_pass_root(damage: Rect, child_pass: PassBuilder, embed_transform: Affine) -> CompositorFrame {
    let full = Rect::new(0, 0, 100, 100);
    let child_pass = child_pass.build();
    let child_rect = child_pass.output_rect;
    FrameBuilder::new()
        .pass(child_pass)
        .pass(
            PassBuilder::new(1, full)
                .damage(damage)
                .render_pass_quad(child_rect, embed_transform, CHILD_PASS)
                .build(),
        )
        .build()
        .unwrap()
}

/// Aggregate once with full damage, then resubmit `frame(damage)` and aggregate again.
fn second_aggregation(frame: impl Fn(Rect) -> CompositorFrame, damage: Rect) -> AggregatedFrame {
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(1), None).unwrap();
    let full = Rect::new(0, 0, 100, 100);
    manager.submit_frame(sid(1), frame(full)).unwrap();
    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    aggregate(&mut aggregator, &mut manager);
    manager.submit_frame(sid(1), frame(damage)).unwrap();
    aggregate(&mut aggregator, &mut manager)
}

#[test]
fn doubly_embedded_surface_is_notified_once() {
    let recorder = Rc::new(DamageRecorder::default());
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(1), None).unwrap();
    manager
        .create_surface(sid(2), Some(recorder.clone() as Rc<dyn SurfaceClient>))
        .unwrap();
    manager
        .submit_frame(sid(2), child_frame(Rect::new(0, 0, 50, 50)))
        .unwrap();
    let half = Rect::new(0, 0, 50, 50);
    let full = Rect::new(0, 0, 100, 100);
    let root = FrameBuilder::new()
        .pass(
            PassBuilder::new(1, full)
                .surface(half, Affine::IDENTITY, sid(2))
                .surface(half, Affine::translate((50.0, 50.0)), sid(2))
                .build(),
        )
        .build()
        .unwrap();
    manager.submit_frame(sid(1), root).unwrap();

    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    aggregate(&mut aggregator, &mut manager);
    assert_eq!(recorder.damage.borrow().as_slice(), &[(sid(2), half)]);
    recorder.damage.borrow_mut().clear();

    manager
        .submit_frame(sid(2), child_frame(Rect::new(0, 0, 5, 5)))
        .unwrap();
    let frame = aggregate(&mut aggregator, &mut manager);
    // Both embeds contribute damage, but the client hears about it once.
    assert_eq!(
        frame.root_pass().unwrap().damage_rect,
        Rect::new(0, 0, 55, 55)
    );
    assert_eq!(
        recorder.damage.borrow().as_slice(),
        &[(sid(2), Rect::new(0, 0, 5, 5))]
    );
}

#[test]
fn cached_pass_keeps_full_damage() {
    let child = |cached: bool| {
        move |damage: Rect| {
            let rect = Rect::new(0, 0, 50, 50);
            two_pass_root(
                damage,
                PassBuilder::new(CHILD_PASS, rect)
                    .cache_render_pass(cached)
                    .solid(rect, Color::BLACK),
                Affine::IDENTITY,
            )
        }
    };
    let damage = Rect::new(70, 70, 5, 5);

    let frame = second_aggregation(child(true), damage);
    assert_eq!(frame.render_pass_list.len(), 2);
    assert!(frame.render_pass_list[0].cache_render_pass);
    assert_eq!(frame.render_pass_list[0].damage_rect, Rect::new(0, 0, 50, 50));
    assert_eq!(frame.root_pass().unwrap().damage_rect, damage);

    let frame = second_aggregation(child(false), damage);
    assert!(frame.render_pass_list[0].damage_rect.is_empty());
    assert_eq!(frame.root_pass().unwrap().damage_rect, damage);
}

#[test]
fn blur_spreads_damage_past_the_quad() {
    let blurred = |damage: Rect| {
        let rect = Rect::new(0, 0, 50, 50);
        two_pass_root(
            damage,
            PassBuilder::new(CHILD_PASS, rect)
                .filters(FilterOperations(vec![FilterOperation::Blur { sigma: 2.0 }]))
                .solid(rect, Color::BLACK),
            Affine::translate((20.0, 20.0)),
        )
    };

    // The quad lands at (20, 20, 50, 50); blur reaches 3 sigma further.
    let frame = second_aggregation(blurred, Rect::new(40, 40, 4, 4));
    assert_eq!(
        frame.root_pass().unwrap().damage_rect,
        Rect::new(14, 14, 62, 62)
    );
    // Blurred content is redrawn whole.
    assert_eq!(frame.render_pass_list[0].damage_rect, Rect::new(0, 0, 50, 50));

    let frame = second_aggregation(blurred, Rect::new(90, 90, 4, 4));
    assert_eq!(
        frame.root_pass().unwrap().damage_rect,
        Rect::new(90, 90, 4, 4)
    );
}

#[test]
fn backdrop_filter_damages_the_area_it_samples() {
    let frosted = |damage: Rect| {
        let rect = Rect::new(0, 0, 30, 30);
        two_pass_root(
            damage,
            PassBuilder::new(CHILD_PASS, rect)
                .backdrop_filters(FilterOperations(vec![FilterOperation::Blur { sigma: 1.0 }]))
                .solid(rect, Color::WHITE),
            Affine::translate((20.0, 20.0)),
        )
    };

    let frame = second_aggregation(frosted, Rect::new(25, 25, 2, 2));
    let root = frame.root_pass().unwrap();
    assert_eq!(root.damage_rect, Rect::new(20, 20, 30, 30));
    assert!(matches!(
        root.quad_list[0].material,
        Material::AggregatedRenderPass {
            intersects_damage_under: true,
            ..
        }
    ));

    // Damage elsewhere leaves the filtered area alone.
    let frame = second_aggregation(frosted, Rect::new(80, 80, 2, 2));
    let root = frame.root_pass().unwrap();
    assert_eq!(root.damage_rect, Rect::new(80, 80, 2, 2));
    assert!(matches!(
        root.quad_list[0].material,
        Material::AggregatedRenderPass {
            intersects_damage_under: false,
            ..
        }
    ));
}

#[test]
fn frame_sinks_changed_only_when_a_new_sink_is_drawn() {
    let mut manager = SurfaceManager::new();
    for sink in [1, 2, 3] {
        manager.create_surface(sid(sink), None).unwrap();
    }
    for sink in [2, 3] {
        manager
            .submit_frame(sid(sink), child_frame(Rect::new(0, 0, 50, 50)))
            .unwrap();
    }
    manager
        .submit_frame(
            sid(1),
            embedding_frame(Rect::new(0, 0, 50, 50), Affine::IDENTITY, sid(2)),
        )
        .unwrap();
    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();

    aggregate(&mut aggregator, &mut manager);
    assert_eq!(manager.frame_sinks_changed_count(), 1);
    aggregate(&mut aggregator, &mut manager);
    assert_eq!(manager.frame_sinks_changed_count(), 1);

    let full = Rect::new(0, 0, 100, 100);
    let half = Rect::new(0, 0, 50, 50);
    let root = FrameBuilder::new()
        .pass(
            PassBuilder::new(1, full)
                .surface(half, Affine::IDENTITY, sid(2))
                .surface(half, Affine::translate((50.0, 0.0)), sid(3))
                .build(),
        )
        .build()
        .unwrap();
    manager.submit_frame(sid(1), root).unwrap();
    aggregate(&mut aggregator, &mut manager);
    assert_eq!(manager.frame_sinks_changed_count(), 2);
}

#[test]
fn full_damage_can_be_forced_for_one_surface() {
    let recorder = Rc::new(DamageRecorder::default());
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(1), None).unwrap();
    manager
        .create_surface(sid(2), Some(recorder.clone() as Rc<dyn SurfaceClient>))
        .unwrap();
    manager
        .submit_frame(sid(2), child_frame(Rect::new(0, 0, 50, 50)))
        .unwrap();
    manager
        .submit_frame(
            sid(1),
            embedding_frame(Rect::new(0, 0, 50, 50), Affine::translate((10.0, 10.0)), sid(2)),
        )
        .unwrap();
    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    aggregate(&mut aggregator, &mut manager);
    let frame = aggregate(&mut aggregator, &mut manager);
    assert!(frame.root_pass().unwrap().damage_rect.is_empty());
    recorder.damage.borrow_mut().clear();

    aggregator.set_full_damage_for_surface(sid(2));
    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(
        frame.root_pass().unwrap().damage_rect,
        Rect::new(10, 10, 50, 50)
    );
    assert_eq!(
        recorder.damage.borrow().as_slice(),
        &[(sid(2), Rect::new(0, 0, 50, 50))]
    );

    // Unknown surfaces are ignored.
    aggregator.set_full_damage_for_surface(sid(9));
    let frame = aggregate(&mut aggregator, &mut manager);
    assert!(frame.root_pass().unwrap().damage_rect.is_empty());
}
