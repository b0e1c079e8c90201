use super::*;
use crate::{
    aggregator::{DeJellySettings, SurfaceAggregator, frame::AggregatedFrame},
    foundation::{
        core::{Color, DisplayTime},
        transform::DisplayTransform,
    },
    quads::{
        builder::{FrameBuilder, PassBuilder},
        frame::CompositorFrame,
    },
    surfaces::{ids::SurfaceId, manager::SurfaceManager},
};

fn sid() -> SurfaceId {
    SurfaceId::from_parts(1, 1, 1)
}

fn full() -> Rect {
    Rect::new(0, 0, 100, 100)
}

fn scrolled(rect: Rect, clip: Rect, delta_y: f32) -> SharedQuadState {
    SharedQuadState {
        clip_rect: Some(clip),
        de_jelly_delta_y: delta_y,
        ..SharedQuadState::with_rect(rect)
    }
}

fn frame_of(states: Vec<SharedQuadState>, damage: Rect) -> CompositorFrame {
    let mut pass = PassBuilder::new(1, full()).damage(damage);
    for state in states {
        let rect = state.quad_layer_rect;
        pass = pass
            .shared_state(state)
            .quad(DrawQuad::solid_color(0, rect, Color::WHITE));
    }
    FrameBuilder::new().pass(pass.build()).build().unwrap()
}

fn setup(frame: CompositorFrame) -> (SurfaceManager, SurfaceAggregator) {
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(), None).unwrap();
    manager.submit_frame(sid(), frame).unwrap();
    let aggregator = SurfaceAggregator::builder()
        .de_jelly(DeJellySettings::default())
        .build()
        .unwrap();
    (manager, aggregator)
}

fn aggregate(aggregator: &mut SurfaceAggregator, manager: &mut SurfaceManager) -> AggregatedFrame {
    aggregator.aggregate(
        manager,
        sid(),
        DisplayTime::NULL,
        DisplayTransform::None,
        Rect::default(),
    )
}

fn skew_for(delta_y: f32) -> f32 {
    delta_y.atan2(DeJellySettings::default().screen_width).to_degrees()
}

#[test]
fn content_filling_the_jelly_clip_is_skewed_in_place() {
    let top = Rect::new(0, 0, 100, 50);
    let bottom = Rect::new(0, 50, 100, 50);
    let (mut manager, mut aggregator) = setup(frame_of(
        vec![scrolled(top, top, 10.0), SharedQuadState::with_rect(bottom)],
        full(),
    ));

    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(frame.render_pass_list.len(), 1);
    let root = frame.root_pass().unwrap();
    assert_eq!(root.quad_list.len(), 2);
    assert_eq!(
        root.sqs(&root.quad_list[0]).quad_to_target_transform,
        skew_y_degrees(skew_for(10.0))
    );
    assert_eq!(
        root.sqs(&root.quad_list[1]).quad_to_target_transform,
        kurbo::Affine::IDENTITY
    );
}

#[test]
fn tighter_clips_are_drawn_through_a_skewed_sub_pass() {
    let (mut manager, mut aggregator) = setup(frame_of(
        vec![
            scrolled(Rect::new(0, 0, 100, 30), Rect::new(0, 0, 100, 30), 10.0),
            scrolled(Rect::new(0, 30, 100, 20), Rect::new(0, 30, 100, 20), 5.0),
            SharedQuadState::with_rect(Rect::new(0, 50, 100, 50)),
        ],
        full(),
    ));

    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(frame.render_pass_list.len(), 2);
    let skew = skew_y_degrees(skew_for(10.0));

    let sub = &frame.render_pass_list[0];
    assert_eq!(sub.transform_to_root_target, skew);
    // Clips touching the jelly clip edges are grown by the max de-jelly height.
    assert_eq!(sub.output_rect, Rect::new(0, -30, 100, 110));
    assert_eq!(sub.quad_list.len(), 2);
    assert_eq!(
        sub.sqs(&sub.quad_list[0]).clip_rect,
        Some(Rect::new(0, -30, 100, 60))
    );
    assert_eq!(
        sub.sqs(&sub.quad_list[1]).clip_rect,
        Some(Rect::new(0, 30, 100, 50))
    );

    let root = frame.root_pass().unwrap();
    assert_eq!(root.quad_list.len(), 2);
    assert_eq!(root.quad_list[0].aggregated_render_pass_id(), Some(sub.id));
    let sub_state = root.sqs(&root.quad_list[0]);
    assert_eq!(sub_state.quad_to_target_transform, skew);
    assert_eq!(sub_state.clip_rect, Some(Rect::new(0, 0, 100, 50)));
    assert_eq!(
        root.sqs(&root.quad_list[1]).quad_to_target_transform,
        kurbo::Affine::IDENTITY
    );
}

#[test]
fn dropping_jelly_redraws_the_root() {
    let top = Rect::new(0, 0, 100, 50);
    let (mut manager, mut aggregator) =
        setup(frame_of(vec![scrolled(top, top, 10.0)], full()));
    aggregate(&mut aggregator, &mut manager);

    let small = Rect::new(0, 0, 1, 1);
    manager
        .submit_frame(sid(), frame_of(vec![SharedQuadState::with_rect(top)], small))
        .unwrap();
    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(frame.root_pass().unwrap().damage_rect, full());

    let next = Rect::new(2, 2, 1, 1);
    manager
        .submit_frame(sid(), frame_of(vec![SharedQuadState::with_rect(top)], next))
        .unwrap();
    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(frame.root_pass().unwrap().damage_rect, next);
}
