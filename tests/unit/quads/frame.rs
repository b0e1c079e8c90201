use kurbo::Affine;

use super::*;
use crate::quads::{
    builder::{FrameBuilder, PassBuilder},
    draw_quad::DrawQuad,
    render_pass::CompositorRenderPassId,
    shared_quad_state::SharedQuadState,
};

fn full() -> Rect {
    Rect::new(0, 0, 100, 100)
}

#[test]
fn builder_produces_valid_frame() {
    let frame = FrameBuilder::new()
        .pass(PassBuilder::new(1, full()).solid(full(), Color::WHITE).build())
        .build()
        .unwrap();
    assert_eq!(frame.size_in_pixels(), Size::new(100, 100));
    assert_eq!(frame.device_scale_factor(), 1.0);
}

#[test]
fn empty_pass_list_is_rejected() {
    let err = FrameBuilder::new().build().unwrap_err();
    assert!(err.to_string().contains("no render passes"));
}

#[test]
fn duplicate_pass_ids_are_rejected() {
    let err = FrameBuilder::new()
        .pass(PassBuilder::new(1, full()).build())
        .pass(PassBuilder::new(1, full()).build())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("duplicate render pass id 1"));
}

#[test]
fn forward_render_pass_references_are_rejected() {
    let err = FrameBuilder::new()
        .pass(
            PassBuilder::new(1, full())
                .render_pass_quad(full(), Affine::IDENTITY, 2)
                .build(),
        )
        .pass(PassBuilder::new(2, full()).build())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("not drawn before it"));
}

#[test]
fn self_references_are_rejected() {
    let err = FrameBuilder::new()
        .pass(
            PassBuilder::new(1, full())
                .render_pass_quad(full(), Affine::IDENTITY, 1)
                .build(),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, StratumError::Validation(_)));
}

#[test]
fn out_of_range_shared_state_is_rejected() {
    let mut pass = CompositorRenderPass::new(CompositorRenderPassId(1), full());
    pass.push_shared_quad_state(SharedQuadState::default());
    let mut quad = DrawQuad::solid_color(0, full(), Color::BLACK);
    quad.shared_quad_state = 3;
    pass.quad_list.push(quad);
    let frame = CompositorFrame {
        render_pass_list: vec![pass],
        ..CompositorFrame::default()
    };
    assert!(frame.validate().is_err());
}

#[test]
fn per_quad_damage_marks_pass() {
    let pass = PassBuilder::new(1, full())
        .quad(DrawQuad::texture(
            0,
            full(),
            ResourceId(4),
            Some(Rect::new(0, 0, 1, 1)),
        ))
        .build();
    assert!(pass.has_per_quad_damage);
    assert_eq!(pass.quad_list[0].resources.as_slice(), &[ResourceId(4)]);
}

#[test]
fn frame_json_round_trips_through_serde() {
    let frame = FrameBuilder::new()
        .pass(PassBuilder::new(1, full()).solid(full(), Color::WHITE).build())
        .build()
        .unwrap();
    let json = serde_json::to_string(&frame).unwrap();
    let back: CompositorFrame = serde_json::from_str(&json).unwrap();
    assert_eq!(back, frame);
}
