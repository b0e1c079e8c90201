use super::*;
use crate::{
    aggregator::{SurfaceAggregator, frame::AggregatedFrame},
    foundation::{
        core::{Color, DisplayTime},
        geometry::Size,
        transform::DisplayTransform,
    },
    quads::{
        builder::{FrameBuilder, PassBuilder},
        filters::{FilterOperation, FilterOperations},
        frame::{CompositorFrame, ResourceId, TransferableResource},
    },
    surfaces::{ids::SurfaceId, manager::SurfaceManager},
};

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

fn damage_list_aggregator() -> SurfaceAggregator {
    SurfaceAggregator::builder()
        .needs_surface_damage_rect_list(true)
        .build()
        .unwrap()
}

fn aggregate(aggregator: &mut SurfaceAggregator, manager: &mut SurfaceManager) -> AggregatedFrame {
    aggregator.aggregate(
        manager,
        sid(1),
        DisplayTime::NULL,
        DisplayTransform::None,
        Rect::default(),
    )
}

fn embedding_manager() -> SurfaceManager {
    let mut manager = SurfaceManager::new();
    for sink in [1, 2] {
        manager.create_surface(sid(sink), None).unwrap();
    }
    manager
        .submit_frame(sid(2), child_frame(Rect::new(0, 0, 50, 50)))
        .unwrap();
    let full = Rect::new(0, 0, 100, 100);
    let root = FrameBuilder::new()
        .pass(
            PassBuilder::new(1, full)
                .surface(Rect::new(0, 0, 50, 50), Affine::translate((10.0, 10.0)), sid(2))
                .build(),
        )
        .build()
        .unwrap();
    manager.submit_frame(sid(1), root).unwrap();
    manager
}

fn overlay_index(frame: &AggregatedFrame) -> Option<usize> {
    let root = frame.root_pass().unwrap();
    root.sqs(&root.quad_list[0]).overlay_damage_index
}

#[test]
fn embedded_surface_damage_is_listed_in_root_space() {
    let mut manager = embedding_manager();
    let mut aggregator = damage_list_aggregator();

    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(
        frame.surface_damage_rect_list,
        vec![Rect::new(0, 0, 100, 100), Rect::new(10, 10, 50, 50)]
    );
    assert_eq!(overlay_index(&frame), Some(1));

    manager
        .submit_frame(sid(2), child_frame(Rect::new(0, 0, 5, 5)))
        .unwrap();
    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(frame.surface_damage_rect_list, vec![Rect::new(10, 10, 5, 5)]);
    assert_eq!(overlay_index(&frame), Some(0));
}

#[test]
fn undamaged_overlay_candidate_gets_an_empty_entry() {
    let mut manager = embedding_manager();
    let mut aggregator = damage_list_aggregator();
    aggregate(&mut aggregator, &mut manager);

    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(frame.surface_damage_rect_list, vec![Rect::default()]);
    assert_eq!(overlay_index(&frame), Some(0));
}

#[test]
fn list_is_empty_unless_requested() {
    let mut manager = embedding_manager();
    let mut aggregator = SurfaceAggregator::builder().build().unwrap();
    let frame = aggregate(&mut aggregator, &mut manager);
    assert!(frame.surface_damage_rect_list.is_empty());
    assert_eq!(overlay_index(&frame), None);
}

#[test]
fn per_quad_damage_gets_its_own_entry() {
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(1), None).unwrap();
    let full = Rect::new(0, 0, 100, 100);
    let frame = FrameBuilder::new()
        .resource(TransferableResource::new(ResourceId(1), Size::new(100, 100)))
        .pass(
            PassBuilder::new(1, full)
                .quad(DrawQuad::texture(
                    0,
                    full,
                    ResourceId(1),
                    Some(Rect::new(5, 5, 10, 10)),
                ))
                .build(),
        )
        .build()
        .unwrap();
    manager.submit_frame(sid(1), frame).unwrap();

    let mut aggregator = damage_list_aggregator();
    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(
        frame.surface_damage_rect_list,
        vec![full, Rect::new(5, 5, 10, 10)]
    );
    assert_eq!(overlay_index(&frame), Some(1));
}

#[test]
fn pixel_moving_filters_list_the_whole_pass_quad() {
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(1), None).unwrap();
    let full = Rect::new(0, 0, 100, 100);
    let child_rect = Rect::new(0, 0, 20, 20);
    let frame = FrameBuilder::new()
        .pass(
            PassBuilder::new(3, child_rect)
                .filters(FilterOperations(vec![FilterOperation::Blur { sigma: 1.0 }]))
                .solid(child_rect, Color::WHITE)
                .build(),
        )
        .pass(
            PassBuilder::new(9, full)
                .render_pass_quad(child_rect, Affine::translate((5.0, 5.0)), 3)
                .build(),
        )
        .build()
        .unwrap();
    manager.submit_frame(sid(1), frame).unwrap();

    let mut aggregator = damage_list_aggregator();
    let frame = aggregate(&mut aggregator, &mut manager);
    assert_eq!(
        frame.surface_damage_rect_list,
        vec![full, Rect::new(5, 5, 20, 20)]
    );
}
