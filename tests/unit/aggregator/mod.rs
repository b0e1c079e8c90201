use super::*;
use crate::{
    foundation::core::Color,
    quads::{
        builder::{FrameBuilder, PassBuilder},
        draw_quad::{DrawQuad, Material},
        frame::ResourceId,
    },
};

fn sid(sink: u32) -> SurfaceId {
    SurfaceId::from_parts(sink, 1, 1)
}

fn solid_frame(size: i32, color: Color) -> CompositorFrame {
    let rect = Rect::new(0, 0, size, size);
    FrameBuilder::new()
        .pass(PassBuilder::new(1, rect).solid(rect, color).build())
        .build()
        .unwrap()
}

fn embed_material(surface: SurfaceId) -> SurfaceQuadMaterial {
    SurfaceQuadMaterial {
        surface_range: SurfaceRange::single(surface),
        default_background_color: Color::TRANSPARENT,
        stretch_content_to_fill_bounds: false,
        is_reflection: false,
        allow_merge: true,
    }
}

fn aggregate(
    aggregator: &mut SurfaceAggregator,
    manager: &mut SurfaceManager,
    root: SurfaceId,
) -> AggregatedFrame {
    aggregator.aggregate(
        manager,
        root,
        DisplayTime::NULL,
        DisplayTransform::None,
        Rect::default(),
    )
}

#[test]
fn settings_are_validated() {
    assert!(AggregatorSettings::default().validate().is_ok());
    assert!(
        SurfaceAggregator::builder()
            .max_render_target_size(-1)
            .build()
            .is_err()
    );
    let bad_de_jelly = SurfaceAggregator::builder()
        .de_jelly(DeJellySettings {
            screen_width: 0.0,
            max_de_jelly_height: 30,
        })
        .build();
    assert!(matches!(bad_de_jelly, Err(StratumError::Validation(_))));
}

#[test]
fn builder_applies_settings() {
    let aggregator = SurfaceAggregator::builder()
        .aggregate_only_damaged(true)
        .extra_pass_for_readback(ExtraPassForReadback::AlwaysAddPass)
        .take_copy_requests(false)
        .build()
        .unwrap();
    let settings = aggregator.settings();
    assert!(settings.aggregate_only_damaged);
    assert_eq!(
        settings.extra_pass_for_readback,
        ExtraPassForReadback::AlwaysAddPass
    );
    assert!(!settings.take_copy_requests);
    assert!(!aggregator.has_frame_annotator());
}

#[test]
fn missing_root_yields_an_empty_frame() {
    let mut manager = SurfaceManager::new();
    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    assert!(aggregate(&mut aggregator, &mut manager, sid(1)).is_empty());

    manager.create_surface(sid(1), None).unwrap();
    assert!(aggregate(&mut aggregator, &mut manager, sid(1)).is_empty());
}

#[test]
fn single_surface_is_fully_damaged_once() {
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(1), None).unwrap();
    manager.submit_frame(sid(1), solid_frame(100, Color::WHITE)).unwrap();
    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();

    let frame = aggregate(&mut aggregator, &mut manager, sid(1));
    assert_eq!(frame.render_pass_list.len(), 1);
    let root = frame.root_pass().unwrap();
    assert_eq!(root.output_rect, Rect::new(0, 0, 100, 100));
    assert_eq!(root.damage_rect, root.output_rect);
    assert_eq!(root.quad_list.len(), 1);
    assert_eq!(aggregator.last_stats().prewalked_surface_count, 1);
    assert_eq!(aggregator.last_stats().copied_surface_count, 1);
    assert!(aggregator.previous_contained_surfaces().contains(&sid(1)));

    let again = aggregate(&mut aggregator, &mut manager, sid(1));
    let root_again = again.root_pass().unwrap();
    assert!(root_again.damage_rect.is_empty());
    assert_eq!(root_again.id, root.id);
}

#[test]
fn opaque_embed_is_merged_into_the_embedder() {
    let mut manager = SurfaceManager::new();
    for sink in [1, 2] {
        manager.create_surface(sid(sink), None).unwrap();
    }
    let red = Color::from_rgb8(255, 0, 0);
    manager.submit_frame(sid(2), solid_frame(50, red)).unwrap();
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

    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    let frame = aggregate(&mut aggregator, &mut manager, sid(1));
    assert_eq!(frame.render_pass_list.len(), 1);
    let root = frame.root_pass().unwrap();
    assert_eq!(root.quad_list.len(), 1);
    let quad = &root.quad_list[0];
    assert!(matches!(quad.material, Material::SolidColor { color, .. } if color == red));
    let sqs = root.sqs(quad);
    assert_eq!(sqs.quad_to_target_transform, Affine::translate((10.0, 10.0)));
    assert_eq!(sqs.clip_rect, Some(Rect::new(10, 10, 50, 50)));
    assert_eq!(
        manager.get_surface_for_id(&sid(2)).unwrap().aggregation_count(),
        1
    );
}

#[test]
fn translucent_embed_keeps_its_own_pass() {
    let mut manager = SurfaceManager::new();
    for sink in [1, 2] {
        manager.create_surface(sid(sink), None).unwrap();
    }
    manager.submit_frame(sid(2), solid_frame(50, Color::BLACK)).unwrap();
    let full = Rect::new(0, 0, 100, 100);
    let embed_rect = Rect::new(0, 0, 50, 50);
    let root = FrameBuilder::new()
        .pass(
            PassBuilder::new(1, full)
                .shared_state(SharedQuadState {
                    opacity: 0.5,
                    ..SharedQuadState::with_rect(embed_rect)
                })
                .quad(DrawQuad::surface_content(0, embed_rect, embed_material(sid(2))))
                .build(),
        )
        .build()
        .unwrap();
    manager.submit_frame(sid(1), root).unwrap();

    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    let frame = aggregate(&mut aggregator, &mut manager, sid(1));
    assert_eq!(frame.render_pass_list.len(), 2);
    let child_pass = &frame.render_pass_list[0];
    let root = frame.root_pass().unwrap();
    assert_eq!(child_pass.output_rect, embed_rect);
    assert_eq!(root.quad_list.len(), 1);
    let quad = &root.quad_list[0];
    assert_eq!(quad.aggregated_render_pass_id(), Some(child_pass.id));
    assert_eq!(root.sqs(quad).opacity, 0.5);
}

#[test]
fn referenced_ranges_report_display_damage() {
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(1), None).unwrap();
    let full = Rect::new(0, 0, 20, 20);
    let frame = FrameBuilder::new()
        .referenced_surface(SurfaceRange::single(sid(2)))
        .pass(PassBuilder::new(1, full).solid(full, Color::WHITE).build())
        .build()
        .unwrap();
    manager.submit_frame(sid(1), frame).unwrap();

    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    aggregate(&mut aggregator, &mut manager, sid(1));

    assert!(aggregator.notify_surface_damage_and_check_for_display_damage(&manager, sid(1)));
    assert!(aggregator.notify_surface_damage_and_check_for_display_damage(&manager, sid(2)));
    assert!(!aggregator.notify_surface_damage_and_check_for_display_damage(&manager, sid(3)));
}

#[test]
fn only_drawn_surfaces_report_display_damage() {
    let mut manager = SurfaceManager::new();
    for sink in [1, 3] {
        manager.create_surface(sid(sink), None).unwrap();
    }
    manager.submit_frame(sid(1), solid_frame(20, Color::WHITE)).unwrap();
    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    aggregate(&mut aggregator, &mut manager, sid(1));

    // Resolved but never drawn: the texture's resource is missing from the frame.
    let full = Rect::new(0, 0, 20, 20);
    let broken = FrameBuilder::new()
        .pass(
            PassBuilder::new(1, full)
                .quad(DrawQuad::texture(0, full, ResourceId(4), None))
                .build(),
        )
        .build()
        .unwrap();
    manager.submit_frame(sid(3), broken).unwrap();
    assert!(aggregate(&mut aggregator, &mut manager, sid(3)).is_empty());

    assert!(aggregator.notify_surface_damage_and_check_for_display_damage(&manager, sid(1)));
    assert!(!aggregator.notify_surface_damage_and_check_for_display_damage(&manager, sid(3)));
}

#[test]
fn destroyed_surfaces_release_their_cache() {
    let mut manager = SurfaceManager::new();
    manager.create_surface(sid(1), None).unwrap();
    manager.submit_frame(sid(1), solid_frame(10, Color::WHITE)).unwrap();
    let mut aggregator = SurfaceAggregator::new(AggregatorSettings::default()).unwrap();
    aggregate(&mut aggregator, &mut manager, sid(1));
    assert_eq!(aggregator.resource_provider().num_children(), 1);

    manager.destroy_surface(sid(1)).unwrap();
    assert!(aggregate(&mut aggregator, &mut manager, sid(1)).is_empty());
    assert_eq!(aggregator.resource_provider().num_children(), 0);
}

#[test]
fn merge_requires_opacity_and_no_jelly() {
    let material = embed_material(sid(2));
    let mut sqs = SharedQuadState::default();
    assert!(can_potentially_merge_pass(&material, &sqs));
    sqs.opacity = 0.9995;
    assert!(can_potentially_merge_pass(&material, &sqs));
    sqs.opacity = 0.5;
    assert!(!can_potentially_merge_pass(&material, &sqs));
    sqs.opacity = 1.0;
    sqs.de_jelly_delta_y = 3.0;
    assert!(!can_potentially_merge_pass(&material, &sqs));
    let no_merge = SurfaceQuadMaterial {
        allow_merge: false,
        ..embed_material(sid(2))
    };
    assert!(!can_potentially_merge_pass(&no_merge, &SharedQuadState::default()));
}

#[test]
fn content_scale_uses_device_scale_ratio_or_stretch() {
    let child = FrameBuilder::new()
        .device_scale_factor(2.0)
        .pass(PassBuilder::new(1, Rect::new(0, 0, 40, 20)).build())
        .build()
        .unwrap();
    let material = embed_material(sid(2));
    assert_eq!(
        extra_content_scale(&material, Rect::new(0, 0, 20, 10), 1.0, &child),
        (0.5, 0.5)
    );
    let stretch = SurfaceQuadMaterial {
        stretch_content_to_fill_bounds: true,
        ..material
    };
    assert_eq!(
        extra_content_scale(&stretch, Rect::new(0, 0, 80, 10), 1.0, &child),
        (2.0, 0.5)
    );
}
