use super::*;

#[test]
fn axis_alignment_accepts_scale_flip_and_quarter_turns() {
    assert!(preserves_2d_axis_alignment(&Affine::scale_non_uniform(2.0, 0.5)));
    assert!(preserves_2d_axis_alignment(
        &DisplayTransform::Rotate90.to_affine(kurbo::Size::new(10.0, 20.0))
    ));
    assert!(!preserves_2d_axis_alignment(&Affine::rotate(0.3)));
    assert!(!preserves_2d_axis_alignment(&skew_y_degrees(5.0)));
}

#[test]
fn singular_transforms_have_no_inverse() {
    assert!(try_inverse(&Affine::scale_non_uniform(0.0, 1.0)).is_none());
    let t = Affine::translate((3.0, 4.0)) * Affine::scale(2.0);
    let inv = try_inverse(&t).unwrap();
    let p = inv * (t * kurbo::Point::new(1.0, 1.0));
    assert!((p.x - 1.0).abs() < 1e-9 && (p.y - 1.0).abs() < 1e-9);
}

#[test]
fn integer_translation_maps_exactly() {
    let t = Affine::translate((5.0, -2.0));
    assert_eq!(
        map_enclosing_rect(&t, Rect::new(0, 0, 10, 10)),
        Rect::new(5, -2, 10, 10)
    );
}

#[test]
fn fractional_mapping_encloses() {
    let t = Affine::translate((0.5, 0.5));
    assert_eq!(
        map_enclosing_rect(&t, Rect::new(0, 0, 10, 10)),
        Rect::new(0, 0, 11, 11)
    );
    assert_eq!(
        map_enclosed_rect_axis_aligned(&t, Rect::new(0, 0, 10, 10)),
        Rect::new(1, 1, 9, 9)
    );
}

#[test]
fn rotate90_maps_viewport_onto_rotated_viewport() {
    let t = DisplayTransform::Rotate90.to_affine(kurbo::Size::new(100.0, 50.0));
    assert_eq!(
        map_enclosed_rect_axis_aligned(&t, Rect::new(0, 0, 100, 50)),
        Rect::new(0, 0, 50, 100)
    );
}

#[test]
fn flips_and_half_turn_keep_viewport_in_place() {
    let size = kurbo::Size::new(30.0, 40.0);
    for dt in [
        DisplayTransform::FlipHorizontal,
        DisplayTransform::FlipVertical,
        DisplayTransform::Rotate180,
    ] {
        assert_eq!(
            map_enclosed_rect_axis_aligned(&dt.to_affine(size), Rect::new(0, 0, 30, 40)),
            Rect::new(0, 0, 30, 40)
        );
    }
    let t = DisplayTransform::Rotate270.to_affine(size);
    assert_eq!(
        map_enclosed_rect_axis_aligned(&t, Rect::new(0, 0, 30, 40)),
        Rect::new(0, 0, 40, 30)
    );
}

#[test]
fn parses_snake_case_names() {
    assert_eq!(
        "rotate270".parse::<DisplayTransform>(),
        Ok(DisplayTransform::Rotate270)
    );
    assert!("sideways".parse::<DisplayTransform>().is_err());
}
