use super::*;

#[test]
fn color_filters_do_not_move_pixels() {
    let ops = FilterOperations(vec![
        FilterOperation::Opacity { amount: 0.5 },
        FilterOperation::Grayscale { amount: 1.0 },
    ]);
    assert!(!ops.has_filter_that_moves_pixels());
    assert_eq!(ops.maximum_pixel_movement(), 0.0);
    assert_eq!(ops.expand_rect(Rect::new(0, 0, 4, 4)), Rect::new(0, 0, 4, 4));
}

#[test]
fn movement_is_maximum_over_chain() {
    let ops = FilterOperations(vec![
        FilterOperation::Blur { sigma: 2.0 },
        FilterOperation::DropShadow {
            offset_x: -4,
            offset_y: 1,
            sigma: 1.0,
            color: Color::BLACK,
        },
        FilterOperation::Zoom {
            amount: 2.0,
            inset: 5,
        },
    ]);
    assert!(ops.has_filter_that_moves_pixels());
    assert_eq!(ops.maximum_pixel_movement(), 7.0);
}

#[test]
fn expanded_rect_is_mapped_to_target() {
    let ops = FilterOperations(vec![FilterOperation::Blur { sigma: 1.0 }]);
    let r = expanded_rect_with_pixel_moving_foreground_filter(
        Rect::new(10, 10, 10, 10),
        &Affine::translate((100.0, 0.0)),
        &ops,
    );
    assert_eq!(r, Rect::new(107, 7, 16, 16));
}

#[test]
fn filters_deserialize_from_tagged_json() {
    let ops: FilterOperations =
        serde_json::from_str(r#"[{"type":"blur","sigma":1.5},{"type":"opacity","amount":0.2}]"#)
            .unwrap();
    assert_eq!(ops.0.len(), 2);
    assert!(ops.has_filter_that_moves_pixels());
}
