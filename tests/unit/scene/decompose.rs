use super::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn identity_decomposes_to_identity() {
    assert_eq!(decompose(Affine::IDENTITY), Some(Decomposed::IDENTITY));
}

#[test]
fn translate_scale_rotate_are_recovered() {
    let m = Affine::translate((5.0, -3.0))
        * Affine::rotate(std::f64::consts::FRAC_PI_4)
        * Affine::scale_non_uniform(2.0, 3.0);
    let d = decompose(m).unwrap();

    assert!(close(d.translation.x, 5.0));
    assert!(close(d.translation.y, -3.0));
    assert!(close(d.rotation, std::f64::consts::FRAC_PI_4));
    assert!(close(d.scale.x, 2.0));
    assert!(close(d.scale.y, 3.0));
}

#[test]
fn mirrored_y_has_negative_scale() {
    let d = decompose(Affine::scale_non_uniform(1.0, -2.0)).unwrap();
    assert!(close(d.scale.x, 1.0));
    assert!(close(d.scale.y, -2.0));
}

#[test]
fn singular_and_non_finite_are_rejected() {
    assert!(decompose(Affine::scale(0.0)).is_none());
    assert!(decompose(Affine::new([1.0, 2.0, 2.0, 4.0, 0.0, 0.0])).is_none());
    assert!(decompose(Affine::new([f64::NAN, 0.0, 0.0, 1.0, 0.0, 0.0])).is_none());
}
