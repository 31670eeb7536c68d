use super::*;

#[test]
fn scaled_bounds_truncate_fractional_pixels() {
    let s = PixelSize::from_scaled_bounds(Rect::new(0.0, 0.0, 10.5, 4.9), Vec2::new(2.0, 1.0));
    assert_eq!(s, PixelSize::new(21, 4));
}

#[test]
fn scaled_bounds_collapse_when_degenerate() {
    let tiny = PixelSize::from_scaled_bounds(Rect::new(0.0, 0.0, 10.0, 10.0), Vec2::new(0.01, 1.0));
    assert!(tiny.is_empty());

    let nan = PixelSize::from_scaled_bounds(Rect::new(0.0, 0.0, 10.0, 10.0), Vec2::new(f64::NAN, 1.0));
    assert!(nan.is_empty());
}

#[test]
fn opacity_scales_alpha_only() {
    let c = Color::rgba(10, 20, 30, 200).with_opacity(128);
    assert_eq!((c.r, c.g, c.b), (10, 20, 30));
    assert_eq!(c.a, 100);
}

#[test]
fn intersection_requires_positive_overlap() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    assert!(rects_intersect(a, Rect::new(5.0, 5.0, 15.0, 15.0)));
    assert!(!rects_intersect(a, Rect::new(10.0, 0.0, 20.0, 10.0)));
    assert!(!rects_intersect(a, Rect::new(2.0, 2.0, 2.0, 8.0)));
}

#[test]
fn host_time_saturates() {
    assert_eq!(HostTime(5).saturating_nanos_since(HostTime(9)), 0);
    assert_eq!(HostTime(u64::MAX).saturating_add_nanos(1), HostTime(u64::MAX));
}

#[test]
fn byte_len_saturates_instead_of_wrapping() {
    assert_eq!(PixelSize::new(3, 5).rgba8_byte_len(), 60);
    let huge = PixelSize::new(u32::MAX, u32::MAX).rgba8_byte_len();
    assert!(huge >= usize::try_from(u32::MAX).unwrap_or(usize::MAX));
    if usize::BITS <= 64 {
        assert_eq!(huge, usize::MAX);
    }
}
