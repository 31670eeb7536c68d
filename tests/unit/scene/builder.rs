use super::*;
use crate::foundation::config::PoolOpts;
use crate::scene::paint::DrawOp;

fn builder() -> SceneBuilder {
    SceneBuilder::new(SceneOpts::default(), SurfacePool::new(PoolOpts::default()))
}

fn rrect(x0: f64, y0: f64, x1: f64, y1: f64) -> RoundedRect {
    RoundedRect::new(x0, y0, x1, y1, 2.0)
}

fn layer(rect: Rect) -> PaintLayer {
    PaintLayer::new(vec![DrawOp::FillRect {
        rect,
        color: Color::rgba(200, 0, 0, 255),
    }])
}

fn shape_materials(b: &SceneBuilder) -> Vec<Material> {
    b.graph()
        .shapes()
        .filter_map(|(_, n)| match &n.kind {
            NodeKind::Shape { material, .. } => Some(material.clone()),
            _ => None,
        })
        .collect()
}

fn entity_planes(b: &SceneBuilder) -> Vec<usize> {
    b.graph()
        .preorder()
        .into_iter()
        .filter_map(|id| match &b.graph().get(id)?.kind {
            NodeKind::Entity { clip_planes, .. } => Some(clip_planes.len()),
            _ => None,
        })
        .collect()
}

fn one_frame(b: &mut SceneBuilder, spec: FrameSpec, content: Rect) -> Vec<PaintTask> {
    b.begin_frame();
    let t = b.push_frame(spec).unwrap();
    b.add_paint_layer(layer(content)).unwrap();
    b.pop(t).unwrap();
    b.end_frame().unwrap()
}

#[test]
fn frame_with_visible_content_yields_a_paint_task() {
    let mut b = builder();
    let spec = FrameSpec::new(rrect(10.0, 10.0, 50.0, 30.0), Color::WHITE).owner(ContentId(1));
    let tasks = one_frame(&mut b, spec, Rect::new(12.0, 12.0, 20.0, 20.0));

    assert_eq!(tasks.len(), 1);
    let t = &tasks[0];
    assert_eq!(t.size, PixelSize::new(40, 20));
    assert_eq!(t.origin, crate::foundation::core::Point::new(10.0, 10.0));
    assert_eq!(t.background, Color::WHITE);
    assert!(t.needs_raster());
    assert_eq!(
        shape_materials(&b),
        vec![Material::Texture(t.surface.id())]
    );
    assert_eq!(entity_planes(&b), vec![4]);
}

#[test]
fn clipped_away_content_emits_clip_but_no_task() {
    let mut b = builder();
    let spec = FrameSpec::new(rrect(0.0, 0.0, 10.0, 10.0), Color::rgba(0, 0, 255, 200))
        .opacity(128)
        .owner(ContentId(1));
    let tasks = one_frame(&mut b, spec, Rect::new(100.0, 100.0, 120.0, 120.0));

    assert!(tasks.is_empty());
    assert_eq!(entity_planes(&b), vec![4]);
    assert_eq!(
        shape_materials(&b),
        vec![Material::Color(Color::rgba(0, 0, 255, 100))]
    );
    assert_eq!(b.pool().stats().misses, 0);
}

#[test]
fn frame_without_layers_is_a_flat_fill() {
    let mut b = builder();
    b.begin_frame();
    let t = b
        .push_frame(FrameSpec::new(rrect(0.0, 0.0, 10.0, 10.0), Color::WHITE))
        .unwrap();
    b.pop(t).unwrap();
    assert!(b.end_frame().unwrap().is_empty());
    assert_eq!(shape_materials(&b), vec![Material::Color(Color::WHITE)]);
}

#[test]
fn degenerate_scaled_size_falls_back_to_flat_fill() {
    let mut b = builder();
    b.begin_frame();
    let s = b.push_scale(0.01, 0.01).unwrap();
    let f = b
        .push_frame(FrameSpec::new(rrect(0.0, 0.0, 10.0, 10.0), Color::WHITE))
        .unwrap();
    b.add_paint_layer(layer(Rect::new(0.0, 0.0, 5.0, 5.0)))
        .unwrap();
    b.pop(f).unwrap();
    b.pop(s).unwrap();

    assert!(b.end_frame().unwrap().is_empty());
    assert_eq!(shape_materials(&b), vec![Material::Color(Color::WHITE)]);
}

#[test]
fn non_finite_frame_contributes_no_geometry() {
    let mut b = builder();
    let spec = FrameSpec::new(rrect(0.0, 0.0, f64::INFINITY, 10.0), Color::WHITE);
    let tasks = one_frame(&mut b, spec, Rect::new(0.0, 0.0, 5.0, 5.0));

    assert!(tasks.is_empty());
    assert!(shape_materials(&b).is_empty());
    assert_eq!(entity_planes(&b), vec![0]);
}

#[test]
fn scale_scopes_compose_and_restore() {
    let mut b = builder();
    b.begin_frame();
    let outer = b.push_scale(3.0, 1.0).unwrap();
    let inner = b.push_scale(2.0, 2.0).unwrap();
    assert_eq!(b.composed_scale(), Vec2::new(6.0, 2.0));
    b.pop(inner).unwrap();
    assert_eq!(b.composed_scale(), Vec2::new(3.0, 1.0));
    b.pop(outer).unwrap();
    assert_eq!(b.composed_scale(), Vec2::new(1.0, 1.0));
    b.end_frame().unwrap();
}

#[test]
fn opacity_scopes_compose_and_restore() {
    let mut b = builder();
    b.begin_frame();
    let o = b.push_opacity(51).unwrap();
    assert!((b.composed_opacity() - 0.2).abs() < 1e-6);
    let p = b.push_opacity(255).unwrap();
    assert!((b.composed_opacity() - 0.2).abs() < 1e-6);
    b.pop(p).unwrap();
    b.pop(o).unwrap();
    assert_eq!(b.composed_opacity(), 1.0);

    let opaque = b.graph().get(NodeId(2)).unwrap();
    match opaque.kind {
        NodeKind::Opacity { opacity } => assert!(opacity < 1.0),
        ref other => panic!("unexpected node {other:?}"),
    }
    b.end_frame().unwrap();
}

#[test]
fn surface_size_follows_composed_and_device_scale() {
    let mut b = SceneBuilder::new(
        SceneOpts {
            device_scale: 2.0,
            ..SceneOpts::default()
        },
        SurfacePool::new(PoolOpts::default()),
    );
    b.begin_frame();
    let s = b.push_scale(1.5, 1.0).unwrap();
    let f = b
        .push_frame(FrameSpec::new(rrect(0.0, 0.0, 10.0, 20.0), Color::WHITE))
        .unwrap();
    b.add_paint_layer(layer(Rect::new(0.0, 0.0, 10.0, 20.0)))
        .unwrap();
    b.pop(f).unwrap();
    b.pop(s).unwrap();
    let tasks = b.end_frame().unwrap();

    assert_eq!(tasks[0].size, PixelSize::new(30, 40));
    assert_eq!(tasks[0].scale, Vec2::new(3.0, 2.0));
}

#[test]
fn identical_frames_allocate_once() {
    let mut b = builder();
    let spec = FrameSpec::new(rrect(0.0, 0.0, 32.0, 32.0), Color::WHITE).owner(ContentId(9));

    let first = one_frame(&mut b, spec.clone(), Rect::new(0.0, 0.0, 8.0, 8.0));
    let id = first[0].surface.id();
    drop(first);
    b.pool_mut().end_frame();

    let second = one_frame(&mut b, spec, Rect::new(0.0, 0.0, 8.0, 8.0));
    assert_eq!(second[0].surface.id(), id);

    let st = b.pool().stats();
    assert_eq!(st.misses, 1);
    assert_eq!(st.hits, 1);
}

#[test]
fn changed_transform_forces_a_new_surface() {
    let mut b = builder();
    let spec = FrameSpec::new(rrect(0.0, 0.0, 16.0, 16.0), Color::WHITE).owner(ContentId(9));
    let first = one_frame(&mut b, spec.clone(), Rect::new(0.0, 0.0, 8.0, 8.0));
    let id = first[0].surface.id();
    b.pool_mut().end_frame();

    b.begin_frame();
    let r = b
        .push_transform(Affine::rotate(std::f64::consts::FRAC_PI_2))
        .unwrap();
    let f = b.push_frame(spec).unwrap();
    b.add_paint_layer(layer(Rect::new(0.0, 0.0, 8.0, 8.0)))
        .unwrap();
    b.pop(f).unwrap();
    b.pop(r).unwrap();
    let second = b.end_frame().unwrap();

    assert_ne!(second[0].surface.id(), id);
    assert_eq!(b.pool().stats().misses, 2);
}

#[test]
fn unchanged_content_with_valid_pixels_skips_raster() {
    let mut b = builder();
    let spec = FrameSpec::new(rrect(0.0, 0.0, 8.0, 8.0), Color::WHITE)
        .owner(ContentId(4))
        .content_unchanged(true);

    let first = one_frame(&mut b, spec.clone(), Rect::new(0.0, 0.0, 8.0, 8.0));
    assert!(first[0].needs_raster());
    let surface = b.pool_mut().checkout(&first[0].surface).unwrap();
    b.pool_mut().checkin(surface, true);
    b.pool_mut().end_frame();

    let second = one_frame(&mut b, spec, Rect::new(0.0, 0.0, 8.0, 8.0));
    assert!(second[0].contents_valid);
    assert!(!second[0].needs_raster());
}

#[test]
fn elevated_siblings_get_increasing_depth() {
    let mut b = builder();
    b.begin_frame();
    let a = b
        .push_frame(FrameSpec::new(rrect(0.0, 0.0, 4.0, 4.0), Color::WHITE).elevated())
        .unwrap();
    b.pop(a).unwrap();
    let c = b
        .push_frame(FrameSpec::new(rrect(0.0, 0.0, 4.0, 4.0), Color::WHITE).elevated())
        .unwrap();
    assert_eq!(b.current_elevation(), 20.0);
    b.pop(c).unwrap();
    b.end_frame().unwrap();

    let elevations: Vec<f32> = b
        .graph()
        .preorder()
        .into_iter()
        .filter_map(|id| match b.graph().get(id)?.kind {
            NodeKind::Entity { elevation, .. } => Some(elevation),
            _ => None,
        })
        .collect();
    assert_eq!(elevations, vec![10.0, 20.0]);

    b.begin_frame();
    assert_eq!(b.next_elevation(), 10.0);
    b.end_frame().unwrap();
}

#[test]
fn begin_frame_discards_previous_tree() {
    let mut b = builder();
    let spec = FrameSpec::new(rrect(0.0, 0.0, 8.0, 8.0), Color::WHITE);
    let _ = one_frame(&mut b, spec, Rect::new(0.0, 0.0, 4.0, 4.0));
    assert!(!b.graph().is_empty());

    b.begin_frame();
    assert!(b.graph().is_empty());
    assert!(b.is_building());
    b.end_frame().unwrap();
}

#[test]
fn scopes_must_pop_in_order() {
    let mut b = builder();
    b.begin_frame();
    let outer = b.push_clip(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
    let inner = b.push_opacity(10).unwrap();

    let err = b.pop(outer).unwrap_err();
    assert!(matches!(err, FramepipeError::Scope(_)));
    assert!(matches!(b.end_frame(), Err(FramepipeError::Scope(_))));

    b.pop(inner).unwrap();
}

#[test]
fn operations_outside_a_frame_are_scope_errors() {
    let mut b = builder();
    assert!(matches!(
        b.push_scale(2.0, 2.0),
        Err(FramepipeError::Scope(_))
    ));
    assert!(matches!(b.end_frame(), Err(FramepipeError::Scope(_))));

    b.begin_frame();
    let err = b
        .add_paint_layer(layer(Rect::new(0.0, 0.0, 1.0, 1.0)))
        .unwrap_err();
    assert!(matches!(err, FramepipeError::Scope(_)));
    b.end_frame().unwrap();
}

#[test]
fn singular_transform_is_treated_as_identity() {
    let mut b = builder();
    b.begin_frame();
    let t = b.push_transform(Affine::scale(0.0)).unwrap();
    assert_eq!(b.composed_scale(), Vec2::new(1.0, 1.0));
    b.pop(t).unwrap();
    b.end_frame().unwrap();
}
