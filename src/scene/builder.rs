use crate::foundation::config::SceneOpts;
use crate::foundation::core::{
    Affine, Color, ContentId, PixelSize, Rect, RoundedRect, Vec2, rect_is_finite, rects_intersect,
};
use crate::foundation::error::{FramepipeError, FramepipeResult};
use crate::scene::decompose::decompose;
use crate::scene::node::{Material, NodeId, NodeKind, SceneGraph, clip_planes_for_rect};
use crate::scene::paint::{PaintLayer, PaintTask};
use crate::surface::key::{RetentionKey, TransformFingerprint};
use crate::surface::pool::SurfacePool;

const ONE_MINUS_EPSILON: f32 = 1.0 - f32::EPSILON;

/// Proof of an open scope. Must be handed back to [`SceneBuilder::pop`] in LIFO order.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "scopes must be popped with SceneBuilder::pop"]
pub struct ScopeToken {
    depth: usize,
    serial: u64,
}

/// Parameters of a frame scope.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSpec {
    /// Clip shape and placement of the frame.
    pub rrect: RoundedRect,
    /// Background color; also the flat fill when there is nothing to rasterize.
    pub color: Color,
    /// Frame opacity, 0..=255.
    pub opacity: u8,
    /// Diagnostic label for the frame's entity node.
    pub label: Option<String>,
    /// Give this subtree its own depth slot.
    pub elevated: bool,
    /// Identity of the drawable subtree, for surface retention.
    pub owner: Option<ContentId>,
    /// The producer guarantees the layers paint the same pixels as last frame.
    pub content_unchanged: bool,
}

impl FrameSpec {
    /// Opaque, unlabelled frame.
    pub fn new(rrect: RoundedRect, color: Color) -> Self {
        Self {
            rrect,
            color,
            opacity: 255,
            label: None,
            elevated: false,
            owner: None,
            content_unchanged: false,
        }
    }

    /// Set the frame opacity.
    pub fn opacity(mut self, opacity: u8) -> Self {
        self.opacity = opacity;
        self
    }

    /// Set the diagnostic label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Request a dedicated depth slot.
    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    /// Set the owning content identity.
    pub fn owner(mut self, id: ContentId) -> Self {
        self.owner = Some(id);
        self
    }

    /// Mark the content as unchanged since last frame.
    pub fn content_unchanged(mut self, unchanged: bool) -> Self {
        self.content_unchanged = unchanged;
        self
    }
}

#[derive(Debug)]
struct FrameScope {
    spec: FrameSpec,
    entity: NodeId,
    opacity_node: NodeId,
    layers: Vec<PaintLayer>,
    paint_bounds: Option<Rect>,
}

#[derive(Debug)]
enum ScopeKind {
    Transform { prev_scale: Vec2, prev_rotation: f64 },
    Opacity { prev_alpha: f32 },
    Clip,
    Frame(Box<FrameScope>),
}

#[derive(Debug)]
struct Scope {
    serial: u64,
    node: NodeId,
    kind: ScopeKind,
}

/// Per-frame scene construction.
///
/// Scopes form an explicit stack: every `push_*` returns a [`ScopeToken`], and the matching
/// [`pop`](Self::pop) restores the composed scale, rotation and opacity that were current at
/// push time. One traversal is active at a time.
#[derive(Debug)]
pub struct SceneBuilder {
    opts: SceneOpts,
    pool: SurfacePool,
    graph: SceneGraph,
    stack: Vec<Scope>,
    tasks: Vec<PaintTask>,
    building: bool,
    next_serial: u64,

    top_scale: Vec2,
    top_rotation: f64,
    alpha: f32,
    topmost_elevation: f32,
    elevation: f32,
}

impl SceneBuilder {
    /// Create a builder that acquires surfaces from `pool`.
    pub fn new(opts: SceneOpts, pool: SurfacePool) -> Self {
        let step = opts.elevation_step;
        Self {
            opts,
            pool,
            graph: SceneGraph::new(),
            stack: Vec::new(),
            tasks: Vec::new(),
            building: false,
            next_serial: 1,
            top_scale: Vec2::new(1.0, 1.0),
            top_rotation: 0.0,
            alpha: 1.0,
            topmost_elevation: step,
            elevation: 0.0,
        }
    }

    /// Tree built by the current (or last) frame.
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Surface pool.
    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    /// Mutable surface pool; only touch it between frames.
    pub fn pool_mut(&mut self) -> &mut SurfacePool {
        &mut self.pool
    }

    /// Return `true` between `begin_frame` and `end_frame`.
    pub fn is_building(&self) -> bool {
        self.building
    }

    /// Composed scale of the open scopes, device scale excluded.
    pub fn composed_scale(&self) -> Vec2 {
        self.top_scale
    }

    /// Composed opacity of the open opacity scopes.
    pub fn composed_opacity(&self) -> f32 {
        self.alpha
    }

    /// Depth offset of the most recently elevated subtree.
    pub fn current_elevation(&self) -> f32 {
        self.elevation
    }

    /// Start a new frame, discarding the previous tree.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn begin_frame(&mut self) {
        if !self.stack.is_empty() || !self.tasks.is_empty() {
            tracing::warn!(
                open_scopes = self.stack.len(),
                tasks = self.tasks.len(),
                "previous frame was not finished; discarding it"
            );
        }
        self.graph.clear();
        self.stack.clear();
        self.tasks.clear();
        self.reset_accumulators();
        self.building = true;
    }

    /// Finish the frame and hand back its paint tasks in creation order.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn end_frame(&mut self) -> FramepipeResult<Vec<PaintTask>> {
        if !self.building {
            return Err(FramepipeError::scope("end_frame without begin_frame"));
        }
        if !self.stack.is_empty() {
            return Err(FramepipeError::scope(format!(
                "end_frame with {} open scope(s)",
                self.stack.len()
            )));
        }
        self.building = false;
        self.reset_accumulators();
        let tasks = std::mem::take(&mut self.tasks);
        tracing::debug!(
            nodes = self.graph.len(),
            tasks = tasks.len(),
            "scene frame built"
        );
        Ok(tasks)
    }

    /// Claim the next depth slot for a sibling subtree.
    pub fn next_elevation(&mut self) -> f32 {
        let e = self.topmost_elevation;
        self.topmost_elevation += self.opts.elevation_step;
        e
    }

    /// Open a transform scope.
    ///
    /// Singular or non-finite transforms are logged and contribute an identity node.
    pub fn push_transform(&mut self, transform: Affine) -> FramepipeResult<ScopeToken> {
        let parent = self.current_parent()?;
        let d = match decompose(transform) {
            Some(d) => d,
            None => {
                tracing::warn!(?transform, "transform cannot be decomposed; ignoring it");
                crate::scene::decompose::Decomposed::IDENTITY
            }
        };
        let node = self.graph.add_child(
            parent,
            NodeKind::Transform {
                translation: d.translation,
                rotation: d.rotation,
                scale: d.scale,
            },
        );
        let kind = ScopeKind::Transform {
            prev_scale: self.top_scale,
            prev_rotation: self.top_rotation,
        };
        self.top_scale = Vec2::new(self.top_scale.x * d.scale.x, self.top_scale.y * d.scale.y);
        self.top_rotation += d.rotation;
        Ok(self.open(node, kind))
    }

    /// Open a uniform or non-uniform scale scope.
    pub fn push_scale(&mut self, sx: f64, sy: f64) -> FramepipeResult<ScopeToken> {
        self.push_transform(Affine::scale_non_uniform(sx, sy))
    }

    /// Open a rectangular clip scope.
    pub fn push_clip(&mut self, rect: Rect) -> FramepipeResult<ScopeToken> {
        let parent = self.current_parent()?;
        let planes = if rect_is_finite(rect) {
            clip_planes_for_rect(rect)
        } else {
            tracing::error!(?rect, "non-finite clip rect; clip has no planes");
            Default::default()
        };
        let node = self.graph.add_child(parent, NodeKind::Clip { planes });
        Ok(self.open(node, ScopeKind::Clip))
    }

    /// Open an opacity scope; `opacity` multiplies into the composed opacity.
    pub fn push_opacity(&mut self, opacity: u8) -> FramepipeResult<ScopeToken> {
        let parent = self.current_parent()?;
        let a = f32::from(opacity) / 255.0;
        let node = self.graph.add_child(
            parent,
            NodeKind::Opacity {
                opacity: a.min(ONE_MINUS_EPSILON),
            },
        );
        let kind = ScopeKind::Opacity {
            prev_alpha: self.alpha,
        };
        self.alpha *= a;
        Ok(self.open(node, kind))
    }

    /// Open a frame scope. Layers added before the matching pop are painted into one surface.
    pub fn push_frame(&mut self, spec: FrameSpec) -> FramepipeResult<ScopeToken> {
        let parent = self.current_parent()?;
        let elevation = if spec.elevated {
            let e = self.next_elevation();
            self.elevation = e;
            e
        } else {
            0.0
        };
        let entity = self.graph.add_child(
            parent,
            NodeKind::Entity {
                label: spec.label.clone(),
                elevation,
                clip_planes: Default::default(),
            },
        );
        let opacity_node = self.graph.add_child(
            entity,
            NodeKind::Opacity {
                opacity: (f32::from(spec.opacity) / 255.0).min(ONE_MINUS_EPSILON),
            },
        );
        let frame = FrameScope {
            spec,
            entity,
            opacity_node,
            layers: Vec::new(),
            paint_bounds: None,
        };
        Ok(self.open(opacity_node, ScopeKind::Frame(Box::new(frame))))
    }

    /// Add drawable content to the innermost open frame.
    pub fn add_paint_layer(&mut self, layer: PaintLayer) -> FramepipeResult<()> {
        let frame = self
            .stack
            .iter_mut()
            .rev()
            .find_map(|s| match &mut s.kind {
                ScopeKind::Frame(f) => Some(f),
                _ => None,
            })
            .ok_or_else(|| FramepipeError::scope("paint layer added outside of a frame"))?;

        if !layer.bounds.is_zero_area() && rect_is_finite(layer.bounds) {
            frame.paint_bounds = Some(match frame.paint_bounds {
                Some(b) => b.union(layer.bounds),
                None => layer.bounds,
            });
        }
        frame.layers.push(layer);
        Ok(())
    }

    /// Close the innermost scope. `token` must come from the matching push.
    pub fn pop(&mut self, token: ScopeToken) -> FramepipeResult<()> {
        match self.stack.last() {
            Some(top) if top.serial == token.serial && self.stack.len() == token.depth => {}
            Some(_) => {
                return Err(FramepipeError::scope(format!(
                    "scope popped out of order (depth {}, open {})",
                    token.depth,
                    self.stack.len()
                )));
            }
            None => return Err(FramepipeError::scope("pop with no open scope")),
        }
        let Some(scope) = self.stack.pop() else {
            return Err(FramepipeError::scope("pop with no open scope"));
        };
        match scope.kind {
            ScopeKind::Transform {
                prev_scale,
                prev_rotation,
            } => {
                self.top_scale = prev_scale;
                self.top_rotation = prev_rotation;
            }
            ScopeKind::Opacity { prev_alpha } => self.alpha = prev_alpha,
            ScopeKind::Clip => {}
            ScopeKind::Frame(frame) => self.close_frame(*frame),
        }
        Ok(())
    }

    fn close_frame(&mut self, frame: FrameScope) {
        let FrameScope {
            spec,
            entity,
            opacity_node,
            mut layers,
            paint_bounds,
        } = frame;
        let bounds = spec.rrect.rect();

        if !rrect_is_finite(&spec.rrect) {
            tracing::error!(rrect = ?spec.rrect, "frame geometry is not finite; skipping it");
            return;
        }
        if bounds.is_zero_area() {
            return;
        }

        if let Some(n) = self.graph.get_mut(entity)
            && let NodeKind::Entity { clip_planes, .. } = &mut n.kind
        {
            *clip_planes = clip_planes_for_rect(bounds);
        }

        let intersects = paint_bounds.is_some_and(|pb| rects_intersect(bounds, pb));
        if !intersects && !layers.is_empty() {
            tracing::trace!(label = ?spec.label, "frame content is clipped away");
            layers.clear();
        }

        let material = self
            .paint_frame(&spec, bounds, layers)
            .unwrap_or_else(|| Material::Color(spec.color.with_opacity(spec.opacity)));

        self.graph.add_child(
            opacity_node,
            NodeKind::Shape {
                rrect: spec.rrect,
                center: bounds.center(),
                material,
            },
        );
    }

    // Acquire a surface and record a paint task; `None` means flat fill.
    fn paint_frame(
        &mut self,
        spec: &FrameSpec,
        bounds: Rect,
        layers: Vec<PaintLayer>,
    ) -> Option<Material> {
        if layers.is_empty() {
            return None;
        }
        let device = self.opts.device_scale;
        let scale = Vec2::new(
            (self.top_scale.x * device).abs(),
            (self.top_scale.y * device).abs(),
        );
        let size = PixelSize::from_scaled_bounds(bounds, scale);
        if size.is_empty() {
            tracing::debug!(label = ?spec.label, "frame scales to nothing; using flat fill");
            return None;
        }

        let key = RetentionKey::new(
            spec.owner,
            TransformFingerprint::new(scale, self.top_rotation),
        );
        let Some(acquired) = self.pool.acquire(size, key) else {
            tracing::warn!(
                label = ?spec.label,
                w = size.width,
                h = size.height,
                "no surface available; using flat fill"
            );
            return None;
        };

        let id = acquired.handle.id();
        self.tasks.push(PaintTask {
            surface: acquired.handle,
            key,
            size,
            layers,
            background: spec.color,
            scale,
            origin: bounds.origin(),
            placement: bounds,
            contents_valid: acquired.contents_valid,
            content_unchanged: spec.content_unchanged,
        });
        Some(Material::Texture(id))
    }

    fn current_parent(&self) -> FramepipeResult<NodeId> {
        if !self.building {
            return Err(FramepipeError::scope("scope pushed outside of a frame"));
        }
        Ok(self
            .stack
            .last()
            .map(|s| s.node)
            .unwrap_or_else(|| self.graph.root()))
    }

    fn open(&mut self, node: NodeId, kind: ScopeKind) -> ScopeToken {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);
        self.stack.push(Scope { serial, node, kind });
        ScopeToken {
            depth: self.stack.len(),
            serial,
        }
    }

    fn reset_accumulators(&mut self) {
        self.top_scale = Vec2::new(1.0, 1.0);
        self.top_rotation = 0.0;
        self.alpha = 1.0;
        self.topmost_elevation = self.opts.elevation_step;
        self.elevation = 0.0;
    }
}

fn rrect_is_finite(rr: &RoundedRect) -> bool {
    let r = rr.radii();
    rect_is_finite(rr.rect())
        && [r.top_left, r.top_right, r.bottom_right, r.bottom_left]
            .iter()
            .all(|v| v.is_finite())
}

#[cfg(test)]
#[path = "../../tests/unit/scene/builder.rs"]
mod tests;
