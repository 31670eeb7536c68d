use crate::foundation::core::{Color, ContentId, PixelSize, Point, Rect, RoundedRect, Vec2};
use crate::surface::key::RetentionKey;
use crate::surface::pool::SurfaceHandle;
use kurbo::{BezPath, Shape};
use std::sync::Arc;

/// A single drawing primitive in layer-local logical units.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    /// Axis-aligned rectangle.
    FillRect {
        /// Geometry.
        rect: Rect,
        /// Fill color.
        color: Color,
    },
    /// Rounded rectangle.
    FillRoundedRect {
        /// Geometry.
        rrect: RoundedRect,
        /// Fill color.
        color: Color,
    },
    /// Arbitrary path, non-zero fill.
    FillPath {
        /// Geometry.
        path: BezPath,
        /// Fill color.
        color: Color,
    },
}

impl DrawOp {
    /// Conservative bounds of the painted area.
    pub fn bounds(&self) -> Rect {
        match self {
            Self::FillRect { rect, .. } => rect.abs(),
            Self::FillRoundedRect { rrect, .. } => rrect.rect().abs(),
            Self::FillPath { path, .. } => path.bounding_box(),
        }
    }
}

/// Drawable content produced upstream and rasterized into a frame's surface.
///
/// Ops are shared: cloning a layer never copies geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct PaintLayer {
    /// Optional producer identity, for diagnostics.
    pub id: Option<ContentId>,
    /// Union of the ops' bounds.
    pub bounds: Rect,
    /// Drawing ops in paint order.
    pub ops: Arc<[DrawOp]>,
}

impl PaintLayer {
    /// Build a layer whose bounds are derived from `ops`.
    pub fn new(ops: impl Into<Arc<[DrawOp]>>) -> Self {
        let ops = ops.into();
        let bounds = ops
            .iter()
            .map(DrawOp::bounds)
            .reduce(|a, b| a.union(b))
            .unwrap_or(Rect::ZERO);
        Self {
            id: None,
            bounds,
            ops,
        }
    }

    /// Attach a producer identity.
    pub fn with_id(mut self, id: ContentId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Deferred rasterization bound to one pooled surface for the current frame.
#[derive(Debug)]
pub struct PaintTask {
    /// Lease on the destination surface.
    pub surface: SurfaceHandle,
    /// Key the surface was acquired under.
    pub key: RetentionKey,
    /// Surface size in pixels.
    pub size: PixelSize,
    /// Layers in paint order.
    pub layers: Vec<PaintLayer>,
    /// Clear color applied before painting.
    pub background: Color,
    /// Logical-to-pixel scale.
    pub scale: Vec2,
    /// Top-left of the frame in logical units; mapped to pixel (0, 0).
    pub origin: Point,
    /// Destination rectangle in the frame's local coordinates.
    pub placement: Rect,
    /// The surface still holds pixels painted under `key`.
    pub contents_valid: bool,
    /// The producer declared the frame's content identical to last frame.
    pub content_unchanged: bool,
}

impl PaintTask {
    /// Return `false` when retained pixels can be shown as-is.
    pub fn needs_raster(&self) -> bool {
        !(self.contents_valid && self.content_unchanged)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/paint.rs"]
mod tests;
