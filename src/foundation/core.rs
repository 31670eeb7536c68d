pub use kurbo::{Affine, BezPath, Point, Rect, RoundedRect, Vec2};

use std::sync::OnceLock;
use std::time::Instant;

/// Integer pixel dimensions of a drawing surface.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PixelSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelSize {
    /// Construct a size from width and height.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Physical size of `bounds` after applying a per-axis scale.
    ///
    /// Fractional pixels are truncated, matching how logical bounds are snapped before a
    /// surface is requested. Negative or non-finite products collapse to zero.
    pub fn from_scaled_bounds(bounds: Rect, scale: Vec2) -> Self {
        fn axis(extent: f64, s: f64) -> u32 {
            let v = extent * s;
            if !v.is_finite() || v <= 0.0 {
                return 0;
            }
            v.min(f64::from(u32::MAX)) as u32
        }
        Self {
            width: axis(bounds.width(), scale.x),
            height: axis(bounds.height(), scale.y),
        }
    }

    /// Return `true` when either dimension is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered.
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Bytes needed for an RGBA8 backing store of this size.
    pub fn rgba8_byte_len(self) -> usize {
        usize::try_from(self.area())
            .unwrap_or(usize::MAX)
            .saturating_mul(4)
    }
}

/// Straight-alpha RGBA8 color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Color {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgba(255, 255, 255, 255);

    /// Construct from straight-alpha channels.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Scale this color's alpha by an 8-bit opacity.
    pub fn with_opacity(self, opacity: u8) -> Self {
        let a = (f32::from(self.a) * f32::from(opacity)) / 255.0;
        Self {
            a: a as u8,
            ..self
        }
    }
}

/// Stable identity of a drawable subtree, supplied by the frame producer.
///
/// Identities are opaque to the pipeline; the only requirement is that a subtree keeps the
/// same identity for as long as its painted pixels may be reused.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ContentId(pub u64);

/// Monotonic host time in nanoseconds.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Current time on the process-wide monotonic clock.
    pub fn now() -> Self {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = *EPOCH.get_or_init(Instant::now);
        Self(u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX))
    }

    /// Add `nanos`, saturating at `u64::MAX`.
    pub fn saturating_add_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Nanoseconds elapsed since `earlier`, or zero if `earlier` is in the future.
    pub fn saturating_nanos_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

pub(crate) fn rect_is_finite(r: Rect) -> bool {
    r.x0.is_finite() && r.y0.is_finite() && r.x1.is_finite() && r.y1.is_finite()
}

/// Positive-area overlap test; empty rects never intersect anything.
pub(crate) fn rects_intersect(a: Rect, b: Rect) -> bool {
    let a = a.abs();
    let b = b.abs();
    if a.is_zero_area() || b.is_zero_area() {
        return false;
    }
    a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
