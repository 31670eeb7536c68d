use crate::foundation::core::{Affine, Vec2};

/// Translation/rotation/scale view of a 2D affine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposed {
    /// Translation.
    pub translation: Vec2,
    /// Rotation in radians.
    pub rotation: f64,
    /// Per-axis scale. `scale.y` is negative for mirrored transforms.
    pub scale: Vec2,
}

impl Decomposed {
    /// The identity decomposition.
    pub const IDENTITY: Self = Self {
        translation: Vec2::ZERO,
        rotation: 0.0,
        scale: Vec2::new(1.0, 1.0),
    };
}

/// Split `affine` into translation, rotation and scale.
///
/// Shear is folded into the y scale. Returns `None` for singular or non-finite transforms.
pub fn decompose(affine: Affine) -> Option<Decomposed> {
    let [a, b, c, d, e, f] = affine.as_coeffs();
    if ![a, b, c, d, e, f].iter().all(|v| v.is_finite()) {
        return None;
    }
    let sx = a.hypot(b);
    let det = a * d - b * c;
    if sx == 0.0 || det == 0.0 {
        return None;
    }
    let sy = det / sx;
    let rotation = b.atan2(a);
    Some(Decomposed {
        translation: Vec2::new(e, f),
        rotation,
        scale: Vec2::new(sx, sy),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/scene/decompose.rs"]
mod tests;
