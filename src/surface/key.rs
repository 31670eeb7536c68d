use crate::foundation::core::{ContentId, Vec2};
use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x8b5ad4a0c7d8e9f1;

/// Digest of the composed scale and rotation a surface was painted under.
///
/// Translation is excluded: moving painted content does not invalidate its pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransformFingerprint {
    hi: u64,
    lo: u64,
}

impl TransformFingerprint {
    /// Fingerprint of a physical scale and accumulated rotation (radians).
    pub fn new(scale: Vec2, rotation: f64) -> Self {
        let mut h = StableHasher::new();
        h.write_f64(canonical(scale.x));
        h.write_f64(canonical(scale.y));
        h.write_f64(canonical(rotation));
        h.finish()
    }

    /// Fingerprint of an unscaled, unrotated transform.
    pub fn identity() -> Self {
        Self::new(Vec2::new(1.0, 1.0), 0.0)
    }
}

// -0.0 and 0.0 must hash the same.
fn canonical(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

/// Why a pooled surface exists: the content it holds and the transform it was painted under.
///
/// `content` is `None` for root-level background content with no stable identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RetentionKey {
    /// Identity of the drawable subtree.
    pub content: Option<ContentId>,
    /// Composed transform fingerprint.
    pub fingerprint: TransformFingerprint,
}

impl RetentionKey {
    /// Construct a key.
    pub fn new(content: Option<ContentId>, fingerprint: TransformFingerprint) -> Self {
        Self {
            content,
            fingerprint,
        }
    }

    /// Same content identity, painted under a different transform.
    pub(crate) fn is_stale_version_of(&self, other: &RetentionKey) -> bool {
        self.content.is_some() && self.content == other.content && self.fingerprint != other.fingerprint
    }
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_u64(&mut self, v: u64) {
        self.inner.update(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn finish(self) -> TransformFingerprint {
        let v = self.inner.digest128();
        TransformFingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surface/key.rs"]
mod tests;
