use crate::foundation::config::PoolOpts;
use crate::foundation::core::PixelSize;
use crate::surface::key::RetentionKey;
use std::time::{Duration, Instant};

/// Identity of a pooled drawing surface, stable for the surface's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct SurfaceId(pub u64);

/// A CPU drawing surface owned by the pool.
pub struct Surface {
    id: SurfaceId,
    size: PixelSize,
    pixmap: vello_cpu::Pixmap,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Surface {
    /// Surface identity.
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// Pixel dimensions.
    pub fn size(&self) -> PixelSize {
        self.size
    }

    /// Backing pixmap.
    pub fn pixmap(&self) -> &vello_cpu::Pixmap {
        &self.pixmap
    }

    pub(crate) fn pixmap_mut(&mut self) -> &mut vello_cpu::Pixmap {
        &mut self.pixmap
    }

    /// Premultiplied RGBA8 pixel bytes, row-major.
    pub fn data_rgba8(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }
}

/// Exclusive lease on a surface acquired for the current frame.
///
/// Not `Clone`: exactly one paint task holds a given lease. A lease is only honoured during the
/// frame it was issued in.
#[derive(Debug, PartialEq, Eq)]
pub struct SurfaceHandle {
    id: SurfaceId,
    lease: u64,
}

impl SurfaceHandle {
    /// Surface this lease refers to.
    pub fn id(&self) -> SurfaceId {
        self.id
    }
}

/// Result of a successful [`SurfacePool::acquire`].
#[derive(Debug)]
pub struct Acquired {
    /// Lease on the surface.
    pub handle: SurfaceHandle,
    /// `true` when the surface still holds pixels painted under the requested key.
    pub contents_valid: bool,
}

/// Counters describing pool behaviour since construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SurfacePoolStats {
    /// Acquisitions satisfied by an exact key and size match.
    pub hits: u64,
    /// Acquisitions that needed a repurposed or fresh surface.
    pub misses: u64,
    /// Fresh surfaces allocated.
    pub allocations: u64,
    /// Idle surfaces handed out under a new key.
    pub repurposed: u64,
    /// Surfaces destroyed by aging, invalidation, budget pressure or shrinking.
    pub evictions: u64,
    /// Acquisitions that produced no surface.
    pub failed: u64,
    /// Surfaces currently held.
    pub retained_surfaces: usize,
    /// Backing bytes currently held.
    pub retained_bytes: usize,
}

#[derive(Debug)]
struct Entry {
    id: SurfaceId,
    size: PixelSize,
    // `None` while checked out for rasterization.
    surface: Option<Surface>,
    key: Option<RetentionKey>,
    age: u32,
    in_use: bool,
    lease: u64,
    contents_valid: bool,
}

impl Entry {
    fn bytes(&self) -> usize {
        self.size.rgba8_byte_len()
    }

    fn is_idle(&self) -> bool {
        !self.in_use && self.surface.is_some()
    }
}

/// Retained cache of drawing surfaces keyed by [`RetentionKey`].
///
/// Surfaces are handed out by [`acquire`](Self::acquire) and aged by
/// [`end_frame`](Self::end_frame). Mutation only happens between frames; nothing is released
/// while a frame is being built.
#[derive(Debug)]
pub struct SurfacePool {
    opts: PoolOpts,
    entries: Vec<Entry>,
    stats: SurfacePoolStats,
    next_id: u64,
    next_lease: u64,
    last_acquire: Option<Instant>,
}

impl SurfacePool {
    /// Create an empty pool.
    pub fn new(opts: PoolOpts) -> Self {
        Self {
            opts,
            entries: Vec::new(),
            stats: SurfacePoolStats::default(),
            next_id: 1,
            next_lease: 1,
            last_acquire: None,
        }
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> SurfacePoolStats {
        self.stats.clone()
    }

    /// Number of surfaces currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when the pool holds no surfaces.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Produce a surface for `key` at `size`, reusing retained pixels when possible.
    ///
    /// Returns `None` when the size is degenerate or cannot be backed; callers fall back to a
    /// flat fill.
    #[tracing::instrument(level = "trace", skip(self), fields(w = size.width, h = size.height))]
    pub fn acquire(&mut self, size: PixelSize, key: RetentionKey) -> Option<Acquired> {
        if size.is_empty() {
            self.stats.failed = self.stats.failed.saturating_add(1);
            return None;
        }
        self.last_acquire = Some(Instant::now());

        if let Some(i) = self
            .entries
            .iter()
            .position(|e| e.is_idle() && e.size == size && e.key == Some(key))
        {
            self.stats.hits = self.stats.hits.saturating_add(1);
            // Unowned keys only match by geometry, so their pixels may belong to another frame.
            let contents_valid = self.entries[i].contents_valid && key.content.is_some();
            let handle = self.lease(i, key);
            return Some(Acquired {
                handle,
                contents_valid,
            });
        }

        self.stats.misses = self.stats.misses.saturating_add(1);
        self.evict_where(|e| e.is_idle() && e.key.is_some_and(|k| key.is_stale_version_of(&k)));

        if let Some(i) = self.repurpose_candidate(size) {
            if self.entries[i].size != size && !self.resize_entry(i, size) {
                self.stats.failed = self.stats.failed.saturating_add(1);
                return None;
            }
            self.stats.repurposed = self.stats.repurposed.saturating_add(1);
            tracing::debug!(id = self.entries[i].id.0, "repurposing idle surface");
            let handle = self.lease(i, key);
            return Some(Acquired {
                handle,
                contents_valid: false,
            });
        }

        match self.allocate(size) {
            Some(i) => {
                let handle = self.lease(i, key);
                Some(Acquired {
                    handle,
                    contents_valid: false,
                })
            }
            None => {
                self.stats.failed = self.stats.failed.saturating_add(1);
                None
            }
        }
    }

    /// Borrow the surface behind a lease.
    pub fn surface(&self, handle: &SurfaceHandle) -> Option<&Surface> {
        self.entry_for(handle)
            .and_then(|i| self.entries[i].surface.as_ref())
    }

    /// Look up a held surface by identity, regardless of lease.
    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.surface.as_ref())
    }

    /// Take the surface out of the pool so it can be painted on another thread.
    ///
    /// The slot stays reserved; return the surface with [`checkin`](Self::checkin).
    pub fn checkout(&mut self, handle: &SurfaceHandle) -> Option<Surface> {
        let i = self.entry_for(handle)?;
        let e = &mut self.entries[i];
        e.contents_valid = false;
        e.surface.take()
    }

    /// Return a checked-out surface. When `painted`, its contents become valid for its
    /// current key.
    pub fn checkin(&mut self, surface: Surface, painted: bool) {
        match self.entries.iter_mut().find(|e| e.id == surface.id) {
            Some(e) if e.surface.is_none() => {
                e.contents_valid = painted;
                e.surface = Some(surface);
            }
            _ => {
                tracing::warn!(id = surface.id.0, "checkin of unknown surface; dropping it");
            }
        }
    }

    /// Drop retained pixels for `key` so the next acquisition repaints.
    pub fn invalidate(&mut self, key: &RetentionKey) {
        for e in &mut self.entries {
            if e.key.as_ref() == Some(key) {
                e.contents_valid = false;
            }
        }
    }

    /// Per-frame maintenance: age every surface not acquired this frame and destroy those past
    /// the idle threshold. Surfaces acquired this frame are released for the next frame.
    ///
    /// Returns the number of surfaces destroyed.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn end_frame(&mut self) -> usize {
        for e in &mut self.entries {
            if e.in_use {
                e.in_use = false;
                e.age = 0;
            } else {
                e.age = e.age.saturating_add(1);
            }
        }
        let max_age = self.opts.max_surface_age;
        self.evict_where(|e| e.is_idle() && e.age > max_age)
    }

    /// Destroy every surface that is not in use, regardless of age.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn shrink_to_fit(&mut self) -> usize {
        let n = self.evict_where(Entry::is_idle);
        if n > 0 {
            tracing::debug!(evicted = n, "surface pool shrunk to fit");
        }
        n
    }

    /// Shrink to fit when nothing has been acquired for the configured quiet period.
    pub fn shrink_if_idle(&mut self, now: Instant) -> usize {
        let Some(last) = self.last_acquire else {
            return 0;
        };
        let quiet = Duration::from_millis(self.opts.shrink_after_ms);
        if now.saturating_duration_since(last) < quiet {
            return 0;
        }
        self.shrink_to_fit()
    }

    fn entry_for(&self, handle: &SurfaceHandle) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.id == handle.id && e.lease == handle.lease && e.in_use)
    }

    fn lease(&mut self, i: usize, key: RetentionKey) -> SurfaceHandle {
        let lease = self.next_lease;
        self.next_lease = self.next_lease.wrapping_add(1);

        let e = &mut self.entries[i];
        if e.key != Some(key) {
            e.contents_valid = false;
        }
        e.key = Some(key);
        e.in_use = true;
        e.age = 0;
        e.lease = lease;
        SurfaceHandle { id: e.id, lease }
    }

    // Least recently used idle surface old enough to be recycled and at least as large in both
    // dimensions.
    fn repurpose_candidate(&self, size: PixelSize) -> Option<usize> {
        let min_age = self.opts.min_repurpose_age;
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_idle()
                    && e.age >= min_age
                    && e.size.width >= size.width
                    && e.size.height >= size.height)
            .max_by_key(|(i, e)| (e.age, std::cmp::Reverse(*i)))
            .map(|(i, _)| i)
    }

    fn resize_entry(&mut self, i: usize, size: PixelSize) -> bool {
        let old = self.entries[i].bytes();
        let bytes = size.rgba8_byte_len();
        if self
            .stats
            .retained_bytes
            .saturating_sub(old)
            .saturating_add(bytes)
            > self.opts.max_pool_bytes
        {
            return false;
        }
        let Some(pixmap) = new_pixmap(size) else {
            return false;
        };
        let e = &mut self.entries[i];
        e.size = size;
        if let Some(s) = e.surface.as_mut() {
            s.size = size;
            s.pixmap = pixmap;
        }
        e.contents_valid = false;
        let new = self.entries[i].bytes();
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(old).saturating_add(new);
        self.stats.allocations = self.stats.allocations.saturating_add(1);
        true
    }

    fn allocate(&mut self, size: PixelSize) -> Option<usize> {
        let bytes = size.rgba8_byte_len();
        if self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes {
            self.evict_for_budget(bytes);
            if self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes {
                tracing::warn!(
                    bytes,
                    retained = self.stats.retained_bytes,
                    budget = self.opts.max_pool_bytes,
                    "surface pool byte budget exhausted"
                );
                return None;
            }
        }

        let pixmap = new_pixmap(size)?;
        let id = SurfaceId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        self.entries.push(Entry {
            id,
            size,
            surface: Some(Surface { id, size, pixmap }),
            key: None,
            age: 0,
            in_use: false,
            lease: 0,
            contents_valid: false,
        });
        self.stats.allocations = self.stats.allocations.saturating_add(1);
        self.stats.retained_surfaces = self.entries.len();
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_add(bytes);
        tracing::debug!(id = id.0, w = size.width, h = size.height, "allocated surface");
        Some(self.entries.len() - 1)
    }

    // Oldest idle surfaces first, until `bytes` more would fit.
    fn evict_for_budget(&mut self, bytes: usize) {
        while self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes {
            let victim = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_idle())
                .max_by_key(|(i, e)| (e.age, std::cmp::Reverse(*i)))
                .map(|(i, _)| i);
            let Some(i) = victim else {
                break;
            };
            let e = self.entries.remove(i);
            self.note_evicted(&e);
        }
    }

    fn evict_where(&mut self, mut pred: impl FnMut(&Entry) -> bool) -> usize {
        let mut evicted = Vec::new();
        self.entries.retain_mut(|e| {
            if pred(e) {
                evicted.push((e.id, e.bytes()));
                false
            } else {
                true
            }
        });
        for (id, bytes) in &evicted {
            self.stats.evictions = self.stats.evictions.saturating_add(1);
            self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(*bytes);
            tracing::trace!(id = id.0, "evicted surface");
        }
        self.stats.retained_surfaces = self.entries.len();
        evicted.len()
    }

    fn note_evicted(&mut self, e: &Entry) {
        self.stats.evictions = self.stats.evictions.saturating_add(1);
        self.stats.retained_bytes = self.stats.retained_bytes.saturating_sub(e.bytes());
        self.stats.retained_surfaces = self.entries.len();
        tracing::debug!(id = e.id.0, "evicted surface under byte budget");
    }
}

fn new_pixmap(size: PixelSize) -> Option<vello_cpu::Pixmap> {
    let (Ok(w), Ok(h)) = (u16::try_from(size.width), u16::try_from(size.height)) else {
        tracing::warn!(
            w = size.width,
            h = size.height,
            "surface dimensions exceed backend limits"
        );
        return None;
    };
    Some(vello_cpu::Pixmap::new(w, h))
}

#[cfg(test)]
#[path = "../../tests/unit/surface/pool.rs"]
mod tests;
