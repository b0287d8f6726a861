//! Depth-bucketed queue of alpha polygons.
//!
//! Polygons live in one contiguous pool for the frame. Each bucket is a
//! singly linked list threaded through the pool by slot index, kept in
//! non-increasing depth order so a far-to-near bucket walk is a
//! painter's-algorithm traversal.
//!
//! ```text
//!  bucket:  511      ...   256          51          25    ...  0
//!  heads:   -              [p1]         [p0]->[p3]  [p2]
//!                          depth 50     10.0  9.99  5.0
//! ```

use veil_core::profiling::profile_function;

use crate::config::AlphaPipelineConfig;
use crate::polygon::{MAX_POLYGON_VERTICES, QueuedPolygon};

/// Index of a polygon slot in the frame pool.
///
/// Tagged with the queue generation it was handed out in, so an id kept
/// across [`AlphaPolygonQueue::reset`] no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolyId {
    index: u32,
    generation: u32,
}

impl PolyId {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Why a polygon (or sort object) was not queued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueueError {
    /// Pool capacity reached for this frame
    PoolExhausted,
    /// Depth 0 is the reject sentinel
    ZeroDepth,
    /// Depth is NaN or infinite
    NonFiniteDepth(f32),
    /// Fewer than three vertices
    TooFewVertices(usize),
    /// More vertices than a queued polygon can hold
    TooManyVertices(usize),
    /// The slot is already linked into a bucket
    AlreadySubmitted(PolyId),
    /// The id was never handed out or predates the last reset
    InvalidSlot(PolyId),
    /// The device is lost; submissions are discarded until reset
    DeviceLost,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PoolExhausted => write!(f, "Alpha pool exhausted"),
            Self::ZeroDepth => write!(f, "Polygon depth is zero"),
            Self::NonFiniteDepth(depth) => write!(f, "Polygon depth {} is not finite", depth),
            Self::TooFewVertices(count) => {
                write!(f, "Polygon has {} vertices, at least 3 required", count)
            }
            Self::TooManyVertices(count) => write!(
                f,
                "Polygon has {} vertices, at most {} supported",
                count, MAX_POLYGON_VERTICES
            ),
            Self::AlreadySubmitted(id) => write!(f, "Polygon slot {} already submitted", id.index),
            Self::InvalidSlot(id) => write!(
                f,
                "Polygon slot {} (generation {}) is not allocated",
                id.index, id.generation
            ),
            Self::DeviceLost => write!(f, "Device lost, submission discarded"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Check a fan's vertex count against the polygon limits.
pub(crate) fn validate_vertex_count(count: usize) -> Result<(), QueueError> {
    if count < 3 {
        Err(QueueError::TooFewVertices(count))
    } else if count > MAX_POLYGON_VERTICES {
        Err(QueueError::TooManyVertices(count))
    } else {
        Ok(())
    }
}

/// Check the depth sentinel and finiteness.
pub(crate) fn validate_depth(depth: f32) -> Result<(), QueueError> {
    if !depth.is_finite() {
        Err(QueueError::NonFiniteDepth(depth))
    } else if depth == 0.0 {
        Err(QueueError::ZeroDepth)
    } else {
        Ok(())
    }
}

/// Maps depth to bucket index for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketScale {
    bucket_count: usize,
    scale: f32,
    min_far_clip: f32,
}

impl BucketScale {
    pub fn new(bucket_count: usize, min_far_clip: f32) -> Self {
        let mut scale = Self {
            bucket_count,
            scale: 0.0,
            min_far_clip,
        };
        scale.set_far_clip_z(min_far_clip);
        scale
    }

    /// `scale = bucket_count / max(far, min_far_clip)`.
    pub fn set_far_clip_z(&mut self, far: f32) {
        let far = if far.is_finite() { far.max(self.min_far_clip) } else { self.min_far_clip };
        self.scale = self.bucket_count as f32 / far;
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// `floor(depth * scale)` clamped to `[0, bucket_count - 1]`.
    pub fn bucket_index(&self, depth: f32) -> usize {
        let scaled = (depth * self.scale).floor();
        if scaled <= 0.0 {
            0
        } else {
            (scaled as usize).min(self.bucket_count - 1)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    polygon: QueuedPolygon,
    next: Option<u32>,
    linked: bool,
}

/// Bounded, depth-bucketed polygon queue.
pub struct AlphaPolygonQueue {
    slots: Vec<Slot>,
    capacity: usize,
    heads: Vec<Option<u32>>,
    scale: BucketScale,
    queued: usize,
    generation: u32,
}

impl AlphaPolygonQueue {
    /// Create a queue with `bucket_count` buckets and a pool of `capacity` slots.
    ///
    /// # Panics
    /// Panics if `bucket_count` is zero.
    pub fn new(bucket_count: usize, capacity: usize) -> Self {
        Self::with_min_far_clip(bucket_count, capacity, 1.0)
    }

    pub fn with_min_far_clip(bucket_count: usize, capacity: usize, min_far_clip: f32) -> Self {
        assert!(bucket_count > 0, "AlphaPolygonQueue needs at least one bucket");
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            heads: vec![None; bucket_count],
            scale: BucketScale::new(bucket_count, min_far_clip),
            queued: 0,
            generation: 0,
        }
    }

    pub fn from_config(config: &AlphaPipelineConfig) -> Self {
        Self::with_min_far_clip(config.bucket_count, config.polygon_capacity, config.min_far_clip)
    }

    /// Recompute the bucket scale. Call once per frame before any submit.
    pub fn set_far_clip_z(&mut self, far: f32) {
        self.scale.set_far_clip_z(far);
    }

    pub fn bucket_scale(&self) -> &BucketScale {
        &self.scale
    }

    pub fn bucket_count(&self) -> usize {
        self.heads.len()
    }

    pub fn bucket_index(&self, depth: f32) -> usize {
        self.scale.bucket_index(depth)
    }

    /// Slots handed out this frame (queued or not).
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    /// Polygons linked into buckets this frame.
    pub fn len(&self) -> usize {
        self.queued
    }

    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hand out a fresh slot, or `None` when the pool is exhausted.
    ///
    /// The caller fills the slot through [`get_mut`](Self::get_mut) and then
    /// calls [`submit`](Self::submit). On `None` the polygon must be dropped.
    pub fn allocate(&mut self) -> Option<PolyId> {
        if self.slots.len() >= self.capacity {
            return None;
        }
        let id = PolyId {
            index: self.slots.len() as u32,
            generation: self.generation,
        };
        self.slots.push(Slot {
            polygon: QueuedPolygon::default(),
            next: None,
            linked: false,
        });
        Some(id)
    }

    fn slot(&self, id: PolyId) -> Option<&Slot> {
        if id.generation != self.generation {
            return None;
        }
        self.slots.get(id.index())
    }

    pub fn get(&self, id: PolyId) -> Option<&QueuedPolygon> {
        self.slot(id).map(|slot| &slot.polygon)
    }

    pub fn get_mut(&mut self, id: PolyId) -> Option<&mut QueuedPolygon> {
        if id.generation != self.generation {
            return None;
        }
        self.slots
            .get_mut(id.index())
            .filter(|slot| !slot.linked)
            .map(|slot| &mut slot.polygon)
    }

    /// Link an allocated slot into its bucket in sorted position.
    ///
    /// Returns the bucket index. Equal depths keep submission order.
    pub fn submit(&mut self, id: PolyId) -> Result<usize, QueueError> {
        profile_function!();
        let slot = self.slot(id).ok_or(QueueError::InvalidSlot(id))?;
        if slot.linked {
            return Err(QueueError::AlreadySubmitted(id));
        }
        let depth = slot.polygon.depth;
        validate_depth(depth)?;
        validate_vertex_count(slot.polygon.vertex_count())?;

        let bucket = self.scale.bucket_index(depth);
        let new = id.index;

        match self.heads[bucket] {
            Some(head) if depth <= self.slots[head as usize].polygon.depth => {
                // Walk past every entry at least as far as the new one.
                let mut prev = head;
                loop {
                    match self.slots[prev as usize].next {
                        Some(next) if self.slots[next as usize].polygon.depth >= depth => prev = next,
                        next => {
                            self.slots[new as usize].next = next;
                            self.slots[prev as usize].next = Some(new);
                            break;
                        }
                    }
                }
            }
            head => {
                self.slots[new as usize].next = head;
                self.heads[bucket] = Some(new);
            }
        }

        self.slots[new as usize].linked = true;
        self.queued += 1;
        Ok(bucket)
    }

    /// Allocate, fill and submit in one step.
    ///
    /// Validation runs before allocation so rejected polygons do not use up
    /// pool slots.
    pub fn push(&mut self, polygon: QueuedPolygon) -> Result<PolyId, QueueError> {
        validate_depth(polygon.depth)?;
        validate_vertex_count(polygon.vertex_count())?;
        let id = self.allocate().ok_or(QueueError::PoolExhausted)?;
        self.slots[id.index()].polygon = polygon;
        self.submit(id)?;
        Ok(id)
    }

    /// Clear every bucket and the allocation cursor.
    ///
    /// O(bucket count); slot contents are overwritten on the next allocate.
    /// Ids handed out before the reset stop resolving.
    pub fn reset(&mut self) {
        self.heads.fill(None);
        self.slots.clear();
        self.queued = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Polygons in `bucket`, farthest first.
    pub fn bucket(&self, bucket: usize) -> BucketIter<'_> {
        BucketIter {
            slots: &self.slots,
            generation: self.generation,
            cursor: self.heads.get(bucket).copied().flatten(),
        }
    }

    pub fn is_bucket_empty(&self, bucket: usize) -> bool {
        self.heads.get(bucket).is_none_or(|head| head.is_none())
    }

    /// Every queued polygon, farthest bucket first.
    pub fn iter_back_to_front(&self) -> impl Iterator<Item = (PolyId, &QueuedPolygon)> + '_ {
        (0..self.heads.len()).rev().flat_map(move |bucket| self.bucket(bucket))
    }
}

/// Iterator over one bucket's linked list.
pub struct BucketIter<'a> {
    slots: &'a [Slot],
    generation: u32,
    cursor: Option<u32>,
}

impl<'a> Iterator for BucketIter<'a> {
    type Item = (PolyId, &'a QueuedPolygon);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.slots[index as usize];
        self.cursor = slot.next;
        let id = PolyId {
            index,
            generation: self.generation,
        };
        Some((id, &slot.polygon))
    }
}
