//! Engine-owned alpha sort objects and the unified back-to-front traversal.
//!
//! Sort objects are whole engine entities (particle systems, decals, ...) that
//! draw themselves through a callback. They are bucketed with the same scale
//! as queued polygons; inside a bucket they keep submission order and are
//! drawn before that bucket's polygons.

use veil_device::RenderDevice;

use crate::alpha_queue::{AlphaPolygonQueue, PolyId, QueueError};

/// An externally drawn alpha entity.
pub trait AlphaSortObject {
    /// View depth used for bucket placement.
    fn depth(&self) -> f32;

    /// Issue the object's draw calls. State set here is not tracked by the
    /// renderer's cache; the renderer re-establishes its baseline afterwards.
    fn draw(&mut self, device: &dyn RenderDevice);
}

/// Closure-backed sort object.
///
/// ```ignore
/// renderer.submit_sort_object(DrawCallback::new(42.0, |device: &dyn RenderDevice| {
///     device.draw_fan_immediate(&smoke_quad);
/// }))?;
/// ```
pub struct DrawCallback<F> {
    depth: f32,
    callback: F,
}

impl<F> DrawCallback<F>
where
    F: FnMut(&dyn RenderDevice),
{
    pub fn new(depth: f32, callback: F) -> Self {
        Self { depth, callback }
    }
}

impl<F> AlphaSortObject for DrawCallback<F>
where
    F: FnMut(&dyn RenderDevice),
{
    fn depth(&self) -> f32 {
        self.depth
    }

    fn draw(&mut self, device: &dyn RenderDevice) {
        (self.callback)(device)
    }
}

/// Index of a sort object in the frame list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortObjectId(u32);

impl SortObjectId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

struct Entry {
    object: Box<dyn AlphaSortObject>,
    next: Option<u32>,
}

/// Per-bucket FIFO lists of sort objects for one frame.
pub struct SortObjectList {
    entries: Vec<Entry>,
    heads: Vec<Option<u32>>,
    tails: Vec<Option<u32>>,
    capacity: usize,
}

impl SortObjectList {
    pub fn new(bucket_count: usize, capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            heads: vec![None; bucket_count],
            tails: vec![None; bucket_count],
            capacity,
        }
    }

    /// Append `object` to the end of `bucket`.
    pub fn push(&mut self, bucket: usize, object: Box<dyn AlphaSortObject>) -> Result<SortObjectId, QueueError> {
        if self.entries.len() >= self.capacity {
            return Err(QueueError::PoolExhausted);
        }
        let bucket = bucket.min(self.heads.len().saturating_sub(1));

        let index = self.entries.len() as u32;
        self.entries.push(Entry { object, next: None });

        match self.tails[bucket] {
            Some(tail) => self.entries[tail as usize].next = Some(index),
            None => self.heads[bucket] = Some(index),
        }
        self.tails[bucket] = Some(index);

        Ok(SortObjectId(index))
    }

    /// Objects in `bucket`, in submission order.
    pub fn bucket(&self, bucket: usize) -> impl Iterator<Item = SortObjectId> + '_ {
        let mut cursor = self.heads.get(bucket).copied().flatten();
        std::iter::from_fn(move || {
            let index = cursor?;
            cursor = self.entries[index as usize].next;
            Some(SortObjectId(index))
        })
    }

    pub fn get_mut(&mut self, id: SortObjectId) -> Option<&mut (dyn AlphaSortObject + 'static)> {
        self.entries.get_mut(id.index()).map(|entry| entry.object.as_mut())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every object and clear the buckets.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.heads.fill(None);
        self.tails.fill(None);
    }
}

/// One step of the alpha pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaSortable {
    /// An engine sort object drawn through its callback.
    External(SortObjectId),
    /// A queued polygon fed to the batcher.
    Polygon(PolyId),
}

/// Fill `out` with `(bucket, item)` in draw order.
///
/// Buckets are walked from the farthest to the nearest. Within a bucket the
/// sort objects come first, then the polygons farthest first.
pub fn back_to_front(queue: &AlphaPolygonQueue, objects: &SortObjectList, out: &mut Vec<(usize, AlphaSortable)>) {
    for bucket in (0..queue.bucket_count()).rev() {
        out.extend(objects.bucket(bucket).map(|id| (bucket, AlphaSortable::External(id))));
        out.extend(queue.bucket(bucket).map(|(id, _)| (bucket, AlphaSortable::Polygon(id))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polygon::{QueuedPolygon, RenderStateKey};
    use std::cell::RefCell;
    use std::rc::Rc;
    use veil_device::{MockRenderDevice, TransformedVertex};

    fn noop(depth: f32) -> Box<dyn AlphaSortObject> {
        Box::new(DrawCallback::new(depth, |_: &dyn RenderDevice| {}))
    }

    #[test]
    fn test_bucket_keeps_submission_order() {
        let mut list = SortObjectList::new(4, 8);
        let a = list.push(1, noop(30.0)).unwrap();
        let b = list.push(2, noop(60.0)).unwrap();
        let c = list.push(1, noop(40.0)).unwrap();

        assert_eq!(list.bucket(1).collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(list.bucket(2).collect::<Vec<_>>(), vec![b]);
        assert_eq!(list.bucket(3).count(), 0);
    }

    #[test]
    fn test_capacity() {
        let mut list = SortObjectList::new(4, 1);
        list.push(0, noop(1.0)).unwrap();
        assert!(matches!(list.push(0, noop(1.0)), Err(QueueError::PoolExhausted)));
    }

    #[test]
    fn test_callback_draws_through_device() {
        let device = MockRenderDevice::new();
        let hits = Rc::new(RefCell::new(0));
        let counter = hits.clone();

        let mut list = SortObjectList::new(4, 8);
        let id = list
            .push(
                0,
                Box::new(DrawCallback::new(2.0, move |device: &dyn RenderDevice| {
                    *counter.borrow_mut() += 1;
                    device.draw_fan_immediate(&[TransformedVertex::default(); 3]);
                })),
            )
            .unwrap();

        let object = list.get_mut(id).unwrap();
        assert_eq!(object.depth(), 2.0);
        object.draw(&device);

        assert_eq!(*hits.borrow(), 1);
        assert_eq!(device.count_draws(), 1);
    }

    #[test]
    fn test_reset_clears_buckets() {
        let mut list = SortObjectList::new(4, 8);
        list.push(3, noop(1.0)).unwrap();
        list.reset();

        assert!(list.is_empty());
        assert_eq!(list.bucket(3).count(), 0);
    }

    #[test]
    fn test_traversal_interleaves_objects_before_polygons() {
        let mut queue = AlphaPolygonQueue::new(4, 8);
        queue.set_far_clip_z(100.0);
        let v = TransformedVertex::default();
        let near = queue
            .push(QueuedPolygon::new(&[v, v, v], RenderStateKey::default(), 10.0))
            .unwrap();
        let far = queue
            .push(QueuedPolygon::new(&[v, v, v], RenderStateKey::default(), 80.0))
            .unwrap();

        let mut objects = SortObjectList::new(4, 8);
        let mid = objects.push(queue.bucket_index(50.0), noop(50.0)).unwrap();
        let same = objects.push(queue.bucket_index(12.0), noop(12.0)).unwrap();

        let mut order = Vec::new();
        back_to_front(&queue, &objects, &mut order);

        assert_eq!(
            order,
            vec![
                (3, AlphaSortable::Polygon(far)),
                (2, AlphaSortable::External(mid)),
                (0, AlphaSortable::External(same)),
                (0, AlphaSortable::Polygon(near)),
            ]
        );
    }
}
