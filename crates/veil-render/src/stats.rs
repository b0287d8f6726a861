//! Per-frame alpha pass statistics.

use crate::ring_buffer::RingStats;
use crate::state_cache::CacheStats;

/// Counters for one frame, reset by `begin_frame`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlphaPassStats {
    /// Polygons accepted into the queue.
    pub polygons_submitted: u32,
    /// Polygons rejected (pool exhausted, bad depth, bad fan, device lost).
    pub polygons_dropped: u32,
    /// Polygons drawn through the batching path.
    pub polygons_batched: u32,
    /// Polygons drawn one by one through the immediate path.
    pub polygons_immediate: u32,
    pub sort_objects_drawn: u32,
    pub batches_flushed: u32,
    /// Draw calls issued by the pipeline itself (not by sort objects).
    pub draw_calls: u32,
    /// Draw calls avoided by merging polygons into batches.
    pub draw_calls_saved: u32,
    /// State writes that reached the device.
    ///
    /// Every sort object invalidates the whole cache, so the next batch
    /// re-sends all of its key states on top of the baseline. Frames with
    /// many sort objects show more changes and a lower hit ratio.
    pub state_changes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub ring_appends: u64,
    pub ring_restarts: u64,
    /// Part of the frame fell back to the immediate path.
    pub degraded: bool,
}

impl AlphaPassStats {
    /// Fraction of state writes skipped by the cache.
    pub fn cache_hit_ratio(&self) -> f32 {
        CacheStats {
            hits: self.cache_hits,
            misses: self.cache_misses,
            invalidations: 0,
        }
        .hit_ratio()
    }

    /// Average polygons per pipeline draw call, 0 when nothing was drawn.
    pub fn batch_efficiency(&self) -> f32 {
        let drawn = self.polygons_batched + self.polygons_immediate;
        if self.draw_calls == 0 {
            0.0
        } else {
            drawn as f32 / self.draw_calls as f32
        }
    }

    pub(crate) fn record_cache(&mut self, cache: CacheStats) {
        self.cache_hits = cache.hits;
        self.cache_misses = cache.misses;
        self.state_changes = cache.misses;
    }

    pub(crate) fn record_rings(&mut self, vertex: RingStats, index: RingStats) {
        self.ring_appends = vertex.appends + index.appends;
        self.ring_restarts = vertex.restarts + index.restarts;
    }
}
