//! Frame orchestrator for the sorted alpha pass.
//!
//! [`AlphaRenderer`] owns the queue, the batcher, both streaming rings and the
//! state cache. Per frame:
//!
//! ```text
//! begin_frame(view)
//!   -> submit_polygon / queue_polygon / submit_sort_object (any number)
//!   -> render_alpha_pass
//!        walk buckets far to near
//!          sort objects: flush pending batch, draw, reset to baseline
//!          polygons: batch, flush on key change or full batch
//!        flush, clear queue and objects
//!        restore opaque state
//! ```

use std::sync::Arc;

use veil_core::profiling::{new_frame, profile_function, profile_scope};
use veil_device::{IndexedDraw, RenderDevice, TransformedVertex};

use crate::alpha_queue::{AlphaPolygonQueue, PolyId, QueueError, validate_depth, validate_vertex_count};
use crate::batcher::{AlphaBatcher, BatchData, BatchSubmit, RejectReason};
use crate::config::{AlphaPipelineConfig, ConfigError};
use crate::depth::{DepthMapping, ViewParams};
use crate::polygon::{QueuedPolygon, RenderStateKey};
use crate::render_state::{OpaqueBaseline, apply_baseline, apply_key};
use crate::ring_buffer::{RingError, StreamingRing};
use crate::sort_object::{AlphaSortObject, AlphaSortable, SortObjectId, SortObjectList, back_to_front};
use crate::state_cache::StateCache;
use crate::stats::AlphaPassStats;

/// Where the renderer is in its per-frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// No frame started since creation or device reset.
    Idle,
    /// Between `begin_frame` and `render_alpha_pass`.
    Recording,
    /// The alpha pass of the current frame has run.
    Rendered,
}

/// Depth-sorted alpha pass renderer.
///
/// # Example
///
/// ```ignore
/// let mut renderer = AlphaRenderer::new(device.clone(), AlphaPipelineConfig::default())?;
///
/// renderer.begin_frame(&ViewParams::from_clip(1.0, 100.0));
/// renderer.queue_polygon(&fan, RenderStateKey::default(), 42.0)?;
/// let stats = renderer.render_alpha_pass();
/// ```
pub struct AlphaRenderer {
    device: Arc<dyn RenderDevice>,
    config: AlphaPipelineConfig,
    cache: StateCache,
    vertex_ring: StreamingRing,
    index_ring: StreamingRing,
    queue: AlphaPolygonQueue,
    objects: SortObjectList,
    batcher: AlphaBatcher,
    /// Reused traversal scratch.
    order: Vec<(usize, AlphaSortable)>,
    depth: DepthMapping,
    opaque: OpaqueBaseline,
    stats: AlphaPassStats,
    phase: FramePhase,
    device_lost: bool,
    /// A ring failed this frame; the rest of the frame draws unbatched.
    degraded: bool,
    warned_out_of_phase: bool,
    viewport: (u32, u32),
}

impl AlphaRenderer {
    /// Create a renderer over `device`.
    ///
    /// Ring buffer creation failure is not an error: the renderer starts with
    /// the immediate path and retries on the next device reset.
    pub fn new(device: Arc<dyn RenderDevice>, config: AlphaPipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let vertex_ring = StreamingRing::vertex(&*device, config.vertex_ring_bytes, config.restart_threshold);
        let index_ring = StreamingRing::index(&*device, config.index_ring_bytes, config.restart_threshold);

        tracing::debug!(
            buckets = config.bucket_count,
            polygons = config.polygon_capacity,
            rings = vertex_ring.is_available() && index_ring.is_available(),
            "Alpha renderer created"
        );

        Ok(Self {
            cache: StateCache::new(),
            queue: AlphaPolygonQueue::from_config(&config),
            objects: SortObjectList::new(config.bucket_count, config.sort_object_capacity),
            batcher: AlphaBatcher::from_config(&config),
            order: Vec::new(),
            depth: DepthMapping::default(),
            opaque: OpaqueBaseline::default(),
            stats: AlphaPassStats::default(),
            phase: FramePhase::Idle,
            device_lost: false,
            degraded: false,
            warned_out_of_phase: false,
            viewport: (0, 0),
            vertex_ring,
            index_ring,
            device,
            config,
        })
    }

    // Frame

    /// Start a frame: rescale buckets, recompute depth constants, apply the
    /// ring restart policy and clear the per-frame stats.
    pub fn begin_frame(&mut self, view: &ViewParams) {
        profile_function!();
        new_frame();

        if self.phase == FramePhase::Recording && !(self.queue.is_empty() && self.objects.is_empty()) {
            tracing::warn!(
                polygons = self.queue.len(),
                objects = self.objects.len(),
                "begin_frame without render_alpha_pass, carrying submissions over"
            );
        }

        self.queue.set_far_clip_z(view.far);
        self.depth = DepthMapping::from_clip(view.near, view.far);

        self.vertex_ring.begin_frame();
        self.index_ring.begin_frame();
        self.vertex_ring.reset_stats();
        self.index_ring.reset_stats();
        self.cache.reset_stats();

        self.stats = AlphaPassStats::default();
        self.degraded = false;
        self.warned_out_of_phase = false;
        self.phase = FramePhase::Recording;
    }

    fn check_submission(&mut self) -> Result<(), QueueError> {
        if self.device_lost {
            self.stats.polygons_dropped += 1;
            tracing::trace!("Submission discarded, device lost");
            return Err(QueueError::DeviceLost);
        }
        if self.phase != FramePhase::Recording && !self.warned_out_of_phase {
            tracing::warn!(phase = ?self.phase, "Alpha submission outside begin_frame, queued for the next pass");
            self.warned_out_of_phase = true;
        }
        Ok(())
    }

    fn record_submission<T>(&mut self, result: Result<T, QueueError>) -> Result<T, QueueError> {
        match &result {
            Ok(_) => self.stats.polygons_submitted += 1,
            Err(err) => {
                self.stats.polygons_dropped += 1;
                tracing::debug!("Alpha polygon dropped: {}", err);
            }
        }
        result
    }

    // Submission

    /// Hand out a polygon slot to fill in place, `None` when the pool is
    /// exhausted or the device is lost.
    pub fn allocate_polygon(&mut self) -> Option<PolyId> {
        if self.check_submission().is_err() {
            return None;
        }
        let id = self.queue.allocate();
        if id.is_none() {
            self.stats.polygons_dropped += 1;
            tracing::trace!(capacity = self.queue.capacity(), "Alpha pool exhausted");
        }
        id
    }

    /// The allocated, not yet submitted polygon in slot `id`.
    pub fn polygon_mut(&mut self, id: PolyId) -> Option<&mut QueuedPolygon> {
        self.queue.get_mut(id)
    }

    /// Link an allocated polygon into its depth bucket.
    pub fn submit_polygon(&mut self, id: PolyId) -> Result<usize, QueueError> {
        self.check_submission()?;
        let result = self.queue.submit(id);
        self.record_submission(result)
    }

    /// Copy `fan` into a new slot and submit it.
    pub fn queue_polygon(
        &mut self,
        fan: &[TransformedVertex],
        key: RenderStateKey,
        depth: f32,
    ) -> Result<PolyId, QueueError> {
        self.check_submission()?;
        let result = validate_vertex_count(fan.len()).and_then(|_| self.queue.push(QueuedPolygon::new(fan, key, depth)));
        self.record_submission(result)
    }

    /// Queue an engine sort object into the bucket of its depth.
    pub fn submit_sort_object(&mut self, object: impl AlphaSortObject + 'static) -> Result<SortObjectId, QueueError> {
        self.check_submission()?;
        let depth = object.depth();
        let result = validate_depth(depth).and_then(|_| {
            let bucket = self.queue.bucket_index(depth);
            self.objects.push(bucket, Box::new(object))
        });
        if let Err(err) = &result {
            tracing::debug!(depth, "Alpha sort object dropped: {}", err);
        }
        result
    }

    // Pass

    /// Draw everything queued this frame back to front, then restore the
    /// opaque baseline. Returns the frame's statistics.
    pub fn render_alpha_pass(&mut self) -> AlphaPassStats {
        profile_function!();

        if self.device_lost {
            tracing::trace!("Alpha pass skipped, device lost");
            self.discard_frame();
            return self.stats;
        }
        if self.phase != FramePhase::Recording {
            tracing::warn!(phase = ?self.phase, "render_alpha_pass without begin_frame, using previous bucket scale");
        }

        let mut order = std::mem::take(&mut self.order);
        order.clear();
        back_to_front(&self.queue, &self.objects, &mut order);

        if !order.is_empty() {
            apply_baseline(&mut self.cache, &*self.device);
        }
        self.batcher.begin();

        for &(bucket, item) in &order {
            match item {
                AlphaSortable::External(id) => {
                    profile_scope!("sort_object");
                    self.flush_batch();
                    if let Some(object) = self.objects.get_mut(id) {
                        object.draw(&*self.device);
                    }
                    self.stats.sort_objects_drawn += 1;
                    tracing::trace!(bucket, "Sort object drawn, resetting to baseline");

                    // The object wrote state behind the cache's back.
                    self.cache.invalidate_all();
                    apply_baseline(&mut self.cache, &*self.device);
                }
                AlphaSortable::Polygon(id) => {
                    if let Some(polygon) = self.queue.get(id).copied() {
                        self.draw_polygon(&polygon);
                    }
                }
            }
        }

        self.flush_batch();
        self.order = order;

        self.queue.reset();
        self.objects.reset();
        self.restore_opaque_state();

        self.stats.record_cache(self.cache.stats());
        self.stats
            .record_rings(self.vertex_ring.stats(), self.index_ring.stats());
        self.stats.degraded |= self.degraded;
        self.phase = FramePhase::Rendered;

        tracing::trace!(
            draw_calls = self.stats.draw_calls,
            batches = self.stats.batches_flushed,
            saved = self.stats.draw_calls_saved,
            "Alpha pass complete"
        );
        self.stats
    }

    /// Whether polygons can currently go through the rings.
    fn batching_available(&self) -> bool {
        self.config.batching_enabled
            && !self.degraded
            && self.vertex_ring.is_available()
            && self.index_ring.is_available()
    }

    fn draw_polygon(&mut self, polygon: &QueuedPolygon) {
        if !self.batching_available() {
            if self.config.batching_enabled {
                // Rings were never created, were lost, or failed earlier this frame.
                self.stats.degraded = true;
            }
            self.draw_immediate(polygon);
            return;
        }

        match self.batcher.submit(polygon) {
            BatchSubmit::Started | BatchSubmit::Appended => {}
            BatchSubmit::Rejected(reason) => {
                self.flush_batch();
                let joined = reason != RejectReason::TooLarge
                    && self.batching_available()
                    && self.batcher.submit(polygon).joined();
                if !joined {
                    self.draw_immediate(polygon);
                }
            }
        }
    }

    fn draw_immediate(&mut self, polygon: &QueuedPolygon) {
        apply_key(&mut self.cache, &*self.device, &polygon.key);
        self.device.draw_fan_immediate(polygon.vertices());
        self.stats.polygons_immediate += 1;
        self.stats.draw_calls += 1;
    }

    /// Draw the open batch, if any, and start a new one.
    fn flush_batch(&mut self) {
        profile_function!();
        let Some(batch) = self.batcher.batch_data() else {
            return;
        };

        let device = &*self.device;
        apply_key(&mut self.cache, device, &batch.key);

        match upload_batch(&mut self.vertex_ring, &mut self.index_ring, device, &batch) {
            Ok(draw) => device.draw_indexed(&draw),
            Err(err) => {
                tracing::warn!("Streaming upload failed, drawing the rest of the frame unbatched: {}", err);
                self.degraded = true;
                device.draw_indexed_immediate(batch.vertices, batch.indices);
            }
        }

        let polygons = batch.polygons as u32;
        self.stats.polygons_batched += polygons;
        self.stats.batches_flushed += 1;
        self.stats.draw_calls += 1;
        self.stats.draw_calls_saved += polygons.saturating_sub(1);

        self.batcher.mark_batch_rendered();
    }

    /// Apply the opaque baseline through the cache.
    pub fn restore_opaque_state(&mut self) {
        self.opaque.apply(&mut self.cache, &*self.device);
    }

    /// Replace the state restored after the alpha pass.
    pub fn set_opaque_baseline(&mut self, baseline: OpaqueBaseline) {
        self.opaque = baseline;
    }

    pub fn opaque_baseline(&self) -> &OpaqueBaseline {
        &self.opaque
    }

    fn discard_frame(&mut self) {
        self.queue.reset();
        self.objects.reset();
        self.batcher.begin();
    }

    // Device lifecycle

    /// Discard every per-frame resource. Submissions are rejected until
    /// [`on_device_reset`](Self::on_device_reset).
    pub fn on_device_lost(&mut self) {
        tracing::info!(
            polygons = self.queue.len(),
            objects = self.objects.len(),
            "Device lost, discarding alpha frame"
        );
        self.discard_frame();
        self.cache.invalidate_all();
        self.vertex_ring.release(&*self.device);
        self.index_ring.release(&*self.device);
        self.device_lost = true;
        self.phase = FramePhase::Idle;
    }

    /// Recreate the rings after the device came back.
    ///
    /// Rings that fail to recreate stay unavailable and the renderer draws
    /// through the immediate path.
    pub fn on_device_reset(&mut self, width: u32, height: u32) {
        let vertex = self.vertex_ring.recreate(&*self.device);
        let index = self.index_ring.recreate(&*self.device);
        tracing::info!(width, height, rings = vertex && index, "Device reset");

        self.discard_frame();
        self.cache.invalidate_all();
        self.viewport = (width, height);
        self.device_lost = false;
        self.degraded = false;
        self.phase = FramePhase::Idle;
    }

    // Accessors

    /// Statistics of the last rendered pass, or the running counters of the
    /// frame being recorded.
    pub fn stats(&self) -> AlphaPassStats {
        self.stats
    }

    pub fn depth_mapping(&self) -> &DepthMapping {
        &self.depth
    }

    /// Map a view depth to `(screen_z, rhw)` with this frame's clip planes.
    pub fn project_depth(&self, view_depth: f32) -> (f32, f32) {
        self.depth.project(view_depth)
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn config(&self) -> &AlphaPipelineConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.device
    }

    pub fn queue(&self) -> &AlphaPolygonQueue {
        &self.queue
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn vertex_ring(&self) -> &StreamingRing {
        &self.vertex_ring
    }

    pub fn index_ring(&self) -> &StreamingRing {
        &self.index_ring
    }
}

/// Stream a batch into the rings and describe the indexed draw.
fn upload_batch(
    vertex_ring: &mut StreamingRing,
    index_ring: &mut StreamingRing,
    device: &dyn RenderDevice,
    batch: &BatchData<'_>,
) -> Result<IndexedDraw, RingError> {
    let vertices = vertex_ring.upload(device, batch.vertices)?;
    let indices = index_ring.upload(device, batch.indices)?;

    Ok(IndexedDraw {
        vertex_buffer: vertices.buffer(),
        index_buffer: indices.buffer(),
        base_vertex: vertices.first_element(),
        vertex_count: vertices.count(),
        first_index: indices.first_element(),
        triangle_count: batch.triangle_count() as u32,
    })
}
