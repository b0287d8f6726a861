//! Accumulates same-state polygons into one indexed draw.
//!
//! The renderer feeds polygons in sorted traversal order. As long as
//! consecutive polygons share a [`RenderStateKey`] and fit, their fans are
//! expanded into one vertex/index run. A differing key or a full batch makes
//! [`AlphaBatcher::submit`] reject, the caller flushes the current run and
//! submits again. Flushing on every key change keeps the back-to-front order
//! intact.

use veil_core::profiling::profile_function;
use veil_device::TransformedVertex;

use crate::config::AlphaPipelineConfig;
use crate::polygon::{QueuedPolygon, RenderStateKey};

/// Why the batcher refused a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Key differs from the open batch
    StateMismatch,
    /// Open batch has no room left
    CapacityExceeded,
    /// The polygon alone exceeds the batch limits
    TooLarge,
}

/// Outcome of [`AlphaBatcher::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSubmit {
    /// First polygon of a new batch; the key must be applied before drawing.
    Started,
    /// Joined the open batch.
    Appended,
    Rejected(RejectReason),
}

impl BatchSubmit {
    pub fn joined(self) -> bool {
        !matches!(self, BatchSubmit::Rejected(_))
    }
}

/// One flushable run: shared key plus fan-expanded geometry.
#[derive(Debug, Clone, Copy)]
pub struct BatchData<'a> {
    pub key: RenderStateKey,
    pub vertices: &'a [TransformedVertex],
    pub indices: &'a [u16],
    /// Polygons merged into this run.
    pub polygons: usize,
}

impl BatchData<'_> {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Same-state polygon accumulator with fixed vertex and index limits.
pub struct AlphaBatcher {
    vertices: Vec<TransformedVertex>,
    indices: Vec<u16>,
    key: Option<RenderStateKey>,
    polygons: usize,
    max_vertices: usize,
    max_indices: usize,
}

impl AlphaBatcher {
    /// Create a batcher.
    ///
    /// `max_vertices` is capped at 65536 so every index fits in 16 bits.
    pub fn new(max_vertices: usize, max_indices: usize) -> Self {
        let max_vertices = max_vertices.min(u16::MAX as usize + 1);
        Self {
            vertices: Vec::with_capacity(max_vertices),
            indices: Vec::with_capacity(max_indices),
            key: None,
            polygons: 0,
            max_vertices,
            max_indices,
        }
    }

    /// Batcher whose batches always fit one streaming ring allocation.
    pub fn from_config(config: &AlphaPipelineConfig) -> Self {
        Self::new(config.batch_vertex_limit(), config.batch_index_limit())
    }

    /// Reset cursors and clear the active key.
    pub fn begin(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.key = None;
        self.polygons = 0;
    }

    /// Try to add `polygon` to the open batch.
    pub fn submit(&mut self, polygon: &QueuedPolygon) -> BatchSubmit {
        profile_function!();
        let vertex_count = polygon.vertex_count();
        let index_count = polygon.index_count();

        if vertex_count > self.max_vertices || index_count > self.max_indices {
            return BatchSubmit::Rejected(RejectReason::TooLarge);
        }

        let outcome = match self.key {
            None => BatchSubmit::Started,
            Some(key) if key != polygon.key => return BatchSubmit::Rejected(RejectReason::StateMismatch),
            Some(_) => {
                if self.vertices.len() + vertex_count > self.max_vertices
                    || self.indices.len() + index_count > self.max_indices
                {
                    return BatchSubmit::Rejected(RejectReason::CapacityExceeded);
                }
                BatchSubmit::Appended
            }
        };

        self.key = Some(polygon.key);
        self.add_triangle_fan(polygon.vertices());
        self.polygons += 1;
        outcome
    }

    /// Append a convex fan as `n - 2` triangles sharing its first vertex.
    ///
    /// Fans with fewer than three vertices add nothing. The caller is
    /// responsible for capacity; [`submit`](Self::submit) checks it.
    pub fn add_triangle_fan(&mut self, fan: &[TransformedVertex]) {
        if fan.len() < 3 {
            return;
        }

        let base = self.vertices.len() as u16;
        self.vertices.extend_from_slice(fan);
        for i in 1..(fan.len() as u16 - 1) {
            self.indices.extend_from_slice(&[base, base + i, base + i + 1]);
        }
    }

    /// The open batch, if any.
    pub fn batch_data(&self) -> Option<BatchData<'_>> {
        let key = self.key?;
        if self.indices.is_empty() {
            return None;
        }
        Some(BatchData {
            key,
            vertices: &self.vertices,
            indices: &self.indices,
            polygons: self.polygons,
        })
    }

    /// The open batch has been drawn; start over.
    pub fn mark_batch_rendered(&mut self) {
        self.begin();
    }

    /// Whether a partial batch is still waiting to be flushed.
    pub fn end(&self) -> bool {
        self.key.is_some() && !self.indices.is_empty()
    }

    pub fn active_key(&self) -> Option<RenderStateKey> {
        self.key
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons
    }

    pub fn max_vertices(&self) -> usize {
        self.max_vertices
    }

    pub fn max_indices(&self) -> usize {
        self.max_indices
    }
}

impl Default for AlphaBatcher {
    fn default() -> Self {
        Self::from_config(&AlphaPipelineConfig::default())
    }
}
