//! Alpha pipeline configuration.

use veil_device::{INDEX_STRIDE, TransformedVertex};

use crate::polygon::MAX_POLYGON_VERTICES;

const LARGEST_FAN_INDICES: usize = (MAX_POLYGON_VERTICES - 2) * 3;

/// Sizing and policy knobs for [`AlphaRenderer`](crate::AlphaRenderer).
///
/// ```
/// use veil_render::AlphaPipelineConfig;
///
/// let config = AlphaPipelineConfig::default()
///     .with_bucket_count(256)
///     .with_polygon_capacity(1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaPipelineConfig {
    /// Number of depth buckets.
    pub bucket_count: usize,
    /// Queued polygon pool size per frame.
    pub polygon_capacity: usize,
    /// Alpha sort objects accepted per frame.
    pub sort_object_capacity: usize,
    /// Vertex limit of one batch. Must fit 16-bit indices.
    pub max_batch_vertices: usize,
    /// Index limit of one batch.
    pub max_batch_indices: usize,
    /// Streaming vertex buffer size in bytes.
    pub vertex_ring_bytes: u64,
    /// Streaming index buffer size in bytes.
    pub index_ring_bytes: u64,
    /// Cursor fraction past which `begin_frame` forces a restart.
    pub restart_threshold: f32,
    /// Lower bound for the far clip distance used for bucket scaling.
    pub min_far_clip: f32,
    /// When false every polygon takes the immediate path.
    pub batching_enabled: bool,
}

impl Default for AlphaPipelineConfig {
    fn default() -> Self {
        Self {
            bucket_count: 512,
            polygon_capacity: 8192,
            sort_object_capacity: 256,
            max_batch_vertices: 2048,
            max_batch_indices: 6144,
            vertex_ring_bytes: 1024 * 1024,
            index_ring_bytes: 256 * 1024,
            restart_threshold: 0.75,
            min_far_clip: 1.0,
            batching_enabled: true,
        }
    }
}

impl AlphaPipelineConfig {
    pub fn with_bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = count;
        self
    }

    pub fn with_polygon_capacity(mut self, capacity: usize) -> Self {
        self.polygon_capacity = capacity;
        self
    }

    pub fn with_sort_object_capacity(mut self, capacity: usize) -> Self {
        self.sort_object_capacity = capacity;
        self
    }

    pub fn with_batch_limits(mut self, max_vertices: usize, max_indices: usize) -> Self {
        self.max_batch_vertices = max_vertices;
        self.max_batch_indices = max_indices;
        self
    }

    pub fn with_ring_sizes(mut self, vertex_bytes: u64, index_bytes: u64) -> Self {
        self.vertex_ring_bytes = vertex_bytes;
        self.index_ring_bytes = index_bytes;
        self
    }

    pub fn with_restart_threshold(mut self, threshold: f32) -> Self {
        self.restart_threshold = threshold;
        self
    }

    pub fn with_min_far_clip(mut self, min_far_clip: f32) -> Self {
        self.min_far_clip = min_far_clip;
        self
    }

    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.batching_enabled = enabled;
        self
    }

    /// Vertices one batch may hold: the configured limit, capped to what
    /// the vertex ring holds in one allocation.
    pub fn batch_vertex_limit(&self) -> usize {
        let ring = (self.vertex_ring_bytes / TransformedVertex::STRIDE as u64) as usize;
        self.max_batch_vertices.min(ring)
    }

    /// Indices one batch may hold, capped to the index ring.
    pub fn batch_index_limit(&self) -> usize {
        let ring = (self.index_ring_bytes / INDEX_STRIDE as u64) as usize;
        self.max_batch_indices.min(ring)
    }

    /// Check that the configuration can run at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_count == 0 {
            return Err(ConfigError::ZeroSized("bucket_count"));
        }
        if self.polygon_capacity == 0 {
            return Err(ConfigError::ZeroSized("polygon_capacity"));
        }
        if self.polygon_capacity > u32::MAX as usize {
            return Err(ConfigError::PoolTooLarge(self.polygon_capacity));
        }
        if self.vertex_ring_bytes == 0 {
            return Err(ConfigError::ZeroSized("vertex_ring_bytes"));
        }
        if self.index_ring_bytes == 0 {
            return Err(ConfigError::ZeroSized("index_ring_bytes"));
        }
        if !(self.restart_threshold > 0.0 && self.restart_threshold <= 1.0) {
            return Err(ConfigError::RestartThreshold(self.restart_threshold));
        }
        if !(self.min_far_clip.is_finite() && self.min_far_clip > 0.0) {
            return Err(ConfigError::MinFarClip(self.min_far_clip));
        }
        if self.max_batch_vertices > u16::MAX as usize + 1 {
            return Err(ConfigError::BatchLimits {
                max_vertices: self.max_batch_vertices,
                max_indices: self.max_batch_indices,
            });
        }
        if self.max_batch_vertices < MAX_POLYGON_VERTICES || self.max_batch_indices < LARGEST_FAN_INDICES {
            return Err(ConfigError::BatchLimits {
                max_vertices: self.max_batch_vertices,
                max_indices: self.max_batch_indices,
            });
        }
        if self.batch_vertex_limit() < MAX_POLYGON_VERTICES {
            return Err(ConfigError::RingTooSmall {
                ring: "vertex_ring_bytes",
                bytes: self.vertex_ring_bytes,
            });
        }
        if self.batch_index_limit() < LARGEST_FAN_INDICES {
            return Err(ConfigError::RingTooSmall {
                ring: "index_ring_bytes",
                bytes: self.index_ring_bytes,
            });
        }
        Ok(())
    }
}

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A size that must be non-zero was zero
    ZeroSized(&'static str),
    /// Polygon pool does not fit 32-bit slot indices
    PoolTooLarge(usize),
    /// Restart threshold outside (0, 1]
    RestartThreshold(f32),
    /// Far clip floor not a positive finite number
    MinFarClip(f32),
    /// Batch limits cannot hold one maximum-size polygon or overflow 16-bit indices
    BatchLimits { max_vertices: usize, max_indices: usize },
    /// A streaming ring cannot hold one maximum-size polygon
    RingTooSmall { ring: &'static str, bytes: u64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroSized(field) => write!(f, "{} must be non-zero", field),
            Self::PoolTooLarge(size) => write!(f, "Polygon capacity {} exceeds u32 range", size),
            Self::RestartThreshold(value) => {
                write!(f, "Restart threshold {} must be in (0, 1]", value)
            }
            Self::MinFarClip(value) => write!(f, "Minimum far clip {} must be positive", value),
            Self::BatchLimits {
                max_vertices,
                max_indices,
            } => write!(
                f,
                "Batch limits ({} vertices, {} indices) cannot hold a {}-vertex polygon with 16-bit indices",
                max_vertices, max_indices, MAX_POLYGON_VERTICES
            ),
            Self::RingTooSmall { ring, bytes } => write!(
                f,
                "{} of {} bytes cannot hold a {}-vertex polygon",
                ring, bytes, MAX_POLYGON_VERTICES
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
