//! Depth-sorted alpha rendering for fixed-function devices.
//!
//! Blended polygons cannot be drawn in submission order without order
//! independent transparency. This crate queues them into depth buckets, walks
//! the buckets far to near, merges same-state neighbours into single draws
//! and streams the geometry through append-or-restart ring buffers.
//!
//! - [`AlphaRenderer`] - Per-frame façade driving the sorted pass
//! - [`AlphaPolygonQueue`] - Bounded, depth-bucketed polygon pool
//! - [`AlphaBatcher`] - Same-state polygon accumulator
//! - [`StreamingRing`] - Vertex/index streaming allocator
//! - [`StateCache`] - Redundant state call filter
//!
//! Engine entities that draw themselves implement [`AlphaSortObject`] and are
//! interleaved with the queued polygons bucket by bucket.

pub mod alpha_queue;
pub mod batcher;
pub mod blend;
pub mod config;
pub mod depth;
pub mod polygon;
pub mod render_state;
pub mod renderer;
pub mod ring_buffer;
pub mod sort_object;
pub mod state_cache;
pub mod stats;

pub use alpha_queue::{AlphaPolygonQueue, BucketScale, PolyId, QueueError};
pub use batcher::{AlphaBatcher, BatchData, BatchSubmit, RejectReason};
pub use blend::BlendFunc;
pub use config::{AlphaPipelineConfig, ConfigError};
pub use depth::{DepthMapping, ViewParams};
pub use polygon::{MAX_POLYGON_VERTICES, QueuedPolygon, RenderStateKey};
pub use render_state::OpaqueBaseline;
pub use renderer::{AlphaRenderer, FramePhase};
pub use ring_buffer::{RingError, RingRegion, RingStats, StreamingRing, WriteDiscipline};
pub use sort_object::{AlphaSortObject, AlphaSortable, DrawCallback, SortObjectId, SortObjectList};
pub use state_cache::{CacheStats, StateCache, StateChange};
pub use stats::AlphaPassStats;
