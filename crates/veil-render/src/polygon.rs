//! Queued alpha polygons and their batching key.

use static_assertions::const_assert;
use veil_device::{AddressMode, CompareFunction, TextureHandle, TransformedVertex};

use crate::blend::BlendFunc;

/// Largest fan a queued polygon can hold.
pub const MAX_POLYGON_VERTICES: usize = 8;

// Vertex counts are stored as u8.
const_assert!(MAX_POLYGON_VERTICES >= 3 && MAX_POLYGON_VERTICES <= u8::MAX as usize);

/// The render-state subset of a polygon.
///
/// Two polygons with equal keys can share a draw call when they are adjacent
/// in the sorted traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderStateKey {
    pub texture: Option<TextureHandle>,
    pub blend: BlendFunc,
    pub depth_func: CompareFunction,
    pub depth_bias: i32,
    pub wrap: AddressMode,
    /// Use the texture's alpha channel; otherwise alpha comes from the vertex color.
    pub alpha_channel: bool,
}

impl Default for RenderStateKey {
    fn default() -> Self {
        Self {
            texture: None,
            blend: BlendFunc::Alpha,
            depth_func: CompareFunction::LessEqual,
            depth_bias: 0,
            wrap: AddressMode::Repeat,
            alpha_channel: true,
        }
    }
}

/// A blended polygon waiting for the alpha pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedPolygon {
    vertices: [TransformedVertex; MAX_POLYGON_VERTICES],
    vertex_count: u8,
    pub key: RenderStateKey,
    /// View depth used for bucket placement only. Zero means "reject".
    pub depth: f32,
}

impl Default for QueuedPolygon {
    fn default() -> Self {
        Self {
            vertices: [TransformedVertex::default(); MAX_POLYGON_VERTICES],
            vertex_count: 0,
            key: RenderStateKey::default(),
            depth: 0.0,
        }
    }
}

impl QueuedPolygon {
    /// Build a polygon from a convex fan.
    ///
    /// Vertices past [`MAX_POLYGON_VERTICES`] are dropped with a debug log; the
    /// queue rejects fans with fewer than three vertices at submission.
    pub fn new(fan: &[TransformedVertex], key: RenderStateKey, depth: f32) -> Self {
        let mut polygon = Self {
            key,
            depth,
            ..Self::default()
        };
        polygon.set_vertices(fan);
        polygon
    }

    /// Replace the vertex fan.
    pub fn set_vertices(&mut self, fan: &[TransformedVertex]) {
        if fan.len() > MAX_POLYGON_VERTICES {
            tracing::debug!(
                count = fan.len(),
                "Polygon fan truncated to {} vertices",
                MAX_POLYGON_VERTICES
            );
        }
        let count = fan.len().min(MAX_POLYGON_VERTICES);
        self.vertices[..count].copy_from_slice(&fan[..count]);
        self.vertex_count = count as u8;
    }

    pub fn vertices(&self) -> &[TransformedVertex] {
        &self.vertices[..self.vertex_count as usize]
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count as usize
    }

    /// Triangles produced by fan expansion.
    pub fn triangle_count(&self) -> usize {
        self.vertex_count().saturating_sub(2)
    }

    /// Indices produced by fan expansion.
    pub fn index_count(&self) -> usize {
        self.triangle_count() * 3
    }

    pub fn with_texture(mut self, texture: Option<TextureHandle>) -> Self {
        self.key.texture = texture;
        self
    }

    pub fn with_blend(mut self, blend: BlendFunc) -> Self {
        self.key.blend = blend;
        self
    }
}
