//! Value types exchanged with the fixed-function device.
//!
//! Blend factors, compare functions, address and filter modes reuse the wgpu
//! enums so the pipeline shares one vocabulary with the rest of the engine.

use std::num::NonZeroU32;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

pub use wgpu::{AddressMode, BlendFactor, BlendOperation, BufferUsages, CompareFunction, Face, FilterMode};

/// Opaque texture reference supplied by the material system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureHandle(NonZeroU32);

impl TextureHandle {
    /// Returns `None` for id 0, which the device reserves for "no texture".
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn id(&self) -> u32 {
        self.0.get()
    }
}

/// Device-side buffer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// A pre-transformed, lit vertex (screen-space position plus reciprocal W).
///
/// 28 bytes: matches the fixed-function XYZRHW | DIFFUSE | TEX1 layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct TransformedVertex {
    /// Screen-space x, y and normalized z.
    pub position: [f32; 3],
    /// Reciprocal homogeneous W, used for perspective-correct interpolation.
    pub rhw: f32,
    /// Packed ARGB color.
    pub color: u32,
    pub uv: [f32; 2],
}

static_assertions::assert_eq_size!(TransformedVertex, [u8; 28]);

impl TransformedVertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    pub const fn new(position: [f32; 3], rhw: f32, color: u32, uv: [f32; 2]) -> Self {
        Self {
            position,
            rhw,
            color,
            uv,
        }
    }
}

/// Size of one 16-bit index in bytes.
pub const INDEX_STRIDE: u32 = std::mem::size_of::<u16>() as u32;

/// Pack an ARGB color from components.
pub const fn pack_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Descriptor for a dynamic, write-only buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub label: Option<&'a str>,
    pub size: u64,
    /// `VERTEX` or `INDEX`.
    pub usage: BufferUsages,
}

bitflags! {
    /// Write contract for a buffer lock.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LockFlags: u32 {
        /// The caller will not touch any region the GPU may still be reading.
        const NO_OVERWRITE = 1 << 0;
        /// Detach from in-flight memory and hand back fresh backing storage.
        const DISCARD = 1 << 1;
    }
}

/// Texture stage combiner operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureOp {
    Disable,
    SelectArg1,
    SelectArg2,
    Modulate,
}

/// Texture stage combiner argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureArg {
    Texture,
    Diffuse,
    Current,
}

/// Fixed-function material colors, packed ARGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Material {
    pub diffuse: u32,
    pub ambient: u32,
    pub emissive: u32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: 0xFFFF_FFFF,
            ambient: 0xFFFF_FFFF,
            emissive: 0x0000_0000,
        }
    }
}

/// Global pipeline render states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderState {
    AlphaBlendEnable(bool),
    SrcBlend(BlendFactor),
    DestBlend(BlendFactor),
    BlendOp(BlendOperation),
    DepthTestEnable(bool),
    DepthWriteEnable(bool),
    DepthCompare(CompareFunction),
    /// Integer depth bias, larger values pull geometry toward the viewer.
    DepthBias(i32),
    AlphaTestEnable(bool),
    AlphaRef(u8),
    AlphaCompare(CompareFunction),
    CullMode(Option<Face>),
    Lighting(bool),
    FogEnable(bool),
}

/// Identifies which [`RenderState`] a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStateId {
    AlphaBlendEnable,
    SrcBlend,
    DestBlend,
    BlendOp,
    DepthTestEnable,
    DepthWriteEnable,
    DepthCompare,
    DepthBias,
    AlphaTestEnable,
    AlphaRef,
    AlphaCompare,
    CullMode,
    Lighting,
    FogEnable,
}

impl RenderState {
    pub fn id(&self) -> RenderStateId {
        match self {
            Self::AlphaBlendEnable(_) => RenderStateId::AlphaBlendEnable,
            Self::SrcBlend(_) => RenderStateId::SrcBlend,
            Self::DestBlend(_) => RenderStateId::DestBlend,
            Self::BlendOp(_) => RenderStateId::BlendOp,
            Self::DepthTestEnable(_) => RenderStateId::DepthTestEnable,
            Self::DepthWriteEnable(_) => RenderStateId::DepthWriteEnable,
            Self::DepthCompare(_) => RenderStateId::DepthCompare,
            Self::DepthBias(_) => RenderStateId::DepthBias,
            Self::AlphaTestEnable(_) => RenderStateId::AlphaTestEnable,
            Self::AlphaRef(_) => RenderStateId::AlphaRef,
            Self::AlphaCompare(_) => RenderStateId::AlphaCompare,
            Self::CullMode(_) => RenderStateId::CullMode,
            Self::Lighting(_) => RenderStateId::Lighting,
            Self::FogEnable(_) => RenderStateId::FogEnable,
        }
    }
}

/// Per-stage texture combiner states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureStageState {
    ColorOp(TextureOp),
    ColorArg1(TextureArg),
    ColorArg2(TextureArg),
    AlphaOp(TextureOp),
    AlphaArg1(TextureArg),
    AlphaArg2(TextureArg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureStageStateId {
    ColorOp,
    ColorArg1,
    ColorArg2,
    AlphaOp,
    AlphaArg1,
    AlphaArg2,
}

impl TextureStageState {
    pub fn id(&self) -> TextureStageStateId {
        match self {
            Self::ColorOp(_) => TextureStageStateId::ColorOp,
            Self::ColorArg1(_) => TextureStageStateId::ColorArg1,
            Self::ColorArg2(_) => TextureStageStateId::ColorArg2,
            Self::AlphaOp(_) => TextureStageStateId::AlphaOp,
            Self::AlphaArg1(_) => TextureStageStateId::AlphaArg1,
            Self::AlphaArg2(_) => TextureStageStateId::AlphaArg2,
        }
    }
}

/// Per-stage sampler states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerState {
    AddressU(AddressMode),
    AddressV(AddressMode),
    MinFilter(FilterMode),
    MagFilter(FilterMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerStateId {
    AddressU,
    AddressV,
    MinFilter,
    MagFilter,
}

impl SamplerState {
    pub fn id(&self) -> SamplerStateId {
        match self {
            Self::AddressU(_) => SamplerStateId::AddressU,
            Self::AddressV(_) => SamplerStateId::AddressV,
            Self::MinFilter(_) => SamplerStateId::MinFilter,
            Self::MagFilter(_) => SamplerStateId::MagFilter,
        }
    }
}

/// One state-setting call on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Render(RenderState),
    TextureStage { stage: u32, state: TextureStageState },
    Sampler { stage: u32, state: SamplerState },
    Texture { stage: u32, texture: Option<TextureHandle> },
    Material(Material),
}

/// The (stage, state-id) slot a [`DeviceState`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateSlot {
    Render(RenderStateId),
    TextureStage(u32, TextureStageStateId),
    Sampler(u32, SamplerStateId),
    Texture(u32),
    Material,
}

impl DeviceState {
    pub fn slot(&self) -> StateSlot {
        match self {
            Self::Render(state) => StateSlot::Render(state.id()),
            Self::TextureStage { stage, state } => StateSlot::TextureStage(*stage, state.id()),
            Self::Sampler { stage, state } => StateSlot::Sampler(*stage, state.id()),
            Self::Texture { stage, .. } => StateSlot::Texture(*stage),
            Self::Material(_) => StateSlot::Material,
        }
    }
}

impl From<RenderState> for DeviceState {
    fn from(state: RenderState) -> Self {
        DeviceState::Render(state)
    }
}

/// An indexed triangle-list draw sourced from device buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedDraw {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    /// Added to every index before fetching a vertex.
    pub base_vertex: u32,
    /// Number of vertices referenced, starting at `base_vertex`.
    pub vertex_count: u32,
    /// First index, in elements, within the index buffer.
    pub first_index: u32,
    pub triangle_count: u32,
}

/// Device operation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Not enough video memory for the request
    OutOfMemory,
    /// The device was lost; resources must be recreated after reset
    DeviceLost,
    /// The buffer handle does not name a live buffer
    InvalidBuffer(BufferHandle),
    /// Lock/map failed
    LockFailed(String),
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "Out of video memory"),
            Self::DeviceLost => write!(f, "Graphics device lost"),
            Self::InvalidBuffer(handle) => write!(f, "Invalid buffer handle {}", handle.0),
            Self::LockFailed(msg) => write!(f, "Buffer lock failed: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}
