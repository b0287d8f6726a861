//! Device state sets used by the alpha pass.
//!
//! Three state sets exist:
//!
//! - the per-batch set derived from a [`RenderStateKey`],
//! - the alpha baseline, a fixed known state set before the first batch and
//!   after every sort object,
//! - the [`OpaqueBaseline`] restored when the pass ends.
//!
//! All of them are applied through the [`StateCache`].

use veil_device::{
    AddressMode, CompareFunction, DeviceState, Face, FilterMode, Material, RenderDevice, RenderState, SamplerState,
    TextureArg, TextureHandle, TextureOp, TextureStageState,
};

use crate::blend::BlendFunc;
use crate::polygon::RenderStateKey;
use crate::state_cache::StateCache;

/// Texture stage used for polygon textures.
pub const TEXTURE_STAGE: u32 = 0;

fn stage(state: TextureStageState) -> DeviceState {
    DeviceState::TextureStage {
        stage: TEXTURE_STAGE,
        state,
    }
}

fn sampler(state: SamplerState) -> DeviceState {
    DeviceState::Sampler {
        stage: TEXTURE_STAGE,
        state,
    }
}

/// Texture stage combiner states for a texture/alpha-source combination.
///
/// Color is modulated with the texture when one is bound. Alpha comes from
/// the texture (modulated with the vertex color) only when `alpha_channel`
/// is set and a texture is bound, otherwise from the vertex color alone.
fn combiner_states(textured: bool, alpha_channel: bool) -> [DeviceState; 4] {
    let color = if textured {
        [
            stage(TextureStageState::ColorOp(TextureOp::Modulate)),
            stage(TextureStageState::ColorArg1(TextureArg::Texture)),
        ]
    } else {
        [
            stage(TextureStageState::ColorOp(TextureOp::SelectArg1)),
            stage(TextureStageState::ColorArg1(TextureArg::Diffuse)),
        ]
    };
    let alpha = if textured && alpha_channel {
        [
            stage(TextureStageState::AlphaOp(TextureOp::Modulate)),
            stage(TextureStageState::AlphaArg1(TextureArg::Texture)),
        ]
    } else {
        [
            stage(TextureStageState::AlphaOp(TextureOp::SelectArg1)),
            stage(TextureStageState::AlphaArg1(TextureArg::Diffuse)),
        ]
    };
    [color[0], color[1], alpha[0], alpha[1]]
}

/// Every device state a batch with `key` depends on.
pub fn key_states(key: &RenderStateKey) -> impl Iterator<Item = DeviceState> {
    let texture = DeviceState::Texture {
        stage: TEXTURE_STAGE,
        texture: key.texture,
    };
    let fixed = [
        texture,
        DeviceState::Render(RenderState::DepthCompare(key.depth_func)),
        DeviceState::Render(RenderState::DepthBias(key.depth_bias)),
        sampler(SamplerState::AddressU(key.wrap)),
        sampler(SamplerState::AddressV(key.wrap)),
    ];

    fixed
        .into_iter()
        .chain(key.blend.device_states())
        .chain(combiner_states(key.texture.is_some(), key.alpha_channel))
}

/// Apply a batch key through the cache. Returns the number of device calls.
pub fn apply_key(cache: &mut StateCache, device: &dyn RenderDevice, key: &RenderStateKey) -> usize {
    cache.set_all(device, key_states(key))
}

/// The fixed alpha-pass state: depth test on, depth write off, blending on,
/// lighting, fog and culling off, bilinear filtering, combiner arg 2 diffuse.
pub fn baseline_states() -> [DeviceState; 12] {
    [
        DeviceState::Render(RenderState::DepthTestEnable(true)),
        DeviceState::Render(RenderState::DepthWriteEnable(false)),
        DeviceState::Render(RenderState::AlphaBlendEnable(true)),
        DeviceState::Render(RenderState::AlphaTestEnable(false)),
        DeviceState::Render(RenderState::Lighting(false)),
        DeviceState::Render(RenderState::FogEnable(false)),
        DeviceState::Render(RenderState::CullMode(None)),
        sampler(SamplerState::MinFilter(FilterMode::Linear)),
        sampler(SamplerState::MagFilter(FilterMode::Linear)),
        stage(TextureStageState::ColorArg2(TextureArg::Diffuse)),
        stage(TextureStageState::AlphaArg2(TextureArg::Diffuse)),
        DeviceState::Material(Material::default()),
    ]
}

/// Apply the alpha baseline through the cache. Returns the number of device calls.
pub fn apply_baseline(cache: &mut StateCache, device: &dyn RenderDevice) -> usize {
    cache.set_all(device, baseline_states())
}

/// State restored for opaque rendering when the alpha pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueBaseline {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    pub blend: BlendFunc,
    pub texture: Option<TextureHandle>,
    pub material: Material,
    pub cull: Option<Face>,
    pub wrap: AddressMode,
}

impl Default for OpaqueBaseline {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunction::LessEqual,
            blend: BlendFunc::Replace,
            texture: None,
            material: Material::default(),
            cull: Some(Face::Back),
            wrap: AddressMode::Repeat,
        }
    }
}

impl OpaqueBaseline {
    /// Device states for this baseline.
    pub fn states(&self) -> impl Iterator<Item = DeviceState> {
        let fixed = [
            DeviceState::Render(RenderState::DepthTestEnable(self.depth_test)),
            DeviceState::Render(RenderState::DepthWriteEnable(self.depth_write)),
            DeviceState::Render(RenderState::DepthCompare(self.depth_func)),
            DeviceState::Render(RenderState::DepthBias(0)),
            DeviceState::Render(RenderState::CullMode(self.cull)),
            DeviceState::Texture {
                stage: TEXTURE_STAGE,
                texture: self.texture,
            },
            sampler(SamplerState::AddressU(self.wrap)),
            sampler(SamplerState::AddressV(self.wrap)),
            DeviceState::Material(self.material),
        ];

        fixed
            .into_iter()
            .chain(self.blend.device_states())
            .chain(combiner_states(self.texture.is_some(), true))
    }

    /// Apply through the cache. Returns the number of device calls.
    pub fn apply(&self, cache: &mut StateCache, device: &dyn RenderDevice) -> usize {
        cache.set_all(device, self.states())
    }
}
