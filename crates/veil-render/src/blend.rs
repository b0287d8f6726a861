//! Blend function presets for alpha polygons.

use veil_device::{BlendFactor, BlendOperation, DeviceState, RenderState};

/// Predefined blend functions for blended polygons.
///
/// Each preset expands to the fixed-function blend enable, factor and
/// operation states. Part of the batching key, so two polygons only share a
/// draw call when their blend functions are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFunc {
    /// No blending - source completely replaces destination.
    Replace,

    /// Standard alpha blending.
    ///
    /// Formula: `src.rgb * src.a + dst.rgb * (1 - src.a)`
    ///
    /// Use for: smoke, foliage edges, UI overlays.
    #[default]
    Alpha,

    /// Premultiplied alpha blending.
    ///
    /// Formula: `src.rgb + dst.rgb * (1 - src.a)`
    PremultipliedAlpha,

    /// Additive blending weighted by source alpha.
    ///
    /// Formula: `src.rgb * src.a + dst.rgb`
    ///
    /// Use for: fire, glows, sparks.
    Additive,

    /// Multiplicative blending.
    ///
    /// Formula: `src.rgb * dst.rgb`
    ///
    /// Use for: decals that darken, shadows blobs.
    Multiply,

    /// Explicit factors for cases the presets do not cover.
    Custom {
        src: BlendFactor,
        dst: BlendFactor,
        op: BlendOperation,
    },
}

impl BlendFunc {
    /// Source factor, destination factor and operation.
    ///
    /// `None` when blending is disabled.
    pub fn factors(self) -> Option<(BlendFactor, BlendFactor, BlendOperation)> {
        match self {
            BlendFunc::Replace => None,
            BlendFunc::Alpha => Some((BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha, BlendOperation::Add)),
            BlendFunc::PremultipliedAlpha => {
                Some((BlendFactor::One, BlendFactor::OneMinusSrcAlpha, BlendOperation::Add))
            }
            BlendFunc::Additive => Some((BlendFactor::SrcAlpha, BlendFactor::One, BlendOperation::Add)),
            BlendFunc::Multiply => Some((BlendFactor::Dst, BlendFactor::Zero, BlendOperation::Add)),
            BlendFunc::Custom { src, dst, op } => Some((src, dst, op)),
        }
    }

    /// Device states that select this blend function.
    ///
    /// Factors are only emitted when blending is enabled; with `Replace` the
    /// previous factors stay bound but are ignored by the device.
    pub fn device_states(self) -> impl Iterator<Item = DeviceState> {
        let enable = RenderState::AlphaBlendEnable(self.factors().is_some());
        let factors = self.factors().into_iter().flat_map(|(src, dst, op)| {
            [
                RenderState::SrcBlend(src),
                RenderState::DestBlend(dst),
                RenderState::BlendOp(op),
            ]
        });
        std::iter::once(enable).chain(factors).map(DeviceState::Render)
    }
}

impl From<(BlendFactor, BlendFactor)> for BlendFunc {
    fn from((src, dst): (BlendFactor, BlendFactor)) -> Self {
        BlendFunc::Custom {
            src,
            dst,
            op: BlendOperation::Add,
        }
    }
}
