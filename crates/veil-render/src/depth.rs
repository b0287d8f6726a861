//! Per-frame depth mapping derived from the camera clip planes.

use glam::{Mat4, Vec3};

/// Camera inputs the pipeline needs once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    /// World-to-view transform. View space looks down +Z.
    pub view: Mat4,
    pub near: f32,
    pub far: f32,
}

impl ViewParams {
    pub fn new(view: Mat4, near: f32, far: f32) -> Self {
        Self { view, near, far }
    }

    /// Clip planes only, identity view.
    pub fn from_clip(near: f32, far: f32) -> Self {
        Self::new(Mat4::IDENTITY, near, far)
    }

    /// Distance along the view axis, as used for bucket placement.
    pub fn view_depth(&self, world: Vec3) -> f32 {
        self.view.transform_point3(world).z
    }
}

/// Constants mapping view depth to screen-space z and reciprocal W.
///
/// Uses the left-handed perspective convention: z is 0 at the near plane and
/// 1 at the far plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthMapping {
    near: f32,
    far: f32,
    z_scale: f32,
    z_offset: f32,
}

impl DepthMapping {
    /// Recompute the constants for new clip planes.
    ///
    /// Degenerate planes (far <= near, non-positive near) are widened so the
    /// mapping stays finite.
    pub fn from_clip(near: f32, far: f32) -> Self {
        let near = if near.is_finite() && near > 0.0 { near } else { f32::EPSILON };
        let far = if far.is_finite() && far > near { far } else { near + 1.0 };

        let range = far - near;
        Self {
            near,
            far,
            z_scale: far / range,
            z_offset: -near * far / range,
        }
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    /// Map a view depth to `(screen_z, rhw)`.
    pub fn project(&self, view_depth: f32) -> (f32, f32) {
        let w = view_depth.max(self.near);
        let rhw = 1.0 / w;
        let z = (self.z_scale + self.z_offset * rhw).clamp(0.0, 1.0);
        (z, rhw)
    }
}

impl Default for DepthMapping {
    fn default() -> Self {
        Self::from_clip(1.0, 1000.0)
    }
}
