//! Trait abstracting the fixed-function graphics device.
//!
//! The alpha pipeline never talks to a graphics API directly. The engine's
//! device bootstrap implements [`RenderDevice`] over the real device, and tests
//! use `MockRenderDevice`.

use crate::device_types::*;

/// Trait abstracting device state, buffer streaming and draw submission.
///
/// # Borrow Checking Pattern
///
/// Methods take `&self` and return owned handles, so the device can be shared
/// through an `Arc<dyn RenderDevice>` between the renderer and external draw
/// callbacks. Implementations that record or mutate use interior mutability.
///
/// # Example
///
/// ```rust,no_run
/// use veil_device::{DeviceState, RenderDevice, RenderState};
///
/// fn disable_depth_write(device: &dyn RenderDevice) {
///     device.apply_state(DeviceState::Render(RenderState::DepthWriteEnable(false)));
/// }
/// ```
pub trait RenderDevice: Send + Sync {
    // State

    /// Set one render, texture-stage, sampler, texture or material state.
    ///
    /// Always reaches the device; de-duplication is the caller's job.
    fn apply_state(&self, state: DeviceState);

    // Buffers

    /// Create a dynamic, write-only buffer.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError>;

    /// Release a buffer. Unknown handles are ignored.
    fn release_buffer(&self, buffer: BufferHandle);

    /// Lock `data.len()` bytes at `offset`, copy `data` in and unlock.
    ///
    /// `flags` selects the write contract (`NO_OVERWRITE` or `DISCARD`).
    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
        flags: LockFlags,
    ) -> Result<(), DeviceError>;

    // Draws

    /// Draw an indexed triangle list from device buffers.
    fn draw_indexed(&self, draw: &IndexedDraw);

    /// Draw an indexed triangle list straight from client memory.
    fn draw_indexed_immediate(&self, vertices: &[TransformedVertex], indices: &[u16]);

    /// Draw one triangle fan straight from client memory.
    fn draw_fan_immediate(&self, vertices: &[TransformedVertex]);
}
