//! Device seam for the Veil alpha pipeline.
//!
//! This crate defines what the pipeline needs from a fixed-function-class
//! graphics device, plus a recording mock for tests.
//!
//! - [`RenderDevice`] - Trait abstracting state, buffer and draw calls
//! - `MockRenderDevice` - Recording implementation (requires `mock` feature)
//! - Device value types ([`DeviceState`], [`TransformedVertex`], [`LockFlags`], ...)
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use veil_device::{DeviceState, MockRenderDevice, RenderDevice, RenderState};
//!
//! let mock = MockRenderDevice::new();
//! mock.apply_state(DeviceState::Render(RenderState::AlphaBlendEnable(true)));
//!
//! assert_eq!(mock.count_state_calls(), 1);
//! # }
//! ```

pub mod device_types;
#[cfg(feature = "mock")]
pub mod mock_device;
pub mod render_device;

pub use device_types::*;
#[cfg(feature = "mock")]
pub use mock_device::*;
pub use render_device::*;
