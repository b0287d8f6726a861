//! Mock implementation of RenderDevice for testing.
//!
//! Records every call, keeps buffer contents so draws can be decoded back into
//! triangles, and can be told to fail buffer creation or writes.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{device_types::*, render_device::RenderDevice};

/// Records a device call for verification in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    ApplyState(DeviceState),
    CreateBuffer {
        buffer: BufferHandle,
        size: u64,
        usage: BufferUsages,
    },
    ReleaseBuffer(BufferHandle),
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: usize,
        flags: LockFlags,
    },
    DrawIndexed(IndexedDraw),
    DrawIndexedImmediate {
        vertex_count: usize,
        index_count: usize,
    },
    DrawFanImmediate {
        vertex_count: usize,
    },
}

/// How a recorded draw reached the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Indexed,
    IndexedImmediate,
    FanImmediate,
}

/// A draw decoded into triangles, with the texture bound on stage 0 at the time.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub kind: DrawKind,
    pub texture: Option<TextureHandle>,
    pub vertex_count: usize,
    pub triangles: Vec<[TransformedVertex; 3]>,
}

impl DrawRecord {
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn index_count(&self) -> usize {
        self.triangles.len() * 3
    }
}

#[derive(Debug, Clone)]
struct MockBuffer {
    usage: BufferUsages,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_buffer_creation: bool,
    fail_writes: bool,
}

/// Mock implementation of [`RenderDevice`].
///
/// # Example
///
/// ```rust
/// use veil_device::{BufferDesc, BufferUsages, MockRenderDevice, RenderDevice};
///
/// let mock = MockRenderDevice::new();
/// let buffer = mock
///     .create_buffer(&BufferDesc {
///         label: Some("verts"),
///         size: 1024,
///         usage: BufferUsages::VERTEX,
///     })
///     .unwrap();
///
/// assert_eq!(mock.count_buffer_creates(), 1);
/// assert_eq!(mock.buffer_size(buffer), Some(1024));
/// ```
pub struct MockRenderDevice {
    calls: Mutex<Vec<DeviceCall>>,
    draws: Mutex<Vec<DrawRecord>>,
    buffers: Mutex<Vec<Option<MockBuffer>>>,
    current: Mutex<HashMap<StateSlot, DeviceState>>,
    faults: Mutex<Faults>,
}

impl MockRenderDevice {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            draws: Mutex::new(Vec::new()),
            buffers: Mutex::new(Vec::new()),
            current: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Make subsequent `create_buffer` calls fail with `OutOfMemory`.
    pub fn set_fail_buffer_creation(&self, fail: bool) {
        self.faults.lock().fail_buffer_creation = fail;
    }

    /// Make subsequent `write_buffer` calls fail with `LockFailed`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.faults.lock().fail_writes = fail;
    }

    /// Get a copy of all recorded calls.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().clone()
    }

    /// Get a copy of all decoded draws.
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.draws.lock().clone()
    }

    /// Every state call that reached the device, in order.
    pub fn state_calls(&self) -> Vec<DeviceState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DeviceCall::ApplyState(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// The last value written to `slot`.
    pub fn current_state(&self, slot: StateSlot) -> Option<DeviceState> {
        self.current.lock().get(&slot).copied()
    }

    pub fn count_state_calls(&self) -> usize {
        self.count(|call| matches!(call, DeviceCall::ApplyState(_)))
    }

    /// Count state calls that wrote `slot`.
    pub fn count_state_calls_for(&self, slot: StateSlot) -> usize {
        self.count(|call| matches!(call, DeviceCall::ApplyState(state) if state.slot() == slot))
    }

    pub fn count_buffer_creates(&self) -> usize {
        self.count(|call| matches!(call, DeviceCall::CreateBuffer { .. }))
    }

    pub fn count_buffer_releases(&self) -> usize {
        self.count(|call| matches!(call, DeviceCall::ReleaseBuffer(_)))
    }

    /// Count writes made with the `DISCARD` contract.
    pub fn count_discard_writes(&self) -> usize {
        self.count(
            |call| matches!(call, DeviceCall::WriteBuffer { flags, .. } if flags.contains(LockFlags::DISCARD)),
        )
    }

    /// Count writes made with the `NO_OVERWRITE` contract.
    pub fn count_append_writes(&self) -> usize {
        self.count(
            |call| matches!(call, DeviceCall::WriteBuffer { flags, .. } if flags.contains(LockFlags::NO_OVERWRITE)),
        )
    }

    /// Count draws of every kind.
    pub fn count_draws(&self) -> usize {
        self.draws.lock().len()
    }

    pub fn count_draws_of(&self, kind: DrawKind) -> usize {
        self.draws.lock().iter().filter(|draw| draw.kind == kind).count()
    }

    /// Size of a live buffer.
    pub fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers
            .lock()
            .get(buffer.0 as usize)
            .and_then(|slot| slot.as_ref())
            .map(|b| b.data.len() as u64)
    }

    /// Number of buffers created and not yet released.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.lock().iter().filter(|slot| slot.is_some()).count()
    }

    /// Clear recorded calls and draws (useful between test steps).
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
        self.draws.lock().clear();
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn bound_texture(&self) -> Option<TextureHandle> {
        match self.current.lock().get(&StateSlot::Texture(0)) {
            Some(DeviceState::Texture { texture, .. }) => *texture,
            _ => None,
        }
    }

    fn read_vertex(data: &[u8], index: usize) -> TransformedVertex {
        let stride = TransformedVertex::STRIDE as usize;
        let start = index * stride;
        data.get(start..start + stride)
            .map(bytemuck::pod_read_unaligned)
            .unwrap_or_default()
    }

    fn read_index(data: &[u8], index: usize) -> usize {
        let start = index * INDEX_STRIDE as usize;
        data.get(start..start + INDEX_STRIDE as usize)
            .map(|bytes| bytemuck::pod_read_unaligned::<u16>(bytes) as usize)
            .unwrap_or_default()
    }

    fn record_draw(&self, kind: DrawKind, vertex_count: usize, triangles: Vec<[TransformedVertex; 3]>) {
        let texture = self.bound_texture();
        self.draws.lock().push(DrawRecord {
            kind,
            texture,
            vertex_count,
            triangles,
        });
    }
}

impl Default for MockRenderDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for MockRenderDevice {
    fn apply_state(&self, state: DeviceState) {
        self.current.lock().insert(state.slot(), state);
        self.calls.lock().push(DeviceCall::ApplyState(state));
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError> {
        if self.faults.lock().fail_buffer_creation {
            tracing::debug!(label = ?desc.label, "Injected buffer creation failure");
            return Err(DeviceError::OutOfMemory);
        }

        let mut buffers = self.buffers.lock();
        let buffer = BufferHandle(buffers.len() as u32);
        buffers.push(Some(MockBuffer {
            usage: desc.usage,
            data: vec![0; desc.size as usize],
        }));

        self.calls.lock().push(DeviceCall::CreateBuffer {
            buffer,
            size: desc.size,
            usage: desc.usage,
        });

        Ok(buffer)
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        if let Some(slot) = self.buffers.lock().get_mut(buffer.0 as usize) {
            *slot = None;
        }
        self.calls.lock().push(DeviceCall::ReleaseBuffer(buffer));
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
        flags: LockFlags,
    ) -> Result<(), DeviceError> {
        if self.faults.lock().fail_writes {
            tracing::debug!(?buffer, offset, "Injected write failure");
            return Err(DeviceError::LockFailed("injected failure".to_string()));
        }

        {
            let mut buffers = self.buffers.lock();
            let target = buffers
                .get_mut(buffer.0 as usize)
                .and_then(|slot| slot.as_mut())
                .ok_or(DeviceError::InvalidBuffer(buffer))?;

            let start = offset as usize;
            let end = start + data.len();
            if end > target.data.len() {
                return Err(DeviceError::LockFailed(format!(
                    "range {}..{} exceeds buffer size {}",
                    start,
                    end,
                    target.data.len()
                )));
            }
            target.data[start..end].copy_from_slice(data);
        }

        self.calls.lock().push(DeviceCall::WriteBuffer {
            buffer,
            offset,
            size: data.len(),
            flags,
        });
        Ok(())
    }

    fn draw_indexed(&self, draw: &IndexedDraw) {
        self.calls.lock().push(DeviceCall::DrawIndexed(*draw));

        let triangles = {
            let buffers = self.buffers.lock();
            let vertices = buffers
                .get(draw.vertex_buffer.0 as usize)
                .and_then(|slot| slot.as_ref())
                .filter(|b| b.usage.contains(BufferUsages::VERTEX));
            let indices = buffers
                .get(draw.index_buffer.0 as usize)
                .and_then(|slot| slot.as_ref())
                .filter(|b| b.usage.contains(BufferUsages::INDEX));

            match (vertices, indices) {
                (Some(vertices), Some(indices)) => (0..draw.triangle_count as usize)
                    .map(|tri| {
                        let fetch = |corner: usize| {
                            let index = Self::read_index(&indices.data, draw.first_index as usize + tri * 3 + corner);
                            Self::read_vertex(&vertices.data, draw.base_vertex as usize + index)
                        };
                        [fetch(0), fetch(1), fetch(2)]
                    })
                    .collect(),
                _ => Vec::new(),
            }
        };

        self.record_draw(DrawKind::Indexed, draw.vertex_count as usize, triangles);
    }

    fn draw_indexed_immediate(&self, vertices: &[TransformedVertex], indices: &[u16]) {
        self.calls.lock().push(DeviceCall::DrawIndexedImmediate {
            vertex_count: vertices.len(),
            index_count: indices.len(),
        });

        let fetch = |i: u16| vertices.get(i as usize).copied().unwrap_or_default();
        let triangles = indices
            .chunks_exact(3)
            .map(|tri| [fetch(tri[0]), fetch(tri[1]), fetch(tri[2])])
            .collect();

        self.record_draw(DrawKind::IndexedImmediate, vertices.len(), triangles);
    }

    fn draw_fan_immediate(&self, vertices: &[TransformedVertex]) {
        self.calls.lock().push(DeviceCall::DrawFanImmediate {
            vertex_count: vertices.len(),
        });

        let triangles = (1..vertices.len().saturating_sub(1))
            .map(|i| [vertices[0], vertices[i], vertices[i + 1]])
            .collect();

        self.record_draw(DrawKind::FanImmediate, vertices.len(), triangles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex_desc(size: u64) -> BufferDesc<'static> {
        BufferDesc {
            label: None,
            size,
            usage: BufferUsages::VERTEX,
        }
    }

    #[test]
    fn test_mock_buffer_creation() {
        let mock = MockRenderDevice::new();
        let buffer = mock.create_buffer(&vertex_desc(1024)).unwrap();

        assert_eq!(mock.count_buffer_creates(), 1);
        assert_eq!(mock.buffer_size(buffer), Some(1024));
        assert_eq!(mock.live_buffer_count(), 1);

        mock.release_buffer(buffer);
        assert_eq!(mock.live_buffer_count(), 0);
    }

    #[test]
    fn test_mock_buffer_creation_failure() {
        let mock = MockRenderDevice::new();
        mock.set_fail_buffer_creation(true);

        assert_eq!(mock.create_buffer(&vertex_desc(64)), Err(DeviceError::OutOfMemory));
        assert_eq!(mock.count_buffer_creates(), 0);
    }

    #[test]
    fn test_mock_write_counts_contracts() {
        let mock = MockRenderDevice::new();
        let buffer = mock.create_buffer(&vertex_desc(256)).unwrap();

        mock.write_buffer(buffer, 0, &[1; 16], LockFlags::DISCARD).unwrap();
        mock.write_buffer(buffer, 16, &[2; 16], LockFlags::NO_OVERWRITE).unwrap();
        mock.write_buffer(buffer, 32, &[3; 16], LockFlags::NO_OVERWRITE).unwrap();

        assert_eq!(mock.count_discard_writes(), 1);
        assert_eq!(mock.count_append_writes(), 2);
    }

    #[test]
    fn test_mock_write_out_of_range() {
        let mock = MockRenderDevice::new();
        let buffer = mock.create_buffer(&vertex_desc(8)).unwrap();

        let result = mock.write_buffer(buffer, 4, &[0; 8], LockFlags::NO_OVERWRITE);
        assert!(matches!(result, Err(DeviceError::LockFailed(_))));
    }

    #[test]
    fn test_mock_fan_decodes_triangles() {
        let mock = MockRenderDevice::new();
        let quad: Vec<_> = (0..4)
            .map(|i| TransformedVertex::new([i as f32, 0.0, 0.5], 1.0, 0xFFFF_FFFF, [0.0, 0.0]))
            .collect();

        mock.draw_fan_immediate(&quad);

        let draws = mock.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].triangle_count(), 2);
        assert_eq!(draws[0].triangles[1][0].position[0], 0.0);
        assert_eq!(draws[0].triangles[1][2].position[0], 3.0);
    }

    #[test]
    fn test_mock_tracks_current_state() {
        let mock = MockRenderDevice::new();
        let texture = TextureHandle::new(3);
        mock.apply_state(DeviceState::Texture { stage: 0, texture });

        assert_eq!(
            mock.current_state(StateSlot::Texture(0)),
            Some(DeviceState::Texture { stage: 0, texture })
        );
        assert_eq!(mock.count_state_calls_for(StateSlot::Texture(0)), 1);
    }
}
