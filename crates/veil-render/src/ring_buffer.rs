//! Streaming ring allocators for per-frame dynamic geometry.
//!
//! A ring hands out consecutive regions of one persistent GPU-visible buffer.
//! It never tracks region lifetimes; instead every write carries one of two
//! contracts:
//!
//! - **Append** (`NO_OVERWRITE`): the region lies past everything written since
//!   the last restart, so the driver can let the GPU keep reading older
//!   regions.
//! - **Restart** (`DISCARD`): used once after the cursor wraps, on first use,
//!   or after a reset. The driver swaps in fresh backing memory and the GPU
//!   keeps its old copy.
//!
//! ```ignore
//! let mut ring = StreamingRing::vertex(&*device, 1 << 20, 0.75);
//!
//! // Each frame
//! ring.begin_frame();
//! let region = ring.upload(&*device, &vertices)?;
//! // draw from region.buffer() starting at region.first_element()
//! ```

use bytemuck::Pod;
use veil_core::profiling::profile_function;
use veil_device::{BufferDesc, BufferHandle, BufferUsages, DeviceError, LockFlags, RenderDevice};

/// Write contract of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteDiscipline {
    Append,
    Restart,
}

impl WriteDiscipline {
    pub fn lock_flags(self) -> LockFlags {
        match self {
            WriteDiscipline::Append => LockFlags::NO_OVERWRITE,
            WriteDiscipline::Restart => LockFlags::DISCARD,
        }
    }
}

/// A region allocated from a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingRegion {
    buffer: BufferHandle,
    offset: u64,
    size: u64,
    stride: u32,
    count: u32,
    discipline: WriteDiscipline,
}

impl RingRegion {
    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Byte offset into the buffer.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offset in elements of `stride` bytes.
    pub fn first_element(&self) -> u32 {
        (self.offset / self.stride as u64) as u32
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn discipline(&self) -> WriteDiscipline {
        self.discipline
    }
}

/// Ring allocation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    /// Backing buffer could not be created; use the immediate path
    Unavailable,
    /// A single request larger than the whole ring
    RequestTooLarge { requested: u64, capacity: u64 },
    /// Zero count or stride
    EmptyRequest,
    /// More data than the region was allocated for
    RegionOverflow { written: u64, size: u64 },
    /// The device rejected the lock
    Device(DeviceError),
}

impl std::fmt::Display for RingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "Streaming buffer unavailable"),
            Self::RequestTooLarge {
                requested,
                capacity,
            } => write!(
                f,
                "Request of {} bytes exceeds ring capacity {}",
                requested, capacity
            ),
            Self::EmptyRequest => write!(f, "Empty ring allocation"),
            Self::RegionOverflow { written, size } => {
                write!(f, "Write of {} bytes exceeds region size {}", written, size)
            }
            Self::Device(err) => write!(f, "Device error: {}", err),
        }
    }
}

impl std::error::Error for RingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeviceError> for RingError {
    fn from(err: DeviceError) -> Self {
        RingError::Device(err)
    }
}

/// Allocation counters since creation or the last [`StreamingRing::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    /// Allocations made with the append contract.
    pub appends: u64,
    /// Allocations made with the restart contract.
    pub restarts: u64,
    /// Times the cursor ran off the end and wrapped.
    pub wraps: u64,
    /// Times `begin_frame` forced a restart past the threshold.
    pub forced_restarts: u64,
    pub bytes_written: u64,
}

/// Append-or-restart allocator over one device buffer.
pub struct StreamingRing {
    label: &'static str,
    usage: BufferUsages,
    /// `None` when creation failed or the device was lost.
    buffer: Option<BufferHandle>,
    capacity: u64,
    cursor: u64,
    need_restart: bool,
    restart_threshold: f32,
    stats: RingStats,
}

impl StreamingRing {
    /// Create a streaming vertex ring of `capacity` bytes.
    pub fn vertex(device: &dyn RenderDevice, capacity: u64, restart_threshold: f32) -> Self {
        Self::new(device, "Alpha Vertex Ring", BufferUsages::VERTEX, capacity, restart_threshold)
    }

    /// Create a streaming 16-bit index ring of `capacity` bytes.
    pub fn index(device: &dyn RenderDevice, capacity: u64, restart_threshold: f32) -> Self {
        Self::new(device, "Alpha Index Ring", BufferUsages::INDEX, capacity, restart_threshold)
    }

    /// Create a ring. Buffer creation failure leaves the ring unavailable.
    pub fn new(
        device: &dyn RenderDevice,
        label: &'static str,
        usage: BufferUsages,
        capacity: u64,
        restart_threshold: f32,
    ) -> Self {
        let mut ring = Self {
            label,
            usage,
            buffer: None,
            capacity,
            cursor: 0,
            need_restart: true,
            restart_threshold,
            stats: RingStats::default(),
        };
        ring.recreate(device);
        ring
    }

    /// Release the old buffer (if any) and create a new one.
    ///
    /// Returns whether the ring is available afterwards.
    pub fn recreate(&mut self, device: &dyn RenderDevice) -> bool {
        self.release(device);

        match device.create_buffer(&BufferDesc {
            label: Some(self.label),
            size: self.capacity,
            usage: self.usage,
        }) {
            Ok(buffer) => {
                self.buffer = Some(buffer);
                tracing::debug!(label = self.label, capacity = self.capacity, "Streaming ring created");
            }
            Err(err) => {
                tracing::warn!(
                    label = self.label,
                    capacity = self.capacity,
                    "Streaming ring unavailable, falling back to immediate draws: {}",
                    err
                );
            }
        }

        self.reset();
        self.is_available()
    }

    /// Drop the backing buffer (device lost). The ring becomes unavailable.
    pub fn release(&mut self, device: &dyn RenderDevice) {
        if let Some(buffer) = self.buffer.take() {
            device.release_buffer(buffer);
        }
        self.reset();
    }

    pub fn is_available(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Whether the next allocation will use the restart contract.
    pub fn needs_restart(&self) -> bool {
        self.need_restart
    }

    /// Fraction of the buffer written since the last restart.
    pub fn usage_fraction(&self) -> f32 {
        self.cursor as f32 / self.capacity.max(1) as f32
    }

    /// Per-frame hook: force a restart once the cursor passes the threshold.
    pub fn begin_frame(&mut self) {
        if self.usage_fraction() > self.restart_threshold {
            tracing::trace!(
                label = self.label,
                cursor = self.cursor,
                "Ring past restart threshold, forcing restart"
            );
            self.cursor = 0;
            self.need_restart = true;
            self.stats.forced_restarts += 1;
        }
    }

    /// Make the next allocation restart unconditionally.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.need_restart = true;
    }

    /// Reserve `count` elements of `stride` bytes.
    ///
    /// The region starts at a multiple of `stride` so it can be addressed by
    /// element. If it does not fit before the end of the buffer the cursor
    /// wraps to 0 and the region uses the restart contract.
    pub fn allocate(&mut self, count: u32, stride: u32) -> Result<RingRegion, RingError> {
        profile_function!();
        let buffer = self.buffer.ok_or(RingError::Unavailable)?;
        if count == 0 || stride == 0 {
            return Err(RingError::EmptyRequest);
        }

        let size = count as u64 * stride as u64;
        if size > self.capacity {
            return Err(RingError::RequestTooLarge {
                requested: size,
                capacity: self.capacity,
            });
        }

        let mut offset = self.cursor.next_multiple_of(stride as u64);
        if offset + size > self.capacity {
            tracing::trace!(label = self.label, "Ring wrapped");
            offset = 0;
            self.need_restart = true;
            self.stats.wraps += 1;
        }

        let discipline = if self.need_restart {
            self.stats.restarts += 1;
            WriteDiscipline::Restart
        } else {
            self.stats.appends += 1;
            WriteDiscipline::Append
        };

        self.need_restart = false;
        self.cursor = offset + size;

        Ok(RingRegion {
            buffer,
            offset,
            size,
            stride,
            count,
            discipline,
        })
    }

    /// Lock `region`, copy `data` in and unlock.
    ///
    /// A failed lock leaves the region contents undefined, so the next
    /// allocation restarts.
    pub fn write<T: Pod>(
        &mut self,
        device: &dyn RenderDevice,
        region: &RingRegion,
        data: &[T],
    ) -> Result<(), RingError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as u64 > region.size {
            return Err(RingError::RegionOverflow {
                written: bytes.len() as u64,
                size: region.size,
            });
        }

        if let Err(err) = device.write_buffer(region.buffer, region.offset, bytes, region.discipline.lock_flags()) {
            self.need_restart = true;
            return Err(err.into());
        }

        self.stats.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Allocate a region sized for `data` and write it.
    pub fn upload<T: Pod>(&mut self, device: &dyn RenderDevice, data: &[T]) -> Result<RingRegion, RingError> {
        let stride = std::mem::size_of::<T>() as u32;
        let region = self.allocate(data.len() as u32, stride)?;
        self.write(device, &region, data)?;
        Ok(region)
    }

    pub fn stats(&self) -> RingStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RingStats::default();
    }
}
