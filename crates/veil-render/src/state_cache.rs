//! Render state cache for skipping redundant device calls.
//!
//! Every state write from the pipeline goes through [`StateCache::set`]. The
//! cache remembers the last value sent to each (stage, state-id) slot and only
//! forwards a call when the value changes. After a device loss the physical
//! state is unknown, so [`StateCache::invalidate_all`] marks every slot unknown
//! and the next write to each slot is forced through.

use veil_core::alloc::HashMap;
use veil_core::profiling::profile_function;
use veil_device::{DeviceState, RenderDevice, StateSlot};

/// Outcome of a cached state write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Value matched the cache; the device was not called.
    Unchanged,
    /// Value differed or was unknown; the device was called.
    Changed,
}

impl StateChange {
    pub fn is_changed(self) -> bool {
        self == StateChange::Changed
    }
}

/// Hit/miss counters since the last [`StateCache::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Writes skipped because the value was already set.
    pub hits: u64,
    /// Writes forwarded to the device.
    pub misses: u64,
    /// Times the whole cache was invalidated.
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of writes that were skipped, 0 when nothing was written.
    pub fn hit_ratio(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }
}

/// Last-known device state, keyed by slot.
///
/// Owned by the renderer and passed by reference; it holds no device handle,
/// so several renderers (or tests) can each keep their own cache.
///
/// # Example
///
/// ```ignore
/// let mut cache = StateCache::new();
/// let blend = DeviceState::Render(RenderState::AlphaBlendEnable(true));
///
/// assert_eq!(cache.set(&device, blend), StateChange::Changed);
/// assert_eq!(cache.set(&device, blend), StateChange::Unchanged);
///
/// cache.invalidate_all();
/// assert_eq!(cache.set(&device, blend), StateChange::Changed);
/// ```
#[derive(Debug, Default)]
pub struct StateCache {
    /// `None` marks a slot whose device value is unknown.
    entries: HashMap<StateSlot, Option<DeviceState>>,
    stats: CacheStats,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `state` to the device unless the slot already holds it.
    pub fn set(&mut self, device: &dyn RenderDevice, state: DeviceState) -> StateChange {
        let entry = self.entries.entry(state.slot()).or_insert(None);
        if *entry == Some(state) {
            self.stats.hits += 1;
            return StateChange::Unchanged;
        }

        *entry = Some(state);
        self.stats.misses += 1;
        device.apply_state(state);
        StateChange::Changed
    }

    /// Apply a sequence of states, returning how many reached the device.
    pub fn set_all(
        &mut self,
        device: &dyn RenderDevice,
        states: impl IntoIterator<Item = DeviceState>,
    ) -> usize {
        profile_function!();
        states
            .into_iter()
            .filter(|state| self.set(device, *state).is_changed())
            .count()
    }

    /// Send `state` regardless of the cached value and record it.
    pub fn force(&mut self, device: &dyn RenderDevice, state: DeviceState) {
        self.entries.insert(state.slot(), Some(state));
        self.stats.misses += 1;
        device.apply_state(state);
    }

    /// Mark every slot unknown.
    ///
    /// Must run after any device loss or recreation, before the next write.
    pub fn invalidate_all(&mut self) {
        for entry in self.entries.values_mut() {
            *entry = None;
        }
        self.stats.invalidations += 1;
        tracing::trace!(slots = self.entries.len(), "State cache invalidated");
    }

    /// Mark one slot unknown, e.g. after external code wrote it directly.
    pub fn invalidate(&mut self, slot: StateSlot) {
        if let Some(entry) = self.entries.get_mut(&slot) {
            *entry = None;
        }
    }

    /// The cached value for `slot`, `None` if never set or invalidated.
    pub fn get(&self, slot: StateSlot) -> Option<DeviceState> {
        self.entries.get(&slot).copied().flatten()
    }

    /// Number of slots the cache has ever seen.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_device::{BlendFactor, MockRenderDevice, RenderState, TextureHandle};

    fn src_blend(factor: BlendFactor) -> DeviceState {
        DeviceState::Render(RenderState::SrcBlend(factor))
    }

    #[test]
    fn test_repeated_value_is_skipped() {
        let device = MockRenderDevice::new();
        let mut cache = StateCache::new();

        assert_eq!(cache.set(&device, src_blend(BlendFactor::SrcAlpha)), StateChange::Changed);
        assert_eq!(cache.set(&device, src_blend(BlendFactor::SrcAlpha)), StateChange::Unchanged);
        assert_eq!(device.count_state_calls(), 1);

        assert_eq!(cache.set(&device, src_blend(BlendFactor::One)), StateChange::Changed);
        assert_eq!(device.count_state_calls(), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_invalidate_forces_same_value_through() {
        let device = MockRenderDevice::new();
        let mut cache = StateCache::new();
        let state = src_blend(BlendFactor::SrcAlpha);

        cache.set(&device, state);
        cache.invalidate_all();

        assert_eq!(cache.get(state.slot()), None);
        assert_eq!(cache.set(&device, state), StateChange::Changed);
        assert_eq!(device.count_state_calls(), 2);
    }

    #[test]
    fn test_stages_are_separate_slots() {
        let device = MockRenderDevice::new();
        let mut cache = StateCache::new();
        let texture = TextureHandle::new(1);

        cache.set(&device, DeviceState::Texture { stage: 0, texture });
        let change = cache.set(&device, DeviceState::Texture { stage: 1, texture });

        assert_eq!(change, StateChange::Changed);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_set_all_counts_changes() {
        let device = MockRenderDevice::new();
        let mut cache = StateCache::new();
        let states = [
            src_blend(BlendFactor::SrcAlpha),
            DeviceState::Render(RenderState::AlphaBlendEnable(true)),
        ];

        assert_eq!(cache.set_all(&device, states), 2);
        assert_eq!(cache.set_all(&device, states), 0);
    }

    #[test]
    fn test_invalidate_single_slot() {
        let device = MockRenderDevice::new();
        let mut cache = StateCache::new();
        let a = src_blend(BlendFactor::SrcAlpha);
        let b = DeviceState::Render(RenderState::AlphaBlendEnable(true));
        cache.set_all(&device, [a, b]);

        cache.invalidate(a.slot());

        assert_eq!(cache.set(&device, a), StateChange::Changed);
        assert_eq!(cache.set(&device, b), StateChange::Unchanged);
    }

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            invalidations: 0,
        };
        assert_eq!(stats.hit_ratio(), 0.75);
        assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    }
}
