//! # Buffer Channel
//!
//! Owns up to two slots of raw bytes and decides which one a mapping gets.
//!
//! ## Safety Note
//!
//! Slot memory lives in `UnsafeCell`s. Every access goes through a mapping
//! handle that holds the slot's [`SlotLock`](crate::sync::SlotLock) for the
//! side it touches; reallocation holds the layout lock exclusively, which no
//! mapping can coexist with.
//!
//! ## Slot Policy
//!
//! ```text
//!   allocate ──► [slot 0]                       (single slot fast path)
//!                   │ contention (try-lock fails)
//!                   ▼
//!   promote  ──► [slot 0] [slot 1]              (copy 0 → 1 under read lock)
//!
//!   read   ──► last-written slot (shared)
//!   write  ──► the other slot (exclusive), seeded from last-written when the
//!              caller needs current content (read-write, single element)
//!   release ─► last_written = written slot, stamp += 1   (only if data supplied)
//! ```

#![allow(unsafe_code)]

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::device_sync::DeviceState;
use super::mapping::{MapMode, MappedRaw, SlotAccess};
use super::slot::{Slot, SlotMemory};
use crate::config::ChannelConfig;
use crate::error::{ChannelError, ChannelResult};
use crate::layout::{ChannelLayout, ElementDesc, Usage};

/// Slot bookkeeping guarded by one short mutex. Never held across a blocking
/// slot acquisition.
#[derive(Clone, Copy, Debug, Default)]
struct SlotState {
    slot_count: usize,
    last_written: usize,
}

/// A single element addressed by index in units of `width` bytes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ElementWindow {
    pub(crate) index: usize,
    pub(crate) width: usize,
}

impl ElementWindow {
    fn resolve(self, byte_size: usize) -> ChannelResult<Range<usize>> {
        if self.width == 0 {
            return Err(ChannelError::SizeMismatch {
                expected: byte_size,
                actual: 0,
            });
        }
        let len = byte_size / self.width;
        if self.index >= len {
            return Err(ChannelError::IndexOutOfBounds {
                index: self.index,
                len,
            });
        }
        let start = self.index * self.width;
        Ok(start..start + self.width)
    }
}

/// Concurrent double-buffered data channel.
///
/// Backs one piece of per-frame numeric data (a uniform, a vertex attribute,
/// an instance array). Any number of threads may map it concurrently; the
/// channel hands out slots so that readers see complete writes and writers
/// rarely wait on readers.
///
/// ## Usage
///
/// ```rust
/// use tandem_core::{BufferChannel, ElementDesc};
///
/// let positions = BufferChannel::new("pos");
/// positions.allocate_vertex_array(ElementDesc::vec3f(), 3)?;
///
/// {
///     let mut w = positions.map_write::<[f32; 3]>()?;
///     w[0] = [0.0, 0.0, 0.0];
///     w[1] = [1.0, 0.0, 0.0];
///     w[2] = [0.0, 1.0, 0.0];
/// } // released: stamp advances
///
/// let r = positions.map_read::<[f32; 3]>()?;
/// assert_eq!(r[1], [1.0, 0.0, 0.0]);
/// # Ok::<(), tandem_core::ChannelError>(())
/// ```
pub struct BufferChannel {
    name: String,
    config: ChannelConfig,
    /// `None` until allocated. Mappings hold it shared for their lifetime.
    layout: RwLock<Option<ChannelLayout>>,
    slots: [Slot; 2],
    state: Mutex<SlotState>,
    stamp: AtomicU64,
    /// Serializes one → two slot promotion.
    promotion: Mutex<()>,
    pub(super) device: Mutex<DeviceState>,
}

// SAFETY: slot memory is only touched through mapping handles holding the
// slot's lock (or under the exclusive layout lock); all other state is behind
// mutexes or atomics.
unsafe impl Sync for BufferChannel {}

impl BufferChannel {
    /// Creates an empty channel with the default configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, ChannelConfig::default())
    }

    /// Creates an empty channel.
    #[must_use]
    pub fn with_config(name: impl Into<String>, config: ChannelConfig) -> Self {
        Self {
            name: name.into(),
            config,
            layout: RwLock::new(None),
            slots: [Slot::new(), Slot::new()],
            state: Mutex::new(SlotState::default()),
            stamp: AtomicU64::new(0),
            promotion: Mutex::new(()),
            device: Mutex::new(DeviceState::default()),
        }
    }

    /// Name used in diagnostics.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this channel was created with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Current version stamp.
    ///
    /// Advances by one on every write release that supplied data and on every
    /// (re)allocation. Never advances on reads.
    #[inline]
    #[must_use]
    pub fn stamp(&self) -> u64 {
        self.stamp.load(Ordering::Acquire)
    }

    /// Advances the stamp without writing, forcing consumers to treat cached
    /// derived state as stale. Returns the new stamp.
    pub fn next_stamp(&self) -> u64 {
        let _state = self.state.lock();
        self.stamp.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current layout, `None` if the channel was never allocated.
    #[must_use]
    pub fn layout(&self) -> Option<ChannelLayout> {
        *self.layout.read_recursive()
    }

    /// Number of allocated slots (0, 1 or 2).
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.state.lock().slot_count
    }

    /// Index of the slot reads are served from.
    #[must_use]
    pub fn last_written_slot(&self) -> usize {
        self.state.lock().last_written
    }

    /// Returns true if a CPU-side copy exists.
    #[must_use]
    pub fn is_backed_by_client_memory(&self) -> bool {
        self.slot_count() > 0
    }

    /// Returns true if either a CPU copy or a device buffer exists.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.is_backed_by_client_memory() || self.is_backed_by_device_buffer()
    }

    // =========================================================================
    // ALLOCATION
    // =========================================================================

    /// Allocates a single value (or value array) shared by all vertices.
    ///
    /// Any previous content is discarded. Blocks until every outstanding
    /// mapping is released, so the calling thread must not hold one.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Allocation`] if slot memory cannot be reserved.
    pub fn allocate_uniform(&self, desc: ElementDesc) -> ChannelResult<()> {
        self.reallocate(ChannelLayout::new(desc, Usage::Uniform)?)
    }

    /// Allocates one element per vertex.
    ///
    /// Any previous content is discarded. Blocks until every outstanding
    /// mapping is released, so the calling thread must not hold one.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Allocation`] if slot memory cannot be reserved.
    pub fn allocate_vertex_array(&self, desc: ElementDesc, vertex_count: u32) -> ChannelResult<()> {
        self.reallocate(ChannelLayout::new(desc, Usage::Vertex { count: vertex_count })?)
    }

    /// Allocates one element per `divisor` instances. Zero counts and divisors
    /// are clamped to one.
    ///
    /// Any previous content is discarded. Blocks until every outstanding
    /// mapping is released, so the calling thread must not hold one.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Allocation`] if slot memory cannot be reserved.
    pub fn allocate_instance_array(
        &self,
        desc: ElementDesc,
        instance_count: u32,
        divisor: u32,
    ) -> ChannelResult<()> {
        let usage = Usage::Instance {
            count: instance_count.max(1),
            divisor: divisor.max(1),
        };
        self.reallocate(ChannelLayout::new(desc, usage)?)
    }

    /// Frees both slots. The channel maps as null afterwards.
    ///
    /// Blocks until every outstanding mapping is released. Must not be called
    /// while the calling thread holds a mapping of this channel.
    pub fn deallocate_client_data(&self) {
        let mut layout = self.layout.write();
        // SAFETY: exclusive layout lock, no mapping exists.
        unsafe {
            drop(self.slots[0].replace(SlotMemory::default()));
            drop(self.slots[1].replace(SlotMemory::default()));
        }
        *self.state.lock() = SlotState::default();
        *layout = None;
        debug!(channel = %self.name, "client data deallocated");
    }

    /// Blocks until every outstanding mapping is released. Must not be called
    /// while the calling thread holds a mapping of this channel.
    fn reallocate(&self, layout: ChannelLayout) -> ChannelResult<()> {
        let bytes = layout.byte_size();
        // Allocate before taking the lock so readers are not stalled by it.
        let primary = SlotMemory::zeroed(bytes)?;
        let secondary = if self.config.eager_dual_slot {
            Some(SlotMemory::zeroed(bytes)?)
        } else {
            None
        };
        let slot_count = if secondary.is_some() { 2 } else { 1 };

        let mut current = self.layout.write();
        // SAFETY: exclusive layout lock, no mapping exists and no promotion runs.
        unsafe {
            drop(self.slots[0].replace(primary));
            drop(self.slots[1].replace(secondary.unwrap_or_default()));
        }
        let stamp = {
            let mut state = self.state.lock();
            state.slot_count = slot_count;
            state.last_written = 0;
            self.stamp.fetch_add(1, Ordering::AcqRel) + 1
        };
        *current = Some(layout);

        debug!(
            channel = %self.name,
            bytes,
            rows = layout.rows(),
            slot_count,
            stamp,
            "channel allocated"
        );
        Ok(())
    }

    /// Copies this channel into a new one with the same name, configuration
    /// and layout. Content is copied only if `copy_data` is set; the device
    /// buffer is never shared.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Allocation`] if slot memory cannot be reserved.
    pub fn try_clone(&self, copy_data: bool) -> ChannelResult<Self> {
        let clone = Self::with_config(self.name.clone(), self.config);
        let Some(source) = self.map_raw(MapMode::Read)? else {
            return Ok(clone);
        };
        clone.reallocate(source.layout())?;
        if copy_data {
            if let Some(mut target) = clone.map_raw(MapMode::Write)? {
                target.supply(source.read_bytes())?;
            }
        }
        Ok(clone)
    }

    // =========================================================================
    // ACCESS ORCHESTRATION
    // =========================================================================

    /// Maps the whole channel. Returns `None` if nothing is allocated.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Allocation`] if promotion to two slots fails.
    pub fn map_raw(&self, mode: MapMode) -> ChannelResult<Option<MappedRaw<'_>>> {
        self.request_access(mode, None)
    }

    /// Maps a single element of `element_bytes` bytes at `index`.
    ///
    /// Returns `None` if nothing is allocated.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::IndexOutOfBounds`] if `index` is past the end.
    pub fn map_raw_element(
        &self,
        mode: MapMode,
        index: usize,
        element_bytes: usize,
    ) -> ChannelResult<Option<MappedRaw<'_>>> {
        self.request_access(
            mode,
            Some(ElementWindow {
                index,
                width: element_bytes,
            }),
        )
    }

    pub(crate) fn request_access(
        &self,
        mode: MapMode,
        element: Option<ElementWindow>,
    ) -> ChannelResult<Option<MappedRaw<'_>>> {
        // Recursive: a thread may hold several mappings of one channel even
        // while a reallocation is queued.
        let guard = self.layout.read_recursive();
        let Some(layout) = *guard else {
            return Ok(None);
        };

        let window = match element {
            Some(element) => element.resolve(layout.byte_size())?,
            None => 0..layout.byte_size(),
        };
        let partial = window.len() < layout.byte_size();

        let access = if mode.writes() {
            self.acquire_for_write(&layout, mode.reads() || partial)?
        } else {
            self.acquire_for_read(&layout)?
        };

        Ok(Some(MappedRaw::new(
            self,
            guard,
            layout,
            mode,
            access,
            window,
            element.map(|e| e.index),
        )))
    }

    fn acquire_for_read(&self, layout: &ChannelLayout) -> ChannelResult<SlotAccess> {
        if self.slot_count() == 1 {
            if self.slots[0].lock.try_acquire_read() {
                if self.last_written_slot() == 0 {
                    return Ok(SlotAccess::read(0));
                }
                // Promoted and written since the count was read.
                self.slots[0].lock.release_read();
            } else {
                // Slot 0 is being written: give writers a second slot from now on.
                self.promote(layout)?;
            }
        }

        let source = self.last_written_slot();
        self.slots[source].lock.acquire_read();
        Ok(SlotAccess::read(source))
    }

    /// `seed`: the caller needs the target to hold current content before
    /// mutating it (read-write and single-element writes).
    fn acquire_for_write(&self, layout: &ChannelLayout, seed: bool) -> ChannelResult<SlotAccess> {
        let fast_path = self.slot_count() == 1 && self.slots[0].lock.try_acquire_write();
        let target = if fast_path {
            0
        } else {
            if self.slot_count() == 1 {
                // A reader (or writer) holds slot 0: promote and retarget.
                self.promote(layout)?;
            }
            let target = 1 - self.last_written_slot();
            self.slots[target].lock.acquire_write();
            target
        };

        if !seed {
            return Ok(SlotAccess::write(target, None));
        }

        // Re-read under the held write lock: last_written can only move to a
        // slot by releasing it, so this value is stable while we hold target.
        let source = self.last_written_slot();
        if source == target {
            return Ok(SlotAccess::write(target, None));
        }

        self.slots[source].lock.acquire_read();
        // SAFETY: write lock on target, read lock on source, source != target.
        unsafe {
            self.slots[target]
                .bytes_mut()
                .copy_from_slice(self.slots[source].bytes());
        }
        Ok(SlotAccess::write(target, Some(source)))
    }

    /// Allocates slot 1 as a copy of slot 0.
    ///
    /// Caller holds the layout lock shared, so no reallocation can interleave.
    fn promote(&self, layout: &ChannelLayout) -> ChannelResult<()> {
        let _promotion = self.promotion.lock();
        if self.slot_count() >= 2 {
            return Ok(());
        }

        let bytes = layout.byte_size();
        let mut memory = SlotMemory::zeroed(bytes)?;

        self.slots[0].lock.acquire_read();
        // SAFETY: read lock held on slot 0.
        memory
            .bytes_mut()
            .copy_from_slice(unsafe { self.slots[0].bytes() });

        // Slot 1 is unreachable until slot_count is published; the write lock
        // keeps it that way for anyone racing the publish.
        self.slots[1].lock.acquire_write();
        // SAFETY: slot 1 is write-locked by us and unreachable.
        drop(unsafe { self.slots[1].replace(memory) });
        self.state.lock().slot_count = 2;
        self.slots[1].lock.release_write();
        self.slots[0].lock.release_read();

        debug!(channel = %self.name, bytes, "promoted to dual slot");
        Ok(())
    }

    /// Returns true while a thread is inside [`promote`](Self::promote).
    #[cfg(test)]
    pub(super) fn is_promoting(&self) -> bool {
        self.promotion.is_locked()
    }

    /// Releases the locks of a mapping.
    ///
    /// A write that supplied data is published (last-written index and stamp)
    /// before its lock is released, and before any seeding read lock is
    /// released, so the next writer of the source slot sees this write.
    pub(crate) fn release(&self, access: SlotAccess, supplied: bool) {
        if let Some(target) = access.write_lock {
            if supplied {
                let stamp = {
                    let mut state = self.state.lock();
                    state.last_written = target;
                    self.stamp.fetch_add(1, Ordering::AcqRel) + 1
                };
                trace!(channel = %self.name, slot = target, stamp, "write published");
            }
            self.slots[target].lock.release_write();
        }
        if let Some(source) = access.read_lock {
            self.slots[source].lock.release_read();
        }
    }

    /// Shared view of a slot.
    ///
    /// # Safety
    ///
    /// The caller holds a read or write lock on `index` while the slice lives.
    #[inline]
    pub(super) unsafe fn slot_bytes(&self, index: usize) -> &[u8] {
        self.slots[index].bytes()
    }

    /// Exclusive view of a slot.
    ///
    /// # Safety
    ///
    /// The caller holds the write lock on `index` and no other slice into it
    /// is alive while the returned slice lives.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(super) unsafe fn slot_bytes_mut(&self, index: usize) -> &mut [u8] {
        self.slots[index].bytes_mut()
    }

    // =========================================================================
    // COPY-IN HELPERS
    // =========================================================================

    /// Replaces the whole content. Returns whether the stamp advanced.
    ///
    /// Returns `Ok(false)` without writing if the channel is unallocated, or if
    /// [`ChannelConfig::skip_unchanged_writes`] is set and `bytes` equal the
    /// current content.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::SizeMismatch`] if `bytes` is not the slot size.
    pub fn write_all(&self, bytes: &[u8]) -> ChannelResult<bool> {
        let mode = if self.config.skip_unchanged_writes {
            MapMode::ReadWrite
        } else {
            MapMode::Write
        };
        match self.map_raw(mode)? {
            Some(handle) => self.copy_in(handle, bytes),
            None => Ok(false),
        }
    }

    /// Overwrites the element at `index`, measured in units of `bytes.len()`,
    /// leaving every other element untouched. Returns whether the stamp advanced.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::IndexOutOfBounds`] if `index` is past the end.
    pub fn write_single_element(&self, index: usize, bytes: &[u8]) -> ChannelResult<bool> {
        let mode = if self.config.skip_unchanged_writes {
            MapMode::ReadWrite
        } else {
            MapMode::Write
        };
        match self.map_raw_element(mode, index, bytes.len())? {
            Some(handle) => self.copy_in(handle, bytes),
            None => Ok(false),
        }
    }

    fn copy_in(&self, mut handle: MappedRaw<'_>, bytes: &[u8]) -> ChannelResult<bool> {
        if self.config.skip_unchanged_writes && handle.read_bytes() == bytes {
            handle.discard();
            return Ok(false);
        }
        handle.supply(bytes)?;
        Ok(true)
    }
}

impl std::fmt::Debug for BufferChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.lock();
        f.debug_struct("BufferChannel")
            .field("name", &self.name)
            .field("layout", &self.layout())
            .field("slot_count", &state.slot_count)
            .field("last_written", &state.last_written)
            .field("stamp", &self.stamp())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ScalarType;

    fn vec3_channel(count: u32) -> BufferChannel {
        let channel = BufferChannel::new("test");
        channel.allocate_vertex_array(ElementDesc::vec3f(), count).unwrap();
        channel
    }

    #[test]
    fn test_channel_creation() {
        let channel = BufferChannel::new("empty");
        assert_eq!(channel.stamp(), 0);
        assert_eq!(channel.slot_count(), 0);
        assert!(!channel.is_backed_by_client_memory());
        assert!(!channel.has_data());
        assert!(channel.layout().is_none());
        assert!(channel.map_raw(MapMode::Read).unwrap().is_none());
    }

    #[test]
    fn test_allocation_resets_and_stamps() {
        let channel = vec3_channel(4);
        assert_eq!(channel.slot_count(), 1);
        assert_eq!(channel.stamp(), 1);
        assert_eq!(channel.layout().unwrap().byte_size(), 48);

        channel.write_all(&[1u8; 48]).unwrap();
        assert_eq!(channel.stamp(), 2);

        // Usage change: last call wins, content reset.
        channel
            .allocate_instance_array(ElementDesc::new(ScalarType::U32, 1), 6, 2)
            .unwrap();
        assert_eq!(channel.stamp(), 3);
        let layout = channel.layout().unwrap();
        assert_eq!(layout.rows(), 3);
        assert_eq!(layout.byte_size(), 12);
        let raw = channel.map_raw(MapMode::Read).unwrap().unwrap();
        assert!(raw.read_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_instance_divisor_clamped() {
        let channel = BufferChannel::new("inst");
        channel.allocate_instance_array(ElementDesc::f32(), 0, 0).unwrap();
        assert_eq!(
            channel.layout().unwrap().usage,
            Usage::Instance { count: 1, divisor: 1 }
        );
    }

    #[test]
    fn test_eager_dual_slot() {
        let config = ChannelConfig {
            eager_dual_slot: true,
            ..ChannelConfig::default()
        };
        let channel = BufferChannel::with_config("eager", config);
        channel.allocate_uniform(ElementDesc::vec4f()).unwrap();
        assert_eq!(channel.slot_count(), 2);
        assert_eq!(channel.last_written_slot(), 0);
    }

    #[test]
    fn test_read_never_stamps() {
        let channel = vec3_channel(2);
        let before = channel.stamp();
        for _ in 0..10 {
            let raw = channel.map_raw(MapMode::Read).unwrap().unwrap();
            assert_eq!(raw.read_bytes().len(), 24);
        }
        assert_eq!(channel.stamp(), before);
    }

    #[test]
    fn test_unsupplied_write_does_not_stamp() {
        let channel = vec3_channel(2);
        let before = channel.stamp();
        {
            let raw = channel.map_raw(MapMode::Write).unwrap().unwrap();
            assert_eq!(raw.write_slot(), Some(0));
        }
        assert_eq!(channel.stamp(), before);

        {
            let mut raw = channel.map_raw(MapMode::Write).unwrap().unwrap();
            raw.supply(&[3u8; 24]).unwrap();
            raw.discard();
        }
        assert_eq!(channel.stamp(), before);
    }

    #[test]
    fn test_single_slot_fast_path_aliases() {
        let channel = vec3_channel(2);
        let raw = channel.map_raw(MapMode::ReadWrite).unwrap().unwrap();
        assert_eq!(raw.read_slot(), 0);
        assert_eq!(raw.write_slot(), Some(0));
        drop(raw);
        assert_eq!(channel.slot_count(), 1);
    }

    #[test]
    fn test_write_during_read_promotes() {
        let channel = vec3_channel(2);
        channel.write_all(&[5u8; 24]).unwrap();

        let reader = channel.map_raw(MapMode::Read).unwrap().unwrap();
        assert_eq!(reader.read_slot(), 0);

        {
            let mut writer = channel.map_raw(MapMode::Write).unwrap().unwrap();
            assert_eq!(channel.slot_count(), 2);
            assert_eq!(writer.write_slot(), Some(1));
            // Promotion copied the current content.
            assert_eq!(writer.read_bytes(), &[5u8; 24]);
            writer.supply(&[9u8; 24]).unwrap();
        }

        // The in-flight read still sees the data it was granted.
        assert_eq!(reader.read_bytes(), &[5u8; 24]);
        drop(reader);

        assert_eq!(channel.last_written_slot(), 1);
        let after = channel.map_raw(MapMode::Read).unwrap().unwrap();
        assert_eq!(after.read_slot(), 1);
        assert_eq!(after.read_bytes(), &[9u8; 24]);
    }

    #[test]
    fn test_read_during_write_promotes() {
        let channel = vec3_channel(2);
        channel.write_all(&[5u8; 24]).unwrap();
        let before = channel.stamp();

        let mut writer = channel.map_raw(MapMode::Write).unwrap().unwrap();
        assert_eq!(writer.write_slot(), Some(0));

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                let raw = channel.map_raw(MapMode::Read).unwrap().unwrap();
                (raw.read_slot(), raw.read_bytes().to_vec())
            });
            while !channel.is_promoting() {
                std::thread::yield_now();
            }
            // The reader is parked in promotion until the write lands.
            assert_eq!(channel.slot_count(), 1);
            writer.write_bytes().unwrap()[..12].fill(9);
            writer.write_bytes().unwrap()[12..].fill(9);
            drop(writer);

            let (slot, bytes) = reader.join().unwrap();
            assert_eq!(slot, 0);
            assert_eq!(bytes, vec![9u8; 24]);
        });

        assert_eq!(channel.slot_count(), 2);
        assert_eq!(channel.stamp(), before + 1);
        // Promotion copied the published content into the second slot.
        let next = channel.map_raw(MapMode::Write).unwrap().unwrap();
        assert_eq!(next.write_slot(), Some(1));
        assert_eq!(next.read_bytes(), &[9u8; 24]);
        next.discard();
    }

    #[test]
    fn test_writes_alternate_between_slots() {
        let config = ChannelConfig {
            eager_dual_slot: true,
            ..ChannelConfig::default()
        };
        let channel = BufferChannel::with_config("flip", config);
        channel.allocate_uniform(ElementDesc::f32()).unwrap();

        for expected in [1, 0, 1, 0] {
            let mut raw = channel.map_raw(MapMode::Write).unwrap().unwrap();
            assert_eq!(raw.write_slot(), Some(expected));
            raw.supply(&[expected as u8; 4]).unwrap();
            drop(raw);
            assert_eq!(channel.last_written_slot(), expected);
        }
    }

    #[test]
    fn test_partial_write_seeds_target() {
        let config = ChannelConfig {
            eager_dual_slot: true,
            ..ChannelConfig::default()
        };
        let channel = BufferChannel::with_config("seed", config);
        channel.allocate_vertex_array(ElementDesc::u32(), 4).unwrap();
        channel.write_all(bytemuck::cast_slice(&[1u32, 2, 3, 4])).unwrap();
        assert_eq!(channel.last_written_slot(), 1);

        channel.write_single_element(2, &30u32.to_ne_bytes()).unwrap();
        assert_eq!(channel.last_written_slot(), 0);

        let raw = channel.map_raw(MapMode::Read).unwrap().unwrap();
        let values: &[u32] = bytemuck::cast_slice(raw.read_bytes());
        assert_eq!(values, &[1, 2, 30, 4]);
    }

    #[test]
    fn test_element_out_of_bounds() {
        let channel = vec3_channel(2);
        let err = channel.write_single_element(2, &[0u8; 12]).unwrap_err();
        assert_eq!(err, ChannelError::IndexOutOfBounds { index: 2, len: 2 });

        let err = channel.map_raw_element(MapMode::Read, 0, 0).unwrap_err();
        assert!(matches!(err, ChannelError::SizeMismatch { actual: 0, .. }));
    }

    #[test]
    fn test_write_all_size_mismatch() {
        let channel = vec3_channel(2);
        let before = channel.stamp();
        let err = channel.write_all(&[0u8; 10]).unwrap_err();
        assert_eq!(err, ChannelError::SizeMismatch { expected: 24, actual: 10 });
        assert_eq!(channel.stamp(), before);
    }

    #[test]
    fn test_skip_unchanged_writes() {
        let config = ChannelConfig {
            skip_unchanged_writes: true,
            ..ChannelConfig::default()
        };
        let channel = BufferChannel::with_config("strict", config);
        channel.allocate_uniform(ElementDesc::vec4f()).unwrap();
        let before = channel.stamp();

        assert!(channel.write_all(&[1u8; 16]).unwrap());
        assert!(!channel.write_all(&[1u8; 16]).unwrap());
        assert!(!channel.write_single_element(0, &[1u8; 16]).unwrap());
        assert_eq!(channel.stamp(), before + 1);
    }

    #[test]
    fn test_shipped_policy_stamps_identical_writes() {
        let channel = BufferChannel::new("shipped");
        channel.allocate_uniform(ElementDesc::vec4f()).unwrap();
        let before = channel.stamp();

        assert!(channel.write_all(&[1u8; 16]).unwrap());
        assert!(channel.write_all(&[1u8; 16]).unwrap());
        assert_eq!(channel.stamp(), before + 2);
    }

    #[test]
    fn test_next_stamp() {
        let channel = BufferChannel::new("manual");
        assert_eq!(channel.next_stamp(), 1);
        assert_eq!(channel.stamp(), 1);
    }

    #[test]
    fn test_deallocate() {
        let channel = vec3_channel(2);
        channel.deallocate_client_data();
        assert_eq!(channel.slot_count(), 0);
        assert!(channel.layout().is_none());
        assert!(channel.map_raw(MapMode::Write).unwrap().is_none());
        assert!(!channel.write_all(&[0u8; 24]).unwrap());
    }

    #[test]
    fn test_try_clone() {
        let channel = vec3_channel(2);
        channel.write_all(&[4u8; 24]).unwrap();

        let copy = channel.try_clone(true).unwrap();
        assert_eq!(copy.name(), "test");
        assert_eq!(copy.layout(), channel.layout());
        let raw = copy.map_raw(MapMode::Read).unwrap().unwrap();
        assert_eq!(raw.read_bytes(), &[4u8; 24]);

        let empty = channel.try_clone(false).unwrap();
        let raw = empty.map_raw(MapMode::Read).unwrap().unwrap();
        assert!(raw.read_bytes().iter().all(|&b| b == 0));

        let unallocated = BufferChannel::new("none").try_clone(true).unwrap();
        assert!(unallocated.layout().is_none());
    }
}
