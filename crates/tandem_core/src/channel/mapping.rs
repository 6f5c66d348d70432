//! Raw mapping handles.

#![allow(unsafe_code)]

use std::ops::Range;

use parking_lot::RwLockReadGuard;

use super::buffer_channel::BufferChannel;
use crate::error::{ChannelError, ChannelResult};
use crate::layout::ChannelLayout;

/// How a mapping intends to touch the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Shared access to the last-written slot.
    Read,
    /// Exclusive access to a slot whose prior content is unspecified.
    Write,
    /// Exclusive access to a slot seeded with the current content.
    ReadWrite,
}

impl MapMode {
    /// Returns true if the mapping observes current content.
    #[inline]
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Returns true if the mapping may publish new content.
    #[inline]
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Slot locks held by one mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SlotAccess {
    /// Slot held with a read lock (pure reads, or the seed source of a write).
    pub(crate) read_lock: Option<usize>,
    /// Slot held with the write lock.
    pub(crate) write_lock: Option<usize>,
}

impl SlotAccess {
    pub(crate) const fn read(slot: usize) -> Self {
        Self {
            read_lock: Some(slot),
            write_lock: None,
        }
    }

    pub(crate) const fn write(target: usize, seed_source: Option<usize>) -> Self {
        Self {
            read_lock: seed_source,
            write_lock: Some(target),
        }
    }

    /// Slot the mapping's bytes come from.
    ///
    /// A write mapping reads back its own target: it was either seeded with the
    /// current content or holds the only slot.
    #[inline]
    const fn view_slot(self) -> usize {
        match (self.write_lock, self.read_lock) {
            (Some(slot), _) | (None, Some(slot)) => slot,
            (None, None) => 0,
        }
    }
}

/// Scoped access to a channel's bytes.
///
/// Holds the slot locks it was granted until it is dropped, unmapped or
/// discarded. Dropping a write mapping that supplied data publishes it: the
/// slot becomes last-written and the stamp advances by one.
///
/// A mapping must not outlive the thread-local scope it was created in and
/// must not be held across a reallocation of its own channel.
pub struct MappedRaw<'a> {
    channel: &'a BufferChannel,
    _layout_guard: RwLockReadGuard<'a, Option<ChannelLayout>>,
    layout: ChannelLayout,
    mode: MapMode,
    access: SlotAccess,
    window: Range<usize>,
    index: Option<usize>,
    supplied: bool,
    released: bool,
}

impl<'a> MappedRaw<'a> {
    pub(crate) fn new(
        channel: &'a BufferChannel,
        layout_guard: RwLockReadGuard<'a, Option<ChannelLayout>>,
        layout: ChannelLayout,
        mode: MapMode,
        access: SlotAccess,
        window: Range<usize>,
        index: Option<usize>,
    ) -> Self {
        Self {
            channel,
            _layout_guard: layout_guard,
            layout,
            mode,
            access,
            window,
            index,
            supplied: false,
            released: false,
        }
    }

    /// Channel this mapping belongs to.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &'a BufferChannel {
        self.channel
    }

    /// Layout at mapping time. Stable for the mapping's lifetime.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Mode the mapping was requested with.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> MapMode {
        self.mode
    }

    /// Element index for single-element mappings.
    #[inline]
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Byte length of the mapped window.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Returns true if the window holds no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Slot the mapping reads from.
    #[inline]
    #[must_use]
    pub fn read_slot(&self) -> usize {
        self.access.view_slot()
    }

    /// Slot the mapping writes to, `None` for read mappings.
    #[inline]
    #[must_use]
    pub fn write_slot(&self) -> Option<usize> {
        self.access.write_lock
    }

    /// Returns true once data was written through this mapping.
    #[inline]
    #[must_use]
    pub fn is_supplied(&self) -> bool {
        self.supplied
    }

    /// Bytes of the mapped window.
    ///
    /// For write mappings this is the target slot: current content when seeded
    /// or single-slot, unspecified otherwise.
    #[must_use]
    pub fn read_bytes(&self) -> &[u8] {
        // SAFETY: the slot returned by view_slot is locked by this mapping
        // (read or write) until release; `&self` excludes `write_bytes`.
        let bytes = unsafe { self.channel.slot_bytes(self.access.view_slot()) };
        &bytes[self.window.clone()]
    }

    /// Mutable bytes of the mapped window. Marks the mapping as supplied.
    ///
    /// Returns `None` for read mappings.
    pub fn write_bytes(&mut self) -> Option<&mut [u8]> {
        let target = self.access.write_lock?;
        self.supplied = true;
        // SAFETY: write lock held on `target`; `&mut self` guarantees no other
        // slice from this mapping is alive. The seed source is a different slot.
        let bytes = unsafe { self.channel.slot_bytes_mut(target) };
        Some(&mut bytes[self.window.clone()])
    }

    /// Copies `bytes` into the mapped window.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ReadOnly`] for read mappings and
    /// [`ChannelError::SizeMismatch`] if `bytes` does not fill the window.
    pub fn supply(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        if !self.mode.writes() {
            return Err(ChannelError::ReadOnly);
        }
        if bytes.len() != self.window.len() {
            return Err(ChannelError::SizeMismatch {
                expected: self.window.len(),
                actual: bytes.len(),
            });
        }
        if let Some(target) = self.write_bytes() {
            target.copy_from_slice(bytes);
        }
        Ok(())
    }

    /// Releases the mapping, publishing supplied data.
    pub fn unmap(mut self) {
        self.release(self.supplied);
    }

    /// Releases the mapping without publishing, even if data was supplied.
    ///
    /// The stamp does not advance and the last-written slot does not move. On a
    /// single-slot channel the target is the current slot, so bytes already
    /// written stay visible.
    pub fn discard(mut self) {
        self.release(false);
    }

    fn release(&mut self, publish: bool) {
        if !self.released {
            self.released = true;
            self.channel.release(self.access, publish);
        }
    }
}

impl Drop for MappedRaw<'_> {
    fn drop(&mut self) {
        self.release(self.supplied);
    }
}

impl std::fmt::Debug for MappedRaw<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRaw")
            .field("channel", &self.channel.name())
            .field("mode", &self.mode)
            .field("access", &self.access)
            .field("window", &self.window)
            .field("supplied", &self.supplied)
            .finish()
    }
}
