//! Slot memory and its lock.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;

use crate::error::{ChannelError, ChannelResult};
use crate::sync::SlotLock;

/// Word type backing slot memory. Keeps every slot 8-byte aligned so any
/// `Pod` element type up to `f64` alignment can be viewed in place.
type Word = u64;

const WORD_BYTES: usize = std::mem::size_of::<Word>();

/// Zero-initialized, word-aligned byte buffer.
#[derive(Default)]
pub(crate) struct SlotMemory {
    words: Vec<Word>,
    len: usize,
}

impl SlotMemory {
    /// Allocates `len` zeroed bytes, reporting allocation failure instead of aborting.
    pub(crate) fn zeroed(len: usize) -> ChannelResult<Self> {
        let word_count = len.div_ceil(WORD_BYTES);
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| ChannelError::Allocation { bytes: len })?;
        words.resize(word_count, 0);
        Ok(Self { words, len })
    }

    #[inline]
    pub(crate) fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    #[inline]
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }
}

/// One of the two buffers of a channel.
///
/// Memory is reachable only through the unsafe accessors below; every caller
/// must hold the matching [`SlotLock`] side (or the channel's exclusive layout
/// lock, which rules out any mapping).
pub(crate) struct Slot {
    pub(crate) lock: SlotLock,
    memory: UnsafeCell<SlotMemory>,
}

impl Slot {
    pub(crate) fn new() -> Self {
        Self {
            lock: SlotLock::new(),
            memory: UnsafeCell::new(SlotMemory::default()),
        }
    }

    /// Shared view of the slot bytes.
    ///
    /// # Safety
    ///
    /// The caller holds a read or write lock on this slot for as long as the
    /// returned slice lives.
    #[inline]
    pub(crate) unsafe fn bytes(&self) -> &[u8] {
        (*self.memory.get()).bytes()
    }

    /// Exclusive view of the slot bytes.
    ///
    /// # Safety
    ///
    /// The caller holds the write lock on this slot and no other slice into
    /// this slot is alive while the returned slice lives.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn bytes_mut(&self) -> &mut [u8] {
        (*self.memory.get()).bytes_mut()
    }

    /// Swaps in new memory, returning the old buffer.
    ///
    /// # Safety
    ///
    /// No slice into this slot may exist: either the channel layout lock is held
    /// exclusively or the slot is unreachable and write-locked by the caller.
    pub(crate) unsafe fn replace(&self, memory: SlotMemory) -> SlotMemory {
        std::mem::replace(&mut *self.memory.get(), memory)
    }
}
