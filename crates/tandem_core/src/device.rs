//! # Device Buffers
//!
//! The seam between a channel's CPU copy and whatever holds the device copy.
//! A channel pushes bytes through [`DeviceBuffer::write`] when its stamp moved
//! and pulls them back with [`DeviceBuffer::read`].
//!
//! [`HostBuffer`] is the in-process implementation: plain host memory behind a
//! shared handle, with transfer counters so callers can see exactly what was
//! moved. GPU backends live in their own crates.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ChannelError, ChannelResult};

/// Device-side storage a channel can upload to and download from.
pub trait DeviceBuffer: Send {
    /// Size of the device buffer in bytes.
    fn size(&self) -> usize;

    /// Copies `data` to the device buffer at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Device`] if the transfer is rejected.
    fn write(&mut self, offset: usize, data: &[u8]) -> ChannelResult<()>;

    /// Copies `out.len()` bytes at `offset` from the device buffer into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Device`] if the transfer is rejected.
    fn read(&mut self, offset: usize, out: &mut [u8]) -> ChannelResult<()>;
}

/// Placement of a channel's rows inside a device buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DeviceLayout {
    /// Byte offset of the first row.
    pub offset: usize,
    /// Distance between rows in bytes. 0 means rows are packed.
    pub stride: usize,
}

impl DeviceLayout {
    /// Rows packed back to back starting at `offset`.
    #[must_use]
    pub const fn packed(offset: usize) -> Self {
        Self { offset, stride: 0 }
    }

    /// Rows `stride` bytes apart starting at `offset` (interleaved buffers).
    #[must_use]
    pub const fn strided(offset: usize, stride: usize) -> Self {
        Self { offset, stride }
    }

    /// Returns true if rows of `element_size` bytes land contiguously.
    #[inline]
    #[must_use]
    pub const fn is_contiguous(&self, element_size: usize) -> bool {
        self.stride == 0 || self.stride == element_size
    }

    /// Device byte offset of `row`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Device`] if the offset does not fit in `usize`.
    #[inline]
    pub fn row_offset(&self, row: usize, element_size: usize) -> ChannelResult<usize> {
        let stride = if self.stride == 0 { element_size } else { self.stride };
        row.checked_mul(stride)
            .and_then(|rel| rel.checked_add(self.offset))
            .ok_or_else(|| {
                ChannelError::Device(format!(
                    "row {row} at stride {stride} from offset {} overflows the address space",
                    self.offset
                ))
            })
    }
}

/// Counters of the transfers a [`HostBuffer`] has served.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Number of `write` calls.
    pub writes: u64,
    /// Number of `read` calls.
    pub reads: u64,
    /// Total bytes written.
    pub bytes_written: u64,
    /// Total bytes read.
    pub bytes_read: u64,
}

#[derive(Debug, Default)]
struct HostStorage {
    bytes: Vec<u8>,
    stats: TransferStats,
}

/// Host-memory [`DeviceBuffer`].
///
/// Cloning yields another handle to the same storage, so a test or tool can
/// keep one handle while the channel owns the other.
#[derive(Clone, Debug, Default)]
pub struct HostBuffer {
    storage: Arc<Mutex<HostStorage>>,
}

impl HostBuffer {
    /// Creates a zero-filled buffer of `size` bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            storage: Arc::new(Mutex::new(HostStorage {
                bytes: vec![0; size],
                stats: TransferStats::default(),
            })),
        }
    }

    /// Snapshot of the buffer content.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.storage.lock().bytes.clone()
    }

    /// Snapshot of the transfer counters.
    #[must_use]
    pub fn stats(&self) -> TransferStats {
        self.storage.lock().stats
    }

    /// Overwrites the buffer from the device side, without counting a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::SizeMismatch`] if `data` is not the buffer size.
    pub fn fill_from(&self, data: &[u8]) -> ChannelResult<()> {
        let mut storage = self.storage.lock();
        if storage.bytes.len() != data.len() {
            return Err(ChannelError::SizeMismatch {
                expected: storage.bytes.len(),
                actual: data.len(),
            });
        }
        storage.bytes.copy_from_slice(data);
        Ok(())
    }
}

fn checked_range(offset: usize, len: usize, size: usize) -> ChannelResult<std::ops::Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset..end),
        _ => Err(ChannelError::Device(format!(
            "transfer of {len} bytes at offset {offset} exceeds buffer of {size} bytes"
        ))),
    }
}

impl DeviceBuffer for HostBuffer {
    fn size(&self) -> usize {
        self.storage.lock().bytes.len()
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> ChannelResult<()> {
        let mut storage = self.storage.lock();
        let range = checked_range(offset, data.len(), storage.bytes.len())?;
        storage.bytes[range].copy_from_slice(data);
        storage.stats.writes += 1;
        storage.stats.bytes_written += data.len() as u64;
        Ok(())
    }

    fn read(&mut self, offset: usize, out: &mut [u8]) -> ChannelResult<()> {
        let mut storage = self.storage.lock();
        let range = checked_range(offset, out.len(), storage.bytes.len())?;
        out.copy_from_slice(&storage.bytes[range]);
        storage.stats.reads += 1;
        storage.stats.bytes_read += out.len() as u64;
        Ok(())
    }
}
