//! Keeps an attached device buffer in step with the channel's CPU copy.
//!
//! Staleness is decided by stamp alone: the stamp is read before the CPU copy
//! is mapped, so a write landing in between is uploaded now and again on the
//! next call, never skipped.

use tracing::debug;

use super::buffer_channel::BufferChannel;
use super::mapping::MapMode;
use crate::device::{DeviceBuffer, DeviceLayout};
use crate::error::{ChannelError, ChannelResult};
use crate::layout::ChannelLayout;

/// Device-side bookkeeping of one channel.
#[derive(Default)]
pub(crate) struct DeviceState {
    buffer: Option<Box<dyn DeviceBuffer>>,
    layout: DeviceLayout,
    uploaded_stamp: Option<u64>,
}

fn upload_rows(
    buffer: &mut dyn DeviceBuffer,
    device: DeviceLayout,
    layout: &ChannelLayout,
    first_row: usize,
    bytes: &[u8],
) -> ChannelResult<()> {
    let element_size = layout.element_size();
    if element_size == 0 || bytes.is_empty() {
        return Ok(());
    }
    if device.is_contiguous(element_size) {
        return buffer.write(device.row_offset(first_row, element_size)?, bytes);
    }
    for (row, chunk) in bytes.chunks(element_size).enumerate() {
        buffer.write(device.row_offset(first_row + row, element_size)?, chunk)?;
    }
    Ok(())
}

fn download_rows(
    buffer: &mut dyn DeviceBuffer,
    device: DeviceLayout,
    layout: &ChannelLayout,
    bytes: &mut [u8],
) -> ChannelResult<()> {
    let element_size = layout.element_size();
    if element_size == 0 || bytes.is_empty() {
        return Ok(());
    }
    if device.is_contiguous(element_size) {
        return buffer.read(device.offset, bytes);
    }
    for (row, chunk) in bytes.chunks_mut(element_size).enumerate() {
        buffer.read(device.row_offset(row, element_size)?, chunk)?;
    }
    Ok(())
}

// Lock order is slot, then device. The device mutex is never held while
// waiting on a slot lock, so queries stay non-blocking for mapping holders.
impl BufferChannel {
    /// Attaches a device buffer, returning the previous one.
    ///
    /// The new buffer is considered stale until the next upload.
    pub fn attach_device_buffer(
        &self,
        buffer: impl DeviceBuffer + 'static,
        layout: DeviceLayout,
    ) -> Option<Box<dyn DeviceBuffer>> {
        let mut device = self.device.lock();
        device.layout = layout;
        device.uploaded_stamp = None;
        debug!(channel = %self.name(), size = buffer.size(), ?layout, "device buffer attached");
        device.buffer.replace(Box::new(buffer))
    }

    /// Detaches the device buffer, if any.
    pub fn detach_device_buffer(&self) -> Option<Box<dyn DeviceBuffer>> {
        let mut device = self.device.lock();
        device.uploaded_stamp = None;
        device.buffer.take()
    }

    /// Returns true if a device buffer is attached.
    #[must_use]
    pub fn is_backed_by_device_buffer(&self) -> bool {
        self.device.lock().buffer.is_some()
    }

    /// Stamp of the content last uploaded, `None` if never uploaded since the
    /// buffer was attached.
    #[must_use]
    pub fn uploaded_stamp(&self) -> Option<u64> {
        self.device.lock().uploaded_stamp
    }

    /// Uploads the CPU copy if the stamp moved since the last upload.
    ///
    /// Returns whether a transfer happened. Without CPU data or without an
    /// attached device buffer this is a no-op returning `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Device`](crate::ChannelError::Device) if the
    /// device buffer rejects the transfer; the channel stays stale.
    pub fn upload_if_stale(&self) -> ChannelResult<bool> {
        let stamp = self.stamp();
        {
            let device = self.device.lock();
            if device.buffer.is_none() || device.uploaded_stamp == Some(stamp) {
                return Ok(false);
            }
        }
        let Some(raw) = self.map_raw(MapMode::Read)? else {
            return Ok(false);
        };

        let mut guard = self.device.lock();
        let device = &mut *guard;
        // Re-checked: detached or uploaded by another thread meanwhile.
        let Some(buffer) = device.buffer.as_deref_mut() else {
            return Ok(false);
        };
        if device.uploaded_stamp == Some(stamp) {
            return Ok(false);
        }

        let layout = raw.layout();
        upload_rows(buffer, device.layout, &layout, 0, raw.read_bytes())?;
        device.uploaded_stamp = Some(stamp);

        debug!(
            channel = %self.name(),
            stamp,
            bytes = raw.len(),
            contiguous = device.layout.is_contiguous(layout.element_size()),
            "uploaded to device"
        );
        Ok(true)
    }

    /// Uploads row `index` regardless of the stamp.
    ///
    /// Returns whether a transfer happened. Does not mark the channel as
    /// uploaded.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::IndexOutOfBounds`](crate::ChannelError::IndexOutOfBounds)
    /// if `index` is not a row, or a device error.
    pub fn upload_single_index(&self, index: usize) -> ChannelResult<bool> {
        if !self.is_backed_by_device_buffer() {
            return Ok(false);
        }
        let Some(layout) = self.layout() else {
            return Ok(false);
        };
        let Some(raw) = self.map_raw_element(MapMode::Read, index, layout.element_size())? else {
            return Ok(false);
        };

        let mut guard = self.device.lock();
        let device = &mut *guard;
        let Some(buffer) = device.buffer.as_deref_mut() else {
            return Ok(false);
        };
        upload_rows(buffer, device.layout, &raw.layout(), index, raw.read_bytes())?;
        debug!(channel = %self.name(), index, "uploaded row to device");
        Ok(true)
    }

    /// Replaces the CPU copy with the device buffer content.
    ///
    /// The device is read into a scratch copy first and the channel is written
    /// in one step, so a failed transfer leaves the CPU copy untouched.
    ///
    /// Counts as a data-changing write: the stamp advances. The uploaded stamp
    /// is left alone, so the next [`upload_if_stale`](Self::upload_if_stale)
    /// pushes the same bytes back once.
    ///
    /// # Errors
    ///
    /// Returns a device error, or [`ChannelError::Device`] if the channel was
    /// reallocated during the transfer; the channel is then unchanged.
    pub fn download_from_device(&self) -> ChannelResult<bool> {
        let Some(layout) = self.layout() else {
            return Ok(false);
        };
        let mut scratch = vec![0u8; layout.byte_size()];
        {
            let mut guard = self.device.lock();
            let device = &mut *guard;
            let Some(buffer) = device.buffer.as_deref_mut() else {
                return Ok(false);
            };
            download_rows(buffer, device.layout, &layout, &mut scratch)?;
        }

        let Some(mut raw) = self.map_raw(MapMode::Write)? else {
            return Ok(false);
        };
        if raw.layout() != layout {
            raw.discard();
            return Err(ChannelError::Device(format!(
                "{}: reallocated during download",
                self.name()
            )));
        }
        raw.supply(&scratch)?;
        raw.unmap();

        debug!(channel = %self.name(), stamp = self.stamp(), "downloaded from device");
        Ok(true)
    }
}
