//! # wgpu Device Buffer
//!
//! `wgpu` requires copy offsets and sizes to be multiples of
//! [`wgpu::COPY_BUFFER_ALIGNMENT`]. Uploads must respect that directly; reads
//! widen to the enclosing aligned window and copy out the requested bytes.

use std::ops::Range;
use std::sync::Arc;

use tandem_core::{ChannelError, ChannelLayout, ChannelResult, DeviceBuffer};
use tracing::{debug, trace};

const ALIGN: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

/// Rounds `len` up to the copy alignment.
#[inline]
fn align_up(len: u64) -> u64 {
    len.div_ceil(ALIGN) * ALIGN
}

/// Smallest aligned window covering `offset..offset + len`.
fn aligned_window(offset: u64, len: u64) -> Range<u64> {
    let start = offset - offset % ALIGN;
    let end = align_up(offset + len);
    start..end
}

fn is_aligned(offset: u64, len: u64) -> bool {
    offset % ALIGN == 0 && len % ALIGN == 0
}

/// GPU buffer a channel uploads into.
///
/// The buffer is created with `COPY_DST | COPY_SRC` in addition to the
/// requested usage so it can be both written by the queue and read back.
pub struct WgpuDeviceBuffer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffer: wgpu::Buffer,
    size: usize,
    label: String,
}

impl WgpuDeviceBuffer {
    /// Creates a zero-initialized buffer of `size` bytes (padded to the copy
    /// alignment on the device).
    #[must_use]
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        label: &str,
        size: usize,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: align_up(size as u64),
            usage: usage | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        debug!(label, size, ?usage, "wgpu device buffer created");
        Self {
            device,
            queue,
            buffer,
            size,
            label: label.to_owned(),
        }
    }

    /// Creates a buffer sized for a packed upload of `layout`, using
    /// vertex usage for vertex attributes and uniform usage otherwise.
    #[must_use]
    pub fn for_channel(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        label: &str,
        layout: &ChannelLayout,
    ) -> Self {
        let usage = if layout.usage.is_vertex_attribute() {
            wgpu::BufferUsages::VERTEX
        } else {
            wgpu::BufferUsages::UNIFORM
        };
        Self::new(device, queue, label, layout.byte_size(), usage)
    }

    /// The underlying buffer, for binding in render passes.
    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    fn check_range(&self, offset: usize, len: usize) -> ChannelResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(ChannelError::Device(format!(
                "{}: transfer of {len} bytes at offset {offset} exceeds buffer of {} bytes",
                self.label, self.size
            ))),
        }
    }

    /// Copies `window` of the buffer into a fresh staging buffer and maps it.
    fn read_back(&self, window: Range<u64>) -> ChannelResult<Vec<u8>> {
        let size = window.end - window.start;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tandem read-back staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tandem read-back"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, window.start, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| ChannelError::Device(format!("{}: map callback dropped", self.label)))?
            .map_err(|err| ChannelError::Device(format!("{}: {err}", self.label)))?;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }
}

impl DeviceBuffer for WgpuDeviceBuffer {
    fn size(&self) -> usize {
        self.size
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> ChannelResult<()> {
        self.check_range(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        if !is_aligned(offset as u64, data.len() as u64) {
            return Err(ChannelError::Device(format!(
                "{}: upload of {} bytes at offset {offset} is not {ALIGN}-byte aligned",
                self.label,
                data.len()
            )));
        }
        self.queue.write_buffer(&self.buffer, offset as u64, data);
        trace!(label = %self.label, offset, bytes = data.len(), "queued upload");
        Ok(())
    }

    fn read(&mut self, offset: usize, out: &mut [u8]) -> ChannelResult<()> {
        self.check_range(offset, out.len())?;
        if out.is_empty() {
            return Ok(());
        }
        let window = aligned_window(offset as u64, out.len() as u64);
        let skip = offset - window.start as usize;
        let bytes = self.read_back(window)?;
        out.copy_from_slice(&bytes[skip..skip + out.len()]);
        trace!(label = %self.label, offset, bytes = out.len(), "read back");
        Ok(())
    }
}

impl std::fmt::Debug for WgpuDeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDeviceBuffer")
            .field("label", &self.label)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
