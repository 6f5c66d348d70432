//! Device buffer implementations.

mod wgpu_buffer;

pub use wgpu_buffer::WgpuDeviceBuffer;
