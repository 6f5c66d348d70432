//! # TANDEM Rendering
//!
//! GPU-side half of the channel: a [`tandem_core::DeviceBuffer`] backed by a
//! `wgpu::Buffer`, so a channel's stamp-driven uploads land in vertex, instance
//! or uniform buffers the render pipeline binds directly.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ writer threads → BufferChannel (2 slots, stamp)          │
//! │                        ↓ upload_if_stale()               │
//! │                  WgpuDeviceBuffer ── Queue::write_buffer │
//! │                        ↑ download_from_device()          │
//! │                  staging buffer ←─ map_async + poll      │
//! └──────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod device;

pub use device::WgpuDeviceBuffer;
