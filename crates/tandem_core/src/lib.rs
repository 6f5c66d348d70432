//! # TANDEM Core
//!
//! Concurrent double-buffered data channel for per-frame numeric data:
//! vertex attributes, uniform values and instance arrays shared between
//! simulation threads, the render thread and the GPU upload path.
//!
//! ## Architecture Rules
//!
//! 1. **Readers never see a partial write** - writes land in a slot readers are not on
//! 2. **Contention is not an error** - the channel resolves it by blocking or promoting
//! 3. **Uploads are stamp-driven** - a device copy is refreshed only when the stamp moved
//!
//! ## Example
//!
//! ```rust
//! use tandem_core::{BufferChannel, ElementDesc, DeviceLayout, HostBuffer};
//!
//! let tint = BufferChannel::new("tint");
//! tint.allocate_uniform(ElementDesc::vec4f())?;
//!
//! let gpu = HostBuffer::new(16);
//! tint.attach_device_buffer(gpu.clone(), DeviceLayout::packed(0));
//!
//! tint.set_uniform(&[1.0f32, 0.5, 0.5, 1.0])?;
//! assert!(tint.upload_if_stale()?);
//! assert!(!tint.upload_if_stale()?);
//! # Ok::<(), tandem_core::ChannelError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod layout;
pub mod sync;

pub use channel::{
    BufferChannel, ElementView, ElementViewMut, MapMode, MappedRaw, ReadView, ReadWriteView,
    WriteView,
};
pub use config::ChannelConfig;
pub use device::{DeviceBuffer, DeviceLayout, HostBuffer, TransferStats};
pub use error::{ChannelError, ChannelResult};
pub use layout::{ChannelLayout, ElementDesc, ScalarType, Usage};
pub use sync::{LockCounts, SlotLock};
