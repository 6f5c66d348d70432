//! # Double-Buffered Data Channel
//!
//! ## The Problem
//!
//! ```text
//! Animation thread:  WRITE bone matrices every tick
//! Render thread:     READ bone matrices every frame
//! Upload path:       READ + push to the GPU when they changed
//!
//! One buffer + one lock:   render stalls behind every write
//! No lock:                 torn matrices on screen
//! ```
//!
//! ## The Solution: Two Slots and a Stamp
//!
//! ```text
//! Readers:  last-written slot, shared lock
//! Writers:  the other slot, exclusive lock
//! Release:  written slot becomes last-written, stamp += 1
//! Upload:   stamp != uploaded stamp → push bytes
//! ```
//!
//! The second slot is only allocated once contention is actually observed.

mod buffer_channel;
mod device_sync;
mod mapping;
mod slot;
mod view;

pub use buffer_channel::BufferChannel;
pub use mapping::{MapMode, MappedRaw};
pub use view::{ElementView, ElementViewMut, ReadView, ReadWriteView, WriteView};
