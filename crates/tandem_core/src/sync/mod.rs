//! # Synchronization Primitives for Slot Access
//!
//! ## The Problem
//!
//! ```text
//! Animation thread:  WRITE vertex positions
//! Render thread:     READ  vertex positions, upload to GPU
//!
//! Without synchronization: torn reads, half-written uploads
//! With a plain Mutex:      render thread stalls behind every tick
//! ```
//!
//! ## The Solution: Writer-Preferring Slot Locks
//!
//! Every slot of a channel carries one [`SlotLock`]. Readers share it, a writer
//! owns it. A waiting writer blocks new readers so producers that must keep up
//! with real time are never starved by a steady stream of readers.

mod slot_lock;

pub use slot_lock::{LockCounts, SlotLock};
