//! # Channel Error Types
//!
//! Everything that can go wrong while allocating, mapping or syncing a channel.
//! Lock contention is deliberately absent: it is resolved inside the channel.

use thiserror::Error;

/// Errors that can occur in the data channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Slot memory could not be reserved.
    #[error("failed to allocate {bytes} bytes of slot memory")]
    Allocation {
        /// Requested size in bytes.
        bytes: usize,
    },

    /// The element descriptor and usage describe more bytes than fit in `usize`.
    #[error("channel size overflows: {element_size} bytes x {rows} rows")]
    SizeOverflow {
        /// Size of one row in bytes.
        element_size: usize,
        /// Number of rows.
        rows: usize,
    },

    /// An element index was outside the mapped array.
    #[error("element index {index} out of bounds for {len} elements")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of addressable elements.
        len: usize,
    },

    /// Supplied bytes do not match the size of the target region.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Bytes the target region holds.
        expected: usize,
        /// Bytes that were supplied.
        actual: usize,
    },

    /// Data was supplied through a mapping opened for reading only.
    #[error("mapping is read-only")]
    ReadOnly,

    /// The requested view type cannot be laid over the slot bytes.
    #[error("typed view does not fit channel layout: {0:?}")]
    Cast(bytemuck::PodCastError),

    /// The device-side buffer rejected a transfer.
    #[error("device buffer error: {0}")]
    Device(String),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<bytemuck::PodCastError> for ChannelError {
    fn from(err: bytemuck::PodCastError) -> Self {
        Self::Cast(err)
    }
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
