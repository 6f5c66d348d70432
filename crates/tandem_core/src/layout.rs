//! # Element Layout
//!
//! Describes what one element of a channel looks like (scalar type, component
//! count, array length) and how many rows of it the channel holds.
//!
//! ```text
//!   element  = scalar bytes x values per element x array length
//!   rows     = 1 (uniform) | vertices | ceil(instances / divisor)
//!   size     = element x rows
//! ```

use crate::error::{ChannelError, ChannelResult};

/// Scalar type of each component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 32-bit unsigned integer.
    U32,
}

impl ScalarType {
    /// Size of one component in bytes.
    #[inline]
    #[must_use]
    pub const fn byte_width(self) -> usize {
        match self {
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Describes a single element of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementDesc {
    /// Component type.
    pub scalar: ScalarType,
    /// Components per element (1-4 for vectors, 9/16 for matrices).
    pub values_per_element: u32,
    /// Number of array elements per row. 1 for non-array data.
    pub array_len: u32,
    /// Whether fixed-point data should be normalized when the device reads it.
    pub normalize: bool,
}

impl ElementDesc {
    /// Creates a non-array, non-normalized element.
    #[must_use]
    pub const fn new(scalar: ScalarType, values_per_element: u32) -> Self {
        Self {
            scalar,
            values_per_element,
            array_len: 1,
            normalize: false,
        }
    }

    /// Single `f32`.
    #[must_use]
    pub const fn f32() -> Self {
        Self::new(ScalarType::F32, 1)
    }

    /// `vec2` of `f32`.
    #[must_use]
    pub const fn vec2f() -> Self {
        Self::new(ScalarType::F32, 2)
    }

    /// `vec3` of `f32`.
    #[must_use]
    pub const fn vec3f() -> Self {
        Self::new(ScalarType::F32, 3)
    }

    /// `vec4` of `f32`.
    #[must_use]
    pub const fn vec4f() -> Self {
        Self::new(ScalarType::F32, 4)
    }

    /// 4x4 `f32` matrix.
    #[must_use]
    pub const fn mat4f() -> Self {
        Self::new(ScalarType::F32, 16)
    }

    /// Single `u32`.
    #[must_use]
    pub const fn u32() -> Self {
        Self::new(ScalarType::U32, 1)
    }

    /// Returns the same element as an array of `len` entries.
    #[must_use]
    pub const fn array(mut self, len: u32) -> Self {
        self.array_len = len;
        self
    }

    /// Returns the same element with the normalize flag set.
    #[must_use]
    pub const fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    /// Size of one element (all array entries of one row) in bytes.
    #[inline]
    #[must_use]
    pub const fn element_size(&self) -> usize {
        self.scalar
            .byte_width()
            .saturating_mul(self.values_per_element as usize)
            .saturating_mul(self.array_len as usize)
    }
}

/// How the channel is consumed. Vertex and instance usage are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Usage {
    /// A single value (or value array) shared by all vertices.
    Uniform,
    /// One element per vertex.
    Vertex {
        /// Number of vertices.
        count: u32,
    },
    /// One element per `divisor` instances.
    Instance {
        /// Number of instances.
        count: u32,
        /// Instances that share one element. Zero is treated as one.
        divisor: u32,
    },
}

impl Usage {
    /// Number of element rows this usage needs.
    #[must_use]
    pub const fn rows(&self) -> usize {
        match *self {
            Self::Uniform => 1,
            Self::Vertex { count } => count as usize,
            Self::Instance { count, divisor } => {
                let divisor = if divisor == 0 { 1 } else { divisor as usize };
                (count as usize).div_ceil(divisor)
            }
        }
    }

    /// Returns true for vertex and instance usage.
    #[must_use]
    pub const fn is_vertex_attribute(&self) -> bool {
        !matches!(self, Self::Uniform)
    }
}

/// Full allocation layout of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    /// Element description.
    pub desc: ElementDesc,
    /// Usage mode.
    pub usage: Usage,
    byte_size: usize,
}

impl ChannelLayout {
    /// Builds a layout, computing the total byte size.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::SizeOverflow`] if the size does not fit in `usize`.
    pub fn new(desc: ElementDesc, usage: Usage) -> ChannelResult<Self> {
        let element_size = desc.element_size();
        let rows = usage.rows();
        let byte_size = element_size
            .checked_mul(rows)
            .ok_or(ChannelError::SizeOverflow { element_size, rows })?;
        Ok(Self { desc, usage, byte_size })
    }

    /// Size of one row in bytes.
    #[inline]
    #[must_use]
    pub const fn element_size(&self) -> usize {
        self.desc.element_size()
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.usage.rows()
    }

    /// Total size of one slot in bytes.
    #[inline]
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        self.byte_size
    }
}
