//! # Typed Views
//!
//! `bytemuck`-checked reinterpretation of a [`MappedRaw`] as `[T]` or `T`.
//!
//! Views add no synchronization of their own: the casts are validated once at
//! construction and the wrapped mapping keeps the slot locks. Views borrow the
//! channel, so they cannot be stored past the scope that mapped them.
//!
//! ```rust
//! use tandem_core::{BufferChannel, ElementDesc};
//!
//! let colors = BufferChannel::new("colors");
//! colors.allocate_instance_array(ElementDesc::vec4f(), 8, 1)?;
//!
//! colors.map_index_write::<[f32; 4]>(3)?.set([1.0, 0.0, 0.0, 1.0]);
//! assert_eq!(*colors.map_index_read::<[f32; 4]>(3)?, [1.0, 0.0, 0.0, 1.0]);
//! # Ok::<(), tandem_core::ChannelError>(())
//! ```

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use bytemuck::Pod;

use super::buffer_channel::BufferChannel;
use super::mapping::{MapMode, MappedRaw};
use crate::error::{ChannelError, ChannelResult};

fn slice_of<'v, T: Pod>(raw: Option<&'v MappedRaw<'_>>) -> &'v [T] {
    raw.map(|raw| bytemuck::try_cast_slice(raw.read_bytes()).unwrap_or_default())
        .unwrap_or_default()
}

fn slice_of_mut<'v, T: Pod>(raw: Option<&'v mut MappedRaw<'_>>) -> &'v mut [T] {
    match raw.and_then(MappedRaw::write_bytes) {
        Some(bytes) => bytemuck::try_cast_slice_mut(bytes).unwrap_or_default(),
        None => Default::default(),
    }
}

fn validate_slice<T: Pod>(raw: Option<MappedRaw<'_>>) -> ChannelResult<Option<MappedRaw<'_>>> {
    if let Some(raw) = &raw {
        bytemuck::try_cast_slice::<u8, T>(raw.read_bytes())?;
    }
    Ok(raw)
}

fn validate_element<T: Pod>(raw: Option<MappedRaw<'_>>, index: usize) -> ChannelResult<MappedRaw<'_>> {
    let raw = raw.ok_or(ChannelError::IndexOutOfBounds { index, len: 0 })?;
    bytemuck::try_from_bytes::<T>(raw.read_bytes())?;
    Ok(raw)
}

macro_rules! view_common {
    ($view:ident) => {
        impl<'a, T: Pod> $view<'a, T> {
            /// Returns true if the channel was unallocated when mapped.
            #[inline]
            #[must_use]
            pub fn is_null(&self) -> bool {
                self.raw.is_none()
            }

            /// Underlying raw mapping, `None` for null views.
            #[inline]
            #[must_use]
            pub fn raw(&self) -> Option<&MappedRaw<'a>> {
                self.raw.as_ref()
            }

            /// Releases the view early, publishing anything written through it.
            pub fn unmap(self) {
                if let Some(raw) = self.raw {
                    raw.unmap();
                }
            }
        }

        impl<T: Pod> Deref for $view<'_, T> {
            type Target = [T];

            fn deref(&self) -> &[T] {
                slice_of(self.raw.as_ref())
            }
        }

        impl<T: Pod> std::fmt::Debug for $view<'_, T> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($view))
                    .field("raw", &self.raw)
                    .field("len", &self.len())
                    .finish()
            }
        }
    };
}

/// Shared view of the whole channel as `[T]`.
pub struct ReadView<'a, T: Pod> {
    raw: Option<MappedRaw<'a>>,
    _marker: PhantomData<T>,
}

/// Exclusive view of a write slot as `[T]`. Prior content is unspecified.
///
/// Any mutable access counts as supplying data.
pub struct WriteView<'a, T: Pod> {
    raw: Option<MappedRaw<'a>>,
    _marker: PhantomData<T>,
}

/// Exclusive view of a write slot seeded with the current content.
///
/// Any mutable access counts as supplying data.
pub struct ReadWriteView<'a, T: Pod> {
    raw: Option<MappedRaw<'a>>,
    _marker: PhantomData<T>,
}

view_common!(ReadView);
view_common!(WriteView);
view_common!(ReadWriteView);

impl<T: Pod> DerefMut for WriteView<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        slice_of_mut(self.raw.as_mut())
    }
}

impl<'a, T: Pod> ReadWriteView<'a, T> {
    /// Releases the view without publishing.
    pub fn discard(self) {
        if let Some(raw) = self.raw {
            raw.discard();
        }
    }
}

impl<T: Pod> DerefMut for ReadWriteView<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        slice_of_mut(self.raw.as_mut())
    }
}

/// Shared view of one element.
pub struct ElementView<'a, T: Pod> {
    raw: MappedRaw<'a>,
    _marker: PhantomData<T>,
}

impl<T: Pod> ElementView<'_, T> {
    /// Index of the viewed element.
    #[must_use]
    pub fn index(&self) -> usize {
        self.raw.index().unwrap_or_default()
    }
}

impl<T: Pod> Deref for ElementView<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Validated at construction; the window never changes.
        bytemuck::from_bytes(self.raw.read_bytes())
    }
}

impl<T: Pod> std::fmt::Debug for ElementView<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementView")
            .field("raw", &self.raw)
            .field("index", &self.index())
            .finish()
    }
}

/// Exclusive view of one element of a write slot seeded with the current
/// content, so neighbouring elements survive the write.
///
/// Edits go to a local copy that is written into the slot when the view is
/// dropped; [`discard`](Self::discard) drops them instead.
pub struct ElementViewMut<'a, T: Pod> {
    raw: MappedRaw<'a>,
    value: T,
    dirty: bool,
}

impl<T: Pod> ElementViewMut<'_, T> {
    /// Index of the viewed element.
    #[must_use]
    pub fn index(&self) -> usize {
        self.raw.index().unwrap_or_default()
    }

    /// Overwrites the element.
    pub fn set(&mut self, value: T) {
        **self = value;
    }

    /// Releases the view without publishing. The slot is left untouched.
    pub fn discard(mut self) {
        self.dirty = false;
    }
}

impl<T: Pod> Deref for ElementViewMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Pod> DerefMut for ElementViewMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.value
    }
}

impl<T: Pod> Drop for ElementViewMut<'_, T> {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        if let Some(bytes) = self.raw.write_bytes() {
            bytes.copy_from_slice(bytemuck::bytes_of(&self.value));
        }
    }
}

impl<T: Pod> std::fmt::Debug for ElementViewMut<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementViewMut")
            .field("raw", &self.raw)
            .field("index", &self.index())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl BufferChannel {
    /// Maps the channel for reading as `[T]`.
    ///
    /// Returns a null view if the channel is unallocated.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Cast`] if the slot bytes are not a whole number
    /// of `T` or are misaligned for `T`.
    pub fn map_read<T: Pod>(&self) -> ChannelResult<ReadView<'_, T>> {
        Ok(ReadView {
            raw: validate_slice::<T>(self.map_raw(MapMode::Read)?)?,
            _marker: PhantomData,
        })
    }

    /// Maps the channel for overwriting as `[T]`.
    ///
    /// Returns a null view if the channel is unallocated.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Cast`] if `T` does not fit the layout.
    pub fn map_write<T: Pod>(&self) -> ChannelResult<WriteView<'_, T>> {
        Ok(WriteView {
            raw: validate_slice::<T>(self.map_raw(MapMode::Write)?)?,
            _marker: PhantomData,
        })
    }

    /// Maps the channel for in-place modification as `[T]`.
    ///
    /// Returns a null view if the channel is unallocated.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Cast`] if `T` does not fit the layout.
    pub fn map_read_write<T: Pod>(&self) -> ChannelResult<ReadWriteView<'_, T>> {
        Ok(ReadWriteView {
            raw: validate_slice::<T>(self.map_raw(MapMode::ReadWrite)?)?,
            _marker: PhantomData,
        })
    }

    /// Maps element `index` for reading, counting in units of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::IndexOutOfBounds`] if `index` is past the end or
    /// the channel is unallocated.
    pub fn map_index_read<T: Pod>(&self, index: usize) -> ChannelResult<ElementView<'_, T>> {
        let raw = self.map_raw_element(MapMode::Read, index, std::mem::size_of::<T>())?;
        Ok(ElementView {
            raw: validate_element::<T>(raw, index)?,
            _marker: PhantomData,
        })
    }

    /// Maps element `index` for writing, counting in units of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::IndexOutOfBounds`] if `index` is past the end or
    /// the channel is unallocated.
    pub fn map_index_write<T: Pod>(&self, index: usize) -> ChannelResult<ElementViewMut<'_, T>> {
        let raw = self.map_raw_element(MapMode::ReadWrite, index, std::mem::size_of::<T>())?;
        let raw = validate_element::<T>(raw, index)?;
        let value = bytemuck::try_pod_read_unaligned::<T>(raw.read_bytes())?;
        Ok(ElementViewMut {
            raw,
            value,
            dirty: false,
        })
    }

    /// Replaces the whole content with `value`. Returns whether the stamp advanced.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::SizeMismatch`] if `T` is not the channel size.
    pub fn set_uniform<T: Pod>(&self, value: &T) -> ChannelResult<bool> {
        self.write_all(bytemuck::bytes_of(value))
    }

    /// Reads the whole content as one `T`, `None` if unallocated.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Cast`] if `T` is not the channel size.
    pub fn uniform<T: Pod>(&self) -> ChannelResult<Option<T>> {
        let Some(raw) = self.map_raw(MapMode::Read)? else {
            return Ok(None);
        };
        let value = bytemuck::try_pod_read_unaligned::<T>(raw.read_bytes())?;
        Ok(Some(value))
    }

    /// Overwrites element `index`. Returns whether the stamp advanced.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::IndexOutOfBounds`] if `index` is past the end.
    pub fn set_element<T: Pod>(&self, index: usize, value: &T) -> ChannelResult<bool> {
        self.write_single_element(index, bytemuck::bytes_of(value))
    }

    /// Reads element `index`, counting in units of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::IndexOutOfBounds`] if `index` is past the end or
    /// the channel is unallocated.
    pub fn element<T: Pod>(&self, index: usize) -> ChannelResult<T> {
        Ok(*self.map_index_read::<T>(index)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ElementDesc;

    #[test]
    fn test_null_views() {
        let channel = BufferChannel::new("null");
        let read = channel.map_read::<f32>().unwrap();
        assert!(read.is_null());
        assert!(read.is_empty());
        drop(read);

        let mut write = channel.map_write::<f32>().unwrap();
        assert!(write.is_null());
        assert!(write.iter_mut().next().is_none());
        drop(write);

        assert_eq!(channel.uniform::<f32>().unwrap(), None);
        assert!(!channel.set_uniform(&1.0f32).unwrap());
        assert_eq!(
            channel.map_index_read::<f32>(0).unwrap_err(),
            ChannelError::IndexOutOfBounds { index: 0, len: 0 }
        );
        assert_eq!(channel.stamp(), 0);
    }

    #[test]
    fn test_typed_round_trip() {
        let channel = BufferChannel::new("matrix");
        channel.allocate_uniform(ElementDesc::mat4f()).unwrap();

        let identity: [f32; 16] = [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        assert!(channel.set_uniform(&identity).unwrap());
        assert_eq!(channel.uniform::<[f32; 16]>().unwrap(), Some(identity));

        let floats = channel.map_read::<f32>().unwrap();
        assert_eq!(floats.len(), 16);
        assert_eq!(floats[5], 1.0);
    }

    #[test]
    fn test_wrong_type_is_error() {
        let channel = BufferChannel::new("vec3");
        channel.allocate_vertex_array(ElementDesc::vec3f(), 1).unwrap();

        // 12 bytes cannot be viewed as [f64].
        let err = channel.map_read::<f64>().unwrap_err();
        assert!(matches!(err, ChannelError::Cast(_)));

        let err = channel.uniform::<[f32; 4]>().unwrap_err();
        assert!(matches!(err, ChannelError::Cast(_)));
    }

    #[test]
    fn test_deref_mut_supplies() {
        let channel = BufferChannel::new("supply");
        channel.allocate_vertex_array(ElementDesc::f32(), 4).unwrap();
        let before = channel.stamp();

        {
            let view = channel.map_write::<f32>().unwrap();
            assert_eq!(view.len(), 4);
        }
        assert_eq!(channel.stamp(), before);

        {
            let mut view = channel.map_write::<f32>().unwrap();
            view.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        }
        assert_eq!(channel.stamp(), before + 1);
        assert_eq!(&*channel.map_read::<f32>().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_read_write_view_sees_current_content() {
        let channel = BufferChannel::new("accumulate");
        channel.allocate_vertex_array(ElementDesc::u32(), 3).unwrap();
        channel.write_all(bytemuck::cast_slice(&[1u32, 2, 3])).unwrap();

        // Hold a reader so the writer lands on the second slot.
        let reader = channel.map_read::<u32>().unwrap();
        {
            let mut view = channel.map_read_write::<u32>().unwrap();
            for value in view.iter_mut() {
                *value *= 10;
            }
        }
        assert_eq!(&*reader, &[1, 2, 3]);
        drop(reader);

        assert_eq!(&*channel.map_read::<u32>().unwrap(), &[10, 20, 30]);
    }

    #[test]
    fn test_element_views() {
        let channel = BufferChannel::new("instances");
        channel.allocate_instance_array(ElementDesc::vec2f(), 4, 1).unwrap();

        let mut view = channel.map_index_write::<[f32; 2]>(2).unwrap();
        assert_eq!(view.index(), 2);
        view.set([4.0, 5.0]);
        drop(view);

        assert_eq!(channel.element::<[f32; 2]>(2).unwrap(), [4.0, 5.0]);
        assert_eq!(channel.element::<[f32; 2]>(1).unwrap(), [0.0, 0.0]);
        // Index counts in units of T: four vec2 are eight floats.
        assert_eq!(channel.element::<f32>(5).unwrap(), 5.0);
        assert!(matches!(
            channel.element::<[f32; 2]>(4),
            Err(ChannelError::IndexOutOfBounds { index: 4, len: 4 })
        ));
    }

    #[test]
    fn test_element_discard() {
        let channel = BufferChannel::new("discard");
        channel.allocate_vertex_array(ElementDesc::u32(), 2).unwrap();
        let before = channel.stamp();

        let mut view = channel.map_index_write::<u32>(0).unwrap();
        view.set(9);
        view.discard();
        assert_eq!(channel.stamp(), before);
        assert_eq!(channel.element::<u32>(0).unwrap(), 0);
    }

    #[test]
    fn test_element_view_untouched_does_not_stamp() {
        let channel = BufferChannel::new("peek");
        channel.allocate_vertex_array(ElementDesc::u32(), 2).unwrap();
        channel.set_element(1, &4u32).unwrap();
        let before = channel.stamp();

        let view = channel.map_index_write::<u32>(1).unwrap();
        assert_eq!(*view, 4);
        assert!(format!("{view:?}").contains("ElementViewMut"));
        drop(view);
        assert_eq!(channel.stamp(), before);

        let mut view = channel.map_index_write::<u32>(1).unwrap();
        *view += 1;
        drop(view);
        assert_eq!(channel.stamp(), before + 1);
        assert_eq!(channel.element::<u32>(1).unwrap(), 5);
    }

    #[test]
    fn test_views_borrow_channel_bytes() {
        let channel = BufferChannel::new("borrow");
        channel.allocate_vertex_array(ElementDesc::u32(), 2).unwrap();
        channel.write_all(bytemuck::cast_slice(&[3u32, 4])).unwrap();

        let view = channel.map_read::<u32>().unwrap();
        let slice: &[u32] = &view;
        assert_eq!(slice, &[3, 4]);
        assert!(format!("{:?}", channel.map_index_read::<u32>(1).unwrap()).contains("ElementView"));
    }
}
