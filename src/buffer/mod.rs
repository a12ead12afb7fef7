//! Geometry buffers.
//!
//! This module provides the CPU/GPU storage behind a mesh:
//!
//! - [`VertexData`] - interleaved `f32` vertex data bound to shader attributes
//! - [`IndexData`] - `u32` indices bound to the element array target
//!
//! Both own their CPU contents and pick one backing strategy at construction.
//! CPU contents survive context loss; [`VertexData::invalidate`] and
//! [`IndexData::invalidate`] allocate fresh device handles and re-upload on
//! the next bind.

mod index;
mod vertex;

pub use index::{IndexBackingKind, IndexData};
pub use vertex::{VertexBackingKind, VertexData};

use bytemuck::Pod;

use crate::backend::SharedDevice;
use crate::error::{check_range, GraphicsError};
use crate::types::{BufferId, BufferTarget, BufferUsage};

/// CPU contents plus the device buffer that mirrors them.
///
/// Shared by the vertex and index sides; the backing kind decides which of
/// these operations run and when.
pub(crate) struct BufferStore<T: Pod> {
    device: SharedDevice,
    target: BufferTarget,
    usage: BufferUsage,
    what: &'static str,
    data: Vec<T>,
    capacity: usize,
    buffer: BufferId,
    dirty: bool,
    bound: bool,
}

impl<T: Pod> BufferStore<T> {
    pub(crate) fn new(
        device: SharedDevice,
        target: BufferTarget,
        usage: BufferUsage,
        what: &'static str,
        capacity: usize,
    ) -> Self {
        Self {
            device,
            target,
            usage,
            what,
            data: Vec::with_capacity(capacity),
            capacity,
            buffer: BufferId::NONE,
            dirty: true,
            bound: false,
        }
    }

    pub(crate) fn device(&self) -> &SharedDevice {
        &self.device
    }

    /// Allocate the device buffer, optionally reserving the full capacity.
    pub(crate) fn create_handle(&mut self, reserve: bool) -> Result<(), GraphicsError> {
        let buffer = self.device.create_buffer()?;
        if reserve {
            self.device.bind_buffer(self.target, buffer);
            self.device.buffer_storage(
                self.target,
                self.capacity * std::mem::size_of::<T>(),
                self.usage,
            );
            self.device.bind_buffer(self.target, BufferId::NONE);
        }
        log::debug!(
            "Created {} buffer {:?} ({} elements)",
            self.what,
            buffer,
            self.capacity
        );
        self.buffer = buffer;
        Ok(())
    }

    /// Forget the current handle without deleting it (it died with the context).
    pub(crate) fn forget_handle(&mut self) {
        self.buffer = BufferId::NONE;
        self.dirty = true;
        self.bound = false;
    }

    pub(crate) fn handle(&self) -> BufferId {
        self.buffer
    }

    pub(crate) fn assert_handle(&self) {
        assert!(
            self.buffer.is_valid(),
            "{} buffer used without a device handle (released or never created)",
            self.what
        );
    }

    pub(crate) fn bind_target(&self) {
        self.device.bind_buffer(self.target, self.buffer);
    }

    pub(crate) fn unbind_target(&self) {
        self.device.bind_buffer(self.target, BufferId::NONE);
    }

    /// Replace the contents with `source[offset..offset + count]`.
    pub(crate) fn replace(
        &mut self,
        source: &[T],
        offset: usize,
        count: usize,
        bounded: bool,
    ) -> Result<(), GraphicsError> {
        check_range(self.what, offset, count, source.len())?;
        if bounded && count > self.capacity {
            return Err(GraphicsError::CapacityExceeded {
                requested: count,
                capacity: self.capacity,
            });
        }
        self.data.clear();
        self.data.extend_from_slice(&source[offset..offset + count]);
        self.dirty = true;
        Ok(())
    }

    /// Overwrite `count` elements at `target_offset` from `source[source_offset..]`.
    pub(crate) fn overwrite(
        &mut self,
        target_offset: usize,
        source: &[T],
        source_offset: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        check_range(self.what, source_offset, count, source.len())?;
        check_range(self.what, target_offset, count, self.data.len())?;
        self.data[target_offset..target_offset + count]
            .copy_from_slice(&source[source_offset..source_offset + count]);
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn read(&self, offset: usize, dst: &mut [T]) -> Result<(), GraphicsError> {
        check_range(self.what, offset, dst.len(), self.data.len())?;
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }

    /// Upload everything, replacing the device storage.
    pub(crate) fn upload_data(&mut self) {
        log::debug!(
            "Uploading {} {} elements to {:?}",
            self.data.len(),
            self.what,
            self.buffer
        );
        self.device
            .buffer_data(self.target, bytemuck::cast_slice(&self.data), self.usage);
        self.dirty = false;
    }

    /// Upload `count` elements at `offset` into the reserved storage.
    pub(crate) fn upload_range(&mut self, offset: usize, count: usize) {
        log::debug!(
            "Uploading {} {} elements at {} to {:?}",
            count,
            self.what,
            offset,
            self.buffer
        );
        self.device.buffer_sub_data(
            self.target,
            offset * std::mem::size_of::<T>(),
            bytemuck::cast_slice(&self.data[offset..offset + count]),
        );
        self.dirty = false;
    }

    pub(crate) fn data(&self) -> &[T] {
        &self.data
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.bound
    }

    pub(crate) fn set_bound(&mut self, bound: bool) {
        self.bound = bound;
    }
}

impl<T: Pod> Drop for BufferStore<T> {
    fn drop(&mut self) {
        if self.buffer.is_valid() {
            if self.bound {
                self.unbind_target();
            }
            self.device.delete_buffer(self.buffer);
        }
    }
}
