//! Index data.

use crate::backend::SharedDevice;
use crate::error::GraphicsError;
use crate::types::{BufferId, BufferTarget, BufferUsage};

use super::BufferStore;

/// Where index data lives and how it reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexBackingKind {
    /// CPU memory handed to the device with every indexed draw.
    ClientArray,
    /// Buffer object re-uploaded in full at the next bind after a change.
    #[default]
    StaticBuffer,
    /// Buffer object with reserved storage, updated in place.
    SubDataBuffer,
}

/// 32-bit vertex indices.
pub struct IndexData {
    kind: IndexBackingKind,
    store: BufferStore<u32>,
}

impl IndexData {
    /// Create index storage for up to `max_indices` indices.
    pub fn new(
        device: SharedDevice,
        kind: IndexBackingKind,
        usage: BufferUsage,
        max_indices: usize,
    ) -> Result<Self, GraphicsError> {
        let store = BufferStore::new(
            device,
            BufferTarget::ElementArray,
            usage,
            "index",
            max_indices,
        );
        let mut data = Self { kind, store };
        data.create_handles()?;
        Ok(data)
    }

    fn create_handles(&mut self) -> Result<(), GraphicsError> {
        match self.kind {
            IndexBackingKind::ClientArray => Ok(()),
            IndexBackingKind::StaticBuffer => self.store.create_handle(false),
            IndexBackingKind::SubDataBuffer => self.store.create_handle(true),
        }
    }

    /// Backing kind chosen at construction.
    pub fn kind(&self) -> IndexBackingKind {
        self.kind
    }

    /// Number of indices currently stored.
    pub fn num_indices(&self) -> usize {
        self.store.len()
    }

    /// Maximum number of indices.
    pub fn max_indices(&self) -> usize {
        self.store.capacity()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Whether no indices are stored.
    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    /// Current contents.
    pub fn contents(&self) -> &[u32] {
        self.store.data()
    }

    /// Copy `dst.len()` indices starting at `offset` into `dst`.
    pub fn get_contents(&self, offset: usize, dst: &mut [u32]) -> Result<(), GraphicsError> {
        self.store.read(offset, dst)
    }

    /// Replace the contents with `data[offset..offset + count]`.
    pub fn set_contents(
        &mut self,
        data: &[u32],
        offset: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        let bounded = self.kind != IndexBackingKind::ClientArray;
        self.store.replace(data, offset, count, bounded)?;
        self.upload_changed(0, count);
        Ok(())
    }

    /// Overwrite `count` indices at `target_offset` with `data[source_offset..]`.
    pub fn update_contents(
        &mut self,
        target_offset: usize,
        data: &[u32],
        source_offset: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        self.store
            .overwrite(target_offset, data, source_offset, count)?;
        self.upload_changed(target_offset, count);
        Ok(())
    }

    fn upload_changed(&mut self, offset: usize, count: usize) {
        if !self.store.is_bound() {
            return;
        }
        match self.kind {
            IndexBackingKind::ClientArray | IndexBackingKind::StaticBuffer => {}
            IndexBackingKind::SubDataBuffer => {
                self.store.bind_target();
                self.store.upload_range(offset, count);
            }
        }
    }

    /// Bind to the element array target, uploading pending changes.
    ///
    /// # Panics
    ///
    /// Panics if a device-backed kind has no handle.
    pub fn bind(&mut self) {
        match self.kind {
            IndexBackingKind::ClientArray => {}
            IndexBackingKind::StaticBuffer => {
                self.store.assert_handle();
                self.store.bind_target();
                if self.store.is_dirty() {
                    self.store.upload_data();
                }
            }
            IndexBackingKind::SubDataBuffer => {
                self.store.assert_handle();
                self.store.bind_target();
                if self.store.is_dirty() {
                    self.store.upload_range(0, self.store.len());
                }
            }
        }
        self.store.set_bound(true);
    }

    /// Unbind the element array target.
    pub fn unbind(&mut self) {
        match self.kind {
            IndexBackingKind::ClientArray => {}
            IndexBackingKind::StaticBuffer | IndexBackingKind::SubDataBuffer => {
                self.store.unbind_target();
            }
        }
        self.store.set_bound(false);
    }

    /// Allocate a fresh device handle after context loss.
    pub fn invalidate(&mut self) -> Result<(), GraphicsError> {
        self.store.forget_handle();
        self.create_handles()
    }

    /// Whether the contents changed since the last upload.
    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty()
    }

    /// Whether the data is currently bound.
    pub fn is_bound(&self) -> bool {
        self.store.is_bound()
    }

    /// Device buffer handle (`NONE` for client arrays).
    pub fn handle(&self) -> BufferId {
        self.store.handle()
    }

    /// Usage hint passed with uploads.
    pub fn usage(&self) -> BufferUsage {
        self.store.usage()
    }

    /// Index bytes for draws that read from CPU memory.
    pub(crate) fn client_indices(&self) -> Option<&[u8]> {
        match self.kind {
            IndexBackingKind::ClientArray => Some(self.store.bytes()),
            IndexBackingKind::StaticBuffer | IndexBackingKind::SubDataBuffer => None,
        }
    }
}

impl std::fmt::Debug for IndexData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexData")
            .field("kind", &self.kind)
            .field("indices", &self.num_indices())
            .field("max_indices", &self.max_indices())
            .field("buffer", &self.store.handle())
            .field("dirty", &self.store.is_dirty())
            .finish()
    }
}
