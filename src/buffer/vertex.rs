//! Interleaved vertex data.

use smallvec::SmallVec;

use crate::backend::SharedDevice;
use crate::error::GraphicsError;
use crate::mesh::{VertexAttribute, VertexAttributes};
use crate::shader::ShaderProgram;
use crate::types::{AttribPointer, BufferId, BufferTarget, BufferUsage, VertexArrayId};

use super::BufferStore;

/// Where vertex data lives and how it reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexBackingKind {
    /// CPU memory handed to the device at every bind.
    ClientArray,
    /// Buffer object re-uploaded in full at the next bind after a change.
    #[default]
    StaticBuffer,
    /// Buffer object with reserved storage, updated in place.
    SubDataBuffer,
    /// Buffer object whose attribute state is recorded in a vertex array object.
    BufferWithVao,
}

type LocationCache = SmallVec<[i32; 8]>;

/// Vertex contents described by a [`VertexAttributes`] layout.
///
/// Contents are counted in `f32` slots: one vertex occupies
/// `vertex_size() / 4` of them.
pub struct VertexData {
    kind: VertexBackingKind,
    attributes: VertexAttributes,
    store: BufferStore<f32>,
    vao: VertexArrayId,
    cached_locations: LocationCache,
}

impl VertexData {
    /// Create vertex storage for up to `max_vertices` vertices.
    pub fn new(
        device: SharedDevice,
        kind: VertexBackingKind,
        usage: BufferUsage,
        max_vertices: usize,
        attributes: VertexAttributes,
    ) -> Result<Self, GraphicsError> {
        let capacity = max_vertices * attributes.vertex_size() / 4;
        let store = BufferStore::new(device, BufferTarget::Array, usage, "vertex", capacity);
        let mut data = Self {
            kind,
            attributes,
            store,
            vao: VertexArrayId::NONE,
            cached_locations: LocationCache::new(),
        };
        data.create_handles()?;
        Ok(data)
    }

    fn create_handles(&mut self) -> Result<(), GraphicsError> {
        match self.kind {
            VertexBackingKind::ClientArray => {}
            VertexBackingKind::StaticBuffer => self.store.create_handle(false)?,
            VertexBackingKind::SubDataBuffer => self.store.create_handle(true)?,
            VertexBackingKind::BufferWithVao => {
                self.store.create_handle(false)?;
                self.vao = self.store.device().create_vertex_array()?;
            }
        }
        Ok(())
    }

    /// Backing kind chosen at construction.
    pub fn kind(&self) -> VertexBackingKind {
        self.kind
    }

    /// Vertex layout.
    pub fn attributes(&self) -> &VertexAttributes {
        &self.attributes
    }

    /// Number of complete vertices currently stored.
    pub fn num_vertices(&self) -> usize {
        self.store.len() * 4 / self.attributes.vertex_size()
    }

    /// Maximum number of vertices.
    pub fn max_vertices(&self) -> usize {
        self.store.capacity() * 4 / self.attributes.vertex_size()
    }

    /// Number of `f32` slots currently stored.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no vertices are stored.
    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    /// Capacity in `f32` slots.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Current contents.
    pub fn contents(&self) -> &[f32] {
        self.store.data()
    }

    /// Copy `dst.len()` slots starting at `offset` into `dst`.
    pub fn get_contents(&self, offset: usize, dst: &mut [f32]) -> Result<(), GraphicsError> {
        self.store.read(offset, dst)
    }

    /// Replace the contents with `data[offset..offset + count]`.
    ///
    /// Device buffers are limited to their capacity; client arrays grow.
    pub fn set_contents(
        &mut self,
        data: &[f32],
        offset: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        let bounded = self.kind != VertexBackingKind::ClientArray;
        self.store.replace(data, offset, count, bounded)?;
        self.upload_changed(0, count);
        Ok(())
    }

    /// Overwrite `count` slots at `target_offset` with `data[source_offset..]`.
    pub fn update_contents(
        &mut self,
        target_offset: usize,
        data: &[f32],
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
            VertexBackingKind::ClientArray | VertexBackingKind::StaticBuffer => {}
            VertexBackingKind::SubDataBuffer => {
                self.store.bind_target();
                self.store.upload_range(offset, count);
            }
            VertexBackingKind::BufferWithVao => {
                self.store.bind_target();
                self.store.upload_data();
            }
        }
    }

    /// Bind the data to the attributes of `shader`.
    ///
    /// `locations[i]` overrides the location of the i-th attribute; without
    /// it the location is looked up by alias. Negative locations are skipped.
    /// An invalidated `shader` is recompiled before its locations are read.
    ///
    /// # Panics
    ///
    /// Panics if a device-backed kind has no handle.
    pub fn bind(&mut self, shader: &mut ShaderProgram, locations: Option<&[i32]>) {
        shader.check_managed();
        match self.kind {
            VertexBackingKind::ClientArray => {
                self.bind_attributes(shader, locations, true);
            }
            VertexBackingKind::StaticBuffer => {
                self.store.assert_handle();
                self.store.bind_target();
                if self.store.is_dirty() {
                    self.store.upload_data();
                }
                self.bind_attributes(shader, locations, false);
            }
            VertexBackingKind::SubDataBuffer => {
                self.store.assert_handle();
                self.store.bind_target();
                if self.store.is_dirty() {
                    self.store.upload_range(0, self.store.len());
                }
                self.bind_attributes(shader, locations, false);
            }
            VertexBackingKind::BufferWithVao => {
                self.store.assert_handle();
                let device = self.store.device().clone();
                device.bind_vertex_array(self.vao);
                self.store.bind_target();
                if self.store.is_dirty() {
                    self.store.upload_data();
                }
                self.bind_cached_attributes(shader, locations);
            }
        }
        self.store.set_bound(true);
    }

    fn bind_attributes(&self, shader: &ShaderProgram, locations: Option<&[i32]>, client: bool) {
        let device = self.store.device();
        let stride = self.attributes.vertex_size() as u32;
        for (index, attribute) in self.attributes.iter().enumerate() {
            let location = resolve_location(shader, locations, index, attribute);
            if location < 0 {
                continue;
            }
            let location = location as u32;
            device.enable_vertex_attrib_array(location);
            let client_data = client.then(|| self.store.bytes());
            device.vertex_attrib_pointer(location, &pointer(attribute, stride), client_data);
        }
    }

    fn bind_cached_attributes(&mut self, shader: &ShaderProgram, locations: Option<&[i32]>) {
        let resolved: LocationCache = self
            .attributes
            .iter()
            .enumerate()
            .map(|(index, attribute)| resolve_location(shader, locations, index, attribute))
            .collect();
        if resolved == self.cached_locations {
            return;
        }

        log::trace!(
            "Vertex array {:?} locations changed: {:?} -> {:?}",
            self.vao,
            self.cached_locations,
            resolved
        );
        let device = self.store.device();
        for &location in self.cached_locations.iter().filter(|l| **l >= 0) {
            device.disable_vertex_attrib_array(location as u32);
        }
        let stride = self.attributes.vertex_size() as u32;
        for (attribute, &location) in self.attributes.iter().zip(resolved.iter()) {
            if location < 0 {
                continue;
            }
            device.enable_vertex_attrib_array(location as u32);
            device.vertex_attrib_pointer(location as u32, &pointer(attribute, stride), None);
        }
        self.cached_locations = resolved;
    }

    /// Release the attribute state set up by [`bind`](Self::bind).
    pub fn unbind(&mut self, shader: &mut ShaderProgram, locations: Option<&[i32]>) {
        shader.check_managed();
        let device = self.store.device().clone();
        match self.kind {
            VertexBackingKind::ClientArray => {
                self.disable_attributes(shader, locations);
            }
            VertexBackingKind::StaticBuffer | VertexBackingKind::SubDataBuffer => {
                self.disable_attributes(shader, locations);
                self.store.unbind_target();
            }
            VertexBackingKind::BufferWithVao => {
                device.bind_vertex_array(VertexArrayId::NONE);
            }
        }
        self.store.set_bound(false);
    }

    fn disable_attributes(&self, shader: &ShaderProgram, locations: Option<&[i32]>) {
        let device = self.store.device();
        for (index, attribute) in self.attributes.iter().enumerate() {
            let location = resolve_location(shader, locations, index, attribute);
            if location >= 0 {
                device.disable_vertex_attrib_array(location as u32);
            }
        }
    }

    /// Allocate fresh device handles after context loss.
    ///
    /// The old handles died with the context and are not deleted. Contents
    /// are kept and uploaded again at the next bind.
    pub fn invalidate(&mut self) -> Result<(), GraphicsError> {
        self.store.forget_handle();
        self.vao = VertexArrayId::NONE;
        self.cached_locations.clear();
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

    /// Vertex array handle (`NONE` unless [`VertexBackingKind::BufferWithVao`]).
    pub fn vertex_array(&self) -> VertexArrayId {
        self.vao
    }

    /// Usage hint passed with uploads.
    pub fn usage(&self) -> BufferUsage {
        self.store.usage()
    }
}

impl Drop for VertexData {
    fn drop(&mut self) {
        if self.vao.is_valid() {
            self.store.device().delete_vertex_array(self.vao);
        }
    }
}

impl std::fmt::Debug for VertexData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexData")
            .field("kind", &self.kind)
            .field("vertices", &self.num_vertices())
            .field("max_vertices", &self.max_vertices())
            .field("buffer", &self.store.handle())
            .field("vao", &self.vao)
            .field("dirty", &self.store.is_dirty())
            .finish()
    }
}

fn resolve_location(
    shader: &ShaderProgram,
    locations: Option<&[i32]>,
    index: usize,
    attribute: &VertexAttribute,
) -> i32 {
    locations
        .and_then(|l| l.get(index).copied())
        .unwrap_or_else(|| shader.fetch_attribute_location(&attribute.alias))
}

fn pointer(attribute: &VertexAttribute, stride: u32) -> AttribPointer {
    AttribPointer {
        components: attribute.num_components,
        component_type: attribute.component_type,
        normalized: attribute.normalized,
        stride,
        offset: attribute.offset() as u32,
    }
}
