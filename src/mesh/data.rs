//! Mesh definition with vertex/index data.
//!
//! A [`Mesh`] owns one [`VertexData`] and one [`IndexData`] and draws them
//! with a shader. When it holds indices every draw is indexed; otherwise
//! vertices are drawn in order.
//!
//! # Example
//!
//! ```ignore
//! let descriptor = MeshDescriptor::new(VertexAttributes::position_only())
//!     .with_max_vertices(3)
//!     .with_max_indices(3)
//!     .with_label("triangle");
//! let mut mesh = Mesh::new(device.clone(), descriptor)?;
//! mesh.set_vertices(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])?;
//! mesh.set_indices(&[0, 1, 2])?;
//!
//! shader.begin();
//! mesh.render(&mut shader, PrimitiveType::Triangles, 0, 3)?;
//! shader.end();
//! ```

use crate::backend::SharedDevice;
use crate::buffer::{IndexBackingKind, IndexData, VertexBackingKind, VertexData};
use crate::error::{check_range, GraphicsError};
use crate::math::{transform_point, Mat3, Mat4, Vec2, Vec3};
use crate::shader::ShaderProgram;
use crate::types::{BufferUsage, PrimitiveType};

use super::attribute::{VertexAttribute, VertexUsage};
use super::attributes::VertexAttributes;
use super::bounds::BoundingBox;

/// Settings for creating a [`Mesh`].
#[derive(Debug, Clone)]
pub struct MeshDescriptor {
    /// Vertex layout.
    pub attributes: VertexAttributes,
    /// Backing of the vertex data.
    pub vertex_kind: VertexBackingKind,
    /// Backing of the index data.
    pub index_kind: IndexBackingKind,
    /// Maximum number of vertices.
    pub max_vertices: usize,
    /// Maximum number of indices.
    pub max_indices: usize,
    /// Upload hint for both buffers.
    pub usage: BufferUsage,
    /// Whether [`Mesh::render`] binds and unbinds the data itself.
    pub auto_bind: bool,
    /// Debug label.
    pub label: Option<String>,
}

impl MeshDescriptor {
    /// Descriptor for a static, buffer-backed mesh with no capacity.
    pub fn new(attributes: VertexAttributes) -> Self {
        Self {
            attributes,
            vertex_kind: VertexBackingKind::StaticBuffer,
            index_kind: IndexBackingKind::StaticBuffer,
            max_vertices: 0,
            max_indices: 0,
            usage: BufferUsage::StaticDraw,
            auto_bind: true,
            label: None,
        }
    }

    pub fn with_vertex_kind(mut self, kind: VertexBackingKind) -> Self {
        self.vertex_kind = kind;
        self
    }

    pub fn with_index_kind(mut self, kind: IndexBackingKind) -> Self {
        self.index_kind = kind;
        self
    }

    /// Keep both vertices and indices in CPU memory.
    pub fn client_array(self) -> Self {
        self.with_vertex_kind(VertexBackingKind::ClientArray)
            .with_index_kind(IndexBackingKind::ClientArray)
    }

    pub fn with_max_vertices(mut self, max_vertices: usize) -> Self {
        self.max_vertices = max_vertices;
        self
    }

    pub fn with_max_indices(mut self, max_indices: usize) -> Self {
        self.max_indices = max_indices;
        self
    }

    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Pick the usage hint for static or frequently rewritten data.
    pub fn with_static(self, is_static: bool) -> Self {
        self.with_usage(BufferUsage::from_static(is_static))
    }

    pub fn with_auto_bind(mut self, auto_bind: bool) -> Self {
        self.auto_bind = auto_bind;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Vertex and index data drawn together.
pub struct Mesh {
    device: SharedDevice,
    vertices: VertexData,
    indices: IndexData,
    auto_bind: bool,
    label: Option<String>,
}

impl Mesh {
    /// Create an empty mesh.
    pub fn new(device: SharedDevice, descriptor: MeshDescriptor) -> Result<Self, GraphicsError> {
        let vertices = VertexData::new(
            device.clone(),
            descriptor.vertex_kind,
            descriptor.usage,
            descriptor.max_vertices,
            descriptor.attributes,
        )?;
        let indices = IndexData::new(
            device.clone(),
            descriptor.index_kind,
            descriptor.usage,
            descriptor.max_indices,
        )?;
        log::debug!(
            "Created mesh {:?} ({:?}/{:?}, {} vertices, {} indices)",
            descriptor.label,
            descriptor.vertex_kind,
            descriptor.index_kind,
            descriptor.max_vertices,
            descriptor.max_indices
        );
        Ok(Self {
            device,
            vertices,
            indices,
            auto_bind: descriptor.auto_bind,
            label: descriptor.label,
        })
    }

    /// Create a mesh holding `vertices` and `indices`.
    ///
    /// Capacities grow to fit the data when the descriptor's are smaller.
    pub fn with_data(
        device: SharedDevice,
        mut descriptor: MeshDescriptor,
        vertices: &[f32],
        indices: &[u32],
    ) -> Result<Self, GraphicsError> {
        let floats_per_vertex = descriptor.attributes.vertex_size() / 4;
        if floats_per_vertex == 0 || vertices.len() % floats_per_vertex != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} floats do not form whole vertices of {} bytes",
                vertices.len(),
                descriptor.attributes.vertex_size()
            )));
        }
        descriptor.max_vertices = descriptor
            .max_vertices
            .max(vertices.len() / floats_per_vertex);
        descriptor.max_indices = descriptor.max_indices.max(indices.len());

        let mut mesh = Self::new(device, descriptor)?;
        mesh.set_vertices(vertices)?;
        mesh.set_indices(indices)?;
        Ok(mesh)
    }

    /// Whether both vertices and indices live in CPU memory.
    pub fn is_client_array(&self) -> bool {
        self.vertices.kind() == VertexBackingKind::ClientArray
            && self.indices.kind() == IndexBackingKind::ClientArray
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn auto_bind(&self) -> bool {
        self.auto_bind
    }

    pub fn set_auto_bind(&mut self, auto_bind: bool) {
        self.auto_bind = auto_bind;
    }

    // ---------------------------------------------------------------------
    // Vertices
    // ---------------------------------------------------------------------

    /// Replace all vertices.
    pub fn set_vertices(&mut self, vertices: &[f32]) -> Result<(), GraphicsError> {
        self.vertices.set_contents(vertices, 0, vertices.len())
    }

    /// Replace all vertices with `vertices[offset..offset + count]`.
    pub fn set_vertices_range(
        &mut self,
        vertices: &[f32],
        offset: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        self.vertices.set_contents(vertices, offset, count)
    }

    /// Overwrite `count` floats at `target_offset` with `source[source_offset..]`.
    pub fn update_vertices(
        &mut self,
        target_offset: usize,
        source: &[f32],
        source_offset: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        self.vertices
            .update_contents(target_offset, source, source_offset, count)
    }

    /// Copy `dst.len()` floats starting at `src_offset` into `dst`.
    pub fn get_vertices(&self, src_offset: usize, dst: &mut [f32]) -> Result<(), GraphicsError> {
        self.vertices.get_contents(src_offset, dst)
    }

    pub fn vertices(&self) -> &[f32] {
        self.vertices.contents()
    }

    // ---------------------------------------------------------------------
    // Indices
    // ---------------------------------------------------------------------

    /// Replace all indices.
    pub fn set_indices(&mut self, indices: &[u32]) -> Result<(), GraphicsError> {
        self.set_indices_range(indices, 0, indices.len())
    }

    /// Replace all indices with `indices[offset..offset + count]`.
    ///
    /// Every index must address a vertex below [`max_vertices`](Self::max_vertices),
    /// or below [`num_vertices`](Self::num_vertices) for a grown client array.
    pub fn set_indices_range(
        &mut self,
        indices: &[u32],
        offset: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        check_range("index source", offset, count, indices.len())?;
        self.check_indices(&indices[offset..offset + count])?;
        self.indices.set_contents(indices, offset, count)
    }

    /// Overwrite `count` indices at `target_offset` with `source[source_offset..]`.
    pub fn update_indices(
        &mut self,
        target_offset: usize,
        source: &[u32],
        source_offset: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        check_range("index source", source_offset, count, source.len())?;
        self.check_indices(&source[source_offset..source_offset + count])?;
        self.indices
            .update_contents(target_offset, source, source_offset, count)
    }

    /// Vertex count an index must stay below. Client arrays grow past their
    /// initial capacity, so their current size counts too.
    fn vertex_limit(&self) -> usize {
        match self.vertices.kind() {
            VertexBackingKind::ClientArray => self.max_vertices().max(self.num_vertices()),
            _ => self.max_vertices(),
        }
    }

    fn check_indices(&self, indices: &[u32]) -> Result<(), GraphicsError> {
        let limit = self.vertex_limit();
        match indices.iter().find(|&&i| i as usize >= limit) {
            Some(&index) => Err(GraphicsError::out_of_range(
                "vertex index",
                index as usize,
                1,
                limit,
            )),
            None => Ok(()),
        }
    }

    /// Copy `dst.len()` indices starting at `src_offset` into `dst`.
    pub fn get_indices(&self, src_offset: usize, dst: &mut [u32]) -> Result<(), GraphicsError> {
        self.indices.get_contents(src_offset, dst)
    }

    pub fn indices(&self) -> &[u32] {
        self.indices.contents()
    }

    // ---------------------------------------------------------------------
    // Layout and sizes
    // ---------------------------------------------------------------------

    pub fn num_vertices(&self) -> usize {
        self.vertices.num_vertices()
    }

    pub fn num_indices(&self) -> usize {
        self.indices.num_indices()
    }

    pub fn max_vertices(&self) -> usize {
        self.vertices.max_vertices()
    }

    pub fn max_indices(&self) -> usize {
        self.indices.max_indices()
    }

    /// Stride of one vertex in bytes.
    pub fn vertex_size(&self) -> usize {
        self.vertices.attributes().vertex_size()
    }

    /// First attribute with the given usage.
    pub fn vertex_attribute(&self, usage: VertexUsage) -> Option<&VertexAttribute> {
        self.vertices.attributes().attribute(usage)
    }

    pub fn vertex_attributes(&self) -> &VertexAttributes {
        self.vertices.attributes()
    }

    pub fn vertex_data(&self) -> &VertexData {
        &self.vertices
    }

    pub fn index_data(&self) -> &IndexData {
        &self.indices
    }

    // ---------------------------------------------------------------------
    // Binding and drawing
    // ---------------------------------------------------------------------

    /// Bind vertices to `shader`, and indices when there are any.
    ///
    /// An invalidated `shader` is recompiled first.
    pub fn bind(&mut self, shader: &mut ShaderProgram, locations: Option<&[i32]>) {
        self.vertices.bind(shader, locations);
        if self.indices.num_indices() > 0 {
            self.indices.bind();
        }
    }

    /// Undo [`bind`](Self::bind).
    pub fn unbind(&mut self, shader: &mut ShaderProgram, locations: Option<&[i32]>) {
        self.vertices.unbind(shader, locations);
        if self.indices.num_indices() > 0 {
            self.indices.unbind();
        }
    }

    /// Draw `count` indices (or vertices, without indices) starting at `offset`.
    pub fn render(
        &mut self,
        shader: &mut ShaderProgram,
        primitive: PrimitiveType,
        offset: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        self.render_with(shader, primitive, offset, count, self.auto_bind)
    }

    /// [`render`](Self::render) with an explicit bind policy.
    pub fn render_with(
        &mut self,
        shader: &mut ShaderProgram,
        primitive: PrimitiveType,
        offset: usize,
        count: usize,
        auto_bind: bool,
    ) -> Result<(), GraphicsError> {
        if count == 0 {
            return Ok(());
        }
        let indexed = self.indices.num_indices() > 0;
        if indexed {
            check_range("index", offset, count, self.indices.num_indices())?;
        } else {
            check_range("vertex", offset, count, self.vertices.num_vertices())?;
        }

        if auto_bind {
            self.bind(shader, None);
        }
        if indexed {
            self.device.draw_elements(
                primitive,
                count as i32,
                offset * std::mem::size_of::<u32>(),
                self.indices.client_indices(),
            );
        } else {
            self.device
                .draw_arrays(primitive, offset as i32, count as i32);
        }
        if auto_bind {
            self.unbind(shader, None);
        }
        Ok(())
    }

    /// Allocate fresh device handles for both buffers after context loss.
    pub fn invalidate(&mut self) -> Result<(), GraphicsError> {
        self.vertices.invalidate()?;
        self.indices.invalidate()
    }

    // ---------------------------------------------------------------------
    // Bounds
    // ---------------------------------------------------------------------

    fn position_attribute(&self) -> Result<(usize, u32), GraphicsError> {
        let attribute = self
            .vertex_attribute(VertexUsage::POSITION)
            .ok_or(GraphicsError::MissingAttribute(VertexUsage::POSITION))?;
        if self.num_vertices() == 0 {
            return Err(GraphicsError::EmptyMesh);
        }
        Ok((attribute.offset() / 4, attribute.num_components))
    }

    fn position_at(&self, vertex: usize, offset: usize, components: u32) -> Vec3 {
        let start = vertex * self.vertex_size() / 4 + offset;
        let data = self.vertices.contents();
        let component = |c: u32| {
            if c < components {
                data[start + c as usize]
            } else {
                0.0
            }
        };
        Vec3::new(component(0), component(1), component(2))
    }

    /// Vertex numbers covered by `offset..offset + count`, walking indices
    /// when the mesh has them.
    fn covered_vertices(&self, offset: usize, count: usize) -> Result<Vec<usize>, GraphicsError> {
        let num_vertices = self.num_vertices();
        let vertices: Vec<usize> = if self.num_indices() > 0 {
            check_range("index", offset, count, self.num_indices())?;
            self.indices()[offset..offset + count]
                .iter()
                .map(|&i| i as usize)
                .collect()
        } else {
            check_range("vertex", offset, count, num_vertices)?;
            (offset..offset + count).collect()
        };
        match vertices.iter().find(|&&v| v >= num_vertices) {
            Some(&v) => Err(GraphicsError::out_of_range("vertex index", v, 1, num_vertices)),
            None => Ok(vertices),
        }
    }

    /// Bounds of all vertices.
    pub fn calculate_bounding_box(&self) -> Result<BoundingBox, GraphicsError> {
        let (offset, components) = self.position_attribute()?;
        let mut bbox = BoundingBox::default();
        for vertex in 0..self.num_vertices() {
            bbox.ext(self.position_at(vertex, offset, components));
        }
        Ok(bbox)
    }

    /// Bounds of part of the mesh, optionally transformed.
    pub fn calculate_bounding_box_range(
        &self,
        offset: usize,
        count: usize,
        transform: Option<&Mat4>,
    ) -> Result<BoundingBox, GraphicsError> {
        let mut bbox = BoundingBox::default();
        self.extend_bounding_box(&mut bbox, offset, count, transform)?;
        Ok(bbox)
    }

    /// Grow `out` by part of the mesh, optionally transformed.
    ///
    /// `offset` and `count` address indices when the mesh has them,
    /// vertices otherwise. On error `out` is left untouched.
    pub fn extend_bounding_box(
        &self,
        out: &mut BoundingBox,
        offset: usize,
        count: usize,
        transform: Option<&Mat4>,
    ) -> Result<(), GraphicsError> {
        let (position, components) = self.position_attribute()?;
        for vertex in self.covered_vertices(offset, count)? {
            let point = self.position_at(vertex, position, components);
            out.ext(match transform {
                Some(matrix) => transform_point(matrix, point),
                None => point,
            });
        }
        Ok(())
    }

    /// Largest squared distance from `center` over part of the mesh.
    pub fn calculate_radius_squared(
        &self,
        center: Vec3,
        offset: usize,
        count: usize,
        transform: Option<&Mat4>,
    ) -> Result<f32, GraphicsError> {
        let (position, components) = self.position_attribute()?;
        let radius = self
            .covered_vertices(offset, count)?
            .into_iter()
            .map(|vertex| {
                let point = self.position_at(vertex, position, components);
                let point = transform.map_or(point, |m| transform_point(m, point));
                point.distance_squared(center)
            })
            .fold(0.0f32, f32::max);
        Ok(radius)
    }

    /// Largest distance from `center` over part of the mesh.
    pub fn calculate_radius(
        &self,
        center: Vec3,
        offset: usize,
        count: usize,
        transform: Option<&Mat4>,
    ) -> Result<f32, GraphicsError> {
        self.calculate_radius_squared(center, offset, count, transform)
            .map(f32::sqrt)
    }

    // ---------------------------------------------------------------------
    // Baking transforms
    // ---------------------------------------------------------------------

    /// Apply `f` to the `usage` components of vertices `start..start + count`.
    ///
    /// Copies the range out and writes it back, so it is meant for baking
    /// rather than per-frame use.
    fn map_vertices(
        &mut self,
        usage: VertexUsage,
        start: usize,
        count: usize,
        mut f: impl FnMut(&mut [f32]),
    ) -> Result<(), GraphicsError> {
        let attribute = self
            .vertex_attribute(usage)
            .ok_or(GraphicsError::MissingAttribute(usage))?;
        let offset = attribute.offset() / 4;
        let components = attribute.num_components as usize;
        check_range("vertex", start, count, self.num_vertices())?;

        let stride = self.vertex_size() / 4;
        let mut range = vec![0.0; count * stride];
        self.get_vertices(start * stride, &mut range)?;
        for vertex in range.chunks_exact_mut(stride) {
            f(&mut vertex[offset..offset + components]);
        }
        self.update_vertices(start * stride, &range, 0, range.len())
    }

    /// Transform the positions of vertices `start..start + count`.
    pub fn transform(
        &mut self,
        matrix: &Mat4,
        start: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        self.map_vertices(VertexUsage::POSITION, start, count, |position| {
            let mut point = Vec3::ZERO;
            for (i, value) in position.iter().enumerate().take(3) {
                point[i] = *value;
            }
            let point = transform_point(matrix, point);
            for (i, value) in position.iter_mut().enumerate().take(3) {
                *value = point[i];
            }
        })
    }

    /// Transform the positions of every vertex.
    pub fn transform_all(&mut self, matrix: &Mat4) -> Result<(), GraphicsError> {
        self.transform(matrix, 0, self.num_vertices())
    }

    /// Scale the positions of every vertex.
    pub fn scale(&mut self, x: f32, y: f32, z: f32) -> Result<(), GraphicsError> {
        let factors = [x, y, z];
        self.map_vertices(VertexUsage::POSITION, 0, self.num_vertices(), |position| {
            for (value, factor) in position.iter_mut().zip(factors) {
                *value *= factor;
            }
        })
    }

    /// Transform the first texture coordinates of vertices `start..start + count`.
    pub fn transform_uv(
        &mut self,
        matrix: &Mat3,
        start: usize,
        count: usize,
    ) -> Result<(), GraphicsError> {
        self.map_vertices(VertexUsage::TEXTURE_COORDINATES, start, count, |uv| {
            let point = Vec2::new(uv[0], uv.get(1).copied().unwrap_or(0.0));
            let point = matrix.transform_point2(point);
            uv[0] = point.x;
            if let Some(v) = uv.get_mut(1) {
                *v = point.y;
            }
        })
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("label", &self.label)
            .field("vertices", &self.vertices)
            .field("indices", &self.indices)
            .field("auto_bind", &self.auto_bind)
            .finish()
    }
}

// Meshes hold the rendering context and stay on its thread.
static_assertions::assert_not_impl_any!(Mesh: Send, Sync);
