//! # meshkit
//!
//! Vertex, index and shader resources for GL-style rendering contexts.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`VertexAttributes`] - Interleaved vertex layouts with computed offsets
//! - [`VertexData`] / [`IndexData`] - Geometry storage with selectable backing
//!   (client arrays, static buffers, sub-data buffers, vertex array objects)
//! - [`ShaderProgram`] - Compiled programs with introspection and location caches
//! - [`ShaderRegistry`] - Programs grouped by application tag for recompilation
//!   after context loss
//! - [`Mesh`] - Vertex and index data drawn together, with bounds helpers
//! - [`GlDevice`] - The device call surface, with an in-memory [`DummyDevice`]
//!   for testing and an optional `glow` backend
//!
//! ## Example
//!
//! ```ignore
//! use meshkit::{Mesh, MeshDescriptor, PrimitiveType, ShaderConfig, ShaderProgram, VertexAttributes};
//!
//! let device = meshkit::backend::create_dummy_device();
//! let mut shader = ShaderProgram::new(device.clone(), &ShaderConfig::default(), VS, FS)?;
//! let mut mesh = Mesh::with_data(
//!     device,
//!     MeshDescriptor::new(VertexAttributes::position_only()),
//!     &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
//!     &[0, 1, 2],
//! )?;
//!
//! shader.begin();
//! mesh.render(&mut shader, PrimitiveType::Triangles, 0, 3)?;
//! shader.end();
//! ```

pub mod backend;
pub mod buffer;
pub mod error;
pub mod math;
pub mod mesh;
pub mod shader;
pub mod types;

// Re-export main types for convenience
pub use backend::{DeviceCall, DummyDevice, GlDevice, SharedDevice};
pub use buffer::{IndexBackingKind, IndexData, VertexBackingKind, VertexData};
pub use error::GraphicsError;
pub use mesh::{BoundingBox, Mesh, MeshDescriptor, VertexAttribute, VertexAttributes, VertexUsage};
pub use shader::{ShaderConfig, ShaderId, ShaderProgram, ShaderRegistry, ShaderState};
pub use types::{
    ActiveVariable, BufferId, BufferTarget, BufferUsage, ComponentType, PrimitiveType, ProgramId,
    ShaderStage, UniformValue, VertexArrayId,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library.
///
/// Only logs the version; resources need no global setup.
pub fn init() {
    log::info!("meshkit v{} initialized", VERSION);
}

// Resources share the device through `Rc` and never leave its thread.
static_assertions::assert_not_impl_any!(VertexData: Send, Sync);
static_assertions::assert_not_impl_any!(IndexData: Send, Sync);
static_assertions::assert_not_impl_any!(ShaderProgram: Send, Sync);
static_assertions::assert_not_impl_any!(ShaderRegistry: Send, Sync);
static_assertions::assert_impl_all!(VertexAttributes: Send, Sync, Clone);
