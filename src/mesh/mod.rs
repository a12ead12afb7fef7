//! Mesh types.
//!
//! This module provides the vertex layout model and the mesh built on it:
//!
//! - [`VertexAttribute`] / [`VertexAttributes`] - describe one interleaved vertex
//! - [`Mesh`] - vertex and index data drawn with a [`ShaderProgram`](crate::shader::ShaderProgram)
//! - [`BoundingBox`] - bounds computed from a mesh's positions

mod attribute;
mod attributes;
mod bounds;
mod data;

pub use attribute::{VertexAttribute, VertexUsage};
pub use attributes::VertexAttributes;
pub use bounds::BoundingBox;
pub use data::{Mesh, MeshDescriptor};
