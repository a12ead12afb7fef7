//! Graphics error types.

use thiserror::Error;

use crate::mesh::VertexUsage;

/// Errors that can occur while managing geometry and shader resources.
///
/// Validation failures (ranges, capacities, missing attributes) leave the
/// resource untouched, so a render loop can log the error and keep going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// The device refused to create a resource handle.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Compiling or linking a shader program failed.
    #[error("shader compilation failed: {0}")]
    ShaderCompilationFailed(String),
    /// A copy range does not lie within the valid elements of a buffer.
    #[error("{what} range out of bounds: offset {offset} + count {count} exceeds {len}")]
    OutOfRange {
        /// Which buffer or source the range refers to.
        what: &'static str,
        /// Start of the requested range.
        offset: usize,
        /// Number of requested elements.
        count: usize,
        /// Number of valid elements.
        len: usize,
    },
    /// More elements were supplied than a device buffer can hold.
    #[error("capacity exceeded: requested {requested} elements, capacity is {capacity}")]
    CapacityExceeded {
        /// Number of elements requested.
        requested: usize,
        /// Fixed capacity of the buffer.
        capacity: usize,
    },
    /// The vertex layout has no attribute with the required usage.
    #[error("vertex layout has no {0:?} attribute")]
    MissingAttribute(VertexUsage),
    /// An operation needs at least one vertex.
    #[error("mesh has no vertices")]
    EmptyMesh,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The device does not support the requested feature.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
}

impl GraphicsError {
    /// Build an [`OutOfRange`](Self::OutOfRange) error.
    pub(crate) fn out_of_range(what: &'static str, offset: usize, count: usize, len: usize) -> Self {
        Self::OutOfRange {
            what,
            offset,
            count,
            len,
        }
    }
}

/// Check that `offset..offset + count` lies within `len` elements.
pub(crate) fn check_range(
    what: &'static str,
    offset: usize,
    count: usize,
    len: usize,
) -> Result<(), GraphicsError> {
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(GraphicsError::out_of_range(what, offset, count, len)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::EmptyMesh;
        assert_eq!(err.to_string(), "mesh has no vertices");

        let err = GraphicsError::out_of_range("vertex", 4, 8, 10);
        assert_eq!(
            err.to_string(),
            "vertex range out of bounds: offset 4 + count 8 exceeds 10"
        );

        let err = GraphicsError::MissingAttribute(VertexUsage::POSITION);
        assert!(err.to_string().contains("POSITION"));
    }

    #[test]
    fn test_check_range() {
        assert!(check_range("index", 0, 3, 3).is_ok());
        assert!(check_range("index", 2, 0, 2).is_ok());
        assert!(check_range("index", 1, 3, 3).is_err());
        assert!(check_range("index", usize::MAX, 2, 3).is_err());
    }
}
