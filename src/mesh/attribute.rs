//! Single vertex attribute descriptions.
//!
//! A [`VertexAttribute`] names one field of a vertex: what it means
//! ([`VertexUsage`]), how many components it has, how those components are
//! stored, and the alias under which shaders see it. Its byte offset inside
//! the vertex is assigned when the attribute becomes part of a
//! [`VertexAttributes`](super::VertexAttributes) layout.

use bitflags::bitflags;

use crate::error::GraphicsError;
use crate::shader::{
    BINORMAL_ATTRIBUTE, BONEWEIGHT_ATTRIBUTE, COLOR_ATTRIBUTE, NORMAL_ATTRIBUTE,
    POSITION_ATTRIBUTE, TANGENT_ATTRIBUTE, TEXCOORD_ATTRIBUTE,
};
use crate::types::ComponentType;

bitflags! {
    /// Semantic meaning of a vertex attribute.
    ///
    /// Each attribute carries exactly one bit; a layout's mask is the union
    /// of its attributes' bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct VertexUsage: u32 {
        /// Vertex position.
        const POSITION = 1;
        /// Color as four floats.
        const COLOR_UNPACKED = 1 << 1;
        /// Color as four normalized bytes packed into one float slot.
        const COLOR_PACKED = 1 << 2;
        /// Vertex normal.
        const NORMAL = 1 << 3;
        /// Texture coordinates for one texture unit.
        const TEXTURE_COORDINATES = 1 << 4;
        /// Any other per-vertex data.
        const GENERIC = 1 << 5;
        /// Bone index and weight pair for one bone slot.
        const BONE_WEIGHT = 1 << 6;
        /// Tangent vector.
        const TANGENT = 1 << 7;
        /// Binormal vector.
        const BINORMAL = 1 << 8;
    }
}

impl VertexUsage {
    /// Position of the lowest set bit, used to build attribute keys.
    pub fn index(&self) -> u32 {
        self.bits().trailing_zeros()
    }
}

/// A single vertex attribute description.
#[derive(Debug, Clone)]
pub struct VertexAttribute {
    /// Semantic meaning of this attribute.
    pub usage: VertexUsage,
    /// Number of components (1-4).
    pub num_components: u32,
    /// Storage type of each component.
    pub component_type: ComponentType,
    /// Whether integer components are normalized when read by the shader.
    pub normalized: bool,
    /// Name of the matching shader input.
    pub alias: String,
    /// Slot for attributes that repeat, such as texture coordinates.
    pub unit: u32,
    pub(crate) offset: usize,
}

impl VertexAttribute {
    /// Create an attribute whose component type follows its usage.
    ///
    /// [`VertexUsage::COLOR_PACKED`] is stored as normalized unsigned bytes,
    /// everything else as floats.
    pub fn new(
        usage: VertexUsage,
        num_components: u32,
        alias: impl Into<String>,
    ) -> Result<Self, GraphicsError> {
        let packed = usage == VertexUsage::COLOR_PACKED;
        let component_type = if packed {
            ComponentType::UnsignedByte
        } else {
            ComponentType::Float
        };
        Self::with_type(usage, num_components, component_type, packed, alias)
    }

    /// Create an attribute with an explicit component type.
    pub fn with_type(
        usage: VertexUsage,
        num_components: u32,
        component_type: ComponentType,
        normalized: bool,
        alias: impl Into<String>,
    ) -> Result<Self, GraphicsError> {
        if !(1..=4).contains(&num_components) {
            return Err(GraphicsError::InvalidParameter(format!(
                "attribute needs 1 to 4 components, got {num_components}"
            )));
        }
        if usage.bits().count_ones() != 1 {
            return Err(GraphicsError::InvalidParameter(format!(
                "attribute usage must be a single flag, got {usage:?}"
            )));
        }
        Ok(Self::raw(
            usage,
            num_components,
            component_type,
            normalized,
            alias.into(),
        ))
    }

    fn raw(
        usage: VertexUsage,
        num_components: u32,
        component_type: ComponentType,
        normalized: bool,
        alias: String,
    ) -> Self {
        Self {
            usage,
            num_components,
            component_type,
            normalized,
            alias,
            unit: 0,
            offset: 0,
        }
    }

    /// Set the unit (texture or bone slot).
    pub fn with_unit(mut self, unit: u32) -> Self {
        self.unit = unit;
        self
    }

    /// Three float position components, `a_position`.
    pub fn position() -> Self {
        Self::raw(
            VertexUsage::POSITION,
            3,
            ComponentType::Float,
            false,
            POSITION_ATTRIBUTE.to_string(),
        )
    }

    /// Four float color components, `a_color`.
    pub fn color_unpacked() -> Self {
        Self::raw(
            VertexUsage::COLOR_UNPACKED,
            4,
            ComponentType::Float,
            false,
            COLOR_ATTRIBUTE.to_string(),
        )
    }

    /// Four normalized byte color components, `a_color`.
    pub fn color_packed() -> Self {
        Self::raw(
            VertexUsage::COLOR_PACKED,
            4,
            ComponentType::UnsignedByte,
            true,
            COLOR_ATTRIBUTE.to_string(),
        )
    }

    /// Three float normal components, `a_normal`.
    pub fn normal() -> Self {
        Self::raw(
            VertexUsage::NORMAL,
            3,
            ComponentType::Float,
            false,
            NORMAL_ATTRIBUTE.to_string(),
        )
    }

    /// Two float texture coordinates, `a_texCoord<unit>`.
    pub fn tex_coords(unit: u32) -> Self {
        Self::raw(
            VertexUsage::TEXTURE_COORDINATES,
            2,
            ComponentType::Float,
            false,
            format!("{TEXCOORD_ATTRIBUTE}{unit}"),
        )
        .with_unit(unit)
    }

    /// Bone index and weight, `a_boneWeight<unit>`.
    pub fn bone_weight(unit: u32) -> Self {
        Self::raw(
            VertexUsage::BONE_WEIGHT,
            2,
            ComponentType::Float,
            false,
            format!("{BONEWEIGHT_ATTRIBUTE}{unit}"),
        )
        .with_unit(unit)
    }

    /// Three float tangent components, `a_tangent`.
    pub fn tangent() -> Self {
        Self::raw(
            VertexUsage::TANGENT,
            3,
            ComponentType::Float,
            false,
            TANGENT_ATTRIBUTE.to_string(),
        )
    }

    /// Three float binormal components, `a_binormal`.
    pub fn binormal() -> Self {
        Self::raw(
            VertexUsage::BINORMAL,
            3,
            ComponentType::Float,
            false,
            BINORMAL_ATTRIBUTE.to_string(),
        )
    }

    /// Byte offset inside the vertex.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size in bytes of this attribute.
    pub fn size_in_bytes(&self) -> usize {
        self.component_type.size() * self.num_components as usize
    }

    /// Key combining usage and unit, unique within a well-formed layout.
    pub fn key(&self) -> u32 {
        (self.usage.index() << 8) + (self.unit & 0xFF)
    }
}

impl PartialEq for VertexAttribute {
    fn eq(&self, other: &Self) -> bool {
        self.usage == other.usage
            && self.num_components == other.num_components
            && self.component_type == other.component_type
            && self.normalized == other.normalized
            && self.alias == other.alias
            && self.unit == other.unit
    }
}

impl Eq for VertexAttribute {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(VertexAttribute::position().size_in_bytes(), 12);
        assert_eq!(VertexAttribute::color_unpacked().size_in_bytes(), 16);
        assert_eq!(VertexAttribute::color_packed().size_in_bytes(), 4);
        assert_eq!(VertexAttribute::tex_coords(0).size_in_bytes(), 8);

        let shorts = VertexAttribute::with_type(
            VertexUsage::GENERIC,
            3,
            ComponentType::Short,
            true,
            "a_shorts",
        )
        .unwrap();
        assert_eq!(shorts.size_in_bytes(), 6);
    }

    #[test]
    fn test_aliases() {
        assert_eq!(VertexAttribute::tex_coords(1).alias, "a_texCoord1");
        assert_eq!(VertexAttribute::tex_coords(1).unit, 1);
        assert_eq!(VertexAttribute::bone_weight(2).alias, "a_boneWeight2");
        assert_eq!(VertexAttribute::normal().alias, "a_normal");
    }

    #[test]
    fn test_new_picks_component_type() {
        let packed = VertexAttribute::new(VertexUsage::COLOR_PACKED, 4, "a_color").unwrap();
        assert_eq!(packed.component_type, ComponentType::UnsignedByte);
        assert!(packed.normalized);
        assert_eq!(packed, VertexAttribute::color_packed());

        let generic = VertexAttribute::new(VertexUsage::GENERIC, 1, "a_weight").unwrap();
        assert_eq!(generic.component_type, ComponentType::Float);
    }

    #[test]
    fn test_component_count_rejected() {
        assert!(VertexAttribute::new(VertexUsage::GENERIC, 0, "a_x").is_err());
        assert!(VertexAttribute::new(VertexUsage::GENERIC, 5, "a_x").is_err());
        assert!(VertexAttribute::new(VertexUsage::POSITION | VertexUsage::NORMAL, 3, "a_x").is_err());
    }

    #[test]
    fn test_equality_ignores_offset() {
        let mut a = VertexAttribute::normal();
        a.offset = 12;
        assert_eq!(a, VertexAttribute::normal());
        assert_ne!(VertexAttribute::tex_coords(0), VertexAttribute::tex_coords(1));
    }

    #[test]
    fn test_key() {
        assert_eq!(VertexAttribute::position().key(), 0);
        assert_eq!(VertexAttribute::tex_coords(3).key(), (4 << 8) + 3);
    }
}
