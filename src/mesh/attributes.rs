//! Vertex layouts.
//!
//! A [`VertexAttributes`] is an ordered list of attributes describing one
//! interleaved vertex. Offsets are assigned once, in list order, when the
//! layout is built; the layout never changes afterwards.
//!
//! # Example
//!
//! ```ignore
//! // 12 bytes of position followed by 8 bytes of texture coordinates.
//! let layout = VertexAttributes::new(vec![
//!     VertexAttribute::position(),
//!     VertexAttribute::tex_coords(0),
//! ])?;
//! assert_eq!(layout.vertex_size(), 20);
//! ```

use std::cmp::Ordering;
use std::ops::Index;
use std::sync::OnceLock;

use crate::error::GraphicsError;
use crate::types::GlEnum;

use super::attribute::{VertexAttribute, VertexUsage};

/// Ordered vertex layout with computed offsets.
#[derive(Debug, Clone)]
pub struct VertexAttributes {
    attributes: Vec<VertexAttribute>,
    vertex_size: usize,
    mask: OnceLock<VertexUsage>,
}

impl VertexAttributes {
    /// Build a layout, assigning every attribute's byte offset.
    pub fn new(attributes: Vec<VertexAttribute>) -> Result<Self, GraphicsError> {
        if attributes.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "a vertex layout needs at least one attribute".to_string(),
            ));
        }
        let mut layout = Self {
            attributes,
            vertex_size: 0,
            mask: OnceLock::new(),
        };
        layout.vertex_size = layout.compute_offsets();
        layout.check_alignment()?;
        Ok(layout)
    }

    /// Position-only layout (12 bytes per vertex).
    pub fn position_only() -> Self {
        Self::from_known(vec![VertexAttribute::position()])
    }

    /// Position + normal layout (24 bytes per vertex).
    pub fn position_normal() -> Self {
        Self::from_known(vec![VertexAttribute::position(), VertexAttribute::normal()])
    }

    /// Position + normal + texcoord layout (32 bytes per vertex).
    pub fn position_normal_uv() -> Self {
        Self::from_known(vec![
            VertexAttribute::position(),
            VertexAttribute::normal(),
            VertexAttribute::tex_coords(0),
        ])
    }

    /// Position + packed color + texcoord layout, as used by sprite batches.
    pub fn position_color_uv() -> Self {
        Self::from_known(vec![
            VertexAttribute::position(),
            VertexAttribute::color_packed(),
            VertexAttribute::tex_coords(0),
        ])
    }

    fn from_known(attributes: Vec<VertexAttribute>) -> Self {
        let mut layout = Self {
            attributes,
            vertex_size: 0,
            mask: OnceLock::new(),
        };
        layout.vertex_size = layout.compute_offsets();
        layout
    }

    fn compute_offsets(&mut self) -> usize {
        let mut count = 0;
        for attribute in &mut self.attributes {
            attribute.offset = count;
            count += attribute.size_in_bytes();
        }
        count
    }

    /// Vertex contents are addressed in `f32` slots, so every offset and the
    /// stride must fall on a 4-byte boundary.
    fn check_alignment(&self) -> Result<(), GraphicsError> {
        if let Some(attribute) = self.attributes.iter().find(|a| a.offset % 4 != 0) {
            return Err(GraphicsError::InvalidParameter(format!(
                "attribute '{}' starts at byte {}, not a multiple of 4",
                attribute.alias, attribute.offset
            )));
        }
        if self.vertex_size % 4 != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "vertex size of {} bytes is not a multiple of 4",
                self.vertex_size
            )));
        }
        Ok(())
    }

    /// Stride of one vertex in bytes.
    pub fn vertex_size(&self) -> usize {
        self.vertex_size
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Always false for a constructed layout.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attribute at `index`.
    pub fn get(&self, index: usize) -> Option<&VertexAttribute> {
        self.attributes.get(index)
    }

    /// Iterate over the attributes in layout order.
    pub fn iter(&self) -> std::slice::Iter<'_, VertexAttribute> {
        self.attributes.iter()
    }

    /// Index of the first attribute with the given usage.
    pub fn find_by_usage(&self, usage: VertexUsage) -> Option<usize> {
        self.attributes.iter().position(|a| a.usage == usage)
    }

    /// First attribute with the given usage.
    pub fn attribute(&self, usage: VertexUsage) -> Option<&VertexAttribute> {
        self.find_by_usage(usage).map(|i| &self.attributes[i])
    }

    /// Offset in 4-byte words of the first attribute with `usage`, or `default`.
    pub fn get_offset(&self, usage: VertexUsage, default: usize) -> usize {
        self.attribute(usage).map_or(default, |a| a.offset / 4)
    }

    /// Union of all attribute usages, computed on first use.
    pub fn mask(&self) -> VertexUsage {
        *self.mask.get_or_init(|| {
            self.attributes
                .iter()
                .fold(VertexUsage::empty(), |mask, a| mask | a.usage)
        })
    }

    /// Mask in the low 32 bits, attribute count in the high 32 bits.
    pub fn mask_with_size_packed(&self) -> u64 {
        u64::from(self.mask().bits()) | ((self.attributes.len() as u64) << 32)
    }

    /// Number of texture coordinate attributes.
    pub fn texture_coordinates(&self) -> usize {
        self.count_usage(VertexUsage::TEXTURE_COORDINATES)
    }

    /// Number of bone weight attributes.
    pub fn bone_weights(&self) -> usize {
        self.count_usage(VertexUsage::BONE_WEIGHT)
    }

    fn count_usage(&self, usage: VertexUsage) -> usize {
        self.attributes.iter().filter(|a| a.usage == usage).count()
    }

    /// Total order over layouts used to sort and deduplicate layout variants.
    ///
    /// Orders by attribute count, then mask, then compares attributes from
    /// last to first by usage, unit, component count, normalization and
    /// component type. Two layouts that compare `Equal` here may still
    /// differ in their aliases.
    pub fn compare_layout(&self, other: &Self) -> Ordering {
        self.attributes
            .len()
            .cmp(&other.attributes.len())
            .then_with(|| self.mask().bits().cmp(&other.mask().bits()))
            .then_with(|| {
                self.attributes
                    .iter()
                    .rev()
                    .zip(other.attributes.iter().rev())
                    .map(|(a, b)| {
                        a.usage
                            .bits()
                            .cmp(&b.usage.bits())
                            .then(a.unit.cmp(&b.unit))
                            .then(a.num_components.cmp(&b.num_components))
                            .then(a.normalized.cmp(&b.normalized))
                            .then(a.component_type.gl_enum().cmp(&b.component_type.gl_enum()))
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
    }
}

impl PartialEq for VertexAttributes {
    fn eq(&self, other: &Self) -> bool {
        self.attributes == other.attributes
    }
}

impl Eq for VertexAttributes {}

impl Index<usize> for VertexAttributes {
    type Output = VertexAttribute;

    fn index(&self, index: usize) -> &Self::Output {
        &self.attributes[index]
    }
}

impl<'a> IntoIterator for &'a VertexAttributes {
    type Item = &'a VertexAttribute;
    type IntoIter = std::slice::Iter<'a, VertexAttribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComponentType;

    #[test]
    fn test_offsets_and_stride() {
        let layout = VertexAttributes::new(vec![
            VertexAttribute::position(),
            VertexAttribute::color_packed(),
            VertexAttribute::tex_coords(0),
        ])
        .unwrap();

        let offsets: Vec<_> = layout.iter().map(VertexAttribute::offset).collect();
        assert_eq!(offsets, vec![0, 12, 16]);
        assert_eq!(layout.vertex_size(), 24);
        assert_eq!(
            layout.vertex_size(),
            layout.iter().map(VertexAttribute::size_in_bytes).sum::<usize>()
        );
    }

    #[test]
    fn test_empty_layout_rejected() {
        assert!(VertexAttributes::new(Vec::new()).is_err());
    }

    #[test]
    fn test_unaligned_layout_rejected() {
        let short = |alias: &str| {
            VertexAttribute::with_type(VertexUsage::GENERIC, 1, ComponentType::Short, false, alias)
                .unwrap()
        };
        let err = VertexAttributes::new(vec![short("a_value")]).unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidParameter(_)));

        let err = VertexAttributes::new(vec![short("a_first"), VertexAttribute::position()])
            .unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidParameter(msg) if msg.contains("a_position")));

        let paired = VertexAttributes::new(vec![short("a_first"), short("a_second")]).unwrap();
        assert_eq!(paired.vertex_size(), 4);
    }

    #[test]
    fn test_find_and_offset() {
        let layout = VertexAttributes::position_normal_uv();
        assert_eq!(layout.find_by_usage(VertexUsage::NORMAL), Some(1));
        assert_eq!(layout.find_by_usage(VertexUsage::TANGENT), None);
        assert_eq!(layout.get_offset(VertexUsage::TEXTURE_COORDINATES, 0), 6);
        assert_eq!(layout.get_offset(VertexUsage::TANGENT, 99), 99);
    }

    #[test]
    fn test_mask() {
        let layout = VertexAttributes::position_normal_uv();
        let expected = VertexUsage::POSITION | VertexUsage::NORMAL | VertexUsage::TEXTURE_COORDINATES;
        assert_eq!(layout.mask(), expected);
        assert_eq!(layout.mask(), expected);
        assert_eq!(
            layout.mask_with_size_packed(),
            u64::from(expected.bits()) | (3 << 32)
        );
    }

    #[test]
    fn test_counts() {
        let layout = VertexAttributes::new(vec![
            VertexAttribute::position(),
            VertexAttribute::tex_coords(0),
            VertexAttribute::tex_coords(1),
            VertexAttribute::bone_weight(0),
        ])
        .unwrap();
        assert_eq!(layout.texture_coordinates(), 2);
        assert_eq!(layout.bone_weights(), 1);
    }

    #[test]
    fn test_equality() {
        let a = VertexAttributes::position_normal();
        let b = VertexAttributes::position_normal();
        assert_eq!(a, b);
        assert_eq!(a.mask(), b.mask());
        assert_ne!(a, VertexAttributes::position_only());
    }

    #[test]
    fn test_compare_layout() {
        let short = VertexAttributes::position_only();
        let long = VertexAttributes::position_normal();
        assert_eq!(short.compare_layout(&long), Ordering::Less);
        assert_eq!(long.compare_layout(&short), Ordering::Greater);
        assert_eq!(long.compare_layout(&long.clone()), Ordering::Equal);

        // Same count, different mask.
        let with_color = VertexAttributes::new(vec![
            VertexAttribute::position(),
            VertexAttribute::color_unpacked(),
        ])
        .unwrap();
        assert_eq!(with_color.compare_layout(&long), Ordering::Less);

        // Same mask, last attribute decides.
        let uv0 = VertexAttributes::new(vec![
            VertexAttribute::position(),
            VertexAttribute::tex_coords(0),
        ])
        .unwrap();
        let uv1 = VertexAttributes::new(vec![
            VertexAttribute::position(),
            VertexAttribute::tex_coords(1),
        ])
        .unwrap();
        assert_eq!(uv0.compare_layout(&uv1), Ordering::Less);

        // Normalized sorts after non-normalized.
        let plain = VertexAttributes::new(vec![VertexAttribute::with_type(
            VertexUsage::GENERIC,
            4,
            ComponentType::UnsignedByte,
            false,
            "a_data",
        )
        .unwrap()])
        .unwrap();
        let normalized = VertexAttributes::new(vec![VertexAttribute::with_type(
            VertexUsage::GENERIC,
            4,
            ComponentType::UnsignedByte,
            true,
            "a_data",
        )
        .unwrap()])
        .unwrap();
        assert_eq!(normalized.compare_layout(&plain), Ordering::Greater);
    }

    #[test]
    fn test_compare_ignores_alias() {
        let a = VertexAttributes::new(vec![
            VertexAttribute::new(VertexUsage::GENERIC, 2, "a_foo").unwrap()
        ])
        .unwrap();
        let b = VertexAttributes::new(vec![
            VertexAttribute::new(VertexUsage::GENERIC, 2, "a_bar").unwrap()
        ])
        .unwrap();
        assert_eq!(a.compare_layout(&b), Ordering::Equal);
        assert_ne!(a, b);
    }
}
