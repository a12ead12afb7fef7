//! Axis-aligned bounding boxes.

use crate::math::Vec3;

/// Axis-aligned bounding box.
///
/// A default box is "inverted" (`min = +inf`, `max = -inf`) so that the
/// first [`ext`](Self::ext) makes it valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }
}

impl BoundingBox {
    /// Box spanning two corners given in any order.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Reset to the inverted, empty box.
    pub fn inf(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// Grow to contain `point`.
    pub fn ext(&mut self, point: Vec3) -> &mut Self {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
        self
    }

    /// Grow to contain another box.
    pub fn merge(&mut self, other: &BoundingBox) -> &mut Self {
        if other.is_valid() {
            self.ext(other.min);
            self.ext(other.max);
        }
        self
    }

    /// Whether the box contains at least one point.
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }

    /// Whether `point` lies inside or on the box.
    pub fn contains(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_invalid() {
        let mut bbox = BoundingBox::default();
        assert!(!bbox.is_valid());
        bbox.ext(Vec3::ONE);
        assert!(bbox.is_valid());
        assert_eq!(bbox.dimensions(), Vec3::ZERO);
    }

    #[test]
    fn test_ext_and_center() {
        let mut bbox = BoundingBox::default();
        bbox.ext(Vec3::new(-1.0, 0.0, 2.0)).ext(Vec3::new(3.0, 4.0, -2.0));
        assert_eq!(bbox.min, Vec3::new(-1.0, 0.0, -2.0));
        assert_eq!(bbox.max, Vec3::new(3.0, 4.0, 2.0));
        assert_eq!(bbox.center(), Vec3::new(1.0, 2.0, 0.0));
        assert!(bbox.contains(Vec3::new(0.0, 1.0, 1.0)));
        assert!(!bbox.contains(Vec3::new(0.0, 5.0, 1.0)));
    }

    #[test]
    fn test_merge_ignores_invalid() {
        let mut bbox = BoundingBox::new(Vec3::ONE, Vec3::ZERO);
        assert_eq!(bbox.min, Vec3::ZERO);
        bbox.merge(&BoundingBox::default());
        assert_eq!(bbox, BoundingBox::new(Vec3::ZERO, Vec3::ONE));
        bbox.merge(&BoundingBox::new(Vec3::splat(-1.0), Vec3::ZERO));
        assert_eq!(bbox.min, Vec3::splat(-1.0));
        bbox.inf();
        assert!(!bbox.is_valid());
    }
}
