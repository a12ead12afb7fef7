//! Math helpers for the flat matrix layout consumed by meshes.
//!
//! Transforms are column-major: element `M_rc` (row `r`, column `c`) lives at
//! flat index `c * 4 + r`, which is also the layout of [`glam::Mat4`].

pub use glam::{Mat3, Mat4, Vec2, Vec3};

pub const M00: usize = 0;
pub const M10: usize = 1;
pub const M20: usize = 2;
pub const M30: usize = 3;
pub const M01: usize = 4;
pub const M11: usize = 5;
pub const M21: usize = 6;
pub const M31: usize = 7;
pub const M02: usize = 8;
pub const M12: usize = 9;
pub const M22: usize = 10;
pub const M32: usize = 11;
pub const M03: usize = 12;
pub const M13: usize = 13;
pub const M23: usize = 14;
pub const M33: usize = 15;

/// Build a matrix from 16 column-major floats.
pub fn mat4_from_column_major(values: &[f32; 16]) -> Mat4 {
    Mat4::from_cols_array(values)
}

/// Transform a point by the affine part of `matrix` (no perspective divide).
pub fn transform_point(matrix: &Mat4, point: Vec3) -> Vec3 {
    matrix.transform_point3(point)
}
