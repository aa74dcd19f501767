//! Planar math helpers layered on top of `glam`.

use glam::{Mat2, Mat3, Vec2, Vec3};

/// Scalar cross product of two vectors (z component of the 3D cross).
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a vector with a scalar: `v × s`.
#[inline]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Cross product of a scalar with a vector: `s × v`.
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Counter-clockwise perpendicular.
#[inline]
pub fn left_perp(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// Clockwise perpendicular.
#[inline]
pub fn right_perp(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

/// Solves `k * x = b`, returning zero for a singular matrix.
pub fn solve22(k: Mat2, b: Vec2) -> Vec2 {
    let (a11, a12, a21, a22) = (k.x_axis.x, k.y_axis.x, k.x_axis.y, k.y_axis.y);
    let mut det = a11 * a22 - a12 * a21;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
}

/// Solves `k * x = b` for a 3x3 system, returning zero for a singular matrix.
pub fn solve33(k: Mat3, b: Vec3) -> Vec3 {
    let (ex, ey, ez) = (k.x_axis, k.y_axis, k.z_axis);
    let mut det = ex.dot(ey.cross(ez));
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec3::new(
        det * b.dot(ey.cross(ez)),
        det * ex.dot(b.cross(ez)),
        det * ex.dot(ey.cross(b)),
    )
}

/// Inverse of a 2x2 matrix, zero when singular.
pub fn inverse22(k: Mat2) -> Mat2 {
    let det = k.determinant();
    if det == 0.0 || !det.is_finite() {
        return Mat2::ZERO;
    }
    k.inverse()
}

/// Reciprocal that maps zero and non-finite inputs to zero.
#[inline]
pub fn safe_recip(value: f32) -> f32 {
    if value > f32::EPSILON && value.is_finite() {
        1.0 / value
    } else {
        0.0
    }
}
