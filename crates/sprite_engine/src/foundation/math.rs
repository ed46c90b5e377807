//! Math utilities and types
//!
//! Provides the math types used by the 2D renderer: nalgebra aliases for
//! uniform data and `Mat2d`, the six-float affine transform applied to
//! sprite vertices on the CPU.

pub use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 2D affine transform stored as `[a, b, c, d, tx, ty]`.
///
/// A point transforms as `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`.
/// This is the layout consumed directly by the batch vertex writers, which
/// read the six elements without going through a full matrix type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat2d(pub [f32; 6]);

impl Mat2d {
    /// The identity transform
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// Create an identity transform
    #[must_use]
    pub const fn identity() -> Self {
        Self::IDENTITY
    }

    /// Create a translation transform
    #[must_use]
    pub const fn translation(x: f32, y: f32) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, x, y])
    }

    /// Create a scaling transform
    #[must_use]
    pub const fn scaling(sx: f32, sy: f32) -> Self {
        Self([sx, 0.0, 0.0, sy, 0.0, 0.0])
    }

    /// Create a rotation transform (angle in radians)
    #[must_use]
    pub fn rotation(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Self([c, s, -s, c, 0.0, 0.0])
    }

    /// Check whether this is exactly the identity transform
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.0 == Self::IDENTITY.0
    }

    /// Multiply two transforms; the result applies `other` first, then `self`
    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        let a = &self.0;
        let b = &other.0;
        Self([
            a[0] * b[0] + a[2] * b[1],
            a[1] * b[0] + a[3] * b[1],
            a[0] * b[2] + a[2] * b[3],
            a[1] * b[2] + a[3] * b[3],
            a[0] * b[4] + a[2] * b[5] + a[4],
            a[1] * b[4] + a[3] * b[5] + a[5],
        ])
    }

    /// Translate this transform in its local space
    #[must_use]
    pub fn translate(&self, x: f32, y: f32) -> Self {
        self.mul(&Self::translation(x, y))
    }

    /// Scale this transform in its local space
    #[must_use]
    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        self.mul(&Self::scaling(sx, sy))
    }

    /// Rotate this transform in its local space (angle in radians)
    #[must_use]
    pub fn rotate(&self, radians: f32) -> Self {
        self.mul(&Self::rotation(radians))
    }

    /// Apply this transform to a point
    #[must_use]
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        let t = &self.0;
        (t[0] * x + t[2] * y + t[4], t[1] * x + t[3] * y + t[5])
    }
}

impl Default for Mat2d {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Orthographic projection for screen-space 2D rendering.
///
/// Maps `(0, 0)` to the top-left corner and `(width, height)` to the
/// bottom-right, with the depth attribute passing through untouched for
/// values well inside the clip range.
#[must_use]
pub fn ortho_projection(width: f32, height: f32) -> Mat4 {
    Mat4::new_orthographic(0.0, width, height, 0.0, -1000.0, 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn test_identity_transform_point() {
        let (x, y) = Mat2d::identity().transform_point(3.0, -7.5);
        assert_relative_eq!(x, 3.0, epsilon = EPSILON);
        assert_relative_eq!(y, -7.5, epsilon = EPSILON);
    }

    #[test]
    fn test_translation() {
        let (x, y) = Mat2d::translation(10.0, 20.0).transform_point(1.0, 2.0);
        assert_relative_eq!(x, 11.0, epsilon = EPSILON);
        assert_relative_eq!(y, 22.0, epsilon = EPSILON);
    }

    #[test]
    fn test_rotation_quarter_turn() {
        let t = Mat2d::rotation(std::f32::consts::FRAC_PI_2);
        let (x, y) = t.transform_point(1.0, 0.0);
        assert_relative_eq!(x, 0.0, epsilon = EPSILON);
        assert_relative_eq!(y, 1.0, epsilon = EPSILON);
    }

    #[test]
    fn test_mul_applies_right_operand_first() {
        let scale_then_translate = Mat2d::translation(5.0, 0.0).mul(&Mat2d::scaling(2.0, 2.0));
        let (x, y) = scale_then_translate.transform_point(1.0, 1.0);
        assert_relative_eq!(x, 7.0, epsilon = EPSILON);
        assert_relative_eq!(y, 2.0, epsilon = EPSILON);
    }

    #[test]
    fn test_is_identity() {
        assert!(Mat2d::identity().is_identity());
        assert!(!Mat2d::translation(0.1, 0.0).is_identity());
        assert!(!Mat2d::rotation(0.3).is_identity());
    }

    #[test]
    fn test_ortho_projection_corners() {
        let proj = ortho_projection(800.0, 600.0);
        let top_left = proj.transform_point(&nalgebra::Point3::new(0.0, 0.0, 0.0));
        let bottom_right = proj.transform_point(&nalgebra::Point3::new(800.0, 600.0, 0.0));
        assert_relative_eq!(top_left.x, -1.0, epsilon = EPSILON);
        assert_relative_eq!(top_left.y, 1.0, epsilon = EPSILON);
        assert_relative_eq!(bottom_right.x, 1.0, epsilon = EPSILON);
        assert_relative_eq!(bottom_right.y, -1.0, epsilon = EPSILON);
    }
}
