//! Math utilities and types
//!
//! Provides the math types used by the scene graph and render pipeline.
//! All types are thin aliases over `nalgebra` using column vectors, so a
//! point is transformed as `matrix * point`.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Squared length below which a vector is treated as zero length.
///
/// Equivalent to a length threshold of `1e-6` without the square root.
pub const ZERO_LENGTH_SQUARED: f32 = 1e-12;

/// Returns true when `v` is too short to be normalized.
pub fn is_near_zero(v: &Vec3) -> bool {
    v.norm_squared() < ZERO_LENGTH_SQUARED
}

/// Composes two rotations and re-normalizes the result to stop drift.
pub fn compose_rotation(lhs: &Quat, rhs: &Quat) -> Quat {
    Quat::new_normalize((lhs * rhs).into_inner())
}

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix (translation * rotation * scale)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Combine this (parent) transform with a child-local transform
    ///
    /// Scale multiplies component-wise, rotations compose by quaternion
    /// product and the child position is scaled, rotated and offset by this
    /// transform.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * self.scale.component_mul(&other.position),
            rotation: compose_rotation(&self.rotation, &other.rotation),
            scale: self.scale.component_mul(&other.scale),
        }
    }

    /// Map a world-space point into the local space of this transform
    pub fn inverse_transform_point(&self, point: &Vec3) -> Vec3 {
        let local = self.rotation.inverse() * (point - self.position);
        local.component_div(&self.scale)
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }
}

/// Flatten a matrix into column-major floats for upload to the device
pub fn mat4_to_cols(matrix: &Mat4) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(matrix.as_slice());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_combine_applies_parent_scale_then_rotation() {
        let parent = Transform {
            position: Vec3::new(1.0, 0.0, 0.0),
            rotation: Quat::from_axis_angle(&Vec3::y_axis(), constants::HALF_PI),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };
        let child = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));

        let world = parent.combine(&child);
        assert_relative_eq!(world.position, Vec3::new(1.0, 0.0, -2.0), epsilon = 1e-5);
        assert_relative_eq!(world.scale, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_matrix_matches_combine() {
        let transform = Transform {
            position: Vec3::new(3.0, -1.0, 2.0),
            rotation: Quat::from_axis_angle(&Vec3::x_axis(), 0.7),
            scale: Vec3::new(1.0, 2.0, 0.5),
        };
        let local = Vec3::new(0.5, 1.0, -2.0);

        let via_matrix = transform.to_matrix().transform_point(&Point3::from(local));
        let via_combine = transform.combine(&Transform::from_position(local)).position;
        assert_relative_eq!(via_matrix.coords, via_combine, epsilon = 1e-5);
    }

    #[test]
    fn test_inverse_transform_point_round_trips() {
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_axis_angle(&Vec3::z_axis(), 1.1),
            scale: Vec3::new(2.0, 3.0, 4.0),
        };
        let local = Vec3::new(-1.0, 0.25, 2.0);
        let world = transform.combine(&Transform::from_position(local)).position;
        assert_relative_eq!(transform.inverse_transform_point(&world), local, epsilon = 1e-5);
    }

    #[test]
    fn test_near_zero_threshold() {
        assert!(is_near_zero(&Vec3::new(1e-7, 0.0, 0.0)));
        assert!(!is_near_zero(&Vec3::new(1e-5, 0.0, 0.0)));
    }
}
