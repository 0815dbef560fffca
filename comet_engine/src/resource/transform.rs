//! Object transforms.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

use crate::engine_warn;

/// Position + uniform scale + orientation, 32 bytes. GPU-visible.
///
/// The scale is deliberately uniform so the culling shader can scale
/// bounding-sphere radii with one multiply.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshTransform {
    pub position: [f32; 3],
    pub scale: f32,
    pub orientation: [f32; 4],
}

impl Default for MeshTransform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            scale: 1.0,
            orientation: Quat::IDENTITY.to_array(),
        }
    }
}

impl MeshTransform {
    pub fn new(position: Vec3, scale: f32, orientation: Quat) -> Self {
        Self {
            position: position.to_array(),
            scale,
            orientation: orientation.to_array(),
        }
    }

    pub fn position_vec(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn orientation_quat(&self) -> Quat {
        Quat::from_array(self.orientation)
    }

    /// Decompose a world matrix. A non-uniform scale collapses to
    /// `max(sx, sy, sz)` with a warning.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        let max_scale = scale.x.max(scale.y).max(scale.z);
        let min_scale = scale.x.min(scale.y).min(scale.z);
        if (max_scale - min_scale) > 1e-4 * max_scale.abs().max(1.0) {
            engine_warn!(
                "comet::transform",
                "non-uniform scale ({}, {}, {}) reduced to {}",
                scale.x, scale.y, scale.z, max_scale
            );
        }
        Self::new(translation, max_scale, rotation)
    }

    /// Apply this transform to a local-space point.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position_vec() + self.orientation_quat() * (point * self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_is_32_bytes() {
        assert_eq!(std::mem::size_of::<MeshTransform>(), 32);
    }

    #[test]
    fn decompose_uniform_scale() {
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::from_rotation_y(0.5),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let transform = MeshTransform::from_matrix(&matrix);
        assert!((transform.scale - 2.0).abs() < 1e-5);
        assert!((transform.position_vec() - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn decompose_non_uniform_scale_takes_max() {
        let matrix = Mat4::from_scale(Vec3::new(1.0, 3.0, 2.0));
        let transform = MeshTransform::from_matrix(&matrix);
        assert!((transform.scale - 3.0).abs() < 1e-5);
    }

    #[test]
    fn transform_point_applies_trs() {
        let transform = MeshTransform::new(
            Vec3::new(10.0, 0.0, 0.0),
            2.0,
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        );
        let moved = transform.transform_point(Vec3::X);
        // X scaled to 2, rotated onto +Y, then translated
        assert!((moved - Vec3::new(10.0, 2.0, 0.0)).length() < 1e-5);
    }
}
