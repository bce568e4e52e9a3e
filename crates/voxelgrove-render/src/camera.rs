//! Viewpoint used for culling and ordering visible models.

use glam::{Mat4, Vec3};
use voxelgrove_core::Frustum;

/// Perspective viewpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Unit view direction
    pub direction: Vec3,
    /// Vertical field of view in radians
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            fov: std::f32::consts::FRAC_PI_3,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Camera at `position` facing `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            direction: (target - position).normalize_or(Vec3::NEG_Z),
            ..Default::default()
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        // Looking straight up or down needs another up vector.
        let up = if self.direction.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        Mat4::look_to_rh(self.position, self.direction, up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Culling volume of the current view.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(self.view_projection_matrix())
    }
}
