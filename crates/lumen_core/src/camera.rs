use glam::{Mat4, Vec3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CameraError {
    #[error("viewport must be non-zero, got {width}x{height}")]
    EmptyViewport { width: u32, height: u32 },
    #[error("invalid clip planes: near = {near}, far = {far} (need 0 < near < far)")]
    InvalidClipPlanes { near: f32, far: f32 },
    #[error("field of view must be in (0, pi), got {0} rad")]
    InvalidFov(f32),
}

/// Everything the projection matrix depends on.
///
/// Two cameras with the same key produce the same projection, so anything
/// derived from the projection alone (cluster bounds) can be cached against it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionKey {
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub width: u32,
    pub height: u32,
}

impl ProjectionKey {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// A perspective camera looking from `position` towards `target`.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view, radians.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    width: u32,
    height: u32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: 45.0f32.to_radians(),
            near: 0.1,
            far: 100.0,
            width: 1280,
            height: 720, // Standard monitor
        }
    }
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Result<Self, CameraError> {
        let mut camera = Self::default();
        camera.set_viewport(width, height)?;
        Ok(camera)
    }

    pub fn looking_at(mut self, position: Vec3, target: Vec3) -> Self {
        self.position = position;
        self.target = target;
        self
    }

    pub fn with_clip_planes(mut self, near: f32, far: f32) -> Result<Self, CameraError> {
        if !(near > 0.0 && far > near) {
            return Err(CameraError::InvalidClipPlanes { near, far });
        }
        self.near = near;
        self.far = far;
        Ok(self)
    }

    pub fn with_fov(mut self, fov: f32) -> Result<Self, CameraError> {
        if !(fov > 0.0 && fov < std::f32::consts::PI) {
            return Err(CameraError::InvalidFov(fov));
        }
        self.fov = fov;
        Ok(self)
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::EmptyViewport { width, height });
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn projection_key(&self) -> ProjectionKey {
        ProjectionKey {
            fov: self.fov,
            near: self.near,
            far: self.far,
            width: self.width,
            height: self.height,
        }
    }

    /// World -> view. Right-handed, the camera looks down -Z.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// View -> clip, with the 0..1 depth range wgpu expects.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect_ratio(), self.near, self.far)
    }

    pub fn inverse_projection(&self) -> Mat4 {
        self.projection_matrix().inverse()
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Unit vector from the eye towards the target.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    /// Orbits the eye around the target by `yaw` (about world up) and `pitch`
    /// (about the camera's right axis). Pitch stops short of the poles.
    pub fn orbit(&mut self, yaw: f32, pitch: f32) {
        let offset = self.position - self.target;
        let right = offset.cross(self.up).normalize_or_zero();
        let pitched = glam::Quat::from_axis_angle(right, pitch) * offset;
        let offset = if pitched.normalize_or_zero().dot(self.up).abs() < 0.99 {
            pitched
        } else {
            offset
        };
        self.position = self.target + glam::Quat::from_axis_angle(self.up, yaw) * offset;
    }

    /// Moves the eye along the view direction, never past `near` from the target.
    pub fn zoom(&mut self, amount: f32) {
        let offset = self.position - self.target;
        let distance = (offset.length() - amount).max(self.near * 2.0);
        self.position = self.target + offset.normalize_or_zero() * distance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_empty_viewport() {
        assert_eq!(
            Camera::new(0, 720).unwrap_err(),
            CameraError::EmptyViewport { width: 0, height: 720 }
        );
    }

    #[test]
    fn rejects_inverted_clip_planes() {
        let err = Camera::default().with_clip_planes(10.0, 1.0).unwrap_err();
        assert!(matches!(err, CameraError::InvalidClipPlanes { .. }));
    }

    #[test]
    fn view_matrix_puts_target_on_negative_z() {
        let camera = Camera::default().looking_at(Vec3::new(1027.0, 183.0, 46.0), Vec3::new(-96.0, 155.0, -14.0));
        let target_vs = camera.view_matrix().transform_point3(camera.target);
        assert_relative_eq!(target_vs.x, 0.0, epsilon = 1e-2);
        assert_relative_eq!(target_vs.y, 0.0, epsilon = 1e-2);
        assert!(target_vs.z < 0.0);
    }

    #[test]
    fn projection_key_tracks_projection_inputs_only() {
        let mut camera = Camera::new(1280, 720).unwrap();
        let key = camera.projection_key();

        camera.position = Vec3::new(5.0, 5.0, 5.0);
        assert_eq!(camera.projection_key(), key);

        camera.set_viewport(1920, 1080).unwrap();
        assert_ne!(camera.projection_key(), key);
    }

    #[test]
    fn inverse_projection_round_trips_a_view_point() {
        let camera = Camera::new(1280, 720).unwrap();
        let point = glam::Vec4::new(1.5, -0.5, -7.0, 1.0);
        let clip = camera.projection_matrix() * point;
        let back = camera.inverse_projection() * clip;
        let back = back / back.w;
        assert_relative_eq!(back.x, point.x, epsilon = 1e-4);
        assert_relative_eq!(back.y, point.y, epsilon = 1e-4);
        assert_relative_eq!(back.z, point.z, epsilon = 1e-3);
    }

    #[test]
    fn zoom_never_crosses_the_target() {
        let mut camera = Camera::default();
        camera.zoom(1_000.0);
        assert!((camera.position - camera.target).length() >= camera.near);
    }

    #[test]
    fn orbit_keeps_distance_to_target() {
        let mut camera = Camera::default();
        let before = (camera.position - camera.target).length();
        camera.orbit(0.3, 0.2);
        let after = (camera.position - camera.target).length();
        assert_relative_eq!(before, after, epsilon = 1e-4);
    }
}
