//! Camera state consumed by the streaming controller

use glam::{Mat4, Vec3};

/// Per-frame camera snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// World-space eye position
    pub position: Vec3,

    /// Camera-to-world transform
    pub world: Mat4,

    pub projection: Mat4,
}

impl CameraView {
    pub fn new(world: Mat4, projection: Mat4) -> Self {
        Self {
            position: world.w_axis.truncate(),
            world,
            projection,
        }
    }

    /// Snapshot of a camera at `eye` looking at `target`
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, projection: Mat4) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        Self {
            position: eye,
            world: view.inverse(),
            projection,
        }
    }

    /// projection × world⁻¹
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.world.inverse()
    }
}

/// Anything that can report the current camera pose
pub trait CameraProvider {
    fn view(&self) -> CameraView;
}

impl CameraProvider for CameraView {
    fn view(&self) -> CameraView {
        *self
    }
}

/// Perspective camera orbiting a ground target
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub target: Vec3,

    /// Vertical field of view in degrees
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,

    /// Viewport size in pixels
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl PerspectiveCamera {
    pub fn new(fov_y: f32, viewport_width: u32, viewport_height: u32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 50.0, 0.0),
            target: Vec3::ZERO,
            fov_y,
            near,
            far,
            viewport_width,
            viewport_height,
        }
    }

    /// Update viewport size
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport_width = width;
        self.viewport_height = height;
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.viewport_height == 0 {
            1.0
        } else {
            self.viewport_width as f32 / self.viewport_height as f32
        }
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y.to_radians(),
            self.aspect_ratio(),
            self.near,
            self.far,
        )
    }

    /// Move camera and target together along the ground plane
    pub fn pan(&mut self, dx: f32, dz: f32) {
        let delta = Vec3::new(dx, 0.0, dz);
        self.position += delta;
        self.target += delta;
    }

    /// Move toward (positive) or away from the target, never past it
    pub fn dolly(&mut self, amount: f32) {
        let offset = self.position - self.target;
        let distance = offset.length();
        if distance <= f32::EPSILON {
            return;
        }
        let new_distance = (distance - amount).max(self.near);
        self.position = self.target + offset / distance * new_distance;
    }

    fn up_vector(&self) -> Vec3 {
        // Looking straight down makes +Y degenerate
        let forward = (self.target - self.position).normalize_or_zero();
        if forward.cross(Vec3::Y).length_squared() < 1.0e-6 {
            Vec3::NEG_Z
        } else {
            Vec3::Y
        }
    }
}

impl CameraProvider for PerspectiveCamera {
    fn view(&self) -> CameraView {
        CameraView::look_at(self.position, self.target, self.up_vector(), self.projection())
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(45.0, 800, 600, 1.0, 1000.0)
    }
}
