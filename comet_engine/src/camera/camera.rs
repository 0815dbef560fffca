//! Free-flying camera and the main/detached camera pair.

use glam::{Mat4, Quat, Vec3};

use crate::limits::{
    CAMERA_DRAW_DISTANCE, CAMERA_FOV_DEGREES, CAMERA_ZNEAR, LOD_TARGET_PIXEL_ERROR,
    MAX_DEPTH_PYRAMID_MIPS,
};
use super::view_data::{frustum_planes_from_projection, CameraViewData};

/// Units per second at velocity 1
const CAMERA_SPEED: f32 = 40.0;
/// Radians per pixel of mouse travel
const MOUSE_SENSITIVITY: f32 = 0.002;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// A perspective camera with yaw/pitch orientation and reverse-Z projection.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub velocity: Vec3,
    /// Set while the camera is moving or was teleported; matrices are only
    /// rebuilt when dirty
    pub dirty: bool,

    pub fov_y: f32,
    pub znear: f32,
    pub draw_distance: f32,
    pub window_width: u32,
    pub window_height: u32,

    pub projection: Mat4,
    pub view: Mat4,
    pub view_projection: Mat4,
}

impl Camera {
    pub fn new(window_width: u32, window_height: u32) -> Self {
        let fov_y = CAMERA_FOV_DEGREES.to_radians();
        let mut camera = Self {
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            velocity: Vec3::ZERO,
            dirty: true,
            fov_y,
            znear: CAMERA_ZNEAR,
            draw_distance: CAMERA_DRAW_DISTANCE,
            window_width,
            window_height,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
        };
        camera.rebuild_projection();
        camera.rebuild_view();
        camera
    }

    /// Reverse-Z infinite perspective: znear maps to depth 1.0, infinity
    /// to 0.0. Pairs with a GREATER depth test.
    fn rebuild_projection(&mut self) {
        let aspect = self.window_width as f32 / self.window_height.max(1) as f32;
        self.projection = Mat4::perspective_infinite_reverse_rh(self.fov_y, aspect, self.znear);
        self.view_projection = self.projection * self.view;
    }

    fn rebuild_view(&mut self) {
        let orientation = self.orientation();
        self.view = Mat4::from_rotation_translation(orientation, self.position).inverse();
        self.view_projection = self.projection * self.view;
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    pub fn on_window_resize(&mut self, width: u32, height: u32) {
        self.window_width = width;
        self.window_height = height;
        self.rebuild_projection();
        self.dirty = true;
    }

    pub fn set_velocity_x(&mut self, x: f32) {
        self.velocity.x = x;
        self.dirty = true;
    }

    pub fn set_velocity_z(&mut self, z: f32) {
        self.velocity.z = z;
        self.dirty = true;
    }

    /// Mouse-look. Positive `dx` turns right, positive `dy` looks down.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * MOUSE_SENSITIVITY;
        self.pitch = (self.pitch - dy * MOUSE_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.dirty = true;
    }

    /// Integrate velocity and rebuild matrices if anything changed.
    pub fn update(&mut self, delta_time: f32) {
        if !self.dirty {
            return;
        }
        if self.velocity != Vec3::ZERO {
            // Velocity is camera-local; -Z is forward
            let local = Vec3::new(self.velocity.x, self.velocity.y, -self.velocity.z);
            self.position += self.orientation() * local * CAMERA_SPEED * delta_time;
        }
        self.rebuild_view();
        if self.velocity == Vec3::ZERO {
            self.dirty = false;
        }
    }

    /// World-units-per-pixel LOD threshold at unit distance, scaled by the
    /// configured target pixel error.
    pub fn lod_target(&self) -> f32 {
        LOD_TARGET_PIXEL_ERROR * (2.0 * (self.fov_y * 0.5).tan()) / (0.5 * self.window_height as f32)
    }
}

/// Which camera the user is flying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MovingCamera {
    Main,
    Detached,
}

/// Render toggles carried into the view data each frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderFlags {
    pub occlusion_enabled: bool,
    pub lod_enabled: bool,
    pub debug_pyramid_level: u32,
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self {
            occlusion_enabled: cfg!(feature = "occlusion"),
            lod_enabled: true,
            debug_pyramid_level: 0,
        }
    }
}

/// The main camera plus a detachable debug camera.
///
/// F1 clones the main camera into the detached slot and redirects movement
/// there. The draw matrices always come from the moving camera; the culling
/// view stays on the main camera, which no longer moves, so the frustum is
/// effectively frozen in place.
pub struct CameraContainer {
    main: Camera,
    detached: Camera,
    moving: MovingCamera,
    pub flags: RenderFlags,
}

impl CameraContainer {
    pub fn new(window_width: u32, window_height: u32) -> Self {
        let main = Camera::new(window_width, window_height);
        let detached = main.clone();
        Self {
            main,
            detached,
            moving: MovingCamera::Main,
            flags: RenderFlags::default(),
        }
    }

    pub fn main_camera(&self) -> &Camera {
        &self.main
    }

    pub fn main_camera_mut(&mut self) -> &mut Camera {
        &mut self.main
    }

    pub fn moving_camera(&self) -> &Camera {
        match self.moving {
            MovingCamera::Main => &self.main,
            MovingCamera::Detached => &self.detached,
        }
    }

    pub fn moving_camera_mut(&mut self) -> &mut Camera {
        match self.moving {
            MovingCamera::Main => &mut self.main,
            MovingCamera::Detached => &mut self.detached,
        }
    }

    pub fn frustum_frozen(&self) -> bool {
        self.moving == MovingCamera::Detached
    }

    /// F1. Detach: start flying a copy while culling stays on the main
    /// camera. Re-attach: resume flying the main camera.
    pub fn toggle_frustum_freeze(&mut self) {
        match self.moving {
            MovingCamera::Main => {
                self.detached = self.main.clone();
                self.moving = MovingCamera::Detached;
            }
            MovingCamera::Detached => {
                self.moving = MovingCamera::Main;
                self.main.dirty = true;
            }
        }
    }

    pub fn toggle_occlusion(&mut self) {
        self.flags.occlusion_enabled = !self.flags.occlusion_enabled;
    }

    pub fn raise_pyramid_debug_level(&mut self) {
        if self.flags.debug_pyramid_level + 1 < MAX_DEPTH_PYRAMID_MIPS {
            self.flags.debug_pyramid_level += 1;
        }
    }

    pub fn lower_pyramid_debug_level(&mut self) {
        self.flags.debug_pyramid_level = self.flags.debug_pyramid_level.saturating_sub(1);
    }

    pub fn on_window_resize(&mut self, width: u32, height: u32) {
        self.main.on_window_resize(width, height);
        self.detached.on_window_resize(width, height);
    }

    /// Per-frame host work: integrate the moving camera.
    pub fn update(&mut self, delta_time: f32) {
        self.moving_camera_mut().update(delta_time);
    }

    /// Assemble the GPU view block. Draw matrices follow the moving camera;
    /// `cull_view` and the frustum planes follow the main camera so F1
    /// freezes culling without touching the projection path.
    pub fn build_view_data(
        &self,
        pyramid_width: f32,
        pyramid_height: f32,
        object_count: u32,
        onpc_object_count: u32,
    ) -> CameraViewData {
        let draw = self.moving_camera();
        let cull = &self.main;
        let planes = frustum_planes_from_projection(&cull.projection);

        CameraViewData {
            view: draw.view,
            projection: draw.projection,
            view_projection: draw.view_projection,
            cull_view: cull.view,
            position: draw.position.extend(1.0),
            frustum_right: planes[0],
            frustum_left: planes[1],
            frustum_top: planes[2],
            frustum_bottom: planes[3],
            proj00: cull.projection.x_axis.x,
            proj11: cull.projection.y_axis.y,
            znear: cull.znear,
            draw_distance: cull.draw_distance,
            pyramid_width,
            pyramid_height,
            lod_target: cull.lod_target(),
            lod_enabled: self.flags.lod_enabled as u32,
            occlusion_enabled: self.flags.occlusion_enabled as u32,
            debug_pyramid_level: self.flags.debug_pyramid_level,
            object_count,
            onpc_object_count,
        }
    }
}

/// Spawn-time placement used by the demo.
pub fn place_camera(camera: &mut Camera, position: Vec3) {
    camera.position = position;
    camera.dirty = true;
    camera.update(0.0);
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
