//! Unit tests for the camera and the main/detached container.

use glam::{Vec3, Vec4};
use super::*;

#[test]
fn projection_is_reverse_z() {
    let camera = Camera::new(1280, 720);
    // A point on the near plane projects to depth 1, a distant one to ~0
    let near = camera.projection * Vec4::new(0.0, 0.0, -camera.znear, 1.0);
    assert!((near.z / near.w - 1.0).abs() < 1e-4);

    let far = camera.projection * Vec4::new(0.0, 0.0, -10_000.0, 1.0);
    assert!(far.z / far.w < 1e-3);
}

#[test]
fn resize_updates_the_aspect_ratio() {
    let mut camera = Camera::new(1280, 720);
    let before = camera.projection.x_axis.x;
    camera.on_window_resize(720, 1280);
    assert!(camera.projection.x_axis.x != before);
}

#[test]
fn velocity_moves_the_camera_forward() {
    let mut camera = Camera::new(1280, 720);
    camera.set_velocity_z(1.0);
    camera.update(1.0);
    // Forward is -Z at yaw 0
    assert!(camera.position.z < 0.0);
    assert_eq!(camera.position.x, 0.0);
}

#[test]
fn released_velocity_clears_the_dirty_flag() {
    let mut camera = Camera::new(1280, 720);
    camera.set_velocity_z(1.0);
    camera.update(0.016);
    camera.set_velocity_z(0.0);
    camera.update(0.016);
    assert!(!camera.dirty);
}

#[test]
fn freeze_keeps_the_cull_view_still() {
    let mut cameras = CameraContainer::new(1280, 720);
    let frozen_view = cameras.main_camera().view;

    cameras.toggle_frustum_freeze();
    assert!(cameras.frustum_frozen());

    // Fly the detached camera away
    cameras.moving_camera_mut().set_velocity_z(1.0);
    cameras.update(1.0);

    let view_data = cameras.build_view_data(1024.0, 512.0, 0, 0);
    assert_eq!(view_data.cull_view, frozen_view);
    assert!(view_data.view != frozen_view, "draw view must keep moving");
}

#[test]
fn unfreeze_restores_the_main_camera() {
    let mut cameras = CameraContainer::new(1280, 720);
    cameras.toggle_frustum_freeze();
    cameras.moving_camera_mut().set_velocity_z(1.0);
    cameras.update(1.0);
    cameras.toggle_frustum_freeze();
    assert!(!cameras.frustum_frozen());

    let view_data = cameras.build_view_data(1024.0, 512.0, 0, 0);
    assert_eq!(view_data.cull_view, view_data.view);
}

#[test]
fn pyramid_debug_level_is_clamped() {
    let mut cameras = CameraContainer::new(1280, 720);
    cameras.lower_pyramid_debug_level();
    assert_eq!(cameras.flags.debug_pyramid_level, 0);

    for _ in 0..100 {
        cameras.raise_pyramid_debug_level();
    }
    assert!(cameras.flags.debug_pyramid_level < crate::limits::MAX_DEPTH_PYRAMID_MIPS);
}

#[test]
fn lod_target_scales_with_resolution() {
    let camera_720 = Camera::new(1280, 720);
    let camera_1440 = Camera::new(2560, 1440);
    // Twice the vertical resolution halves the world error per pixel
    assert!(
        (camera_720.lod_target() / camera_1440.lod_target() - 2.0).abs() < 1e-4
    );
}

#[test]
fn place_camera_rebuilds_the_view() {
    let mut camera = Camera::new(1280, 720);
    place_camera(&mut camera, Vec3::new(0.0, 0.0, 5.0));
    let eye = camera.view.inverse().w_axis;
    assert!((Vec3::new(eye.x, eye.y, eye.z) - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-4);
}
