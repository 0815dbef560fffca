//! Unit tests for frustum-plane extraction and the view-data block.

use glam::{Mat4, Vec3, Vec4};
use super::*;

fn reverse_z_projection() -> Mat4 {
    Mat4::perspective_infinite_reverse_rh(70f32.to_radians(), 16.0 / 9.0, 0.1)
}

#[test]
fn planes_are_normalized() {
    let planes = frustum_planes_from_projection(&reverse_z_projection());
    for plane in planes {
        let len = Vec3::new(plane.x, plane.y, plane.z).length();
        assert!((len - 1.0).abs() < 1e-5, "plane normal should be unit length");
    }
}

#[test]
fn left_right_planes_are_mirrored() {
    let [right, left, _, _] = frustum_planes_from_projection(&reverse_z_projection());
    assert!((right.x + left.x).abs() < 1e-5);
    assert!((right.z - left.z).abs() < 1e-5);
}

#[test]
fn point_ahead_is_inside_every_plane() {
    let planes = frustum_planes_from_projection(&reverse_z_projection());
    // Straight down the view axis in view space
    let point = Vec3::new(0.0, 0.0, -10.0);
    for plane in planes {
        assert!(plane.truncate().dot(point) + plane.w >= 0.0);
    }
}

#[test]
fn point_far_to_the_side_is_outside_one_plane() {
    let planes = frustum_planes_from_projection(&reverse_z_projection());
    let point = Vec3::new(1_000.0, 0.0, -1.0);
    let outside = planes
        .iter()
        .any(|plane| plane.truncate().dot(point) + plane.w < 0.0);
    assert!(outside);
}

#[test]
fn normalize_plane_handles_degenerate_input() {
    let zero = normalize_plane(Vec4::ZERO);
    assert_eq!(zero, Vec4::ZERO);
}

#[test]
fn view_data_block_has_stable_layout() {
    // UBO layout: must stay 16-byte aligned and padding-free
    assert_eq!(std::mem::size_of::<CameraViewData>() % 16, 0);
}
