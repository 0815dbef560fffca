//! GPU-visible camera block.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Per-view data uploaded once per frame and read by every culling and
/// drawing pipeline.
///
/// `view`/`projection`/`view_projection` always follow the camera the user is
/// flying; `cull_view` is the view matrix the culling pass uses and stays
/// behind when the frustum is frozen (F1). The four frustum planes are
/// view-space plane equations derived from the projection transpose rows
/// (`row3 ± row0`, `row3 ± row1`) and are only valid together with
/// `cull_view`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraViewData {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub cull_view: Mat4,
    pub position: Vec4,

    pub frustum_right: Vec4,
    pub frustum_left: Vec4,
    pub frustum_top: Vec4,
    pub frustum_bottom: Vec4,

    /// projection[0][0] / projection[1][1], used to project bounding spheres
    pub proj00: f32,
    pub proj11: f32,
    pub znear: f32,
    pub draw_distance: f32,

    pub pyramid_width: f32,
    pub pyramid_height: f32,
    /// World-space error per unit distance that maps to the target pixel
    /// error on screen
    pub lod_target: f32,
    pub lod_enabled: u32,

    pub occlusion_enabled: u32,
    pub debug_pyramid_level: u32,
    pub object_count: u32,
    pub onpc_object_count: u32,
}

impl Default for CameraViewData {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Normalize a plane equation so its normal is unit length.
pub fn normalize_plane(plane: Vec4) -> Vec4 {
    let len = plane.truncate().length();
    if len > 0.0 {
        plane / len
    } else {
        plane
    }
}

/// Extract the four side planes from a projection matrix.
///
/// Returns `[right, left, top, bottom]` in view space. Near and far are
/// tested separately against `znear` and the draw distance.
pub fn frustum_planes_from_projection(projection: &Mat4) -> [Vec4; 4] {
    let pt = projection.transpose();
    // pt.x_axis is row 0 of the projection, pt.w_axis is row 3
    [
        normalize_plane(pt.w_axis - pt.x_axis),
        normalize_plane(pt.w_axis + pt.x_axis),
        normalize_plane(pt.w_axis - pt.y_axis),
        normalize_plane(pt.w_axis + pt.y_axis),
    ]
}

#[cfg(test)]
#[path = "view_data_tests.rs"]
mod tests;
