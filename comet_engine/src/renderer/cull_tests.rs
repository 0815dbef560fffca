//! Unit tests for the culling math against known reference scenarios.

use super::*;
use crate::camera::{place_camera, CameraContainer};
use crate::resource::{LodData, MeshTransform, PrimitiveSurface};
use crate::scene::RenderObject;

fn view_data_at(position: Vec3, object_count: u32) -> crate::camera::CameraViewData {
    let mut cameras = CameraContainer::new(1280, 720);
    place_camera(cameras.main_camera_mut(), position);
    cameras.build_view_data(1024.0, 512.0, object_count, 0)
}

fn unit_surface() -> PrimitiveSurface {
    PrimitiveSurface {
        center: [0.0; 3],
        radius: 1.0,
        vertex_offset: 0,
        lod_offset: 0,
        lod_count: 1,
        material_id: 0,
    }
}

fn single_lod() -> Vec<LodData> {
    vec![LodData {
        first_index: 0,
        index_count: 36,
        ..Default::default()
    }]
}

// ============================================================================
// Frustum culling
// ============================================================================

#[test]
fn object_in_front_survives_object_behind_is_dropped() {
    // Camera at origin looking down -Z: one object ahead, one behind
    let view_data = view_data_at(Vec3::ZERO, 2);
    let transforms = vec![
        MeshTransform::new(Vec3::new(0.0, 0.0, -5.0), 1.0, glam::Quat::IDENTITY),
        MeshTransform::new(Vec3::new(0.0, 0.0, 5.0), 1.0, glam::Quat::IDENTITY),
    ];
    let objects = vec![
        RenderObject { transform_id: 0, surface_id: 0 },
        RenderObject { transform_id: 1, surface_id: 0 },
    ];
    let output = cull_objects(
        &objects,
        &transforms,
        &[unit_surface()],
        &single_lod(),
        &view_data,
        1024,
    );
    assert_eq!(output.commands.len(), 1);
    assert_eq!(output.commands[0].object_id, 0);
    assert!(!output.overflowed);
}

#[test]
fn sphere_larger_than_the_view_is_kept() {
    let view_data = view_data_at(Vec3::ZERO, 1);
    // Center right at the camera, radius dwarfing the frustum
    let center_view = Vec3::new(0.0, 0.0, -0.5);
    assert!(is_sphere_visible(&view_data, center_view, 10_000.0));
}

#[test]
fn object_beyond_draw_distance_is_dropped() {
    let view_data = view_data_at(Vec3::ZERO, 1);
    let too_far = -(view_data.draw_distance + 10.0);
    assert!(!is_sphere_visible(&view_data, Vec3::new(0.0, 0.0, too_far), 1.0));
}

#[test]
fn empty_scene_emits_zero_commands() {
    let view_data = view_data_at(Vec3::ZERO, 0);
    let output = cull_objects(&[], &[], &[], &[], &view_data, 1024);
    assert!(output.commands.is_empty());
    assert!(!output.overflowed);
}

#[test]
fn overflow_clamps_and_reports() {
    let view_data = view_data_at(Vec3::ZERO, 3);
    let transforms = vec![MeshTransform::new(
        Vec3::new(0.0, 0.0, -5.0),
        1.0,
        glam::Quat::IDENTITY,
    )];
    let objects = vec![RenderObject::default(); 3];
    let output = cull_objects(
        &objects,
        &transforms,
        &[unit_surface()],
        &single_lod(),
        &view_data,
        2,
    );
    assert_eq!(output.commands.len(), 2);
    assert!(output.overflowed);
}

// ============================================================================
// LOD selection
// ============================================================================

#[test]
fn lod_selection_matches_the_reference_scenario() {
    // Four LODs, camera 100 units away, 1 px target at 1280×720, fov 70°
    let errors = [0.01f32, 0.05, 0.2, 1.0];
    let lods: Vec<LodData> = errors
        .iter()
        .map(|&error| LodData { error, ..Default::default() })
        .collect();

    let cameras = CameraContainer::new(1280, 720);
    let lod_target = cameras.main_camera().lod_target();

    let chosen = select_lod(&lods, 100.0, lod_target, true);
    assert_eq!(chosen, 2);
}

#[test]
fn lod_selection_prefers_coarser_on_equality() {
    let lods = vec![
        LodData { error: 0.0, ..Default::default() },
        LodData { error: 1.0, ..Default::default() },
    ];
    // threshold exactly equals the coarse LOD's error
    let chosen = select_lod(&lods, 1.0, 1.0, true);
    assert_eq!(chosen, 1);
}

#[test]
fn lod_selection_disabled_picks_the_finest() {
    let lods = vec![
        LodData { error: 0.0, ..Default::default() },
        LodData { error: 0.1, ..Default::default() },
    ];
    assert_eq!(select_lod(&lods, 1_000.0, 1.0, false), 0);
}

#[test]
fn close_object_uses_lod_zero() {
    let lods = vec![
        LodData { error: 0.0, ..Default::default() },
        LodData { error: 0.5, ..Default::default() },
    ];
    let cameras = CameraContainer::new(1280, 720);
    let chosen = select_lod(&lods, 5.0, cameras.main_camera().lod_target(), true);
    assert_eq!(chosen, 0);
}

// ============================================================================
// Depth pyramid
// ============================================================================

#[test]
fn pyramid_dimensions_clamp_to_powers_of_two() {
    let (width, height, mips) = pyramid_dimensions(1280, 720);
    assert_eq!(width, 1024);
    assert_eq!(height, 512);
    assert_eq!(mips, 11); // log2(1024) + 1

    let (width, height, mips) = pyramid_dimensions(1, 1);
    assert_eq!((width, height, mips), (1, 1, 1));
}

#[test]
fn pyramid_mip_count_is_capped() {
    let (_, _, mips) = pyramid_dimensions(1 << 20, 1 << 20);
    assert_eq!(mips, crate::limits::MAX_DEPTH_PYRAMID_MIPS);
}

#[test]
fn pyramid_reduction_takes_the_max() {
    // 4×4 reverse-Z depth: one near sample must survive to the 1×1 mip
    let mut depth = vec![0.0f32; 16];
    depth[5] = 0.9;
    let pyramid = CpuDepthPyramid::build(&depth, 4, 4);
    assert_eq!(pyramid.mips.len(), 3);
    let top = pyramid.mips.last().unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0], 0.9);
}

// ============================================================================
// Occlusion
// ============================================================================

#[test]
fn wall_occludes_the_mesh_behind_it() {
    let view_data = {
        let mut cameras = CameraContainer::new(1024, 512);
        place_camera(cameras.main_camera_mut(), Vec3::ZERO);
        cameras.build_view_data(1024.0, 512.0, 2, 0)
    };

    // A wall at distance 10 fills the whole depth buffer: reverse-Z depth
    // znear / 10
    let wall_depth = view_data.znear / 10.0;
    let depth = vec![wall_depth; (1024 * 512) as usize];
    let pyramid = CpuDepthPyramid::build(&depth, 1024, 512);

    // Mesh behind the wall
    let behind = Vec3::new(0.0, 0.0, -50.0);
    assert!(is_sphere_occluded(&view_data, &pyramid, behind, 1.0));

    // Mesh in front of the wall
    let in_front = Vec3::new(0.0, 0.0, -5.0);
    assert!(!is_sphere_occluded(&view_data, &pyramid, in_front, 1.0));
}

#[test]
fn sphere_crossing_the_near_plane_is_never_occluded() {
    let view_data = view_data_at(Vec3::ZERO, 1);
    let depth = vec![0.99f32; 64 * 64];
    let pyramid = CpuDepthPyramid::build(&depth, 64, 64);
    assert!(!is_sphere_occluded(
        &view_data,
        &pyramid,
        Vec3::new(0.0, 0.0, -1.0),
        5.0
    ));
}

/// The two-phase strategy: frame F draws last-frame-visible objects in the
/// first pass, then the late pass re-tests everything against the new
/// pyramid and records visibility for frame F+1. A freshly occluded object
/// therefore disappears one frame late, a freshly revealed one appears one
/// frame late, and nothing is ever missed while visible.
#[test]
fn two_phase_visibility_converges() {
    let view_data = view_data_at(Vec3::ZERO, 2);

    let wall_depth = view_data.znear / 10.0;
    let depth = vec![wall_depth; (1024 * 512) as usize];
    let pyramid = CpuDepthPyramid::build(&depth, 1024, 512);

    let wall = Vec3::new(0.0, 0.0, -10.0);
    let mesh_behind = Vec3::new(0.0, 0.0, -50.0);

    // Persistent visibility bits, seeded visible (everything draws on the
    // very first frame)
    let mut visible = [true, true];

    // Frame F: first pass draws both (both were visible), late pass updates
    let late = |center: Vec3, visible: &mut bool| {
        *visible = !is_sphere_occluded(&view_data, &pyramid, center, 1.0);
    };
    let drawn_frame_f = visible.iter().filter(|&&v| v).count();
    late(wall, &mut visible[0]);
    late(mesh_behind, &mut visible[1]);
    assert_eq!(drawn_frame_f, 2);

    // Frame F+1: only the wall survives the first pass
    let drawn_frame_f1 = visible.iter().filter(|&&v| v).count();
    assert_eq!(drawn_frame_f1, 1);
    assert!(visible[0]);
    assert!(!visible[1]);
}
