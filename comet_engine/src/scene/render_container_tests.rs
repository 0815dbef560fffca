//! Unit tests for render-object partitioning and the transform layout.

use super::*;
use crate::limits::{MAX_DYNAMIC_OBJECTS, MAX_ONPC_OBJECTS};
use crate::resource::GeometryTables;

fn tables_with_surfaces(count: usize, transparent: &[usize]) -> GeometryTables {
    let mut tables = GeometryTables::new();
    let mesh = tables.add_mesh("fixture").unwrap();
    for i in 0..count {
        tables.surfaces.push(Default::default());
        tables.surface_transparency.push(transparent.contains(&i));
        tables.count_surface(mesh);
    }
    tables
}

#[test]
fn static_transforms_start_after_the_dynamic_range() {
    let mut renders = RenderContainer::new();
    let id = renders.add_transform(MeshTransform::default());
    assert_eq!(id as usize, MAX_DYNAMIC_OBJECTS);
}

#[test]
fn transparent_surfaces_route_to_the_transparent_set() {
    let tables = tables_with_surfaces(2, &[1]);
    let mut renders = RenderContainer::new();
    let transform = renders.add_transform(MeshTransform::default());

    renders.create_render_object(&tables, transform, 0).unwrap();
    renders.create_render_object(&tables, transform, 1).unwrap();

    assert_eq!(renders.opaque.len(), 1);
    assert_eq!(renders.transparent.len(), 1);
    assert_eq!(renders.opaque[0].surface_id, 0);
    assert_eq!(renders.transparent[0].surface_id, 1);
}

#[test]
fn out_of_range_surface_ids_are_rejected() {
    let tables = tables_with_surfaces(1, &[]);
    let mut renders = RenderContainer::new();
    let transform = renders.add_transform(MeshTransform::default());
    let result = renders.create_render_object(&tables, transform, 5);
    assert!(matches!(result, Err(EngineError::InvalidResource(_))));
}

#[test]
fn dynamic_slots_are_capped() {
    let mut renders = RenderContainer::new();
    for _ in 0..MAX_DYNAMIC_OBJECTS {
        renders.add_dynamic_transform(MeshTransform::default()).unwrap();
    }
    let result = renders.add_dynamic_transform(MeshTransform::default());
    assert!(matches!(
        result,
        Err(EngineError::CapacityExhausted { what: "dynamic transforms", .. })
    ));
}

#[test]
fn dynamic_writes_land_in_the_claimed_slot() {
    let mut renders = RenderContainer::new();
    let id = renders.add_dynamic_transform(MeshTransform::default()).unwrap();
    let moved = MeshTransform::new(Vec3::new(1.0, 2.0, 3.0), 1.0, Quat::IDENTITY);
    renders.write_dynamic_transform(id, moved);
    assert_eq!(renders.transforms()[id as usize], moved);
}

#[test]
fn onpc_set_is_capped() {
    let tables = tables_with_surfaces(1, &[]);
    let mut renders = RenderContainer::new();
    let transform = renders.add_transform(MeshTransform::default());
    for _ in 0..MAX_ONPC_OBJECTS {
        renders.create_onpc_object(&tables, transform, 0).unwrap();
    }
    let result = renders.create_onpc_object(&tables, transform, 0);
    assert!(matches!(
        result,
        Err(EngineError::CapacityExhausted { what: "ONPC objects", .. })
    ));
}

#[test]
fn add_objects_from_mesh_emits_one_object_per_surface() {
    let tables = tables_with_surfaces(3, &[2]);
    let mut renders = RenderContainer::new();
    let transform_id = renders
        .add_objects_from_mesh(&tables, 0, MeshTransform::default(), false)
        .unwrap();

    assert_eq!(renders.opaque.len(), 2);
    assert_eq!(renders.transparent.len(), 1);
    assert!(renders
        .opaque
        .iter()
        .all(|object| object.transform_id == transform_id));
}

#[test]
fn randomized_transforms_stay_in_range() {
    for _ in 0..64 {
        let transform = randomize_transform(100.0, 2.0);
        let position = transform.position_vec();
        assert!(position.abs().max_element() <= 100.0);
        assert_eq!(transform.scale, 2.0);
        // Orientation stays a unit quaternion
        assert!((transform.orientation_quat().length() - 1.0).abs() < 1e-4);
    }
}
