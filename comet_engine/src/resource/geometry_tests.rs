//! Unit tests for the geometry tables.

use super::*;
use crate::resource::Vertex;

#[test]
fn meshes_record_their_surface_runs() {
    let mut tables = GeometryTables::new();
    let a = tables.add_mesh("rock").unwrap();
    tables.surfaces.push(Default::default());
    tables.count_surface(a);
    tables.surfaces.push(Default::default());
    tables.count_surface(a);

    let b = tables.add_mesh("tree").unwrap();
    tables.surfaces.push(Default::default());
    tables.count_surface(b);

    let rock = tables.mesh_by_name("rock").unwrap();
    assert_eq!((rock.first_surface, rock.surface_count), (0, 2));
    let tree = tables.mesh_by_name("tree").unwrap();
    assert_eq!((tree.first_surface, tree.surface_count), (2, 1));
    assert_eq!(tables.mesh_count(), 2);
}

#[test]
fn mesh_name_collision_overwrites() {
    let mut tables = GeometryTables::new();
    tables.add_mesh("thing").unwrap();
    let second = tables.add_mesh("thing").unwrap();
    assert_eq!(tables.mesh_by_name("thing").unwrap().mesh_id, second);
}

#[test]
fn unknown_names_and_ids_return_none() {
    let tables = GeometryTables::new();
    assert!(tables.mesh_by_name("ghost").is_none());
    assert!(tables.mesh(0).is_none());
}

#[test]
fn vertex_packing_is_idempotent() {
    let mut tables = GeometryTables::new();
    tables.vertices.push(Vertex {
        position: [1.0, 2.0, 3.0],
        uv: [0.5, 0.5],
        normal: [1, 2, 3, 4],
        tangent: [5, 6, 7, 8],
    });

    tables.pack_gpu_vertices();
    assert_eq!(tables.packed_vertices.len(), 1);
    let first = tables.packed_vertices[0];

    // A second call must not duplicate or change anything
    tables.pack_gpu_vertices();
    assert_eq!(tables.packed_vertices.len(), 1);
    assert_eq!(tables.packed_vertices[0], first);
    assert_eq!(first.normal, 0x01020304);
}

#[test]
fn lod_range_validation_catches_overruns() {
    let mut tables = GeometryTables::new();
    tables.indices = vec![0, 1, 2];
    tables.lods.push(crate::resource::LodData {
        first_index: 0,
        index_count: 3,
        ..Default::default()
    });
    assert!(tables.validate_lod_ranges());

    tables.lods.push(crate::resource::LodData {
        first_index: 2,
        index_count: 3,
        ..Default::default()
    });
    assert!(!tables.validate_lod_ranges());
}
