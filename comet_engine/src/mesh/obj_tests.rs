//! Unit tests for OBJ ingest, using a generated file.

use super::*;
use crate::resource::GeometryTables;
use std::io::Write;

const QUAD_OBJ: &str = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
vn 0.0 0.0 1.0
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/4/1
";

fn write_temp_obj(name: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(name);
    let mut file = std::fs::File::create(&path).expect("temp file");
    file.write_all(QUAD_OBJ.as_bytes()).expect("write obj");
    path
}

#[test]
fn quad_obj_loads_as_one_surface() {
    let path = write_temp_obj("comet_quad_test.obj");
    let mut tables = GeometryTables::new();
    let mesh_id = load_obj(&mut tables, &path, "quad").unwrap();
    std::fs::remove_file(&path).ok();

    let mesh = *tables.mesh(mesh_id).unwrap();
    assert_eq!(mesh.surface_count, 1);
    assert_eq!(tables.surfaces.len(), 1);

    // Four welded corners, six indices in LOD 0
    assert_eq!(tables.vertices.len(), 4);
    let surface = tables.surfaces[0];
    assert!(surface.lod_count >= 1);
    let lod0 = tables.lods[surface.lod_offset as usize];
    assert_eq!(lod0.index_count, 6);
    assert!(tables.validate_lod_ranges());
}

#[test]
fn quad_normals_survive_quantization() {
    let path = write_temp_obj("comet_quad_normals_test.obj");
    let mut tables = GeometryTables::new();
    load_obj(&mut tables, &path, "quad").unwrap();
    std::fs::remove_file(&path).ok();

    for vertex in &tables.vertices {
        // +Z normal quantizes to (127, 127, 254)
        assert_eq!(vertex.normal[0], 127);
        assert_eq!(vertex.normal[1], 127);
        assert_eq!(vertex.normal[2], 254);
    }
}

#[test]
fn missing_file_is_an_asset_parse_error() {
    let mut tables = GeometryTables::new();
    let result = load_obj(
        &mut tables,
        std::path::Path::new("does/not/exist.obj"),
        "ghost",
    );
    assert!(matches!(result, Err(crate::error::EngineError::AssetParse(_))));
}

#[test]
fn mesh_registers_under_its_name() {
    let path = write_temp_obj("comet_quad_named_test.obj");
    let mut tables = GeometryTables::new();
    load_obj(&mut tables, &path, "quad").unwrap();
    std::fs::remove_file(&path).ok();
    assert!(tables.mesh_by_name("quad").is_some());
}
