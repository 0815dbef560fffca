//! Wavefront OBJ ingest.

use std::path::Path;

use crate::engine_info;
use crate::error::{EngineError, EngineResult};
use crate::resource::{quantize_snorm8, GeometryTables, Vertex};
use super::prep::{generate_surface, generate_tangents};

/// Load an OBJ file as a single-surface mesh registered under `name`.
/// Returns the mesh id.
pub fn load_obj(tables: &mut GeometryTables, path: &Path, name: &str) -> EngineResult<u32> {
    engine_info!("comet::mesh", "loading obj model from {}", path.display());

    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| EngineError::AssetParse(format!("{}: {}", path.display(), e)))?;

    if models.is_empty() {
        return Err(EngineError::AssetParse(format!(
            "{}: no geometry",
            path.display()
        )));
    }

    let mesh_id = tables.add_mesh(name)?;

    // OBJ models collapse into one surface, matching how the test scenes
    // address them
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for model in &models {
        let mesh = &model.mesh;
        let base = vertices.len() as u32;
        let vertex_count = mesh.positions.len() / 3;

        for i in 0..vertex_count {
            let normal = if mesh.normals.len() >= (i + 1) * 3 {
                [
                    mesh.normals[i * 3],
                    mesh.normals[i * 3 + 1],
                    mesh.normals[i * 3 + 2],
                ]
            } else {
                [0.0, 0.0, 1.0]
            };
            let uv = if mesh.texcoords.len() >= (i + 1) * 2 {
                [mesh.texcoords[i * 2], mesh.texcoords[i * 2 + 1]]
            } else {
                [0.0, 0.0]
            };
            vertices.push(Vertex {
                position: [
                    mesh.positions[i * 3],
                    mesh.positions[i * 3 + 1],
                    mesh.positions[i * 3 + 2],
                ],
                uv,
                normal: [
                    quantize_snorm8(normal[0]),
                    quantize_snorm8(normal[1]),
                    quantize_snorm8(normal[2]),
                    0,
                ],
                tangent: [127, 127, 127, 254],
            });
        }
        indices.extend(mesh.indices.iter().map(|&index| index + base));
    }

    // Weld duplicate vertices before optimization
    let (vertex_count, remap) = meshopt::generate_vertex_remap(&vertices, Some(&indices));
    let mut vertices = meshopt::remap_vertex_buffer(&vertices, vertex_count, &remap);
    let indices = meshopt::remap_index_buffer(Some(&indices), vertex_count, &remap);

    generate_tangents(&mut vertices, &indices);
    generate_surface(tables, vertices, indices)?;
    tables.count_surface(mesh_id);
    Ok(mesh_id)
}

#[cfg(test)]
#[path = "obj_tests.rs"]
mod tests;
