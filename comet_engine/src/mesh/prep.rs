//! Surface generation: vertex optimization, LOD chains, clusters, bounds.
//!
//! Every ingest path (OBJ, glTF) funnels its raw vertices and indices
//! through [`generate_surface`], which owns the meshoptimizer calls and the
//! append discipline into the global geometry tables.

use glam::Vec3;
use meshopt::{SimplifyOptions, VertexDataAdapter};

use crate::engine_debug;
use crate::engine_error;
use crate::error::{EngineError, EngineResult};
use crate::limits::{
    CLUSTER_CONE_WEIGHT, MAX_CLUSTER_TRIANGLES, MAX_CLUSTER_VERTICES, MAX_LOD_COUNT,
    MAX_INSTANCES_PER_LOD,
};
use crate::resource::{
    quantize_snorm8, Cluster, GeometryTables, LodData, LodInstanceCounter, PrimitiveSurface,
    Vertex,
};

/// Target shrink factor per LOD step
const LOD_TARGET_FACTOR: f64 = 0.65;
/// Hard absolute simplification error bound per step
const LOD_MAX_STEP_ERROR: f32 = 1e-1;
/// A step that keeps ≥ 95 % of its input is not worth another LOD
const LOD_MIN_REDUCTION: f64 = 0.95;

fn position_adapter(vertices: &[Vertex]) -> EngineResult<VertexDataAdapter<'_>> {
    VertexDataAdapter::new(
        bytemuck::cast_slice(vertices),
        std::mem::size_of::<Vertex>(),
        0,
    )
    .map_err(|e| EngineError::AssetParse(format!("vertex adapter: {}", e)))
}

/// Turn one primitive's vertices and indices into a [`PrimitiveSurface`]
/// with LODs, optional clusters and a bounding sphere, appending everything
/// into the global tables. Returns the new surface id.
pub fn generate_surface(
    tables: &mut GeometryTables,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
) -> EngineResult<u32> {
    if vertices.is_empty() || indices.len() < 3 {
        return Err(EngineError::AssetParse(
            "surface with no triangles".to_string(),
        ));
    }

    // Vertex cache then fetch optimization, the order meshoptimizer expects
    let mut indices = meshopt::optimize_vertex_cache(&indices, vertices.len());
    let vertices = meshopt::optimize_vertex_fetch(&mut indices, &vertices);

    let mut surface = PrimitiveSurface {
        vertex_offset: tables.vertices.len() as u32,
        lod_offset: tables.lods.len() as u32,
        material_id: 0,
        ..Default::default()
    };

    generate_lods(tables, &mut surface, &vertices, indices)?;
    generate_bounding_sphere(&mut surface, &vertices);

    tables.vertices.extend_from_slice(&vertices);

    let surface_id = tables.surfaces.len() as u32;
    tables.surfaces.push(surface);
    // Transparency is decided by the caller once material data is known
    tables.surface_transparency.push(false);
    Ok(surface_id)
}

/// Build up to [`MAX_LOD_COUNT`] LODs.
///
/// Each step targets 65 % of the previous index count under a hard error
/// bound, stopping when simplification yields nothing, cannot shrink below
/// 95 %, or the chain is full. Per-LOD errors accumulate so that a coarse
/// LOD's error covers every step that produced it, scaled into world units.
fn generate_lods(
    tables: &mut GeometryTables,
    surface: &mut PrimitiveSurface,
    vertices: &[Vertex],
    indices: Vec<u32>,
) -> EngineResult<()> {
    let adapter = position_adapter(vertices)?;
    let lod_scale = meshopt::simplify_scale(&adapter);

    let mut lod_indices = indices;
    let mut all_lod_indices: Vec<u32> = Vec::new();
    let mut lod_error = 0.0f32;

    loop {
        surface.lod_count += 1;

        if cfg!(feature = "instancing") {
            tables.lod_instance_counters.push(LodInstanceCounter {
                instance_offset: (tables.lods.len() * MAX_INSTANCES_PER_LOD) as u32,
                instance_count: 0,
            });
        }

        let mut lod = LodData {
            first_index: (tables.indices.len() + all_lod_indices.len()) as u32,
            index_count: lod_indices.len() as u32,
            cluster_offset: tables.clusters.len() as u32,
            cluster_count: 0,
            error: lod_error * lod_scale,
            _pad: [0; 3],
        };
        if cfg!(feature = "clusters") {
            lod.cluster_count =
                generate_clusters(tables, vertices, &lod_indices, surface.vertex_offset)? as u32;
        }
        tables.lods.push(lod);
        all_lod_indices.extend_from_slice(&lod_indices);

        if surface.lod_count as usize >= MAX_LOD_COUNT {
            break;
        }

        let target_count = ((lod_indices.len() as f64 * LOD_TARGET_FACTOR) / 3.0) as usize * 3;
        let mut step_error = 0.0f32;
        let next = meshopt::simplify(
            &lod_indices,
            &adapter,
            target_count,
            LOD_MAX_STEP_ERROR,
            SimplifyOptions::None,
            Some(&mut step_error),
        );

        if next.len() > lod_indices.len() {
            engine_error!("comet::mesh", "LOD simplification grew the index count");
            break;
        }
        // Error bound reached, or nothing left to simplify
        if next.is_empty() || next.len() == lod_indices.len() {
            break;
        }
        // Keeping a LOD this close to the previous one buys nothing
        if next.len() as f64 >= lod_indices.len() as f64 * LOD_MIN_REDUCTION {
            break;
        }

        lod_indices = meshopt::optimize_vertex_cache(&next, vertices.len());
        lod_error = lod_error.max(step_error);
    }

    engine_debug!(
        "comet::mesh",
        "surface at vertex offset {} got {} LODs",
        surface.vertex_offset,
        surface.lod_count
    );

    // Indices are surface-local until here
    let vertex_offset = surface.vertex_offset;
    tables
        .indices
        .extend(all_lod_indices.iter().map(|index| index + vertex_offset));
    Ok(())
}

/// Split one LOD's triangles into meshlets and append them to the cluster
/// tables. Returns how many clusters were emitted.
fn generate_clusters(
    tables: &mut GeometryTables,
    vertices: &[Vertex],
    indices: &[u32],
    vertex_offset: u32,
) -> EngineResult<usize> {
    let adapter = position_adapter(vertices)?;
    let meshlets = meshopt::build_meshlets(
        indices,
        &adapter,
        MAX_CLUSTER_VERTICES,
        MAX_CLUSTER_TRIANGLES,
        CLUSTER_CONE_WEIGHT,
    );

    let mut emitted = 0;
    for meshlet in meshlets.iter() {
        let data_offset = tables.cluster_indices.len() as u32;
        let triangle_count = meshlet.triangles.len() / 3;
        for triangle in 0..triangle_count {
            for corner in 0..3 {
                let local = meshlet.triangles[triangle * 3 + corner] as usize;
                let global = meshlet.vertices[local] + vertex_offset;
                tables.cluster_indices.push(global);
            }
        }

        let bounds = meshopt::compute_meshlet_bounds(meshlet, &adapter);
        tables.clusters.push(Cluster {
            center: bounds.center,
            radius: bounds.radius,
            data_offset,
            triangle_count: triangle_count as u8,
            vertex_count: meshlet.vertices.len() as u8,
            cone_axis: bounds.cone_axis_s8,
            cone_cutoff: bounds.cone_cutoff_s8,
            _pad: [0; 2],
        });
        emitted += 1;
    }
    Ok(emitted)
}

/// Center = vertex mean, radius = max distance to center.
pub fn generate_bounding_sphere(surface: &mut PrimitiveSurface, vertices: &[Vertex]) {
    let mut center = Vec3::ZERO;
    for vertex in vertices {
        center += Vec3::from_array(vertex.position);
    }
    center /= vertices.len() as f32;

    let mut radius = 0.0f32;
    for vertex in vertices {
        radius = radius.max(center.distance(Vec3::from_array(vertex.position)));
    }
    surface.center = center.to_array();
    surface.radius = radius;
}

/// Per-triangle tangents from the UV gradients, averaged onto the three
/// corners; handedness goes into the tangent's w byte.
pub fn generate_tangents(vertices: &mut [Vertex], indices: &[u32]) {
    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];

        let p0 = Vec3::from_array(vertices[i0].position);
        let p1 = Vec3::from_array(vertices[i1].position);
        let p2 = Vec3::from_array(vertices[i2].position);
        let edge1 = p1 - p0;
        let edge2 = p2 - p0;

        let du1 = vertices[i1].uv[0] - vertices[i0].uv[0];
        let dv1 = vertices[i1].uv[1] - vertices[i0].uv[1];
        let du2 = vertices[i2].uv[0] - vertices[i0].uv[0];
        let dv2 = vertices[i2].uv[1] - vertices[i0].uv[1];

        let dividend = du1 * dv2 - du2 * dv1;
        if dividend.abs() < f32::EPSILON {
            continue;
        }
        let fc = 1.0 / dividend;

        let tangent = (edge1 * (fc * dv2) - edge2 * (fc * dv1)).normalize_or_zero();
        if tangent == Vec3::ZERO {
            continue;
        }

        let handedness = if dv1 * du2 - dv2 * du1 < 0.0 { -1.0 } else { 1.0 };

        let packed = [
            quantize_snorm8(tangent.x),
            quantize_snorm8(tangent.y),
            quantize_snorm8(tangent.z),
            quantize_snorm8(handedness),
        ];
        vertices[i0].tangent = packed;
        vertices[i1].tangent = packed;
        vertices[i2].tangent = packed;
    }
}

#[cfg(test)]
#[path = "prep_tests.rs"]
mod tests;
