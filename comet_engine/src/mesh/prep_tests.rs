//! Unit tests for surface generation, LOD chains and bounds.

use super::*;
use crate::resource::GeometryTables;

fn flat_vertex(x: f32, y: f32, z: f32, u: f32, v: f32) -> Vertex {
    Vertex {
        position: [x, y, z],
        uv: [u, v],
        normal: [127, 127, 254, 0],
        tangent: [127, 127, 127, 254],
    }
}

/// A wavy N×N grid with enough redundancy for the simplifier to chew on.
fn wavy_grid(n: usize) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let fx = x as f32 / (n - 1) as f32;
            let fy = y as f32 / (n - 1) as f32;
            let fz = (fx * 12.0).sin() * 0.05 + (fy * 9.0).cos() * 0.05;
            vertices.push(flat_vertex(fx, fy, fz, fx, fy));
        }
    }
    let mut indices = Vec::new();
    for y in 0..n - 1 {
        for x in 0..n - 1 {
            let i = (y * n + x) as u32;
            let right = i + 1;
            let down = i + n as u32;
            indices.extend_from_slice(&[i, down, right, right, down, down + 1]);
        }
    }
    (vertices, indices)
}

fn tetrahedron() -> (Vec<Vertex>, Vec<u32>) {
    let vertices = vec![
        flat_vertex(0.0, 0.0, 0.0, 0.0, 0.0),
        flat_vertex(1.0, 0.0, 0.0, 1.0, 0.0),
        flat_vertex(0.0, 1.0, 0.0, 0.0, 1.0),
        flat_vertex(0.0, 0.0, 1.0, 1.0, 1.0),
    ];
    let indices = vec![0, 1, 2, 0, 3, 1, 0, 2, 3, 1, 3, 2];
    (vertices, indices)
}

#[test]
fn tetrahedron_yields_exactly_one_lod() {
    let mut tables = GeometryTables::new();
    let (vertices, indices) = tetrahedron();
    let surface_id = generate_surface(&mut tables, vertices, indices).unwrap();
    let surface = tables.surfaces[surface_id as usize];
    assert_eq!(surface.lod_count, 1);
    assert_eq!(tables.lods.len(), 1);
    assert_eq!(tables.lods[0].index_count, 12);
}

#[test]
fn lod_chain_shrinks_and_errors_grow() {
    let mut tables = GeometryTables::new();
    let (vertices, indices) = wavy_grid(33);
    let surface_id = generate_surface(&mut tables, vertices, indices).unwrap();
    let surface = tables.surfaces[surface_id as usize];

    assert!(surface.lod_count >= 2, "grid should simplify at least once");
    assert!(surface.lod_count as usize <= crate::limits::MAX_LOD_COUNT);

    let lods = &tables.lods
        [surface.lod_offset as usize..(surface.lod_offset + surface.lod_count) as usize];
    for pair in lods.windows(2) {
        assert!(
            pair[0].error <= pair[1].error,
            "LOD errors must be non-decreasing"
        );
        assert!(
            (pair[1].index_count as f64) <= pair[0].index_count as f64 * 0.95,
            "each LOD must shrink below 95% of its predecessor"
        );
    }
}

#[test]
fn lod_ranges_stay_inside_the_index_buffer() {
    let mut tables = GeometryTables::new();
    let (vertices, indices) = wavy_grid(17);
    generate_surface(&mut tables, vertices, indices).unwrap();
    let (vertices, indices) = tetrahedron();
    generate_surface(&mut tables, vertices, indices).unwrap();
    assert!(tables.validate_lod_ranges());
}

#[test]
fn lod_indices_carry_the_vertex_offset() {
    let mut tables = GeometryTables::new();
    let (vertices, indices) = tetrahedron();
    generate_surface(&mut tables, vertices, indices).unwrap();
    let first_surface_vertices = tables.vertices.len() as u32;

    let (vertices, indices) = tetrahedron();
    let second = generate_surface(&mut tables, vertices, indices).unwrap();
    let surface = tables.surfaces[second as usize];
    assert_eq!(surface.vertex_offset, first_surface_vertices);

    let lod = tables.lods[surface.lod_offset as usize];
    let range = lod.first_index as usize..(lod.first_index + lod.index_count) as usize;
    for &index in &tables.indices[range] {
        assert!(index >= surface.vertex_offset);
        assert!((index as usize) < tables.vertices.len());
    }
}

#[test]
fn bounding_sphere_contains_every_vertex() {
    let (vertices, _) = wavy_grid(9);
    let mut surface = PrimitiveSurface::default();
    generate_bounding_sphere(&mut surface, &vertices);

    let center = Vec3::from_array(surface.center);
    for vertex in &vertices {
        let distance = center.distance(Vec3::from_array(vertex.position));
        assert!(distance <= surface.radius + 1e-5);
    }
}

#[test]
fn bounding_sphere_is_idempotent() {
    let (vertices, _) = wavy_grid(9);
    let mut surface = PrimitiveSurface::default();
    generate_bounding_sphere(&mut surface, &vertices);
    let first = (surface.center, surface.radius);
    generate_bounding_sphere(&mut surface, &vertices);
    assert_eq!(first, (surface.center, surface.radius));
}

#[test]
fn tangents_encode_handedness() {
    let (mut vertices, indices) = wavy_grid(5);
    generate_tangents(&mut vertices, &indices);
    for vertex in &vertices {
        // w byte is either ≈ +1 or ≈ −1
        assert!(vertex.tangent[3] == 254 || vertex.tangent[3] == 0);
    }
}

#[cfg(feature = "clusters")]
#[test]
fn clusters_respect_shape_limits() {
    let mut tables = GeometryTables::new();
    let (vertices, indices) = wavy_grid(33);
    let surface_id = generate_surface(&mut tables, vertices, indices).unwrap();
    let surface = tables.surfaces[surface_id as usize];

    assert!(!tables.clusters.is_empty());
    for cluster in &tables.clusters {
        assert!(cluster.triangle_count as usize <= crate::limits::MAX_CLUSTER_TRIANGLES);
        assert!(cluster.vertex_count as usize <= crate::limits::MAX_CLUSTER_VERTICES);
    }
    // Every LOD knows its cluster range
    let lods = &tables.lods
        [surface.lod_offset as usize..(surface.lod_offset + surface.lod_count) as usize];
    for lod in lods {
        assert!(
            (lod.cluster_offset + lod.cluster_count) as usize <= tables.clusters.len()
        );
    }
}
