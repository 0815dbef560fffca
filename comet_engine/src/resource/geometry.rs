//! Geometry tables: the shared vertex/index/surface/LOD/cluster arrays every
//! mesh appends into.
//!
//! All offsets stored in [`PrimitiveSurface`] and [`LodData`] are into these
//! global arrays, so the whole scene uploads as a handful of buffers.

use rustc_hash::FxHashMap;

use crate::engine_warn;
use crate::error::{EngineError, EngineResult};
use crate::limits::MAX_MESH_COUNT;
use super::surface::{Cluster, LodData, LodInstanceCounter, Mesh, PrimitiveSurface};
use super::vertex::{PackedVertex, Vertex};

pub struct GeometryTables {
    pub vertices: Vec<Vertex>,
    /// Backend vertex layout, built once by [`Self::pack_gpu_vertices`]
    pub packed_vertices: Vec<PackedVertex>,
    pub indices: Vec<u32>,
    pub surfaces: Vec<PrimitiveSurface>,
    pub lods: Vec<LodData>,
    pub clusters: Vec<Cluster>,
    pub cluster_indices: Vec<u32>,
    pub lod_instance_counters: Vec<LodInstanceCounter>,
    /// Parallel to `surfaces`: routes render objects to the transparent set
    pub surface_transparency: Vec<bool>,

    meshes: Vec<Mesh>,
    mesh_names: FxHashMap<String, u32>,
}

impl GeometryTables {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            packed_vertices: Vec::new(),
            indices: Vec::new(),
            surfaces: Vec::new(),
            lods: Vec::new(),
            clusters: Vec::new(),
            cluster_indices: Vec::new(),
            lod_instance_counters: Vec::new(),
            surface_transparency: Vec::new(),
            meshes: Vec::new(),
            mesh_names: FxHashMap::default(),
        }
    }

    /// Start a new mesh whose surfaces will be appended next.
    /// Name collisions overwrite the map entry with a warning.
    pub fn add_mesh(&mut self, name: &str) -> EngineResult<u32> {
        if self.meshes.len() >= MAX_MESH_COUNT {
            return Err(EngineError::CapacityExhausted {
                what: "meshes",
                capacity: MAX_MESH_COUNT,
            });
        }
        let mesh_id = self.meshes.len() as u32;
        self.meshes.push(Mesh {
            first_surface: self.surfaces.len() as u32,
            surface_count: 0,
            mesh_id,
        });
        if self.mesh_names.insert(name.to_string(), mesh_id).is_some() {
            engine_warn!("comet::geometry", "mesh name '{}' redefined", name);
        }
        Ok(mesh_id)
    }

    /// Record that one more surface belongs to `mesh_id`.
    pub fn count_surface(&mut self, mesh_id: u32) {
        if let Some(mesh) = self.meshes.get_mut(mesh_id as usize) {
            mesh.surface_count += 1;
        }
    }

    pub fn mesh(&self, mesh_id: u32) -> Option<&Mesh> {
        self.meshes.get(mesh_id as usize)
    }

    pub fn mesh_by_name(&self, name: &str) -> Option<&Mesh> {
        self.mesh_names
            .get(name)
            .and_then(|&id| self.meshes.get(id as usize))
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Repack every vertex into the backend layout. No-op when already done.
    pub fn pack_gpu_vertices(&mut self) {
        if !self.packed_vertices.is_empty() {
            return;
        }
        self.packed_vertices = self.vertices.iter().map(Vertex::packed).collect();
    }

    /// Check that every LOD's index range lies inside the global index
    /// buffer. Used by tests and debug assertions after a load.
    pub fn validate_lod_ranges(&self) -> bool {
        self.lods
            .iter()
            .all(|lod| (lod.first_index + lod.index_count) as usize <= self.indices.len())
    }
}

impl Default for GeometryTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "geometry_tests.rs"]
mod tests;
