//! Surface, LOD and cluster records.

use bytemuck::{Pod, Zeroable};

/// A drawable primitive: one vertex range with an LOD chain, a material and
/// a bounding sphere. GPU-visible.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, Default)]
pub struct PrimitiveSurface {
    pub center: [f32; 3],
    pub radius: f32,
    /// Base added to every LOD-local index of this surface
    pub vertex_offset: u32,
    /// First entry in the LOD table
    pub lod_offset: u32,
    /// 1..=8 LODs, sorted by increasing error
    pub lod_count: u32,
    pub material_id: u32,
}

/// One level of detail. GPU-visible.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, Default)]
pub struct LodData {
    pub first_index: u32,
    pub index_count: u32,
    pub cluster_offset: u32,
    pub cluster_count: u32,
    /// World-space simplification error, scaled by the mesh extent
    pub error: f32,
    pub _pad: [u32; 3],
}

/// A meshlet: ≤ 124 triangles over ≤ 64 vertices with its own bounds and
/// visibility cone. GPU-visible.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, Default)]
pub struct Cluster {
    pub center: [f32; 3],
    pub radius: f32,
    /// Offset into the cluster-index buffer
    pub data_offset: u32,
    pub triangle_count: u8,
    pub vertex_count: u8,
    pub cone_axis: [i8; 3],
    pub cone_cutoff: i8,
    pub _pad: [u8; 2],
}

/// A named mesh: a run of surfaces in the surface table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mesh {
    pub first_surface: u32,
    pub surface_count: u32,
    pub mesh_id: u32,
}

/// Per-LOD instance bookkeeping for the instanced culling path.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, Default)]
pub struct LodInstanceCounter {
    pub instance_offset: u32,
    pub instance_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_records_have_std430_friendly_sizes() {
        assert_eq!(std::mem::size_of::<PrimitiveSurface>() % 16, 0);
        assert_eq!(std::mem::size_of::<LodData>() % 16, 0);
        assert_eq!(std::mem::size_of::<Cluster>() % 4, 0);
    }
}
