//! Render objects and their transforms.
//!
//! A render object is the unit of culling and drawing: one surface under one
//! transform. The container keeps three disjoint sets (opaque, transparent,
//! oblique-near-plane-clipping) plus the shared transform array.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use rand::Rng;

use crate::engine_warn;
use crate::error::{EngineError, EngineResult};
use crate::limits::{MAX_DYNAMIC_OBJECTS, MAX_ONPC_OBJECTS, MAX_RENDER_OBJECTS};
use crate::resource::{GeometryTables, MeshTransform};

/// One drawable instance. GPU-visible.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Default)]
pub struct RenderObject {
    pub transform_id: u32,
    pub surface_id: u32,
}

/// The scene's render objects, partitioned by draw path.
///
/// The transform array is partitioned too: slots `[0, MAX_DYNAMIC_OBJECTS)`
/// are reserved for dynamic objects and stay writable every frame; everything
/// after is immutable once rendering starts.
pub struct RenderContainer {
    pub opaque: Vec<RenderObject>,
    pub transparent: Vec<RenderObject>,
    pub onpc: Vec<RenderObject>,
    transforms: Vec<MeshTransform>,
    dynamic_transform_count: u32,
}

impl RenderContainer {
    pub fn new() -> Self {
        Self {
            opaque: Vec::new(),
            transparent: Vec::new(),
            onpc: Vec::new(),
            // Dynamic slots live at the front so the per-frame staging copy
            // is one contiguous range
            transforms: vec![MeshTransform::default(); MAX_DYNAMIC_OBJECTS],
            dynamic_transform_count: 0,
        }
    }

    pub fn transforms(&self) -> &[MeshTransform] {
        &self.transforms
    }

    pub fn dynamic_transform_count(&self) -> u32 {
        self.dynamic_transform_count
    }

    /// Total across all three sets
    pub fn render_object_count(&self) -> usize {
        self.opaque.len() + self.transparent.len() + self.onpc.len()
    }

    /// Append a static transform; returns its id.
    pub fn add_transform(&mut self, transform: MeshTransform) -> u32 {
        let id = self.transforms.len() as u32;
        self.transforms.push(transform);
        id
    }

    /// Claim a dynamic slot; fails once all slots are taken.
    pub fn add_dynamic_transform(&mut self, transform: MeshTransform) -> EngineResult<u32> {
        if self.dynamic_transform_count as usize >= MAX_DYNAMIC_OBJECTS {
            return Err(EngineError::CapacityExhausted {
                what: "dynamic transforms",
                capacity: MAX_DYNAMIC_OBJECTS,
            });
        }
        let id = self.dynamic_transform_count;
        self.transforms[id as usize] = transform;
        self.dynamic_transform_count += 1;
        Ok(id)
    }

    /// Host-side write of a dynamic transform (the renderer re-uploads the
    /// dynamic range each frame).
    pub fn write_dynamic_transform(&mut self, id: u32, transform: MeshTransform) {
        debug_assert!(id < self.dynamic_transform_count);
        self.transforms[id as usize] = transform;
    }

    /// Create one render object, routed to the opaque or transparent set by
    /// the surface's transparency flag.
    pub fn create_render_object(
        &mut self,
        tables: &GeometryTables,
        transform_id: u32,
        surface_id: u32,
    ) -> EngineResult<()> {
        if self.render_object_count() >= MAX_RENDER_OBJECTS {
            return Err(EngineError::CapacityExhausted {
                what: "render objects",
                capacity: MAX_RENDER_OBJECTS,
            });
        }
        if surface_id as usize >= tables.surfaces.len() {
            return Err(EngineError::InvalidResource(format!(
                "surface id {} out of range ({} surfaces)",
                surface_id,
                tables.surfaces.len()
            )));
        }
        let object = RenderObject { transform_id, surface_id };
        if tables.surface_transparency[surface_id as usize] {
            self.transparent.push(object);
        } else {
            self.opaque.push(object);
        }
        Ok(())
    }

    /// Caller-populated reflective-plane set.
    pub fn create_onpc_object(
        &mut self,
        tables: &GeometryTables,
        transform_id: u32,
        surface_id: u32,
    ) -> EngineResult<()> {
        if self.onpc.len() >= MAX_ONPC_OBJECTS {
            return Err(EngineError::CapacityExhausted {
                what: "ONPC objects",
                capacity: MAX_ONPC_OBJECTS,
            });
        }
        if surface_id as usize >= tables.surfaces.len() {
            return Err(EngineError::InvalidResource(format!(
                "surface id {} out of range",
                surface_id
            )));
        }
        self.onpc.push(RenderObject { transform_id, surface_id });
        Ok(())
    }

    /// One transform, one render object per surface of the mesh.
    /// Returns the transform id.
    pub fn add_objects_from_mesh(
        &mut self,
        tables: &GeometryTables,
        mesh_id: u32,
        transform: MeshTransform,
        dynamic: bool,
    ) -> EngineResult<u32> {
        let mesh = *tables.mesh(mesh_id).ok_or_else(|| {
            EngineError::InvalidResource(format!("mesh id {} does not exist", mesh_id))
        })?;
        if self.render_object_count() + mesh.surface_count as usize > MAX_RENDER_OBJECTS {
            return Err(EngineError::CapacityExhausted {
                what: "render objects",
                capacity: MAX_RENDER_OBJECTS,
            });
        }
        let transform_id = if dynamic {
            self.add_dynamic_transform(transform)?
        } else {
            self.add_transform(transform)
        };
        for surface in mesh.first_surface..mesh.first_surface + mesh.surface_count {
            self.create_render_object(tables, transform_id, surface)?;
        }
        Ok(transform_id)
    }
}

impl Default for RenderContainer {
    fn default() -> Self {
        Self::new()
    }
}

/// Random placement for the stress scenes.
pub fn randomize_transform(position_range: f32, scale: f32) -> MeshTransform {
    let mut rng = rand::thread_rng();
    let position = Vec3::new(
        rng.gen_range(-position_range..position_range),
        rng.gen_range(-position_range..position_range),
        rng.gen_range(-position_range..position_range),
    );
    let axis = Vec3::new(
        rng.gen_range(-1.0f32..1.0),
        rng.gen_range(-1.0f32..1.0),
        rng.gen_range(-1.0f32..1.0),
    )
    .try_normalize()
    .unwrap_or(Vec3::Y);
    let angle = rng.gen_range(0.0f32..std::f32::consts::TAU);
    MeshTransform::new(position, scale, Quat::from_axis_angle(axis, angle))
}

/// One randomly placed object from a single-surface mesh.
pub fn create_render_object_with_random_transform(
    renders: &mut RenderContainer,
    tables: &GeometryTables,
    mesh_id: u32,
    position_range: f32,
    scale: f32,
) -> EngineResult<()> {
    let mesh = *tables.mesh(mesh_id).ok_or_else(|| {
        EngineError::InvalidResource(format!("mesh id {} does not exist", mesh_id))
    })?;
    if mesh.surface_count > 1 {
        engine_warn!(
            "comet::scene",
            "random placement expects single-surface meshes, mesh {} has {}",
            mesh_id,
            mesh.surface_count
        );
        return Ok(());
    }
    let transform = randomize_transform(position_range, scale);
    let transform_id = renders.add_transform(transform);
    renders.create_render_object(tables, transform_id, mesh.first_surface)
}

#[cfg(test)]
#[path = "render_container_tests.rs"]
mod tests;
