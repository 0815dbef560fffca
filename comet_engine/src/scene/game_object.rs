//! Dynamic game objects.
//!
//! Up to [`MAX_DYNAMIC_OBJECTS`](crate::limits::MAX_DYNAMIC_OBJECTS) objects
//! own a dynamic transform slot each and run a small behavior every frame.
//! Behavior-driven transform writes are forwarded to the renderer's staging
//! region via `update_object_transform`.

use slotmap::{DefaultKey, SlotMap};

use crate::error::EngineResult;
use crate::renderer::Renderer;
use crate::resource::{GeometryTables, MeshTransform};
use super::render_container::RenderContainer;

/// Per-frame update logic for a dynamic object.
///
/// Returns `true` when the transform changed and must be re-staged.
pub trait GameBehavior: Send {
    fn update(&mut self, transform: &mut MeshTransform, delta_time: f32) -> bool;
}

/// Slow constant spin, the built-in test behavior.
pub struct SpinBehavior {
    pub yaw_per_second: f32,
}

impl GameBehavior for SpinBehavior {
    fn update(&mut self, transform: &mut MeshTransform, delta_time: f32) -> bool {
        let spin = glam::Quat::from_rotation_y(self.yaw_per_second * delta_time);
        let orientation = (spin * transform.orientation_quat()).normalize();
        transform.orientation = orientation.to_array();
        true
    }
}

struct GameObject {
    transform_id: u32,
    transform: MeshTransform,
    behavior: Box<dyn GameBehavior>,
}

/// Registry of dynamic objects keyed by slotmap handles.
pub struct GameObjectManager {
    objects: SlotMap<DefaultKey, GameObject>,
}

impl GameObjectManager {
    pub fn new() -> Self {
        Self {
            objects: SlotMap::new(),
        }
    }

    /// Create a dynamic object for `mesh_name` and register its render
    /// objects. Fails when the dynamic-slot cap is hit.
    pub fn add_object(
        &mut self,
        tables: &GeometryTables,
        renders: &mut RenderContainer,
        mesh_name: &str,
        transform: MeshTransform,
        behavior: Box<dyn GameBehavior>,
    ) -> EngineResult<DefaultKey> {
        let mesh_id = tables
            .mesh_by_name(mesh_name)
            .map(|m| m.mesh_id)
            .ok_or_else(|| {
                crate::error::EngineError::InvalidResource(format!(
                    "mesh '{}' does not exist",
                    mesh_name
                ))
            })?;
        let transform_id = renders.add_objects_from_mesh(tables, mesh_id, transform, true)?;
        Ok(self.objects.insert(GameObject {
            transform_id,
            transform,
            behavior,
        }))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Run every behavior; changed transforms go to the host container and
    /// the renderer's per-frame staging region.
    pub fn update_dynamic_objects(
        &mut self,
        renders: &mut RenderContainer,
        renderer: &mut dyn Renderer,
        delta_time: f32,
    ) {
        for (_, object) in self.objects.iter_mut() {
            if object.behavior.update(&mut object.transform, delta_time) {
                renders.write_dynamic_transform(object.transform_id, object.transform);
                renderer.update_object_transform(object.transform_id, &object.transform);
            }
        }
    }
}

impl Default for GameObjectManager {
    fn default() -> Self {
        Self::new()
    }
}
