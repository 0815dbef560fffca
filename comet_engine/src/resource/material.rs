//! Material table.

use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;

use crate::engine_warn;
use crate::error::{EngineError, EngineResult};
use crate::limits::MAX_MATERIAL_COUNT;

/// Texture tags index the bindless texture array; tag 0 is the reserved
/// default texture. GPU-visible.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Default)]
pub struct Material {
    pub albedo_tag: u32,
    pub normal_tag: u32,
    pub specular_tag: u32,
    pub emissive_tag: u32,
    pub material_id: u32,
    pub _pad: [u32; 3],
}

/// Append-only material table with a name map.
///
/// Material 0 is a default created at construction so every surface has a
/// valid material to fall back on.
pub struct MaterialTable {
    materials: Vec<Material>,
    names: FxHashMap<String, u32>,
}

impl MaterialTable {
    pub fn new() -> Self {
        let mut table = Self {
            materials: Vec::new(),
            names: FxHashMap::default(),
        };
        // Reserved default material, all tags 0
        table
            .add(0, 0, 0, 0, Some("default"))
            .expect("default material always fits");
        table
    }

    /// Add a material; returns its id. Passing a name registers it in the
    /// name map (collisions overwrite with a warning).
    pub fn add(
        &mut self,
        albedo_tag: u32,
        normal_tag: u32,
        specular_tag: u32,
        emissive_tag: u32,
        name: Option<&str>,
    ) -> EngineResult<u32> {
        if self.materials.len() >= MAX_MATERIAL_COUNT {
            return Err(EngineError::CapacityExhausted {
                what: "materials",
                capacity: MAX_MATERIAL_COUNT,
            });
        }
        let material_id = self.materials.len() as u32;
        self.materials.push(Material {
            albedo_tag,
            normal_tag,
            specular_tag,
            emissive_tag,
            material_id,
            _pad: [0; 3],
        });
        if let Some(name) = name {
            if self.names.insert(name.to_string(), material_id).is_some() {
                engine_warn!("comet::material", "material name '{}' redefined", name);
            }
        }
        Ok(material_id)
    }

    pub fn get(&self, id: u32) -> Option<&Material> {
        self.materials.get(id as usize)
    }

    pub fn id_by_name(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn as_slice(&self) -> &[Material] {
        &self.materials
    }

    /// Shift every non-zero texture tag by `texture_base`. Called once by
    /// `setup_for_rendering` so tags index the final descriptor array.
    pub fn rebase_texture_tags(&mut self, texture_base: u32) {
        for material in &mut self.materials {
            for tag in [
                &mut material.albedo_tag,
                &mut material.normal_tag,
                &mut material.specular_tag,
                &mut material.emissive_tag,
            ] {
                if *tag != 0 {
                    *tag += texture_base;
                }
            }
        }
    }
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "material_tests.rs"]
mod tests;
