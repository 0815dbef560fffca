//! Scene construction from command-line arguments.
//!
//! The first argument may select a test scene; every remaining argument is a
//! glTF file path. Without a mode keyword all arguments are glTF paths.

use std::path::PathBuf;

use glam::{Quat, Vec3};

use crate::engine_warn;
use crate::error::EngineResult;
use crate::mesh::load_obj;
use crate::renderer::Renderer;
use crate::resource::{GeometryTables, MaterialTable, MeshTransform, TextureTable};
use super::render_container::{
    create_render_object_with_random_transform, RenderContainer,
};

/// Built-in test scenes selectable from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneMode {
    /// ≈ 4.1 M random objects; exercises the culling pipeline
    RenderingStressTest,
    /// Smaller spread tuned for the instanced-culling path
    InstancingStressTest,
    /// Oblique near-plane clipping scene (reflective plane + clutter)
    OnpcReflectionTest,
}

impl SceneMode {
    fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "RenderingStressTest" => Some(SceneMode::RenderingStressTest),
            "InstancingStressTest" => Some(SceneMode::InstancingStressTest),
            "OnpcReflectionTest" => Some(SceneMode::OnpcReflectionTest),
            _ => None,
        }
    }
}

/// Parsed CLI surface: optional scene mode + glTF paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneArgs {
    pub mode: Option<SceneMode>,
    pub gltf_paths: Vec<PathBuf>,
}

/// Parse everything after the executable name.
pub fn parse_scene_args(args: &[String]) -> SceneArgs {
    match args.split_first() {
        Some((first, rest)) => match SceneMode::parse(first) {
            Some(mode) => SceneArgs {
                mode: Some(mode),
                gltf_paths: rest.iter().map(PathBuf::from).collect(),
            },
            None => SceneArgs {
                mode: None,
                gltf_paths: args.iter().map(PathBuf::from).collect(),
            },
        },
        None => SceneArgs {
            mode: None,
            gltf_paths: Vec::new(),
        },
    }
}

// Stress-test population (dragon/kitten/human load after the default bunny)
const STRESS_BUNNY_COUNT: u32 = 2_500_000;
const STRESS_KITTEN_COUNT: u32 = 1_500_000;
const STRESS_DRAGON_COUNT: u32 = 10_000;
const STRESS_HUMAN_COUNT: u32 = 90_000;

/// Load the OBJ meshes the test scenes reference.
pub fn load_test_geometry(tables: &mut GeometryTables) -> EngineResult<()> {
    load_obj(tables, "assets/meshes/dragon.obj".as_ref(), "dragon")?;
    load_obj(tables, "assets/meshes/kitten.obj".as_ref(), "kitten")?;
    load_obj(tables, "assets/meshes/human.obj".as_ref(), "human")?;
    Ok(())
}

/// Populate the heavy random scene. `position_range` spreads the objects;
/// the instancing variant uses a tighter spread.
pub fn load_geometry_stress_test(
    renders: &mut RenderContainer,
    tables: &GeometryTables,
    position_range: f32,
) -> EngineResult<()> {
    let total =
        STRESS_BUNNY_COUNT + STRESS_KITTEN_COUNT + STRESS_DRAGON_COUNT + STRESS_HUMAN_COUNT;
    engine_warn!("comet::scene", "loading stress test with {} objects", total);

    populate_random(renders, tables, "bunny", STRESS_BUNNY_COUNT, position_range, 5.0)?;
    populate_random(renders, tables, "kitten", STRESS_KITTEN_COUNT, position_range, 1.0)?;
    populate_random(renders, tables, "dragon", STRESS_DRAGON_COUNT, position_range, 0.5)?;
    populate_random(renders, tables, "human", STRESS_HUMAN_COUNT, position_range, 0.2)?;
    Ok(())
}

fn populate_random(
    renders: &mut RenderContainer,
    tables: &GeometryTables,
    mesh_name: &str,
    count: u32,
    position_range: f32,
    scale: f32,
) -> EngineResult<()> {
    let mesh_id = match tables.mesh_by_name(mesh_name) {
        Some(mesh) => mesh.mesh_id,
        None => {
            engine_warn!("comet::scene", "mesh '{}' missing, skipping population", mesh_name);
            return Ok(());
        }
    };
    for _ in 0..count {
        create_render_object_with_random_transform(
            renders,
            tables,
            mesh_id,
            position_range,
            scale,
        )?;
    }
    Ok(())
}

/// The ONPC test: one reflective plane object plus a spread of kittens.
pub fn create_onpc_reflection_test(
    renders: &mut RenderContainer,
    tables: &GeometryTables,
) -> EngineResult<()> {
    let human = tables
        .mesh_by_name("human")
        .map(|m| m.first_surface)
        .unwrap_or(0);
    let transform = MeshTransform::new(
        Vec3::new(30.0, 50.0, 50.0),
        2.0,
        Quat::IDENTITY,
    );
    let transform_id = renders.add_transform(transform);
    renders.create_onpc_object(tables, transform_id, human)?;

    if let Some(kitten) = tables.mesh_by_name("kitten") {
        let kitten_id = kitten.mesh_id;
        for _ in 0..1_000 {
            create_render_object_with_random_transform(renders, tables, kitten_id, 100.0, 1.0)?;
        }
    }
    Ok(())
}

/// Load a DDS texture from disk, upload it and register it under `name`.
/// Returns the texture tag. Must run before `setup_for_rendering`.
pub fn upload_texture_from_file(
    path: &std::path::Path,
    name: &str,
    textures: &mut TextureTable,
    renderer: &mut dyn Renderer,
) -> EngineResult<u32> {
    let asset = crate::resource::load_dds(path)?;
    let device_tag = renderer.upload_texture(&asset)?;
    let table_tag = textures.add(name, &asset)?;
    debug_assert_eq!(device_tag, table_tag);
    Ok(table_tag)
}

/// Build the whole scene the arguments describe. Called on the loader
/// thread; any error aborts the load.
pub fn create_scene_from_args(
    args: &SceneArgs,
    tables: &mut GeometryTables,
    materials: &mut MaterialTable,
    textures: &mut TextureTable,
    renders: &mut RenderContainer,
    renderer: &mut dyn Renderer,
) -> EngineResult<()> {
    load_test_geometry(tables)?;

    match args.mode {
        Some(SceneMode::RenderingStressTest) => {
            load_geometry_stress_test(renders, tables, 3_000.0)?;
        }
        Some(SceneMode::InstancingStressTest) => {
            load_geometry_stress_test(renders, tables, 2_000.0)?;
        }
        Some(SceneMode::OnpcReflectionTest) => {
            create_onpc_reflection_test(renders, tables)?;
        }
        None => {}
    }

    for path in &args.gltf_paths {
        crate::mesh::load_gltf_scene(path, tables, materials, textures, renders, renderer)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "setup_tests.rs"]
mod tests;
