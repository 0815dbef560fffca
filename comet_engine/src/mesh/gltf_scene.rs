//! glTF 2.0 scene ingest: textures, materials, meshes and node transforms.

use std::path::Path;

use glam::Mat4;
use gltf::material::AlphaMode;

use crate::engine_info;
use crate::engine_warn;
use crate::error::{EngineError, EngineResult};
use crate::renderer::Renderer;
use crate::resource::{
    load_dds, quantize_snorm8, GeometryTables, MaterialTable, MeshTransform, TextureTable, Vertex,
};
use crate::scene::RenderContainer;
use super::prep::{generate_surface, generate_tangents};

/// Load a whole glTF scene: sibling DDS textures, materials, meshes and one
/// render object per node primitive.
pub fn load_gltf_scene(
    path: &Path,
    tables: &mut GeometryTables,
    materials: &mut MaterialTable,
    textures: &mut TextureTable,
    renders: &mut RenderContainer,
    renderer: &mut dyn Renderer,
) -> EngineResult<()> {
    engine_info!("comet::gltf", "loading gltf scene from {}", path.display());

    let (document, buffers, _images) = gltf::import(path)
        .map_err(|e| EngineError::AssetParse(format!("{}: {}", path.display(), e)))?;

    let texture_tags = load_textures(path, &document, textures, renderer)?;

    let previous_material_count = materials.len() as u32;
    load_materials(&document, materials, &texture_tags)?;

    let surface_bases = load_meshes(&document, &buffers, tables, previous_material_count)?;

    load_nodes(&document, tables, renders, &surface_bases)?;
    Ok(())
}

/// Textures ship as DDS files next to the glTF's source images. A missing or
/// malformed file maps to the default texture (tag 0) so material indexing
/// stays intact.
fn load_textures(
    gltf_path: &Path,
    document: &gltf::Document,
    textures: &mut TextureTable,
    renderer: &mut dyn Renderer,
) -> EngineResult<Vec<u32>> {
    let base_dir = gltf_path.parent().unwrap_or_else(|| Path::new(""));
    let mut tags = Vec::with_capacity(document.textures().len());

    for texture in document.textures() {
        let uri = match texture.source().source() {
            gltf::image::Source::Uri { uri, .. } => uri.to_string(),
            gltf::image::Source::View { .. } => {
                engine_warn!("comet::gltf", "embedded images are not supported, using default");
                tags.push(0);
                continue;
            }
        };

        let dds_path = base_dir.join(Path::new(&uri).with_extension("dds"));
        match load_dds(&dds_path) {
            Ok(asset) => {
                let device_tag = renderer.upload_texture(&asset)?;
                let table_tag = textures.add(&uri, &asset)?;
                debug_assert_eq!(device_tag, table_tag);
                tags.push(table_tag);
            }
            Err(error) => {
                engine_warn!(
                    "comet::gltf",
                    "texture {} unavailable ({}), using default",
                    dds_path.display(),
                    error
                );
                tags.push(0);
            }
        }
    }
    Ok(tags)
}

fn load_materials(
    document: &gltf::Document,
    materials: &mut MaterialTable,
    texture_tags: &[u32],
) -> EngineResult<()> {
    let tag_of = |index: Option<usize>| -> u32 {
        index
            .and_then(|i| texture_tags.get(i).copied())
            .unwrap_or(0)
    };

    for material in document.materials() {
        // glTF's own default material never reaches this iterator
        let pbr = material.pbr_metallic_roughness();
        let spec_gloss = material.pbr_specular_glossiness();

        let albedo = pbr
            .base_color_texture()
            .map(|info| info.texture().index())
            .or_else(|| {
                spec_gloss
                    .as_ref()
                    .and_then(|sg| sg.diffuse_texture())
                    .map(|info| info.texture().index())
            });
        let normal = material.normal_texture().map(|info| info.texture().index());
        let specular = spec_gloss
            .as_ref()
            .and_then(|sg| sg.specular_glossiness_texture())
            .map(|info| info.texture().index());
        let emissive = material
            .emissive_texture()
            .map(|info| info.texture().index());

        materials.add(
            tag_of(albedo),
            tag_of(normal),
            tag_of(specular),
            tag_of(emissive),
            material.name(),
        )?;
    }
    Ok(())
}

/// Load every mesh; returns the first-surface id of each, indexed by the
/// glTF mesh index.
fn load_meshes(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    tables: &mut GeometryTables,
    previous_material_count: u32,
) -> EngineResult<Vec<u32>> {
    let mut surface_bases = vec![0u32; document.meshes().len()];

    for mesh in document.meshes() {
        surface_bases[mesh.index()] = tables.surfaces.len() as u32;
        let name = mesh
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("gltf_mesh_{}", mesh.index()));
        let mesh_id = tables.add_mesh(&name)?;

        for primitive in mesh.primitives() {
            load_primitive(tables, buffers, &primitive, previous_material_count)?;
            tables.count_surface(mesh_id);
        }
    }
    Ok(surface_bases)
}

fn load_primitive(
    tables: &mut GeometryTables,
    buffers: &[gltf::buffer::Data],
    primitive: &gltf::Primitive,
    previous_material_count: u32,
) -> EngineResult<()> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        return Err(EngineError::UnsupportedFormat(format!(
            "glTF primitive mode {:?}, only triangles are supported",
            primitive.mode()
        )));
    }
    if primitive.indices().is_none() {
        return Err(EngineError::UnsupportedFormat(
            "glTF primitive without indices".to_string(),
        ));
    }

    let reader = primitive.reader(|buffer| Some(buffers[buffer.index()].0.as_slice()));

    let positions = reader
        .read_positions()
        .ok_or_else(|| EngineError::AssetParse("glTF primitive without positions".to_string()))?;
    let mut vertices: Vec<Vertex> = positions
        .map(|position| Vertex {
            position,
            uv: [0.0, 0.0],
            normal: [127, 127, 254, 0],
            tangent: [127, 127, 127, 254],
        })
        .collect();

    if let Some(normals) = reader.read_normals() {
        for (vertex, normal) in vertices.iter_mut().zip(normals) {
            vertex.normal = [
                quantize_snorm8(normal[0]),
                quantize_snorm8(normal[1]),
                quantize_snorm8(normal[2]),
                0,
            ];
        }
    }

    let mut has_tangents = false;
    if let Some(tangents) = reader.read_tangents() {
        has_tangents = true;
        for (vertex, tangent) in vertices.iter_mut().zip(tangents) {
            vertex.tangent = [
                quantize_snorm8(tangent[0]),
                quantize_snorm8(tangent[1]),
                quantize_snorm8(tangent[2]),
                quantize_snorm8(tangent[3]),
            ];
        }
    }

    if let Some(tex_coords) = reader.read_tex_coords(0) {
        for (vertex, uv) in vertices.iter_mut().zip(tex_coords.into_f32()) {
            vertex.uv = uv;
        }
    }

    let indices: Vec<u32> = reader
        .read_indices()
        .ok_or_else(|| EngineError::AssetParse("glTF indices unreadable".to_string()))?
        .into_u32()
        .collect();

    if !has_tangents {
        generate_tangents(&mut vertices, &indices);
    }

    let surface_id = generate_surface(tables, vertices, indices)?;

    let material = primitive.material();
    if let Some(material_index) = material.index() {
        let material_id = previous_material_count + material_index as u32;
        tables.surfaces[surface_id as usize].material_id = material_id;
    }
    if material.alpha_mode() != AlphaMode::Opaque {
        tables.surface_transparency[surface_id as usize] = true;
    }
    Ok(())
}

/// One render object per node primitive, with the node's world transform
/// decomposed to position + uniform scale + orientation.
fn load_nodes(
    document: &gltf::Document,
    tables: &GeometryTables,
    renders: &mut RenderContainer,
    surface_bases: &[u32],
) -> EngineResult<()> {
    for scene in document.scenes() {
        for node in scene.nodes() {
            visit_node(&node, Mat4::IDENTITY, tables, renders, surface_bases)?;
        }
    }
    Ok(())
}

fn visit_node(
    node: &gltf::Node,
    parent: Mat4,
    tables: &GeometryTables,
    renders: &mut RenderContainer,
    surface_bases: &[u32],
) -> EngineResult<()> {
    let local = Mat4::from_cols_array_2d(&node.transform().matrix());
    let world = parent * local;

    if let Some(mesh) = node.mesh() {
        let transform = MeshTransform::from_matrix(&world);
        let transform_id = renders.add_transform(transform);
        let base = surface_bases[mesh.index()];
        for (offset, _) in mesh.primitives().enumerate() {
            renders.create_render_object(tables, transform_id, base + offset as u32)?;
        }
    }

    for child in node.children() {
        visit_node(&child, world, tables, renders, surface_bases)?;
    }
    Ok(())
}
