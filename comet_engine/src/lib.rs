/*!
# Comet Engine

Core of the Comet GPU-driven renderer.

This crate is platform and graphics-API agnostic. It owns the scene-side data
model (meshes, LODs, clusters, materials, textures, transforms, render
objects), the asset ingest pipeline (OBJ / glTF / DDS), the camera system and
culling math, and the [`renderer::Renderer`] trait that concrete backends
implement.

## Architecture

- **Resource tables**: append-only arrays with stable integer handles
- **Mesh preparation**: vertex dedup/optimization, LOD chains, clusters
- **Scene assembly**: render-object lists partitioned opaque/transparent/ONPC
- **Renderer trait**: `init` → `upload_texture`* → `setup_for_rendering` →
  `final_setup` → per-frame `update`/`draw_frame`

Backend crates (`comet_engine_renderer_vulkan`, `comet_engine_renderer_gl`)
provide concrete renderers.
*/

pub mod camera;
pub mod clock;
pub mod error;
pub mod events;
pub mod limits;
pub mod log;
pub mod mesh;
pub mod renderer;
pub mod resource;
pub mod scene;

pub use error::{EngineError, EngineResult};

// Re-export math library
pub use glam;
