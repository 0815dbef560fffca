/// Mesh module - geometry ingest and GPU-ready preparation

pub mod gltf_scene;
pub mod obj;
pub mod prep;

pub use gltf_scene::*;
pub use obj::*;
pub use prep::*;
