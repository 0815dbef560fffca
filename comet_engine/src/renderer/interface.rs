//! The renderer trait every backend implements.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::camera::CameraContainer;
use crate::error::EngineResult;
use crate::resource::{GeometryTables, MaterialTable, MeshTransform, TextureAsset};
use crate::scene::RenderContainer;

/// Native window handles captured on the main thread before `init`.
pub struct WindowHandles {
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
    pub width: u32,
    pub height: u32,
}

/// Everything `setup_for_rendering` needs to build the GPU scene.
pub struct DrawContext<'a> {
    pub geometry: &'a mut GeometryTables,
    pub materials: &'a mut MaterialTable,
    pub renders: &'a RenderContainer,
}

/// Per-frame inputs for `update` / `draw_frame`.
pub struct FrameContext<'a> {
    pub cameras: &'a mut CameraContainer,
    pub renders: &'a RenderContainer,
    pub delta_time: f32,
}

/// Main renderer interface, the engine's view of a backend.
///
/// Call order: `init` once, `upload_texture` any number of times, then
/// `setup_for_rendering` exactly once, then `final_setup` once, then
/// per-frame `update` + `draw_frame`. `draw_while_waiting` is legal any time
/// after `init` and touches no scene data.
///
/// Implementations must be `Send`: scene loading (including texture uploads
/// and `setup_for_rendering`) runs on the loader thread while the main
/// thread keeps presenting the waiting screen.
pub trait Renderer: Send {
    /// Create device objects, swapchain, depth targets, descriptor heaps and
    /// the loading-screen pipeline. Idempotent once it has succeeded; does
    /// not touch scene data.
    fn init(&mut self, handles: &WindowHandles) -> EngineResult<()>;

    /// Upload one block-compressed texture; returns the texture's slot in
    /// the bindless array. Must happen before `setup_for_rendering`.
    fn upload_texture(&mut self, asset: &TextureAsset) -> EngineResult<u32>;

    /// Build every GPU table from the finished scene, create the runtime
    /// pipelines and write the descriptor sets. Patches material texture
    /// tags by the backend's texture base. Exactly once per lifetime.
    fn setup_for_rendering(&mut self, ctx: &mut DrawContext) -> EngineResult<()>;

    /// Emit the initial resource-state transitions so the per-frame passes
    /// find every buffer in its expected starting state. No-op after the
    /// first successful call.
    fn final_setup(&mut self) -> EngineResult<()>;

    /// Minimal fullscreen-triangle frame used while the scene loads.
    fn draw_while_waiting(&mut self, delta_time: f32) -> EngineResult<()>;

    /// Host-side per-frame work: view-data refresh, dynamic staging writes.
    fn update(&mut self, ctx: &mut FrameContext) -> EngineResult<()>;

    /// Record and submit exactly one frame. Returns when the submission is
    /// issued, not when the GPU finishes.
    fn draw_frame(&mut self, ctx: &mut FrameContext) -> EngineResult<()>;

    /// Write one transform into the current frame's persistently-mapped
    /// staging region; the next `draw_frame` copies it to the GPU.
    fn update_object_transform(&mut self, transform_id: u32, transform: &MeshTransform);

    /// Window size changed. Zero sizes suspend; the swapchain is recreated
    /// on the next non-zero resize.
    fn resize(&mut self, width: u32, height: u32);

    /// Block until the device is idle. Used at shutdown; bounded by the
    /// shutdown timeout, after which teardown proceeds with a warning.
    fn wait_idle(&mut self);
}
