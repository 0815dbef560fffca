//! Compile-time limits and defaults.
//!
//! Every capacity the resource tables enforce lives here, together with the
//! window/camera defaults the demo application uses. Exceeding a capacity is
//! a hard error at insert time, never a silent truncation.

/// Initial window size
pub const INITIAL_WINDOW_WIDTH: u32 = 1280;
pub const INITIAL_WINDOW_HEIGHT: u32 = 720;

/// Window background clear color (linear RGBA)
pub const WINDOW_BACKGROUND_COLOR: [f32; 4] = [0.0, 0.2, 0.4, 1.0];

/// Reverse-Z depth clear value: far plane clears to 0.0
pub const DEPTH_CLEAR_VALUE: f32 = 0.0;

// Camera defaults
pub const CAMERA_INITIAL_POSITION: [f32; 3] = [20.0, 70.0, 0.0];
pub const CAMERA_ZNEAR: f32 = 0.1;
pub const CAMERA_FOV_DEGREES: f32 = 70.0;
pub const CAMERA_DRAW_DISTANCE: f32 = 650.0;

/// Screen-space LOD error target in pixels
pub const LOD_TARGET_PIXEL_ERROR: f32 = 1.0;

// Resource table capacities
pub const MAX_TEXTURE_COUNT: usize = 5_000;
pub const MAX_MATERIAL_COUNT: usize = 10_000;
pub const MAX_MESH_COUNT: usize = 1_000_000;
pub const MAX_RENDER_OBJECTS: usize = 5_000_000;
pub const MAX_ONPC_OBJECTS: usize = 100;
pub const MAX_DYNAMIC_OBJECTS: usize = 1_000;

/// LOD chain length cap per surface
pub const MAX_LOD_COUNT: usize = 8;

/// Meshlet shape limits (also baked into the culling shaders)
pub const MAX_CLUSTER_VERTICES: usize = 64;
pub const MAX_CLUSTER_TRIANGLES: usize = 124;
pub const CLUSTER_CONE_WEIGHT: f32 = 0.25;

/// Per-LOD instance slots in instanced-culling mode
pub const MAX_INSTANCES_PER_LOD: usize = 100_000;

/// Depth pyramid mip chain cap
pub const MAX_DEPTH_PYRAMID_MIPS: u32 = 16;

/// Bounded staging buffer for texture uploads
pub const TEXTURE_STAGING_BUFFER_SIZE: u64 = 128 * 1024 * 1024;

/// Frames whose GPU work may be in flight at once
#[cfg(feature = "double-buffering")]
pub const FRAMES_IN_FLIGHT: usize = 2;
#[cfg(not(feature = "double-buffering"))]
pub const FRAMES_IN_FLIGHT: usize = 1;

/// Fence timeout applied during shutdown (nanoseconds). Steady-state waits
/// are unbounded; a shutdown wait that exceeds this downgrades to a forced
/// teardown with a warning.
pub const SHUTDOWN_FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Name under which the default mesh is registered
pub const DEFAULT_MESH_NAME: &str = "bunny";

/// Engine identification
pub const ENGINE_NAME: &str = "Comet Engine";
pub const ENGINE_VERSION: (u32, u32, u32) = (0, 1, 0);
