//! Indirect-draw command layout and shader asset paths.

use bytemuck::{Pod, Zeroable};

/// One slot in the indirect draw buffer, written by the culling pass.
///
/// The five trailing fields are exactly a `VkDrawIndexedIndirectCommand`
/// (and the D3D12 equivalent), prefixed with the render-object id the
/// vertex shader reads via the draw index.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Default)]
pub struct IndirectDrawCommand {
    pub object_id: u32,
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

impl IndirectDrawCommand {
    /// Command for one visible object at a chosen LOD.
    pub fn for_lod(object_id: u32, first_index: u32, index_count: u32) -> Self {
        Self {
            object_id,
            index_count,
            instance_count: 1,
            first_index,
            vertex_offset: 0,
            first_instance: 0,
        }
    }
}

/// Culling dispatches run one thread per render object in groups of 64.
pub const CULL_GROUP_SIZE: u32 = 64;

/// Workgroup count for `count` items at [`CULL_GROUP_SIZE`].
pub fn dispatch_group_count(count: u32) -> u32 {
    count.div_ceil(CULL_GROUP_SIZE)
}

/// Fixed paths the backends load pre-compiled shader bytecode from.
pub mod shader_paths {
    pub const LOADING_TRIANGLE_VS: &str = "shaders/loading-triangle.vs.bin";
    pub const LOADING_TRIANGLE_PS: &str = "shaders/loading-triangle.ps.bin";
    pub const OPAQUE_VS: &str = "shaders/opaque.vs.bin";
    pub const OPAQUE_PS: &str = "shaders/opaque.ps.bin";
    pub const DRAW_COUNT_RESET_CS: &str = "shaders/cs/draw-count-reset.cs.bin";
    pub const DRAW_CULL_CS: &str = "shaders/cs/draw-cull.cs.bin";
    // Occlusion mode
    pub const DRAW_OCC_FIRST_CS: &str = "shaders/cs/draw-occ-first.cs.bin";
    pub const DRAW_OCC_LATE_CS: &str = "shaders/cs/draw-occ-late.cs.bin";
    pub const DEPTH_PYRAMID_CS: &str = "shaders/cs/depth-pyramid.cs.bin";
    // Instanced mode
    pub const DRAW_INST_CULL_CS: &str = "shaders/cs/draw-inst-cull.cs.bin";
    pub const DRAW_INST_CMD_CS: &str = "shaders/cs/draw-inst-cmd.cs.bin";
    pub const DRAW_INST_COUNT_RESET_CS: &str = "shaders/cs/draw-inst-count-reset.cs.bin";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirect_command_is_24_bytes() {
        assert_eq!(std::mem::size_of::<IndirectDrawCommand>(), 24);
    }

    #[test]
    fn dispatch_rounds_up() {
        assert_eq!(dispatch_group_count(0), 0);
        assert_eq!(dispatch_group_count(1), 1);
        assert_eq!(dispatch_group_count(64), 1);
        assert_eq!(dispatch_group_count(65), 2);
    }
}
