//! Translation of the engine's logical resource states into Vulkan
//! barriers.
//!
//! Pass code asks the shared [`ResourceStateTracker`] for transitions and
//! feeds them through a [`BarrierBatch`]; the tracker catches state
//! mismatches, this module only translates.

use ash::vk;
use comet_engine::renderer::{ResourceState, StateTransition};

/// Stage + access scope of a logical state for buffer use.
pub fn buffer_state_scope(state: ResourceState) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    match state {
        ResourceState::Common => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
        ),
        ResourceState::CopyDest => (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        ResourceState::CopySource => (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_READ,
        ),
        ResourceState::IndexBuffer => (
            vk::PipelineStageFlags::VERTEX_INPUT,
            vk::AccessFlags::INDEX_READ,
        ),
        ResourceState::NonPixelShaderResource => (
            vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::VERTEX_SHADER,
            vk::AccessFlags::SHADER_READ,
        ),
        ResourceState::PixelShaderResource => (
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::SHADER_READ,
        ),
        ResourceState::UnorderedAccess => (
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        ),
        // The opaque vertex shader also reads the command records (object
        // ids via gl_DrawID), so the scope covers both uses
        ResourceState::IndirectArgument => (
            vk::PipelineStageFlags::DRAW_INDIRECT | vk::PipelineStageFlags::VERTEX_SHADER,
            vk::AccessFlags::INDIRECT_COMMAND_READ | vk::AccessFlags::SHADER_READ,
        ),
        ResourceState::RenderTarget => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        ResourceState::DepthWrite => (
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        ResourceState::Present => (
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::AccessFlags::empty(),
        ),
    }
}

/// Image layout a logical state implies.
pub fn image_state_layout(state: ResourceState, aspect: vk::ImageAspectFlags) -> vk::ImageLayout {
    match state {
        ResourceState::Common => vk::ImageLayout::UNDEFINED,
        ResourceState::CopyDest => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ResourceState::CopySource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ResourceState::NonPixelShaderResource | ResourceState::PixelShaderResource => {
            if aspect.contains(vk::ImageAspectFlags::DEPTH) {
                vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            }
        }
        ResourceState::UnorderedAccess => vk::ImageLayout::GENERAL,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::DepthWrite => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        // Buffers only; images never declare these
        ResourceState::IndexBuffer | ResourceState::IndirectArgument => {
            vk::ImageLayout::UNDEFINED
        }
    }
}

/// Collects the barriers of one pass boundary into a single
/// `vkCmdPipelineBarrier`.
pub struct BarrierBatch<'a> {
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
    buffers: Vec<vk::BufferMemoryBarrier<'a>>,
    images: Vec<vk::ImageMemoryBarrier<'a>>,
}

impl<'a> BarrierBatch<'a> {
    pub fn new() -> Self {
        Self {
            src_stage: vk::PipelineStageFlags::empty(),
            dst_stage: vk::PipelineStageFlags::empty(),
            buffers: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Barrier for a whole buffer. A `UnorderedAccess -> UnorderedAccess`
    /// transition becomes the write-write self-barrier.
    pub fn buffer(&mut self, transition: StateTransition, buffer: vk::Buffer) {
        let (src_stage, src_access) = buffer_state_scope(transition.from);
        let (dst_stage, dst_access) = buffer_state_scope(transition.to);
        self.src_stage |= src_stage;
        self.dst_stage |= dst_stage;
        self.buffers.push(
            vk::BufferMemoryBarrier::default()
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(buffer)
                .offset(0)
                .size(vk::WHOLE_SIZE),
        );
    }

    /// Barrier + layout change for an image subresource range.
    pub fn image(
        &mut self,
        transition: StateTransition,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        base_mip: u32,
        mip_count: u32,
    ) {
        let (src_stage, src_access) = buffer_state_scope(transition.from);
        let (dst_stage, dst_access) = buffer_state_scope(transition.to);
        self.src_stage |= src_stage;
        self.dst_stage |= dst_stage;
        self.images.push(
            vk::ImageMemoryBarrier::default()
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .old_layout(image_state_layout(transition.from, aspect))
                .new_layout(image_state_layout(transition.to, aspect))
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: base_mip,
                    level_count: mip_count,
                    base_array_layer: 0,
                    layer_count: 1,
                }),
        );
    }

    /// Same as [`Self::image`], but keeping the image's contents is not
    /// required (first use after creation or full overwrite).
    pub fn image_discard(
        &mut self,
        to: ResourceState,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) {
        let (dst_stage, dst_access) = buffer_state_scope(to);
        self.src_stage |= vk::PipelineStageFlags::TOP_OF_PIPE;
        self.dst_stage |= dst_stage;
        self.images.push(
            vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(dst_access)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(image_state_layout(to, aspect))
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                    base_array_layer: 0,
                    layer_count: 1,
                }),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.images.is_empty()
    }

    /// Emit everything as one pipeline barrier.
    pub fn flush(self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                if self.src_stage.is_empty() {
                    vk::PipelineStageFlags::TOP_OF_PIPE
                } else {
                    self.src_stage
                },
                self.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &self.buffers,
                &self.images,
            );
        }
    }
}

impl Default for BarrierBatch<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirect_maps_to_draw_indirect_scope() {
        let (stage, access) = buffer_state_scope(ResourceState::IndirectArgument);
        assert_eq!(stage, vk::PipelineStageFlags::DRAW_INDIRECT);
        assert_eq!(access, vk::AccessFlags::INDIRECT_COMMAND_READ);
    }

    #[test]
    fn uav_covers_read_and_write() {
        let (_, access) = buffer_state_scope(ResourceState::UnorderedAccess);
        assert!(access.contains(vk::AccessFlags::SHADER_WRITE));
        assert!(access.contains(vk::AccessFlags::SHADER_READ));
    }

    #[test]
    fn depth_states_pick_depth_layouts() {
        assert_eq!(
            image_state_layout(ResourceState::DepthWrite, vk::ImageAspectFlags::DEPTH),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            image_state_layout(
                ResourceState::NonPixelShaderResource,
                vk::ImageAspectFlags::DEPTH
            ),
            vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            image_state_layout(
                ResourceState::NonPixelShaderResource,
                vk::ImageAspectFlags::COLOR
            ),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn empty_batch_flushes_nothing() {
        let batch = BarrierBatch::new();
        assert!(batch.is_empty());
    }
}
