//! Frame slots: command pools, buffers and fences for N frames in flight.

use ash::vk;
use comet_engine::error::EngineResult;
use comet_engine::limits::FRAMES_IN_FLIGHT;
use std::sync::Arc;

use crate::vulkan_context::{map_vk_error, VulkanContext};

/// Everything one frame slot owns. A slot is never re-entered while its
/// in-flight fence is unsignaled.
pub struct FrameTools {
    pub graphics_pool: vk::CommandPool,
    pub graphics_cmd: vk::CommandBuffer,
    /// Per-frame upload recording (dynamic transforms)
    pub transfer_pool: vk::CommandPool,
    pub transfer_cmd: vk::CommandBuffer,
    pub in_flight_fence: vk::Fence,
    pub copy_fence: vk::Fence,
}

pub struct FrameScheduler {
    device: Arc<ash::Device>,
    pub slots: Vec<FrameTools>,
    frame_index: usize,
}

fn create_pool_and_buffer(
    device: &ash::Device,
    family: u32,
) -> EngineResult<(vk::CommandPool, vk::CommandBuffer)> {
    unsafe {
        let pool_info = vk::CommandPoolCreateInfo::default().queue_family_index(family);
        let pool = device
            .create_command_pool(&pool_info, None)
            .map_err(|e| map_vk_error(e, "command pool"))?;
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = device
            .allocate_command_buffers(&alloc_info)
            .map_err(|e| map_vk_error(e, "command buffer"))?;
        Ok((pool, buffers[0]))
    }
}

impl FrameScheduler {
    pub fn new(context: &VulkanContext) -> EngineResult<Self> {
        let device = context.device.clone();
        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);
        unsafe {
            for _ in 0..FRAMES_IN_FLIGHT {
                let (graphics_pool, graphics_cmd) =
                    create_pool_and_buffer(&device, context.graphics_queue.family)?;
                let (transfer_pool, transfer_cmd) =
                    create_pool_and_buffer(&device, context.transfer_queue.family)?;

                // In-flight starts signaled so the first begin_frame passes
                let signaled = vk::FenceCreateInfo::default()
                    .flags(vk::FenceCreateFlags::SIGNALED);
                let in_flight_fence = device
                    .create_fence(&signaled, None)
                    .map_err(|e| map_vk_error(e, "fence"))?;
                let copy_fence = device
                    .create_fence(&vk::FenceCreateInfo::default(), None)
                    .map_err(|e| map_vk_error(e, "copy fence"))?;

                slots.push(FrameTools {
                    graphics_pool,
                    graphics_cmd,
                    transfer_pool,
                    transfer_cmd,
                    in_flight_fence,
                    copy_fence,
                });
            }
        }
        Ok(Self {
            device,
            slots,
            frame_index: 0,
        })
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn current(&self) -> &FrameTools {
        &self.slots[self.frame_index]
    }

    /// Block until this slot's previous submission retired, then reset its
    /// command pool. The only steady-state suspension point. The in-flight
    /// fence is reset separately, right before the submit that will signal
    /// it again, so a skipped frame (failed acquire) cannot deadlock the
    /// next wait.
    pub fn begin_frame(&mut self) -> EngineResult<&FrameTools> {
        unsafe {
            let tools = &self.slots[self.frame_index];
            self.device
                .wait_for_fences(&[tools.in_flight_fence], true, u64::MAX)
                .map_err(|e| map_vk_error(e, "frame fence wait"))?;
            self.device
                .reset_command_pool(
                    tools.graphics_pool,
                    vk::CommandPoolResetFlags::empty(),
                )
                .map_err(|e| map_vk_error(e, "pool reset"))?;
            Ok(&self.slots[self.frame_index])
        }
    }

    /// Arm this slot's fence for the submission that is about to happen.
    pub fn reset_in_flight_fence(&self) -> EngineResult<()> {
        unsafe {
            let tools = self.current();
            self.device
                .reset_fences(&[tools.in_flight_fence])
                .map_err(|e| map_vk_error(e, "fence reset"))
        }
    }

    /// Advance to the next slot after submission.
    pub fn end_frame(&mut self) {
        self.frame_index = (self.frame_index + 1) % FRAMES_IN_FLIGHT;
    }

    /// Record + submit a blocking copy on the transfer queue using this
    /// slot's copy fence. Used for the per-frame dynamic-transform upload.
    pub fn submit_transfer<F>(
        &self,
        context: &VulkanContext,
        record: F,
    ) -> EngineResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        unsafe {
            let tools = self.current();
            self.device
                .reset_command_pool(tools.transfer_pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| map_vk_error(e, "transfer pool reset"))?;

            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(tools.transfer_cmd, &begin)
                .map_err(|e| map_vk_error(e, "transfer begin"))?;
            record(tools.transfer_cmd);
            self.device
                .end_command_buffer(tools.transfer_cmd)
                .map_err(|e| map_vk_error(e, "transfer end"))?;

            let buffers = [tools.transfer_cmd];
            let submit = vk::SubmitInfo::default().command_buffers(&buffers);
            self.device
                .queue_submit(context.transfer_queue.handle, &[submit], tools.copy_fence)
                .map_err(|e| map_vk_error(e, "transfer submit"))?;
            // The graphics submission consumes the data this frame; block
            // here rather than threading a cross-queue semaphore
            self.device
                .wait_for_fences(&[tools.copy_fence], true, u64::MAX)
                .map_err(|e| map_vk_error(e, "copy fence wait"))?;
            self.device
                .reset_fences(&[tools.copy_fence])
                .map_err(|e| map_vk_error(e, "copy fence reset"))?;
            Ok(())
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        unsafe {
            for tools in &self.slots {
                self.device.destroy_fence(tools.in_flight_fence, None);
                self.device.destroy_fence(tools.copy_fence, None);
                self.device.destroy_command_pool(tools.graphics_pool, None);
                self.device.destroy_command_pool(tools.transfer_pool, None);
            }
        }
    }
}
