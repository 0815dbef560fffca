//! The Vulkan implementation of the engine's `Renderer` trait.

use ash::vk;
use comet_engine::camera::CameraViewData;
use comet_engine::error::{EngineError, EngineResult};
use comet_engine::limits::{
    DEPTH_CLEAR_VALUE, FRAMES_IN_FLIGHT, MAX_DYNAMIC_OBJECTS, TEXTURE_STAGING_BUFFER_SIZE,
    WINDOW_BACKGROUND_COLOR,
};
use comet_engine::renderer::{
    dispatch_group_count, DrawContext, FrameContext, IndirectDrawCommand, Renderer,
    ResourceState, ResourceStateTracker, TrackedResource, WindowHandles,
};
use comet_engine::resource::{BlockFormat, MeshTransform, TextureAsset};
use comet_engine::{engine_info, engine_warn};
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::{map_vk_error, VulkanContext};
use crate::vulkan_descriptors as descriptors;
use crate::vulkan_descriptors::DescriptorContext;
use crate::vulkan_frame::FrameScheduler;
#[cfg(feature = "occlusion")]
use crate::vulkan_image::DepthPyramid;
use crate::vulkan_image::{create_default_sampler, create_pyramid_sampler, Image};
use crate::vulkan_pipelines::{LoadingPipeline, RuntimePipelines};
use crate::vulkan_state::BarrierBatch;
use crate::vulkan_swapchain::{AcquireResult, Swapchain};
use gpu_allocator::vulkan::Allocator;

// Tracked-resource id layout. Per-slot resources add their slot index.
const ID_TRANSFORM_BASE: u32 = 0;
const ID_INDIRECT_BASE: u32 = 8;
const ID_COUNT_BASE: u32 = 16;
const ID_VISIBILITY_BASE: u32 = 24;
const ID_PYRAMID_BASE: u32 = 32;
const ID_DEPTH_TARGET: u32 = 40;
const ID_SWAPCHAIN_BASE: u32 = 48;

fn block_format_to_vk(format: BlockFormat) -> vk::Format {
    match format {
        BlockFormat::Bc1 { srgb: false } => vk::Format::BC1_RGBA_UNORM_BLOCK,
        BlockFormat::Bc1 { srgb: true } => vk::Format::BC1_RGBA_SRGB_BLOCK,
        BlockFormat::Bc2 { srgb: false } => vk::Format::BC2_UNORM_BLOCK,
        BlockFormat::Bc2 { srgb: true } => vk::Format::BC2_SRGB_BLOCK,
        BlockFormat::Bc3 { srgb: false } => vk::Format::BC3_UNORM_BLOCK,
        BlockFormat::Bc3 { srgb: true } => vk::Format::BC3_SRGB_BLOCK,
        BlockFormat::Bc4 { signed: false } => vk::Format::BC4_UNORM_BLOCK,
        BlockFormat::Bc4 { signed: true } => vk::Format::BC4_SNORM_BLOCK,
        BlockFormat::Bc5 { signed: false } => vk::Format::BC5_UNORM_BLOCK,
        BlockFormat::Bc5 { signed: true } => vk::Format::BC5_SNORM_BLOCK,
        BlockFormat::Bc6h { signed: false } => vk::Format::BC6H_UFLOAT_BLOCK,
        BlockFormat::Bc6h { signed: true } => vk::Format::BC6H_SFLOAT_BLOCK,
        BlockFormat::Bc7 { srgb: false } => vk::Format::BC7_UNORM_BLOCK,
        BlockFormat::Bc7 { srgb: true } => vk::Format::BC7_SRGB_BLOCK,
    }
}

/// Scene-dependent GPU resources created by `setup_for_rendering`.
struct SceneResources {
    pipelines: RuntimePipelines,

    vertex_buffer: Buffer,
    index_buffer: Buffer,
    surface_buffer: Buffer,
    lod_buffer: Buffer,
    material_buffer: Buffer,
    render_object_buffer: Buffer,
    #[cfg(feature = "clusters")]
    cluster_buffer: Buffer,
    #[cfg(feature = "clusters")]
    cluster_index_buffer: Buffer,
    #[cfg(feature = "instancing")]
    lod_instance_buffers: Vec<Buffer>,
    #[cfg(feature = "instancing")]
    instance_data_buffers: Vec<Buffer>,

    transform_buffer: Buffer,
    /// Per-slot persistently mapped dynamic-transform staging
    transform_staging: Vec<Buffer>,
    /// Per-slot view-data uniform buffers, persistently mapped
    view_data_buffers: Vec<Buffer>,
    indirect_buffers: Vec<Buffer>,
    count_buffers: Vec<Buffer>,
    /// Shared across slots: the late pass of frame F feeds the first pass
    /// of frame F+1, queue order serializes the accesses
    visibility_buffer: Buffer,
    #[cfg(feature = "occlusion")]
    pyramids: Vec<DepthPyramid>,

    object_count: u32,
    /// Indirect command slots available per frame
    draw_capacity: u32,
    dynamic_count: u32,
}

pub struct VulkanRenderer {
    // Dropped in declaration order: scene and frame resources first,
    // context (device) last
    scene: Option<SceneResources>,
    textures: Vec<Image>,
    texture_staging: Option<Buffer>,
    loading_pipeline: Option<LoadingPipeline>,
    depth_target: Option<Image>,
    swapchain: Option<Swapchain>,
    frames: Option<FrameScheduler>,
    descriptors: Option<DescriptorContext>,
    default_sampler: vk::Sampler,
    pyramid_sampler: vk::Sampler,
    tracker: ResourceStateTracker,
    view_data: CameraViewData,
    resize_pending: Option<(u32, u32)>,
    final_setup_done: bool,
    device_lost: bool,
    overflow_warned: bool,
    context: Option<VulkanContext>,
}

impl VulkanRenderer {
    pub fn new() -> Self {
        Self {
            scene: None,
            textures: Vec::new(),
            texture_staging: None,
            loading_pipeline: None,
            depth_target: None,
            swapchain: None,
            frames: None,
            descriptors: None,
            default_sampler: vk::Sampler::null(),
            pyramid_sampler: vk::Sampler::null(),
            tracker: ResourceStateTracker::new(),
            view_data: CameraViewData::default(),
            resize_pending: None,
            final_setup_done: false,
            device_lost: false,
            overflow_warned: false,
            context: None,
        }
    }

    fn context(&self) -> &VulkanContext {
        self.context.as_ref().expect("renderer not initialized")
    }

    fn device(&self) -> Arc<ash::Device> {
        self.context().device.clone()
    }

    fn allocator(&self) -> Arc<Mutex<Allocator>> {
        (*self.context().allocator).clone()
    }

    /// Blocking one-shot submission on the graphics queue, used for
    /// loading-time uploads and the initial state transitions.
    fn submit_once<F>(&self, record: F) -> EngineResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let context = self.context();
        let device = &context.device;
        unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .flags(vk::CommandPoolCreateFlags::TRANSIENT)
                .queue_family_index(context.graphics_queue.family);
            let pool = device
                .create_command_pool(&pool_info, None)
                .map_err(|e| map_vk_error(e, "upload pool"))?;
            let alloc = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let cmd = device
                .allocate_command_buffers(&alloc)
                .map_err(|e| map_vk_error(e, "upload cmd"))?[0];

            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd, &begin)
                .map_err(|e| map_vk_error(e, "upload begin"))?;
            record(cmd);
            device
                .end_command_buffer(cmd)
                .map_err(|e| map_vk_error(e, "upload end"))?;

            let fence = device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| map_vk_error(e, "upload fence"))?;
            let buffers = [cmd];
            let submit = vk::SubmitInfo::default().command_buffers(&buffers);
            let result = device
                .queue_submit(context.graphics_queue.handle, &[submit], fence)
                .map_err(|e| map_vk_error(e, "upload submit"))
                .and_then(|_| {
                    device
                        .wait_for_fences(&[fence], true, u64::MAX)
                        .map_err(|e| map_vk_error(e, "upload wait"))
                });
            device.destroy_fence(fence, None);
            device.destroy_command_pool(pool, None);
            result
        }
    }

    /// Create a device-local buffer and fill it through the bounded staging
    /// buffer, chunking when the data is larger than the staging region.
    fn upload_device_buffer(
        &mut self,
        name: &str,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> EngineResult<Buffer> {
        let buffer = Buffer::device_local(
            self.device(),
            self.allocator(),
            name,
            data.len().max(4) as u64,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
        )?;
        if data.is_empty() {
            return Ok(buffer);
        }

        let staging_size = {
            let staging = self.texture_staging.as_ref().expect("staging exists");
            staging.size as usize
        };
        let mut offset = 0usize;
        while offset < data.len() {
            let chunk = (data.len() - offset).min(staging_size);
            self.texture_staging
                .as_mut()
                .expect("staging exists")
                .write(0, &data[offset..offset + chunk])?;
            let staging_handle = self.texture_staging.as_ref().unwrap().handle;
            let device = self.device();
            let dst = buffer.handle;
            self.submit_once(|cmd| unsafe {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: offset as u64,
                    size: chunk as u64,
                };
                device.cmd_copy_buffer(cmd, staging_handle, dst, &[region]);
            })?;
            offset += chunk;
        }
        Ok(buffer)
    }

    fn declare_swapchain_images(&mut self) {
        let image_count = self.swapchain.as_ref().map_or(0, |s| s.images.len());
        for index in 0..image_count {
            self.tracker.declare(
                TrackedResource::whole(ID_SWAPCHAIN_BASE + index as u32),
                ResourceState::Common,
            );
        }
    }

    /// Rebuild swapchain-sized resources after a resize.
    fn recreate_swapchain(&mut self, width: u32, height: u32) -> EngineResult<()> {
        self.context().wait_idle();
        {
            let context = self.context.as_ref().expect("init done");
            self.swapchain
                .as_mut()
                .expect("swapchain exists")
                .recreate(context, width, height)?;
        }
        let extent = self.swapchain.as_ref().unwrap().extent;
        self.depth_target = Some(Image::depth_target(
            self.device(),
            self.allocator(),
            extent,
        )?);
        self.declare_swapchain_images();
        self.tracker
            .declare(TrackedResource::whole(ID_DEPTH_TARGET), ResourceState::Common);

        #[cfg(feature = "occlusion")]
        if self.scene.is_some() {
            let device = self.device();
            let allocator = self.allocator();
            let mut pyramids = Vec::with_capacity(FRAMES_IN_FLIGHT);
            for _ in 0..FRAMES_IN_FLIGHT {
                pyramids.push(DepthPyramid::new(device.clone(), allocator.clone(), extent)?);
            }
            self.scene.as_mut().expect("scene exists").pyramids = pyramids;
            self.write_pyramid_sets();
            self.declare_pyramids();
        }

        // The first frame after a recreate runs the initial transitions for
        // the new attachments
        if self.final_setup_done {
            self.emit_initial_attachment_states()?;
        }
        Ok(())
    }

    #[cfg(feature = "occlusion")]
    fn declare_pyramids(&mut self) {
        if let Some(scene) = &self.scene {
            for (slot, pyramid) in scene.pyramids.iter().enumerate() {
                for mip in 0..pyramid.mip_count {
                    self.tracker.declare(
                        TrackedResource::mip(ID_PYRAMID_BASE + slot as u32, mip),
                        ResourceState::Common,
                    );
                }
            }
        }
    }

    #[cfg(feature = "occlusion")]
    fn write_pyramid_sets(&self) {
        let scene = self.scene.as_ref().expect("scene exists");
        let descriptors = self.descriptors.as_ref().expect("descriptors exist");
        for (slot, pyramid) in scene.pyramids.iter().enumerate() {
            // Cull set samples the whole chain
            descriptors.write_combined_image(
                descriptors.cull_sets[slot],
                descriptors::CULL_PYRAMID_BINDING,
                pyramid.image.view,
                self.pyramid_sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
            // Reduction sets: dst = mip, src = previous mip (or the depth
            // target for mip 0)
            for mip in 0..pyramid.mip_count as usize {
                let set = descriptors.pyramid_sets[slot][mip];
                descriptors.write_storage_image(
                    set,
                    descriptors::PYRAMID_DST_BINDING,
                    pyramid.mip_views[mip],
                );
                if mip == 0 {
                    descriptors.write_combined_image(
                        set,
                        descriptors::PYRAMID_SRC_BINDING,
                        self.depth_target.as_ref().expect("depth exists").view,
                        self.pyramid_sampler,
                        vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
                    );
                } else {
                    descriptors.write_combined_image(
                        set,
                        descriptors::PYRAMID_SRC_BINDING,
                        pyramid.mip_views[mip - 1],
                        self.pyramid_sampler,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    );
                }
            }
        }
    }

    /// Put the depth target, swapchain images (and pyramids) into the
    /// states the per-frame passes expect at their first use.
    fn emit_initial_attachment_states(&mut self) -> EngineResult<()> {
        let depth = self.depth_target.as_ref().expect("depth exists").handle;
        let swapchain_images: Vec<vk::Image> =
            self.swapchain.as_ref().expect("swapchain exists").images.clone();
        #[cfg(feature = "occlusion")]
        let pyramid_images: Vec<(vk::Image, u32)> = self
            .scene
            .as_ref()
            .map(|scene| {
                scene
                    .pyramids
                    .iter()
                    .map(|p| (p.image.handle, p.mip_count))
                    .collect()
            })
            .unwrap_or_default();

        let device = self.device();
        self.submit_once(|cmd| {
            let mut batch = BarrierBatch::new();
            batch.image_discard(
                ResourceState::DepthWrite,
                depth,
                vk::ImageAspectFlags::DEPTH,
            );
            for image in &swapchain_images {
                batch.image_discard(
                    ResourceState::Present,
                    *image,
                    vk::ImageAspectFlags::COLOR,
                );
            }
            #[cfg(feature = "occlusion")]
            for (image, _) in &pyramid_images {
                batch.image_discard(
                    ResourceState::NonPixelShaderResource,
                    *image,
                    vk::ImageAspectFlags::COLOR,
                );
            }
            batch.flush(&device, cmd);
        })?;

        // Mirror the transitions in the tracker
        self.tracker.declare(
            TrackedResource::whole(ID_DEPTH_TARGET),
            ResourceState::DepthWrite,
        );
        for index in 0..swapchain_images.len() {
            self.tracker.declare(
                TrackedResource::whole(ID_SWAPCHAIN_BASE + index as u32),
                ResourceState::Present,
            );
        }
        #[cfg(feature = "occlusion")]
        for (slot, (_, mips)) in pyramid_images.iter().enumerate() {
            for mip in 0..*mips {
                self.tracker.declare(
                    TrackedResource::mip(ID_PYRAMID_BASE + slot as u32, mip),
                    ResourceState::NonPixelShaderResource,
                );
            }
        }
        Ok(())
    }

    /// Write the per-frame descriptor sets once all scene buffers exist.
    fn write_runtime_sets(&mut self) {
        let scene = self.scene.as_ref().expect("scene exists");
        let descriptors = self.descriptors.as_ref().expect("descriptors exist");

        for slot in 0..FRAMES_IN_FLIGHT {
            let shared = descriptors.shared_sets[slot];
            descriptors.write_buffer(
                shared,
                descriptors::SHARED_VIEW_DATA_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
                scene.view_data_buffers[slot].handle,
            );
            descriptors.write_buffer(
                shared,
                descriptors::SHARED_SURFACES_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                scene.surface_buffer.handle,
            );
            descriptors.write_buffer(
                shared,
                descriptors::SHARED_TRANSFORMS_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                scene.transform_buffer.handle,
            );
            descriptors.write_buffer(
                shared,
                descriptors::SHARED_RENDER_OBJECTS_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                scene.render_object_buffer.handle,
            );
            descriptors.write_buffer(
                shared,
                descriptors::SHARED_LODS_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                scene.lod_buffer.handle,
            );

            let cull = descriptors.cull_sets[slot];
            descriptors.write_buffer(
                cull,
                descriptors::CULL_INDIRECT_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                scene.indirect_buffers[slot].handle,
            );
            descriptors.write_buffer(
                cull,
                descriptors::CULL_COUNT_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                scene.count_buffers[slot].handle,
            );
            descriptors.write_buffer(
                cull,
                descriptors::CULL_VISIBILITY_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                scene.visibility_buffer.handle,
            );
            #[cfg(feature = "instancing")]
            {
                descriptors.write_buffer(
                    cull,
                    descriptors::CULL_LOD_INSTANCES_BINDING,
                    vk::DescriptorType::STORAGE_BUFFER,
                    scene.lod_instance_buffers[slot].handle,
                );
                descriptors.write_buffer(
                    cull,
                    descriptors::CULL_INSTANCE_DATA_BINDING,
                    vk::DescriptorType::STORAGE_BUFFER,
                    scene.instance_data_buffers[slot].handle,
                );
            }
        }

        for slot in 0..FRAMES_IN_FLIGHT {
            let graphics = descriptors.graphics_sets[slot];
            descriptors.write_buffer(
                graphics,
                descriptors::GFX_VERTICES_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                scene.vertex_buffer.handle,
            );
            descriptors.write_buffer(
                graphics,
                descriptors::GFX_MATERIALS_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                scene.material_buffer.handle,
            );
            descriptors.write_buffer(
                graphics,
                descriptors::GFX_COMMANDS_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                scene.indirect_buffers[slot].handle,
            );
        }
        descriptors.write_sampler(
            descriptors.texture_set,
            descriptors::TEX_SAMPLER_BINDING,
            self.default_sampler,
        );
    }

    /// Record the draw-count reset + frustum/LOD cull dispatches with their
    /// barrier discipline.
    fn record_cull_passes(&mut self, cmd: vk::CommandBuffer, slot: usize) -> EngineResult<()> {
        let device = self.device();
        let scene = self.scene.as_ref().expect("scene exists");
        let descriptors = self.descriptors.as_ref().expect("descriptors exist");

        // Indirect + count leave the graphics domain and become UAVs
        let mut batch = BarrierBatch::new();
        batch.buffer(
            self.tracker.transition(
                TrackedResource::whole(ID_INDIRECT_BASE + slot as u32),
                ResourceState::IndirectArgument,
                ResourceState::UnorderedAccess,
            )?,
            scene.indirect_buffers[slot].handle,
        );
        batch.buffer(
            self.tracker.transition(
                TrackedResource::whole(ID_COUNT_BASE + slot as u32),
                ResourceState::IndirectArgument,
                ResourceState::UnorderedAccess,
            )?,
            scene.count_buffers[slot].handle,
        );
        #[cfg(feature = "occlusion")]
        {
            // Last frame's late pass wrote the visibility bits this pass
            // reads; a self-barrier orders the two compute accesses
            batch.buffer(
                self.tracker
                    .request(
                        TrackedResource::whole(ID_VISIBILITY_BASE),
                        ResourceState::UnorderedAccess,
                    )?
                    .expect("uav self-barrier"),
                scene.visibility_buffer.handle,
            );
        }
        batch.flush(&device, cmd);

        unsafe {
            let sets = [descriptors.shared_sets[slot], descriptors.cull_sets[slot]];
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                scene.pipelines.cull_layout,
                0,
                &sets,
                &[],
            );
            let push = [scene.object_count, scene.draw_capacity];
            device.cmd_push_constants(
                cmd,
                scene.pipelines.cull_layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::cast_slice(&push),
            );

            // Draw-count reset: one workgroup
            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                scene.pipelines.draw_count_reset,
            );
            device.cmd_dispatch(cmd, 1, 1, 1);

            // UAV self-barrier between the reset and the cull writes
            let mut uav = BarrierBatch::new();
            uav.buffer(
                self.tracker.request(
                    TrackedResource::whole(ID_COUNT_BASE + slot as u32),
                    ResourceState::UnorderedAccess,
                )?
                .expect("uav self-barrier"),
                scene.count_buffers[slot].handle,
            );
            uav.flush(&device, cmd);

            // Frustum + LOD cull, one thread per render object
            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                scene.pipelines.draw_cull,
            );
            device.cmd_dispatch(cmd, dispatch_group_count(scene.object_count), 1, 1);

            #[cfg(feature = "instancing")]
            {
                // Expand per-LOD instance counters into draw commands
                let mut expand_uav = BarrierBatch::new();
                expand_uav.buffer(
                    self.tracker
                        .request(
                            TrackedResource::whole(ID_INDIRECT_BASE + slot as u32),
                            ResourceState::UnorderedAccess,
                        )?
                        .expect("uav self-barrier"),
                    scene.indirect_buffers[slot].handle,
                );
                expand_uav.flush(&device, cmd);
                device.cmd_bind_pipeline(
                    cmd,
                    vk::PipelineBindPoint::COMPUTE,
                    scene.pipelines.draw_inst_cmd,
                );
                device.cmd_dispatch(cmd, dispatch_group_count(scene.object_count), 1, 1);
            }
        }

        // Back to the graphics domain for ExecuteIndirect
        let mut batch = BarrierBatch::new();
        batch.buffer(
            self.tracker.transition(
                TrackedResource::whole(ID_INDIRECT_BASE + slot as u32),
                ResourceState::UnorderedAccess,
                ResourceState::IndirectArgument,
            )?,
            scene.indirect_buffers[slot].handle,
        );
        batch.buffer(
            self.tracker.transition(
                TrackedResource::whole(ID_COUNT_BASE + slot as u32),
                ResourceState::UnorderedAccess,
                ResourceState::IndirectArgument,
            )?,
            scene.count_buffers[slot].handle,
        );
        batch.flush(&device, cmd);
        Ok(())
    }

    /// Max-reduce the depth buffer into the slot's pyramid, one dispatch
    /// per mip with a subresource barrier before the next mip samples it.
    #[cfg(feature = "occlusion")]
    fn record_pyramid_build(&mut self, cmd: vk::CommandBuffer, slot: usize) -> EngineResult<()> {
        let device = self.device();
        let scene = self.scene.as_ref().expect("scene exists");
        let descriptors = self.descriptors.as_ref().expect("descriptors exist");
        let pyramid = &scene.pyramids[slot];
        let depth = self.depth_target.as_ref().expect("depth exists");

        // Depth becomes a shader resource for the reduction
        let mut batch = BarrierBatch::new();
        batch.image(
            self.tracker.transition(
                TrackedResource::whole(ID_DEPTH_TARGET),
                ResourceState::DepthWrite,
                ResourceState::NonPixelShaderResource,
            )?,
            depth.handle,
            vk::ImageAspectFlags::DEPTH,
            0,
            1,
        );
        batch.flush(&device, cmd);

        unsafe {
            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                scene.pipelines.depth_pyramid,
            );
            for mip in 0..pyramid.mip_count {
                let id = TrackedResource::mip(ID_PYRAMID_BASE + slot as u32, mip);
                let mut to_uav = BarrierBatch::new();
                to_uav.image(
                    self.tracker.transition(
                        id,
                        ResourceState::NonPixelShaderResource,
                        ResourceState::UnorderedAccess,
                    )?,
                    pyramid.image.handle,
                    vk::ImageAspectFlags::COLOR,
                    mip,
                    1,
                );
                to_uav.flush(&device, cmd);

                let sets = [descriptors.pyramid_sets[slot][mip as usize]];
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::COMPUTE,
                    scene.pipelines.pyramid_layout,
                    0,
                    &sets,
                    &[],
                );
                let (mip_width, mip_height) = pyramid.mip_extent(mip);
                let push = [mip_width, mip_height];
                device.cmd_push_constants(
                    cmd,
                    scene.pipelines.pyramid_layout,
                    vk::ShaderStageFlags::COMPUTE,
                    0,
                    bytemuck::cast_slice(&push),
                );
                device.cmd_dispatch(
                    cmd,
                    mip_width.div_ceil(8),
                    mip_height.div_ceil(8),
                    1,
                );

                // Mip i is sampled by the mip i+1 dispatch
                let mut to_read = BarrierBatch::new();
                to_read.image(
                    self.tracker.transition(
                        id,
                        ResourceState::UnorderedAccess,
                        ResourceState::NonPixelShaderResource,
                    )?,
                    pyramid.image.handle,
                    vk::ImageAspectFlags::COLOR,
                    mip,
                    1,
                );
                to_read.flush(&device, cmd);
            }
        }

        // Late occlusion pass: re-test frustum survivors against the fresh
        // pyramid and persist the visibility bits for the next frame
        unsafe {
            let sets = [descriptors.shared_sets[slot], descriptors.cull_sets[slot]];
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                scene.pipelines.cull_layout,
                0,
                &sets,
                &[],
            );
            let push = [scene.object_count, scene.draw_capacity];
            device.cmd_push_constants(
                cmd,
                scene.pipelines.cull_layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::cast_slice(&push),
            );
            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                scene.pipelines.draw_occ_late,
            );
            device.cmd_dispatch(cmd, dispatch_group_count(scene.object_count), 1, 1);
        }

        // Depth returns to attachment use for the next frame
        let mut batch = BarrierBatch::new();
        batch.image(
            self.tracker.transition(
                TrackedResource::whole(ID_DEPTH_TARGET),
                ResourceState::NonPixelShaderResource,
                ResourceState::DepthWrite,
            )?,
            depth.handle,
            vk::ImageAspectFlags::DEPTH,
            0,
            1,
        );
        batch.flush(&device, cmd);
        Ok(())
    }

    /// Viewport + scissor + clears + the indirect indexed draw.
    fn record_opaque_pass(
        &mut self,
        cmd: vk::CommandBuffer,
        slot: usize,
        image_index: u32,
    ) -> EngineResult<()> {
        let device = self.device();
        let scene = self.scene.as_ref().expect("scene exists");
        let descriptors = self.descriptors.as_ref().expect("descriptors exist");
        let swapchain = self.swapchain.as_ref().expect("swapchain exists");
        let depth = self.depth_target.as_ref().expect("depth exists");
        let extent = swapchain.extent;

        let mut batch = BarrierBatch::new();
        batch.image(
            self.tracker.transition(
                TrackedResource::whole(ID_SWAPCHAIN_BASE + image_index),
                ResourceState::Present,
                ResourceState::RenderTarget,
            )?,
            swapchain.images[image_index as usize],
            vk::ImageAspectFlags::COLOR,
            0,
            1,
        );
        batch.flush(&device, cmd);

        unsafe {
            let color_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(swapchain.views[image_index as usize])
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: WINDOW_BACKGROUND_COLOR,
                    },
                });
            let depth_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(depth.view)
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: DEPTH_CLEAR_VALUE,
                        stencil: 0,
                    },
                });
            let color_attachments = [color_attachment];
            let rendering_info = vk::RenderingInfo::default()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .layer_count(1)
                .color_attachments(&color_attachments)
                .depth_attachment(&depth_attachment);
            device.cmd_begin_rendering(cmd, &rendering_info);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                }],
            );

            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                scene.pipelines.opaque,
            );
            let sets = [
                descriptors.shared_sets[slot],
                descriptors.graphics_sets[slot],
                descriptors.texture_set,
            ];
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                scene.pipelines.opaque_layout,
                0,
                &sets,
                &[],
            );
            // Texture-descriptor base offset: tags already index from 0
            let texture_base = [0u32];
            device.cmd_push_constants(
                cmd,
                scene.pipelines.opaque_layout,
                vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::cast_slice(&texture_base),
            );
            device.cmd_bind_index_buffer(
                cmd,
                scene.index_buffer.handle,
                0,
                vk::IndexType::UINT32,
            );
            // Commands carry a leading object_id; the draw arguments start
            // 4 bytes in, stride is the full record
            device.cmd_draw_indexed_indirect_count(
                cmd,
                scene.indirect_buffers[slot].handle,
                4,
                scene.count_buffers[slot].handle,
                0,
                scene.draw_capacity,
                std::mem::size_of::<IndirectDrawCommand>() as u32,
            );

            device.cmd_end_rendering(cmd);
        }
        Ok(())
    }
}

impl Default for VulkanRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for VulkanRenderer {
    fn init(&mut self, handles: &WindowHandles) -> EngineResult<()> {
        if self.context.is_some() {
            return Ok(());
        }
        let context = VulkanContext::new(handles)?;
        self.context = Some(context);

        let swapchain = Swapchain::new(self.context(), handles.width, handles.height)?;
        let depth_target = Image::depth_target(
            self.device(),
            self.allocator(),
            swapchain.extent,
        )?;
        let frames = FrameScheduler::new(self.context())?;
        let descriptor_context = DescriptorContext::new(self.device())?;
        let loading_pipeline =
            LoadingPipeline::new(self.device(), swapchain.format)?;

        self.default_sampler = create_default_sampler(&self.context().device)?;
        self.pyramid_sampler = create_pyramid_sampler(&self.context().device)?;

        self.swapchain = Some(swapchain);
        self.depth_target = Some(depth_target);
        self.frames = Some(frames);
        self.descriptors = Some(descriptor_context);
        self.loading_pipeline = Some(loading_pipeline);
        self.texture_staging = Some(Buffer::staging(
            self.device(),
            self.allocator(),
            "texture staging",
            TEXTURE_STAGING_BUFFER_SIZE,
        )?);
        self.declare_swapchain_images();
        self.tracker
            .declare(TrackedResource::whole(ID_DEPTH_TARGET), ResourceState::Common);

        // Texture slot 0: a 2×2 pattern of magenta and (0.3, 0, 0.6), the
        // albedo every untextured material samples
        let default_pixels: [u8; 16] = [
            255, 0, 255, 255, 77, 0, 153, 255, //
            77, 0, 153, 255, 255, 0, 255, 255,
        ];
        let default_asset = TextureAsset {
            width: 2,
            height: 2,
            mip_count: 1,
            format: BlockFormat::Bc1 { srgb: false },
            data: Vec::new(),
        };
        let image = self.upload_texture_image(
            &default_asset,
            Some((vk::Format::R8G8B8A8_UNORM, &default_pixels)),
        )?;
        self.descriptors
            .as_ref()
            .unwrap()
            .write_texture_array_element(0, image.view);
        self.textures.push(image);

        engine_info!("comet::vulkan", "renderer initialized");
        Ok(())
    }

    fn upload_texture(&mut self, asset: &TextureAsset) -> EngineResult<u32> {
        let tag = self.textures.len() as u32;
        let image = self.upload_texture_image(asset, None)?;
        self.descriptors
            .as_ref()
            .expect("init done")
            .write_texture_array_element(tag, image.view);
        self.textures.push(image);
        Ok(tag)
    }

    fn setup_for_rendering(&mut self, ctx: &mut DrawContext) -> EngineResult<()> {
        if self.scene.is_some() {
            return Err(EngineError::InvalidResource(
                "setup_for_rendering called twice".to_string(),
            ));
        }

        ctx.geometry.pack_gpu_vertices();
        // Tags index the bindless array directly; the base is zero but the
        // patch step stays so a non-zero base keeps working
        ctx.materials.rebase_texture_tags(0);

        let usage = vk::BufferUsageFlags::STORAGE_BUFFER;
        let vertex_buffer = self.upload_device_buffer(
            "vertices",
            bytemuck::cast_slice(&ctx.geometry.packed_vertices),
            usage,
        )?;
        let index_buffer = self.upload_device_buffer(
            "indices",
            bytemuck::cast_slice(&ctx.geometry.indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        let surface_buffer = self.upload_device_buffer(
            "surfaces",
            bytemuck::cast_slice(&ctx.geometry.surfaces),
            usage,
        )?;
        let lod_buffer = self.upload_device_buffer(
            "lods",
            bytemuck::cast_slice(&ctx.geometry.lods),
            usage,
        )?;
        #[cfg(feature = "clusters")]
        let cluster_buffer = self.upload_device_buffer(
            "clusters",
            bytemuck::cast_slice(&ctx.geometry.clusters),
            usage,
        )?;
        #[cfg(feature = "clusters")]
        let cluster_index_buffer = self.upload_device_buffer(
            "cluster indices",
            bytemuck::cast_slice(&ctx.geometry.cluster_indices),
            usage,
        )?;
        let material_buffer = self.upload_device_buffer(
            "materials",
            bytemuck::cast_slice(ctx.materials.as_slice()),
            usage,
        )?;
        let render_object_buffer = self.upload_device_buffer(
            "render objects",
            bytemuck::cast_slice(&ctx.renders.opaque),
            usage,
        )?;
        let transform_buffer = self.upload_device_buffer(
            "transforms",
            bytemuck::cast_slice(ctx.renders.transforms()),
            usage,
        )?;

        let object_count = ctx.renders.opaque.len() as u32;
        let draw_capacity = object_count.max(1);
        let dynamic_count = ctx.renders.dynamic_transform_count();

        let device = self.device();
        let allocator = self.allocator();
        let mut transform_staging = Vec::new();
        let mut view_data_buffers = Vec::new();
        let mut indirect_buffers = Vec::new();
        let mut count_buffers = Vec::new();
        #[cfg(feature = "instancing")]
        let mut lod_instance_buffers = Vec::new();
        #[cfg(feature = "instancing")]
        let mut instance_data_buffers = Vec::new();
        for slot in 0..FRAMES_IN_FLIGHT {
            let mut staging = Buffer::new(
                device.clone(),
                allocator.clone(),
                &format!("transform staging {}", slot),
                (MAX_DYNAMIC_OBJECTS * std::mem::size_of::<MeshTransform>()) as u64,
                vk::BufferUsageFlags::TRANSFER_SRC,
                gpu_allocator::MemoryLocation::CpuToGpu,
            )?;
            // Seed every slot with the load-time dynamic transforms
            let dynamic_bytes: &[u8] = bytemuck::cast_slice(
                &ctx.renders.transforms()[..dynamic_count.max(1) as usize],
            );
            staging.write(0, dynamic_bytes)?;
            transform_staging.push(staging);

            view_data_buffers.push(Buffer::new(
                device.clone(),
                allocator.clone(),
                &format!("view data {}", slot),
                std::mem::size_of::<CameraViewData>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                gpu_allocator::MemoryLocation::CpuToGpu,
            )?);
            indirect_buffers.push(Buffer::device_local(
                device.clone(),
                allocator.clone(),
                &format!("indirect commands {}", slot),
                draw_capacity as u64 * std::mem::size_of::<IndirectDrawCommand>() as u64,
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::INDIRECT_BUFFER,
            )?);
            count_buffers.push(Buffer::device_local(
                device.clone(),
                allocator.clone(),
                &format!("draw count {}", slot),
                4,
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::INDIRECT_BUFFER,
            )?);
            #[cfg(feature = "instancing")]
            {
                lod_instance_buffers.push(Buffer::device_local(
                    device.clone(),
                    allocator.clone(),
                    &format!("lod instances {}", slot),
                    (ctx.geometry.lod_instance_counters.len().max(1)
                        * std::mem::size_of::<comet_engine::resource::LodInstanceCounter>())
                        as u64,
                    vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                )?);
                instance_data_buffers.push(Buffer::device_local(
                    device.clone(),
                    allocator.clone(),
                    &format!("instance data {}", slot),
                    (ctx.geometry.lod_instance_counters.len().max(1)
                        * comet_engine::limits::MAX_INSTANCES_PER_LOD
                        * std::mem::size_of::<u32>()) as u64,
                    vk::BufferUsageFlags::STORAGE_BUFFER,
                )?);
            }
        }

        let visibility_buffer = Buffer::device_local(
            device.clone(),
            allocator.clone(),
            "visibility",
            object_count.max(1) as u64 * 4,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        )?;

        let pipelines = RuntimePipelines::new(
            device.clone(),
            self.descriptors.as_ref().expect("descriptors exist"),
            self.swapchain.as_ref().expect("swapchain exists").format,
        )?;

        #[cfg(feature = "occlusion")]
        let pyramids = {
            let extent = self.swapchain.as_ref().unwrap().extent;
            let mut pyramids = Vec::new();
            for _ in 0..FRAMES_IN_FLIGHT {
                pyramids.push(DepthPyramid::new(
                    device.clone(),
                    allocator.clone(),
                    extent,
                )?);
            }
            pyramids
        };

        self.scene = Some(SceneResources {
            pipelines,
            vertex_buffer,
            index_buffer,
            surface_buffer,
            lod_buffer,
            material_buffer,
            render_object_buffer,
            #[cfg(feature = "clusters")]
            cluster_buffer,
            #[cfg(feature = "clusters")]
            cluster_index_buffer,
            #[cfg(feature = "instancing")]
            lod_instance_buffers,
            #[cfg(feature = "instancing")]
            instance_data_buffers,
            transform_buffer,
            transform_staging,
            view_data_buffers,
            indirect_buffers,
            count_buffers,
            visibility_buffer,
            #[cfg(feature = "occlusion")]
            pyramids,
            object_count,
            draw_capacity,
            dynamic_count,
        });

        self.descriptors
            .as_mut()
            .expect("descriptors exist")
            .allocate_runtime_sets()?;
        #[cfg(feature = "occlusion")]
        {
            // Allocate for the deepest possible chain once; resizes only
            // rewrite the sets, the pool cannot hand sets back
            self.descriptors
                .as_mut()
                .expect("descriptors exist")
                .allocate_pyramid_sets(comet_engine::limits::MAX_DEPTH_PYRAMID_MIPS)?;
        }
        self.write_runtime_sets();
        #[cfg(feature = "occlusion")]
        {
            self.write_pyramid_sets();
            self.declare_pyramids();
        }

        #[cfg(feature = "clusters")]
        {
            let scene = self.scene.as_ref().expect("scene exists");
            engine_info!(
                "comet::vulkan",
                "cluster tables uploaded: {} + {} bytes",
                scene.cluster_buffer.size,
                scene.cluster_index_buffer.size
            );
        }
        engine_info!(
            "comet::vulkan",
            "scene ready: {} objects, {} vertices, {} indices",
            object_count,
            ctx.geometry.packed_vertices.len(),
            ctx.geometry.indices.len()
        );
        Ok(())
    }

    fn final_setup(&mut self) -> EngineResult<()> {
        if self.final_setup_done {
            return Ok(());
        }
        let scene = self.scene.as_ref().ok_or_else(|| {
            EngineError::InvalidResource("final_setup before setup_for_rendering".to_string())
        })?;

        // Every visibility bit starts at 1: the first frame draws whatever
        // passes the frustum, the late pass then refines
        let visibility = scene.visibility_buffer.handle;
        let device = self.device();
        self.submit_once(|cmd| unsafe {
            device.cmd_fill_buffer(cmd, visibility, 0, vk::WHOLE_SIZE, 1);
        })?;

        // Declare buffer states as the first frame expects them
        self.tracker.declare(
            TrackedResource::whole(ID_VISIBILITY_BASE),
            ResourceState::UnorderedAccess,
        );
        for slot in 0..FRAMES_IN_FLIGHT {
            self.tracker.declare(
                TrackedResource::whole(ID_TRANSFORM_BASE + slot as u32),
                ResourceState::CopyDest,
            );
            self.tracker.declare(
                TrackedResource::whole(ID_INDIRECT_BASE + slot as u32),
                ResourceState::IndirectArgument,
            );
            self.tracker.declare(
                TrackedResource::whole(ID_COUNT_BASE + slot as u32),
                ResourceState::IndirectArgument,
            );
        }
        self.emit_initial_attachment_states()?;

        self.final_setup_done = true;
        engine_info!("comet::vulkan", "final setup complete");
        Ok(())
    }

    fn draw_while_waiting(&mut self, _delta_time: f32) -> EngineResult<()> {
        if self.device_lost {
            return Err(EngineError::DeviceLost);
        }
        let device = self.device();

        let frames = self.frames.as_mut().expect("init done");
        frames.begin_frame()?;
        let slot = frames.frame_index();

        let acquired = self.swapchain.as_mut().expect("init done").acquire(slot)?;
        let image_index = match acquired {
            AcquireResult::Ready(index) => index,
            AcquireResult::NeedsRecreate => {
                let extent = self.swapchain.as_ref().unwrap().extent;
                self.resize_pending = Some((extent.width, extent.height));
                return Ok(());
            }
        };
        if let Some((width, height)) = self.resize_pending.take() {
            self.recreate_swapchain(width, height)?;
            return Ok(());
        }

        let cmd = self.frames.as_ref().unwrap().current().graphics_cmd;
        unsafe {
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd, &begin)
                .map_err(|e| map_vk_error(e, "begin"))?;
        }

        // The waiting screen may run before final_setup: images transition
        // from whatever state they are known to be in
        let swapchain = self.swapchain.as_ref().unwrap();
        let image_id = TrackedResource::whole(ID_SWAPCHAIN_BASE + image_index);
        let from = self.tracker.current(image_id).unwrap_or(ResourceState::Common);
        let mut batch = BarrierBatch::new();
        if from == ResourceState::Common {
            batch.image_discard(
                ResourceState::RenderTarget,
                swapchain.images[image_index as usize],
                vk::ImageAspectFlags::COLOR,
            );
            self.tracker.declare(image_id, ResourceState::RenderTarget);
        } else {
            batch.image(
                self.tracker.transition(
                    image_id,
                    ResourceState::Present,
                    ResourceState::RenderTarget,
                )?,
                swapchain.images[image_index as usize],
                vk::ImageAspectFlags::COLOR,
                0,
                1,
            );
        }
        batch.flush(&device, cmd);

        let swapchain = self.swapchain.as_ref().unwrap();
        let loading = self.loading_pipeline.as_ref().expect("init done");
        unsafe {
            let color_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(swapchain.views[image_index as usize])
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: WINDOW_BACKGROUND_COLOR,
                    },
                });
            let color_attachments = [color_attachment];
            let rendering_info = vk::RenderingInfo::default()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: swapchain.extent,
                })
                .layer_count(1)
                .color_attachments(&color_attachments);
            device.cmd_begin_rendering(cmd, &rendering_info);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: swapchain.extent.width as f32,
                height: swapchain.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: swapchain.extent,
                }],
            );
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, loading.pipeline);
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_rendering(cmd);
        }

        let mut batch = BarrierBatch::new();
        batch.image(
            self.tracker.transition(
                image_id,
                ResourceState::RenderTarget,
                ResourceState::Present,
            )?,
            self.swapchain.as_ref().unwrap().images[image_index as usize],
            vk::ImageAspectFlags::COLOR,
            0,
            1,
        );
        batch.flush(&device, cmd);

        unsafe {
            device
                .end_command_buffer(cmd)
                .map_err(|e| map_vk_error(e, "end"))?;
        }
        self.submit_and_present(cmd, slot, image_index)?;
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext) -> EngineResult<()> {
        #[cfg(feature = "occlusion")]
        let (pyramid_width, pyramid_height) = {
            let scene = self.scene.as_ref();
            scene
                .map(|s| {
                    let p = &s.pyramids[0];
                    (p.width as f32, p.height as f32)
                })
                .unwrap_or((0.0, 0.0))
        };
        #[cfg(not(feature = "occlusion"))]
        let (pyramid_width, pyramid_height) = (0.0, 0.0);

        let object_count = self.scene.as_ref().map_or(0, |s| s.object_count);
        self.view_data = ctx.cameras.build_view_data(
            pyramid_width,
            pyramid_height,
            object_count,
            ctx.renders.onpc.len() as u32,
        );
        Ok(())
    }

    fn draw_frame(&mut self, _ctx: &mut FrameContext) -> EngineResult<()> {
        if self.device_lost {
            return Err(EngineError::DeviceLost);
        }
        if self.scene.is_none() {
            return Err(EngineError::InvalidResource(
                "draw_frame before setup_for_rendering".to_string(),
            ));
        }
        if let Some((width, height)) = self.resize_pending.take() {
            self.recreate_swapchain(width, height)?;
        }
        self.overflow_warned = false;

        let device = self.device();
        let frames = self.frames.as_mut().expect("init done");
        frames.begin_frame()?;
        let slot = frames.frame_index();

        let acquired = self.swapchain.as_mut().expect("init done").acquire(slot)?;
        let image_index = match acquired {
            AcquireResult::Ready(index) => index,
            AcquireResult::NeedsRecreate => {
                let extent = self.swapchain.as_ref().unwrap().extent;
                self.resize_pending = Some((extent.width, extent.height));
                return Ok(());
            }
        };

        // Per-frame uploads: view data through the persistent mapping,
        // dynamic transforms through the copy queue
        {
            let scene = self.scene.as_mut().expect("scene exists");
            let view_bytes = bytemuck::bytes_of(&self.view_data);
            scene.view_data_buffers[slot].write(0, view_bytes)?;

            if scene.object_count > scene.draw_capacity && !self.overflow_warned {
                engine_warn!(
                    "comet::vulkan",
                    "indirect buffer clamped to {} of {} objects",
                    scene.draw_capacity,
                    scene.object_count
                );
                self.overflow_warned = true;
            }
        }

        let dynamic_count = self.scene.as_ref().unwrap().dynamic_count;
        if dynamic_count > 0 {
            let staging = self.scene.as_ref().unwrap().transform_staging[slot].handle;
            let dst = self.scene.as_ref().unwrap().transform_buffer.handle;
            let size = dynamic_count as u64 * std::mem::size_of::<MeshTransform>() as u64;
            let context = self.context.as_ref().expect("init done");
            self.frames
                .as_ref()
                .unwrap()
                .submit_transfer(context, |cmd| unsafe {
                    let region = vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size,
                    };
                    context
                        .device
                        .cmd_copy_buffer(cmd, staging, dst, &[region]);
                })?;
        }

        let cmd = self.frames.as_ref().unwrap().current().graphics_cmd;
        unsafe {
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd, &begin)
                .map_err(|e| map_vk_error(e, "begin"))?;
        }

        // Transforms: copy destination -> culling input
        {
            let transform_buffer = self.scene.as_ref().unwrap().transform_buffer.handle;
            let mut batch = BarrierBatch::new();
            batch.buffer(
                self.tracker.transition(
                    TrackedResource::whole(ID_TRANSFORM_BASE + slot as u32),
                    ResourceState::CopyDest,
                    ResourceState::NonPixelShaderResource,
                )?,
                transform_buffer,
            );
            batch.flush(&device, cmd);
        }

        self.record_cull_passes(cmd, slot)?;
        self.record_opaque_pass(cmd, slot, image_index)?;
        #[cfg(feature = "occlusion")]
        self.record_pyramid_build(cmd, slot)?;

        // Transforms return to the copy queue for the next frame's upload
        {
            let transform_buffer = self.scene.as_ref().unwrap().transform_buffer.handle;
            let mut batch = BarrierBatch::new();
            batch.buffer(
                self.tracker.transition(
                    TrackedResource::whole(ID_TRANSFORM_BASE + slot as u32),
                    ResourceState::NonPixelShaderResource,
                    ResourceState::CopyDest,
                )?,
                transform_buffer,
            );
            batch.flush(&device, cmd);
        }

        // Swapchain to present
        {
            let swapchain = self.swapchain.as_ref().unwrap();
            let mut batch = BarrierBatch::new();
            batch.image(
                self.tracker.transition(
                    TrackedResource::whole(ID_SWAPCHAIN_BASE + image_index),
                    ResourceState::RenderTarget,
                    ResourceState::Present,
                )?,
                swapchain.images[image_index as usize],
                vk::ImageAspectFlags::COLOR,
                0,
                1,
            );
            batch.flush(&device, cmd);
        }

        unsafe {
            device
                .end_command_buffer(cmd)
                .map_err(|e| map_vk_error(e, "end"))?;
        }
        self.submit_and_present(cmd, slot, image_index)?;
        Ok(())
    }

    fn update_object_transform(&mut self, transform_id: u32, transform: &MeshTransform) {
        if let Some(scene) = self.scene.as_mut() {
            if transform_id >= scene.dynamic_count {
                engine_warn!(
                    "comet::vulkan",
                    "transform {} is not in the dynamic range",
                    transform_id
                );
                return;
            }
            let slot = self.frames.as_ref().map_or(0, |f| f.frame_index());
            let offset = transform_id as usize * std::mem::size_of::<MeshTransform>();
            let _ = scene.transform_staging[slot]
                .write(offset, bytemuck::bytes_of(transform));
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.resize_pending = Some((width, height));
    }

    fn wait_idle(&mut self) {
        let Some(context) = &self.context else {
            return;
        };
        // Bounded wait on the in-flight fences first; a hung submission
        // downgrades into a forced teardown instead of blocking shutdown
        if let Some(frames) = &self.frames {
            let fences: Vec<vk::Fence> = frames
                .slots
                .iter()
                .map(|slot| slot.in_flight_fence)
                .collect();
            let waited = unsafe {
                context.device.wait_for_fences(
                    &fences,
                    true,
                    comet_engine::limits::SHUTDOWN_FENCE_TIMEOUT_NS,
                )
            };
            if waited.is_err() {
                engine_warn!(
                    "comet::vulkan",
                    "frame fences did not signal within the shutdown timeout, forcing teardown"
                );
            }
        }
        context.wait_idle();
    }
}

impl VulkanRenderer {
    /// Upload one texture image. `raw_override` carries an uncompressed
    /// RGBA payload for the built-in default texture.
    fn upload_texture_image(
        &mut self,
        asset: &TextureAsset,
        raw_override: Option<(vk::Format, &[u8])>,
    ) -> EngineResult<Image> {
        let (format, data): (vk::Format, &[u8]) = match raw_override {
            Some((format, data)) => (format, data),
            None => (block_format_to_vk(asset.format), &asset.data),
        };

        let image = Image::new(
            self.device(),
            self.allocator(),
            "texture",
            vk::Extent2D {
                width: asset.width,
                height: asset.height,
            },
            format,
            asset.mip_count,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
        )?;

        let staging_size = self.texture_staging.as_ref().expect("init done").size;
        if (data.len() as u64) > staging_size {
            return Err(EngineError::UploadFailed(format!(
                "texture of {} bytes exceeds the {} byte staging buffer",
                data.len(),
                staging_size
            )));
        }
        self.texture_staging
            .as_mut()
            .expect("init done")
            .write(0, data)?;

        // Build one copy region per mip
        let block_size = match raw_override {
            Some(_) => 4,
            None => asset.format.block_size(),
        };
        let mut regions = Vec::with_capacity(asset.mip_count as usize);
        let mut offset: u64 = 0;
        let mut width = asset.width;
        let mut height = asset.height;
        for mip in 0..asset.mip_count {
            let mip_bytes = if raw_override.is_some() {
                u64::from(width) * u64::from(height) * 4
            } else {
                u64::from((width + 3) / 4) * u64::from((height + 3) / 4) * u64::from(block_size)
            };
            regions.push(
                vk::BufferImageCopy::default()
                    .buffer_offset(offset)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: mip,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image_extent(vk::Extent3D {
                        width,
                        height,
                        depth: 1,
                    }),
            );
            offset += mip_bytes;
            width = (width / 2).max(1);
            height = (height / 2).max(1);
        }

        let device = self.device();
        let staging = self.texture_staging.as_ref().unwrap().handle;
        let target = image.handle;
        self.submit_once(|cmd| unsafe {
            let mut to_copy = BarrierBatch::new();
            to_copy.image_discard(
                ResourceState::CopyDest,
                target,
                vk::ImageAspectFlags::COLOR,
            );
            to_copy.flush(&device, cmd);

            device.cmd_copy_buffer_to_image(
                cmd,
                staging,
                target,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );

            // COPY_DEST -> SHADER_RESOURCE at end of load
            let barrier = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(target)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })?;
        Ok(image)
    }

    /// Submit the frame's command buffer and present.
    fn submit_and_present(
        &mut self,
        cmd: vk::CommandBuffer,
        slot: usize,
        image_index: u32,
    ) -> EngineResult<()> {
        let context = self.context.as_ref().expect("init done");
        let frames = self.frames.as_ref().expect("init done");
        let swapchain = self.swapchain.as_ref().expect("init done");

        frames.reset_in_flight_fence()?;
        let result = unsafe {
            let wait_semaphores = [swapchain.image_available[slot]];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let signal_semaphores = [swapchain.render_finished[image_index as usize]];
            let buffers = [cmd];
            let submit = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&buffers)
                .signal_semaphores(&signal_semaphores);
            context.device.queue_submit(
                context.graphics_queue.handle,
                &[submit],
                frames.current().in_flight_fence,
            )
        };
        if let Err(error) = result {
            if error == vk::Result::ERROR_DEVICE_LOST {
                self.device_lost = true;
            }
            return Err(map_vk_error(error, "frame submit"));
        }

        let presented = swapchain.present(context.graphics_queue.handle, image_index)?;
        if !presented {
            let extent = swapchain.extent;
            self.resize_pending = Some((extent.width, extent.height));
        }
        self.frames.as_mut().expect("init done").end_frame();
        Ok(())
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Some(context) = &self.context {
            context.wait_idle();
            unsafe {
                if self.default_sampler != vk::Sampler::null() {
                    context.device.destroy_sampler(self.default_sampler, None);
                }
                if self.pyramid_sampler != vk::Sampler::null() {
                    context.device.destroy_sampler(self.pyramid_sampler, None);
                }
            }
        }
    }
}
