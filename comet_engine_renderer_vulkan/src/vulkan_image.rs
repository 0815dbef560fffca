//! Image wrapper, depth targets and the depth pyramid resources.

use ash::vk;
use comet_engine::error::EngineResult;
use comet_engine::renderer::pyramid_dimensions;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use std::sync::{Arc, Mutex};

use crate::vulkan_context::map_vk_error;

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
pub const DEPTH_PYRAMID_FORMAT: vk::Format = vk::Format::R32_SFLOAT;

/// An image, its allocation and its default whole-resource view.
pub struct Image {
    device: Arc<ash::Device>,
    allocator: Arc<Mutex<Allocator>>,
    pub handle: vk::Image,
    pub view: vk::ImageView,
    allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub mip_count: u32,
}

impl Image {
    pub fn new(
        device: Arc<ash::Device>,
        allocator: Arc<Mutex<Allocator>>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        mip_count: u32,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> EngineResult<Self> {
        unsafe {
            let image_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(mip_count)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            let handle = device
                .create_image(&image_info, None)
                .map_err(|e| map_vk_error(e, "image"))?;

            let requirements = device.get_image_memory_requirements(handle);
            let allocation = allocator
                .lock()
                .expect("allocator lock")
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| {
                    comet_engine::error::EngineError::ApiObjectCreate(format!(
                        "image allocation {}: {}",
                        name, e
                    ))
                })?;
            device
                .bind_image_memory(handle, allocation.memory(), allocation.offset())
                .map_err(|e| map_vk_error(e, "bind image memory"))?;

            let view = create_view(&device, handle, format, aspect, 0, mip_count)?;

            Ok(Self {
                device,
                allocator,
                handle,
                view,
                allocation: Some(allocation),
                format,
                extent,
                mip_count,
            })
        }
    }

    /// Depth attachment sized to the swapchain.
    pub fn depth_target(
        device: Arc<ash::Device>,
        allocator: Arc<Mutex<Allocator>>,
        extent: vk::Extent2D,
    ) -> EngineResult<Self> {
        Self::new(
            device,
            allocator,
            "depth target",
            extent,
            DEPTH_FORMAT,
            1,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::DEPTH,
        )
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.handle, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let _ = self
                .allocator
                .lock()
                .expect("allocator lock")
                .free(allocation);
        }
    }
}

pub fn create_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    base_mip: u32,
    mip_count: u32,
) -> EngineResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: base_mip,
            level_count: mip_count,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe {
        device
            .create_image_view(&view_info, None)
            .map_err(|e| map_vk_error(e, "image view"))
    }
}

/// The Hi-Z mip chain for occlusion culling: power-of-two dimensions, one
/// storage/sample view per mip plus a whole-chain sampling view.
pub struct DepthPyramid {
    device: Arc<ash::Device>,
    pub image: Image,
    /// One view per mip, used as the reduction's storage target
    pub mip_views: Vec<vk::ImageView>,
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
}

impl DepthPyramid {
    pub fn new(
        device: Arc<ash::Device>,
        allocator: Arc<Mutex<Allocator>>,
        draw_extent: vk::Extent2D,
    ) -> EngineResult<Self> {
        let (width, height, mip_count) =
            pyramid_dimensions(draw_extent.width, draw_extent.height);
        let image = Image::new(
            device.clone(),
            allocator,
            "depth pyramid",
            vk::Extent2D { width, height },
            DEPTH_PYRAMID_FORMAT,
            mip_count,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::STORAGE,
            vk::ImageAspectFlags::COLOR,
        )?;

        let mut mip_views = Vec::with_capacity(mip_count as usize);
        for mip in 0..mip_count {
            mip_views.push(create_view(
                &device,
                image.handle,
                DEPTH_PYRAMID_FORMAT,
                vk::ImageAspectFlags::COLOR,
                mip,
                1,
            )?);
        }

        Ok(Self {
            device,
            image,
            mip_views,
            width,
            height,
            mip_count,
        })
    }

    /// Size of one mip level, floored at 1×1.
    pub fn mip_extent(&self, mip: u32) -> (u32, u32) {
        ((self.width >> mip).max(1), (self.height >> mip).max(1))
    }
}

impl Drop for DepthPyramid {
    fn drop(&mut self) {
        unsafe {
            for view in &self.mip_views {
                self.device.destroy_image_view(*view, None);
            }
        }
    }
}

/// The default sampler: linear minify/magnify, mip-linear, wrapping.
pub fn create_default_sampler(device: &ash::Device) -> EngineResult<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE);
    unsafe {
        device
            .create_sampler(&sampler_info, None)
            .map_err(|e| map_vk_error(e, "sampler"))
    }
}

/// Nearest-neighbour sampler the pyramid reduction and occlusion tests use.
pub fn create_pyramid_sampler(device: &ash::Device) -> EngineResult<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::NEAREST)
        .min_filter(vk::Filter::NEAREST)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE);
    unsafe {
        device
            .create_sampler(&sampler_info, None)
            .map_err(|e| map_vk_error(e, "pyramid sampler"))
    }
}
