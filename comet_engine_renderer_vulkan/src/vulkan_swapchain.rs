//! Swapchain management: creation, acquisition, present, resize recreation.

use ash::vk;
use comet_engine::error::{EngineError, EngineResult};
use comet_engine::limits::FRAMES_IN_FLIGHT;
use comet_engine::{engine_info, engine_warn};
use std::sync::Arc;

use crate::vulkan_context::{map_vk_error, VulkanContext};

pub const SWAPCHAIN_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// What an acquire attempt produced.
pub enum AcquireResult {
    /// Image index + the semaphore the submit must wait on
    Ready(u32),
    /// Out-of-date/suboptimal surface; skip the frame and recreate
    NeedsRecreate,
}

pub struct Swapchain {
    device: Arc<ash::Device>,
    loader: ash::khr::swapchain::Device,
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    /// One per frame slot, waited by the frame's submit
    pub image_available: Vec<vk::Semaphore>,
    /// One per swapchain image, signaled by the submit, waited by present
    pub render_finished: Vec<vk::Semaphore>,
}

impl Swapchain {
    pub fn new(context: &VulkanContext, width: u32, height: u32) -> EngineResult<Self> {
        let device = context.device.clone();
        let loader = ash::khr::swapchain::Device::new(&context.instance, &device);
        let mut swapchain = Self {
            device,
            loader,
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            format: SWAPCHAIN_FORMAT,
            extent: vk::Extent2D { width, height },
            image_available: Vec::new(),
            render_finished: Vec::new(),
        };
        swapchain.recreate(context, width, height)?;
        Ok(swapchain)
    }

    /// (Re)build the swapchain for the given size. Also used on resize.
    pub fn recreate(
        &mut self,
        context: &VulkanContext,
        width: u32,
        height: u32,
    ) -> EngineResult<()> {
        unsafe {
            let capabilities = context
                .surface_loader
                .get_physical_device_surface_capabilities(
                    context.physical_device,
                    context.surface,
                )
                .map_err(|e| map_vk_error(e, "surface capabilities"))?;

            let formats = context
                .surface_loader
                .get_physical_device_surface_formats(context.physical_device, context.surface)
                .map_err(|e| map_vk_error(e, "surface formats"))?;
            let surface_format = formats
                .iter()
                .find(|f| {
                    f.format == SWAPCHAIN_FORMAT
                        && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
                })
                .copied()
                .unwrap_or(formats[0]);

            let present_modes = context
                .surface_loader
                .get_physical_device_surface_present_modes(
                    context.physical_device,
                    context.surface,
                )
                .map_err(|e| map_vk_error(e, "present modes"))?;
            let present_mode = if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
                vk::PresentModeKHR::MAILBOX
            } else {
                vk::PresentModeKHR::FIFO
            };

            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: width.clamp(
                        capabilities.min_image_extent.width,
                        capabilities.max_image_extent.width,
                    ),
                    height: height.clamp(
                        capabilities.min_image_extent.height,
                        capabilities.max_image_extent.height,
                    ),
                }
            };
            if extent.width == 0 || extent.height == 0 {
                engine_warn!("comet::vulkan", "zero-sized surface, swapchain not rebuilt");
                return Err(EngineError::ApiObjectCreate("zero-sized surface".into()));
            }

            let mut image_count = capabilities.min_image_count + 1;
            if capabilities.max_image_count != 0 {
                image_count = image_count.min(capabilities.max_image_count);
            }

            let old_swapchain = self.handle;
            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(context.surface)
                .min_image_count(image_count)
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let handle = self
                .loader
                .create_swapchain(&create_info, None)
                .map_err(|e| map_vk_error(e, "swapchain"))?;

            self.destroy_resources();
            if old_swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(old_swapchain, None);
            }

            self.handle = handle;
            self.format = surface_format.format;
            self.extent = extent;
            self.images = self
                .loader
                .get_swapchain_images(handle)
                .map_err(|e| map_vk_error(e, "swapchain images"))?;
            self.views = self
                .images
                .iter()
                .map(|&image| {
                    crate::vulkan_image::create_view(
                        &self.device,
                        image,
                        self.format,
                        vk::ImageAspectFlags::COLOR,
                        0,
                        1,
                    )
                })
                .collect::<EngineResult<Vec<_>>>()?;

            let semaphore_info = vk::SemaphoreCreateInfo::default();
            self.image_available = (0..FRAMES_IN_FLIGHT)
                .map(|_| {
                    self.device
                        .create_semaphore(&semaphore_info, None)
                        .map_err(|e| map_vk_error(e, "semaphore"))
                })
                .collect::<EngineResult<Vec<_>>>()?;
            self.render_finished = (0..self.images.len())
                .map(|_| {
                    self.device
                        .create_semaphore(&semaphore_info, None)
                        .map_err(|e| map_vk_error(e, "semaphore"))
                })
                .collect::<EngineResult<Vec<_>>>()?;

            engine_info!(
                "comet::vulkan",
                "swapchain {}x{} with {} images",
                extent.width,
                extent.height,
                self.images.len()
            );
            Ok(())
        }
    }

    /// Acquire the next image using the frame slot's semaphore.
    pub fn acquire(&mut self, frame_index: usize) -> EngineResult<AcquireResult> {
        unsafe {
            match self.loader.acquire_next_image(
                self.handle,
                u64::MAX,
                self.image_available[frame_index],
                vk::Fence::null(),
            ) {
                Ok((image_index, suboptimal)) => {
                    if suboptimal {
                        Ok(AcquireResult::NeedsRecreate)
                    } else {
                        Ok(AcquireResult::Ready(image_index))
                    }
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::NeedsRecreate),
                Err(e) => Err(map_vk_error(e, "acquire")),
            }
        }
    }

    /// Queue the present; out-of-date surfaces request a recreate instead
    /// of failing the frame.
    pub fn present(&self, queue: vk::Queue, image_index: u32) -> EngineResult<bool> {
        unsafe {
            let wait = [self.render_finished[image_index as usize]];
            let swapchains = [self.handle];
            let indices = [image_index];
            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&wait)
                .swapchains(&swapchains)
                .image_indices(&indices);
            match self.loader.queue_present(queue, &present_info) {
                Ok(suboptimal) => Ok(!suboptimal),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(false),
                Err(e) => Err(map_vk_error(e, "present")),
            }
        }
    }

    fn destroy_resources(&mut self) {
        unsafe {
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            for semaphore in self.image_available.drain(..) {
                self.device.destroy_semaphore(semaphore, None);
            }
            for semaphore in self.render_finished.drain(..) {
                self.device.destroy_semaphore(semaphore, None);
            }
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.destroy_resources();
            if self.handle != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.handle, None);
            }
        }
    }
}
