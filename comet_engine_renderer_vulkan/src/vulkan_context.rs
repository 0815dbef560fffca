//! Instance, device and queue setup.

use ash::vk;
use comet_engine::error::{EngineError, EngineResult};
use comet_engine::renderer::WindowHandles;
use comet_engine::{engine_err, engine_info};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

/// Map a Vulkan error onto the engine's error kinds. Device removal is
/// detected here and classified as fatal.
pub fn map_vk_error(result: vk::Result, what: &str) -> EngineError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => EngineError::DeviceLost,
        other => EngineError::ApiObjectCreate(format!("{}: {:?}", what, other)),
    }
}

/// A queue together with its family index.
#[derive(Clone, Copy)]
pub struct Queue {
    pub family: u32,
    pub handle: vk::Queue,
}

/// Core Vulkan objects shared by every other module of this backend.
pub struct VulkanContext {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: Arc<ash::Device>,
    pub graphics_queue: Queue,
    /// Dedicated transfer queue when the hardware has one, otherwise an
    /// alias of the graphics queue
    pub transfer_queue: Queue,
    /// ManuallyDrop so the allocator dies before the device
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    #[cfg(feature = "vulkan-validation")]
    debug: crate::vulkan_debug::DebugMessenger,
}

impl VulkanContext {
    pub fn new(handles: &WindowHandles) -> EngineResult<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_err!(ApiObjectCreate, "comet::vulkan", "failed to load Vulkan: {}", e)
            })?;

            let app_info = vk::ApplicationInfo::default()
                .application_name(c"Comet Application")
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Comet Engine")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let mut extension_names =
                ash_window::enumerate_required_extensions(handles.display)
                    .map_err(|e| map_vk_error(e, "surface extensions"))?
                    .to_vec();
            #[cfg(feature = "vulkan-validation")]
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());

            #[cfg(feature = "vulkan-validation")]
            let layer_names = vec![c"VK_LAYER_KHRONOS_validation".as_ptr()];
            #[cfg(not(feature = "vulkan-validation"))]
            let layer_names: Vec<*const i8> = Vec::new();

            let instance_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&instance_info, None)
                .map_err(|e| map_vk_error(e, "instance"))?;

            #[cfg(feature = "vulkan-validation")]
            let debug = crate::vulkan_debug::DebugMessenger::new(&entry, &instance)?;

            let surface = ash_window::create_surface(
                &entry,
                &instance,
                handles.display,
                handles.window,
                None,
            )
            .map_err(|e| map_vk_error(e, "surface"))?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let physical_device = pick_physical_device(&instance)?;
            let (graphics_family, transfer_family) =
                pick_queue_families(&instance, &surface_loader, physical_device, surface)?;

            let queue_priorities = [1.0f32];
            let mut queue_infos = vec![vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family)
                .queue_priorities(&queue_priorities)];
            if transfer_family != graphics_family {
                queue_infos.push(
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(transfer_family)
                        .queue_priorities(&queue_priorities),
                );
            }

            let device_extensions = [ash::khr::swapchain::NAME.as_ptr()];

            let features = vk::PhysicalDeviceFeatures::default()
                .multi_draw_indirect(true);
            let mut features11 =
                vk::PhysicalDeviceVulkan11Features::default().shader_draw_parameters(true);
            let mut features12 = vk::PhysicalDeviceVulkan12Features::default()
                .draw_indirect_count(true)
                .runtime_descriptor_array(true)
                .descriptor_binding_partially_bound(true)
                .descriptor_binding_variable_descriptor_count(true)
                .shader_sampled_image_array_non_uniform_indexing(true);
            let mut features13 =
                vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

            let device_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_infos)
                .enabled_extension_names(&device_extensions)
                .enabled_features(&features)
                .push_next(&mut features11)
                .push_next(&mut features12)
                .push_next(&mut features13);

            let device = Arc::new(
                instance
                    .create_device(physical_device, &device_info, None)
                    .map_err(|e| map_vk_error(e, "device"))?,
            );

            let graphics_queue = Queue {
                family: graphics_family,
                handle: device.get_device_queue(graphics_family, 0),
            };
            let transfer_queue = Queue {
                family: transfer_family,
                handle: device.get_device_queue(transfer_family, 0),
            };

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: (*device).clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_err!(ApiObjectCreate, "comet::vulkan", "allocator: {}", e)
            })?;

            engine_info!("comet::vulkan", "device and queues created");

            Ok(Self {
                entry,
                instance,
                surface,
                surface_loader,
                physical_device,
                device,
                graphics_queue,
                transfer_queue,
                allocator: ManuallyDrop::new(Arc::new(Mutex::new(allocator))),
                #[cfg(feature = "vulkan-validation")]
                debug,
            })
        }
    }

    pub fn wait_idle(&self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
    }
}

fn pick_physical_device(instance: &ash::Instance) -> EngineResult<vk::PhysicalDevice> {
    unsafe {
        let devices = instance
            .enumerate_physical_devices()
            .map_err(|e| map_vk_error(e, "physical devices"))?;
        if devices.is_empty() {
            return Err(EngineError::ApiObjectCreate(
                "no Vulkan-capable GPU found".to_string(),
            ));
        }
        // Prefer a discrete GPU
        let discrete = devices.iter().copied().find(|&device| {
            instance.get_physical_device_properties(device).device_type
                == vk::PhysicalDeviceType::DISCRETE_GPU
        });
        let chosen = discrete.unwrap_or(devices[0]);
        let properties = instance.get_physical_device_properties(chosen);
        let name = CStr::from_ptr(properties.device_name.as_ptr());
        engine_info!("comet::vulkan", "using GPU {:?}", name);
        Ok(chosen)
    }
}

/// Graphics family must support graphics + compute + present; the transfer
/// family prefers a dedicated transfer-only queue.
fn pick_queue_families(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> EngineResult<(u32, u32)> {
    unsafe {
        let families = instance.get_physical_device_queue_family_properties(physical_device);

        let graphics = families
            .iter()
            .enumerate()
            .find(|(index, family)| {
                family
                    .queue_flags
                    .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
                    && surface_loader
                        .get_physical_device_surface_support(
                            physical_device,
                            *index as u32,
                            surface,
                        )
                        .unwrap_or(false)
            })
            .map(|(index, _)| index as u32)
            .ok_or_else(|| {
                EngineError::ApiObjectCreate(
                    "no graphics+compute+present queue family".to_string(),
                )
            })?;

        let transfer = families
            .iter()
            .enumerate()
            .find(|(_, family)| {
                family.queue_flags.contains(vk::QueueFlags::TRANSFER)
                    && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .map(|(index, _)| index as u32)
            .unwrap_or(graphics);

        Ok((graphics, transfer))
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            #[cfg(feature = "vulkan-validation")]
            self.debug.destroy();
            self.instance.destroy_instance(None);
        }
    }
}
