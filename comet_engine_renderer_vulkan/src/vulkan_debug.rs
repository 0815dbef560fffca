//! Validation-layer debug messenger. Compiled only with the
//! `vulkan-validation` feature; release builds carry none of this.

#![cfg(feature = "vulkan-validation")]

use ash::vk;
use comet_engine::error::EngineResult;
use comet_engine::{engine_debug, engine_error, engine_warn};
use std::ffi::CStr;

pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> EngineResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));
        let messenger = unsafe {
            loader
                .create_debug_utils_messenger(&create_info, None)
                .map_err(|e| crate::vulkan_context::map_vk_error(e, "debug messenger"))?
        };
        Ok(Self { loader, messenger })
    }

    pub fn destroy(&mut self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        engine_error!("comet::vulkan", "validation: {}", message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        engine_warn!("comet::vulkan", "validation: {}", message);
    } else {
        engine_debug!("comet::vulkan", "validation: {}", message);
    }
    vk::FALSE
}
