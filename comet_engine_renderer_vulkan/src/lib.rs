/*!
# Comet Engine - Vulkan backend

The modern, GPU-driven backend: compute culling feeding
`vkCmdDrawIndexedIndirectCount`, a bindless texture array, per-frame-slot
resources and explicit barrier discipline routed through the engine's
resource-state tracker.

Requires Vulkan 1.3 (dynamic rendering) with the 1.2 core features
`drawIndirectCount` and descriptor indexing.
*/

mod vulkan_buffer;
mod vulkan_context;
mod vulkan_debug;
mod vulkan_descriptors;
mod vulkan_frame;
mod vulkan_image;
mod vulkan_pipelines;
mod vulkan_renderer;
mod vulkan_state;
mod vulkan_swapchain;

pub use vulkan_renderer::VulkanRenderer;
