//! Buffer wrapper over gpu-allocator.

use ash::vk;
use comet_engine::error::{EngineError, EngineResult};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use std::sync::{Arc, Mutex};

/// A device buffer plus its allocation. Host-visible buffers stay
/// persistently mapped for their whole lifetime.
pub struct Buffer {
    device: Arc<ash::Device>,
    allocator: Arc<Mutex<Allocator>>,
    pub handle: vk::Buffer,
    allocation: Option<Allocation>,
    pub size: u64,
}

impl Buffer {
    pub fn new(
        device: Arc<ash::Device>,
        allocator: Arc<Mutex<Allocator>>,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> EngineResult<Self> {
        unsafe {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size.max(4))
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let handle = device
                .create_buffer(&buffer_info, None)
                .map_err(|e| crate::vulkan_context::map_vk_error(e, "buffer"))?;

            let requirements = device.get_buffer_memory_requirements(handle);
            let allocation = allocator
                .lock()
                .expect("allocator lock")
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| EngineError::UploadFailed(format!("allocate {}: {}", name, e)))?;

            device
                .bind_buffer_memory(handle, allocation.memory(), allocation.offset())
                .map_err(|e| crate::vulkan_context::map_vk_error(e, "bind buffer memory"))?;

            Ok(Self {
                device,
                allocator,
                handle,
                allocation: Some(allocation),
                size,
            })
        }
    }

    /// Device-local buffer
    pub fn device_local(
        device: Arc<ash::Device>,
        allocator: Arc<Mutex<Allocator>>,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
    ) -> EngineResult<Self> {
        Self::new(device, allocator, name, size, usage, MemoryLocation::GpuOnly)
    }

    /// Host-visible, persistently mapped staging buffer
    pub fn staging(
        device: Arc<ash::Device>,
        allocator: Arc<Mutex<Allocator>>,
        name: &str,
        size: u64,
    ) -> EngineResult<Self> {
        Self::new(
            device,
            allocator,
            name,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )
    }

    /// Mapped pointer for host-visible buffers.
    pub fn mapped_slice_mut(&mut self) -> EngineResult<&mut [u8]> {
        self.allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| EngineError::UploadFailed("buffer is not host-visible".to_string()))
    }

    /// Write `data` at `offset` through the persistent mapping.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> EngineResult<()> {
        let mapped = self.mapped_slice_mut()?;
        if offset + data.len() > mapped.len() {
            return Err(EngineError::UploadFailed(format!(
                "write of {} bytes at {} exceeds buffer of {}",
                data.len(),
                offset,
                mapped.len()
            )));
        }
        mapped[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.handle, None);
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
