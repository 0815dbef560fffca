//! Descriptor layouts, pool and set management.
//!
//! Three conceptual spaces, mirrored from the culling/drawing pipelines:
//!
//! - set 0 (shared): view data + surface/transform/render-object/LOD tables,
//!   visible to compute and graphics alike
//! - set 1 (pass-exclusive): culling buffers for the compute pipelines,
//!   vertex + material tables for the opaque pipeline
//! - set 2 (textures): one sampler plus the bindless texture array indexed
//!   by material tags
//!
//! The depth-pyramid reduction uses its own two-binding layout, one set per
//! mip per frame slot.

use ash::vk;
use comet_engine::error::EngineResult;
use comet_engine::limits::{FRAMES_IN_FLIGHT, MAX_DEPTH_PYRAMID_MIPS, MAX_TEXTURE_COUNT};
use std::sync::Arc;

use crate::vulkan_context::map_vk_error;

// Shared set bindings
pub const SHARED_VIEW_DATA_BINDING: u32 = 0;
pub const SHARED_SURFACES_BINDING: u32 = 1;
pub const SHARED_TRANSFORMS_BINDING: u32 = 2;
pub const SHARED_RENDER_OBJECTS_BINDING: u32 = 3;
pub const SHARED_LODS_BINDING: u32 = 4;

// Cull-exclusive set bindings
pub const CULL_INDIRECT_BINDING: u32 = 0;
pub const CULL_COUNT_BINDING: u32 = 1;
pub const CULL_VISIBILITY_BINDING: u32 = 2;
#[cfg(feature = "occlusion")]
pub const CULL_PYRAMID_BINDING: u32 = 3;
#[cfg(feature = "instancing")]
pub const CULL_LOD_INSTANCES_BINDING: u32 = 4;
#[cfg(feature = "instancing")]
pub const CULL_INSTANCE_DATA_BINDING: u32 = 5;

// Graphics-exclusive set bindings
pub const GFX_VERTICES_BINDING: u32 = 0;
pub const GFX_MATERIALS_BINDING: u32 = 1;
/// The indirect command records double as an object-id table for gl_DrawID
pub const GFX_COMMANDS_BINDING: u32 = 2;

// Texture set bindings
pub const TEX_SAMPLER_BINDING: u32 = 0;
pub const TEX_ARRAY_BINDING: u32 = 1;

// Pyramid reduction set bindings
pub const PYRAMID_DST_BINDING: u32 = 0;
pub const PYRAMID_SRC_BINDING: u32 = 1;

pub struct DescriptorContext {
    device: Arc<ash::Device>,
    pool: vk::DescriptorPool,

    pub shared_layout: vk::DescriptorSetLayout,
    pub cull_layout: vk::DescriptorSetLayout,
    pub graphics_layout: vk::DescriptorSetLayout,
    pub texture_layout: vk::DescriptorSetLayout,
    pub pyramid_layout: vk::DescriptorSetLayout,

    /// Indexed by frame slot
    pub shared_sets: Vec<vk::DescriptorSet>,
    pub cull_sets: Vec<vk::DescriptorSet>,
    /// Per slot too: each binds its slot's indirect command buffer
    pub graphics_sets: Vec<vk::DescriptorSet>,
    pub texture_set: vk::DescriptorSet,
    /// `[frame][mip]`
    pub pyramid_sets: Vec<Vec<vk::DescriptorSet>>,
}

fn binding(
    index: u32,
    ty: vk::DescriptorType,
    count: u32,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(index)
        .descriptor_type(ty)
        .descriptor_count(count)
        .stage_flags(stages)
}

fn create_layout(
    device: &ash::Device,
    bindings: &[vk::DescriptorSetLayoutBinding],
    flags: Option<&[vk::DescriptorBindingFlags]>,
) -> EngineResult<vk::DescriptorSetLayout> {
    let mut info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
    let mut flags_info;
    if let Some(flags) = flags {
        flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(flags);
        info = info.push_next(&mut flags_info);
    }
    unsafe {
        device
            .create_descriptor_set_layout(&info, None)
            .map_err(|e| map_vk_error(e, "descriptor set layout"))
    }
}

impl DescriptorContext {
    pub fn new(device: Arc<ash::Device>) -> EngineResult<Self> {
        let all_stages = vk::ShaderStageFlags::COMPUTE
            | vk::ShaderStageFlags::VERTEX
            | vk::ShaderStageFlags::FRAGMENT;

        let shared_layout = create_layout(
            &device,
            &[
                binding(
                    SHARED_VIEW_DATA_BINDING,
                    vk::DescriptorType::UNIFORM_BUFFER,
                    1,
                    all_stages,
                ),
                binding(
                    SHARED_SURFACES_BINDING,
                    vk::DescriptorType::STORAGE_BUFFER,
                    1,
                    all_stages,
                ),
                binding(
                    SHARED_TRANSFORMS_BINDING,
                    vk::DescriptorType::STORAGE_BUFFER,
                    1,
                    all_stages,
                ),
                binding(
                    SHARED_RENDER_OBJECTS_BINDING,
                    vk::DescriptorType::STORAGE_BUFFER,
                    1,
                    all_stages,
                ),
                binding(
                    SHARED_LODS_BINDING,
                    vk::DescriptorType::STORAGE_BUFFER,
                    1,
                    all_stages,
                ),
            ],
            None,
        )?;

        let mut cull_bindings = vec![
            binding(
                CULL_INDIRECT_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                1,
                vk::ShaderStageFlags::COMPUTE,
            ),
            binding(
                CULL_COUNT_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                1,
                vk::ShaderStageFlags::COMPUTE,
            ),
            binding(
                CULL_VISIBILITY_BINDING,
                vk::DescriptorType::STORAGE_BUFFER,
                1,
                vk::ShaderStageFlags::COMPUTE,
            ),
        ];
        #[cfg(feature = "occlusion")]
        cull_bindings.push(binding(
            CULL_PYRAMID_BINDING,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            vk::ShaderStageFlags::COMPUTE,
        ));
        #[cfg(feature = "instancing")]
        cull_bindings.push(binding(
            CULL_LOD_INSTANCES_BINDING,
            vk::DescriptorType::STORAGE_BUFFER,
            1,
            vk::ShaderStageFlags::COMPUTE,
        ));
        #[cfg(feature = "instancing")]
        cull_bindings.push(binding(
            CULL_INSTANCE_DATA_BINDING,
            vk::DescriptorType::STORAGE_BUFFER,
            1,
            vk::ShaderStageFlags::COMPUTE,
        ));
        let cull_layout = create_layout(&device, &cull_bindings, None)?;

        let graphics_layout = create_layout(
            &device,
            &[
                binding(
                    GFX_VERTICES_BINDING,
                    vk::DescriptorType::STORAGE_BUFFER,
                    1,
                    vk::ShaderStageFlags::VERTEX,
                ),
                binding(
                    GFX_MATERIALS_BINDING,
                    vk::DescriptorType::STORAGE_BUFFER,
                    1,
                    vk::ShaderStageFlags::FRAGMENT,
                ),
                binding(
                    GFX_COMMANDS_BINDING,
                    vk::DescriptorType::STORAGE_BUFFER,
                    1,
                    vk::ShaderStageFlags::VERTEX,
                ),
            ],
            None,
        )?;

        let texture_layout = create_layout(
            &device,
            &[
                binding(
                    TEX_SAMPLER_BINDING,
                    vk::DescriptorType::SAMPLER,
                    1,
                    vk::ShaderStageFlags::FRAGMENT,
                ),
                binding(
                    TEX_ARRAY_BINDING,
                    vk::DescriptorType::SAMPLED_IMAGE,
                    MAX_TEXTURE_COUNT as u32,
                    vk::ShaderStageFlags::FRAGMENT,
                ),
            ],
            Some(&[
                vk::DescriptorBindingFlags::empty(),
                vk::DescriptorBindingFlags::PARTIALLY_BOUND
                    | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
            ]),
        )?;

        let pyramid_layout = create_layout(
            &device,
            &[
                binding(
                    PYRAMID_DST_BINDING,
                    vk::DescriptorType::STORAGE_IMAGE,
                    1,
                    vk::ShaderStageFlags::COMPUTE,
                ),
                binding(
                    PYRAMID_SRC_BINDING,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    1,
                    vk::ShaderStageFlags::COMPUTE,
                ),
            ],
            None,
        )?;

        let frames = FRAMES_IN_FLIGHT as u32;
        let pyramid_sets = frames * MAX_DEPTH_PYRAMID_MIPS;
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: frames,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: frames * 16 + 8,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: frames + pyramid_sets,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: pyramid_sets,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: MAX_TEXTURE_COUNT as u32,
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(frames * 3 + pyramid_sets + 2)
            .pool_sizes(&pool_sizes);
        let pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(|e| map_vk_error(e, "descriptor pool"))?
        };

        // The texture set exists from the start: uploads write into it
        // before the scene is finalized
        let texture_set = {
            let counts = [MAX_TEXTURE_COUNT as u32];
            let mut variable_info =
                vk::DescriptorSetVariableDescriptorCountAllocateInfo::default()
                    .descriptor_counts(&counts);
            let layouts = [texture_layout];
            let alloc = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts)
                .push_next(&mut variable_info);
            unsafe {
                device
                    .allocate_descriptor_sets(&alloc)
                    .map_err(|e| map_vk_error(e, "texture descriptor set"))?[0]
            }
        };

        Ok(Self {
            device,
            pool,
            shared_layout,
            cull_layout,
            graphics_layout,
            texture_layout,
            pyramid_layout,
            shared_sets: Vec::new(),
            cull_sets: Vec::new(),
            graphics_sets: Vec::new(),
            texture_set,
            pyramid_sets: Vec::new(),
        })
    }

    fn allocate(&self, layout: vk::DescriptorSetLayout) -> EngineResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        unsafe {
            Ok(self
                .device
                .allocate_descriptor_sets(&alloc)
                .map_err(|e| map_vk_error(e, "descriptor set"))?[0])
        }
    }

    /// Allocate the per-frame and static sets once the scene buffers exist.
    pub fn allocate_runtime_sets(&mut self) -> EngineResult<()> {
        for _ in 0..FRAMES_IN_FLIGHT {
            self.shared_sets.push(self.allocate(self.shared_layout)?);
            self.cull_sets.push(self.allocate(self.cull_layout)?);
            self.graphics_sets.push(self.allocate(self.graphics_layout)?);
        }
        Ok(())
    }

    /// Allocate the reduction sets for `mip_count` pyramid mips per slot.
    pub fn allocate_pyramid_sets(&mut self, mip_count: u32) -> EngineResult<()> {
        self.pyramid_sets.clear();
        for _ in 0..FRAMES_IN_FLIGHT {
            let mut per_mip = Vec::with_capacity(mip_count as usize);
            for _ in 0..mip_count {
                per_mip.push(self.allocate(self.pyramid_layout)?);
            }
            self.pyramid_sets.push(per_mip);
        }
        Ok(())
    }

    pub fn write_buffer(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
    ) {
        let info = [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(ty)
            .buffer_info(&info);
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
    }

    pub fn write_sampler(&self, set: vk::DescriptorSet, binding: u32, sampler: vk::Sampler) {
        let info = [vk::DescriptorImageInfo {
            sampler,
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::UNDEFINED,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::SAMPLER)
            .image_info(&info);
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
    }

    /// Write one element of the bindless texture array.
    pub fn write_texture_array_element(
        &self,
        element: u32,
        view: vk::ImageView,
    ) {
        let info = [vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.texture_set)
            .dst_binding(TEX_ARRAY_BINDING)
            .dst_array_element(element)
            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
            .image_info(&info);
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
    }

    pub fn write_combined_image(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) {
        let info = [vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: layout,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&info);
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
    }

    pub fn write_storage_image(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
    ) {
        let info = [vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view,
            image_layout: vk::ImageLayout::GENERAL,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
            .image_info(&info);
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
    }
}

impl Drop for DescriptorContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device
                .destroy_descriptor_set_layout(self.shared_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.cull_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.graphics_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.texture_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.pyramid_layout, None);
        }
    }
}
