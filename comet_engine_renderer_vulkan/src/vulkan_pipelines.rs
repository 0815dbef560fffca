//! Shader loading and pipeline construction.
//!
//! Shaders are pre-compiled SPIR-V loaded from the fixed asset paths; each
//! module is reflected with `spirq` before use so a stale or truncated
//! binary fails at load time with a `shader-load` error instead of a
//! device loss at draw time.

use ash::vk;
use comet_engine::error::{EngineError, EngineResult};
use comet_engine::{engine_bail, engine_info};
use spirq::ReflectConfig;
use std::path::Path;
use std::sync::Arc;

use crate::vulkan_context::map_vk_error;
use crate::vulkan_image::DEPTH_FORMAT;

/// Read, validate and wrap one SPIR-V binary.
pub fn load_shader_module(
    device: &ash::Device,
    path: &str,
) -> EngineResult<vk::ShaderModule> {
    let bytes = std::fs::read(Path::new(path))
        .map_err(|e| EngineError::ShaderLoad(format!("{}: {}", path, e)))?;
    if bytes.len() % 4 != 0 || bytes.len() < 20 {
        engine_bail!(ShaderLoad, "comet::vulkan", "{}: not SPIR-V bytecode", path);
    }
    let mut code = vec![0u32; bytes.len() / 4];
    for (word, chunk) in code.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    if code[0] != 0x0723_0203 {
        engine_bail!(ShaderLoad, "comet::vulkan", "{}: bad SPIR-V magic", path);
    }

    // Reflection doubles as validation of the binary's structure
    let entry_points = ReflectConfig::new()
        .spv(code.as_slice())
        .reflect()
        .map_err(|e| EngineError::ShaderLoad(format!("{}: reflection failed: {}", path, e)))?;
    if !entry_points.iter().any(|entry| entry.name == "main") {
        engine_bail!(ShaderLoad, "comet::vulkan", "{}: no 'main' entry point", path);
    }

    let info = vk::ShaderModuleCreateInfo::default().code(&code);
    let module = unsafe {
        device
            .create_shader_module(&info, None)
            .map_err(|e| map_vk_error(e, "shader module"))?
    };
    engine_info!("comet::vulkan", "loaded shader {}", path);
    Ok(module)
}

fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constants: &[vk::PushConstantRange],
) -> EngineResult<vk::PipelineLayout> {
    let info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constants);
    unsafe {
        device
            .create_pipeline_layout(&info, None)
            .map_err(|e| map_vk_error(e, "pipeline layout"))
    }
}

fn create_compute_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    path: &str,
) -> EngineResult<vk::Pipeline> {
    let module = load_shader_module(device, path)?;
    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(module)
        .name(c"main");
    let info = vk::ComputePipelineCreateInfo::default()
        .stage(stage)
        .layout(layout);
    let pipeline = unsafe {
        device
            .create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
            .map_err(|(_, e)| map_vk_error(e, "compute pipeline"))?[0]
    };
    unsafe { device.destroy_shader_module(module, None) };
    Ok(pipeline)
}

fn create_graphics_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    vs_path: &str,
    ps_path: &str,
    color_format: vk::Format,
    depth: bool,
) -> EngineResult<vk::Pipeline> {
    let vs = load_shader_module(device, vs_path)?;
    let ps = load_shader_module(device, ps_path)?;

    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vs)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(ps)
            .name(c"main"),
    ];

    // Vertices are pulled from a storage buffer; no vertex input state
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    // Reverse-Z: clear to 0, keep the greater depth
    let depth_stencil = if depth {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::GREATER)
    } else {
        vk::PipelineDepthStencilStateCreateInfo::default()
    };

    let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)];
    let color_blend =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo::default()
        .dynamic_states(&dynamic_states);

    let color_formats = [color_format];
    let mut rendering = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats);
    if depth {
        rendering = rendering.depth_attachment_format(DEPTH_FORMAT);
    }

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic)
        .layout(layout)
        .push_next(&mut rendering);

    let pipeline = unsafe {
        device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
            .map_err(|(_, e)| map_vk_error(e, "graphics pipeline"))?[0]
    };
    unsafe {
        device.destroy_shader_module(vs, None);
        device.destroy_shader_module(ps, None);
    }
    Ok(pipeline)
}

/// The loading-screen pipeline, available right after `init`.
pub struct LoadingPipeline {
    device: Arc<ash::Device>,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl LoadingPipeline {
    pub fn new(device: Arc<ash::Device>, color_format: vk::Format) -> EngineResult<Self> {
        use comet_engine::renderer::shader_paths;
        let layout = create_pipeline_layout(&device, &[], &[])?;
        let pipeline = create_graphics_pipeline(
            &device,
            layout,
            shader_paths::LOADING_TRIANGLE_VS,
            shader_paths::LOADING_TRIANGLE_PS,
            color_format,
            false,
        )?;
        Ok(Self { device, layout, pipeline })
    }
}

impl Drop for LoadingPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// All runtime pipelines, created in `setup_for_rendering` once the
/// descriptor layouts exist.
pub struct RuntimePipelines {
    device: Arc<ash::Device>,

    pub cull_layout: vk::PipelineLayout,
    pub draw_count_reset: vk::Pipeline,
    pub draw_cull: vk::Pipeline,
    #[cfg(feature = "occlusion")]
    pub draw_occ_late: vk::Pipeline,
    #[cfg(feature = "instancing")]
    pub draw_inst_cmd: vk::Pipeline,
    #[cfg(feature = "instancing")]
    pub draw_inst_count_reset: vk::Pipeline,

    pub pyramid_layout: vk::PipelineLayout,
    #[cfg(feature = "occlusion")]
    pub depth_pyramid: vk::Pipeline,

    pub opaque_layout: vk::PipelineLayout,
    pub opaque: vk::Pipeline,
}

impl RuntimePipelines {
    pub fn new(
        device: Arc<ash::Device>,
        descriptors: &crate::vulkan_descriptors::DescriptorContext,
        color_format: vk::Format,
    ) -> EngineResult<Self> {
        use comet_engine::renderer::shader_paths;

        // Culling: object count + command capacity as push constants
        let cull_push = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            offset: 0,
            size: 8,
        }];
        let cull_layout = create_pipeline_layout(
            &device,
            &[descriptors.shared_layout, descriptors.cull_layout],
            &cull_push,
        )?;

        let draw_count_reset =
            create_compute_pipeline(&device, cull_layout, shader_paths::DRAW_COUNT_RESET_CS)?;
        let cull_shader = if cfg!(feature = "occlusion") {
            shader_paths::DRAW_OCC_FIRST_CS
        } else if cfg!(feature = "instancing") {
            shader_paths::DRAW_INST_CULL_CS
        } else {
            shader_paths::DRAW_CULL_CS
        };
        let draw_cull = create_compute_pipeline(&device, cull_layout, cull_shader)?;
        #[cfg(feature = "occlusion")]
        let draw_occ_late =
            create_compute_pipeline(&device, cull_layout, shader_paths::DRAW_OCC_LATE_CS)?;
        #[cfg(feature = "instancing")]
        let draw_inst_cmd =
            create_compute_pipeline(&device, cull_layout, shader_paths::DRAW_INST_CMD_CS)?;
        #[cfg(feature = "instancing")]
        let draw_inst_count_reset = create_compute_pipeline(
            &device,
            cull_layout,
            shader_paths::DRAW_INST_COUNT_RESET_CS,
        )?;

        // Pyramid reduction: destination mip size as push constants
        let pyramid_push = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            offset: 0,
            size: 8,
        }];
        let pyramid_layout = create_pipeline_layout(
            &device,
            &[descriptors.pyramid_layout],
            &pyramid_push,
        )?;
        #[cfg(feature = "occlusion")]
        let depth_pyramid =
            create_compute_pipeline(&device, pyramid_layout, shader_paths::DEPTH_PYRAMID_CS)?;

        // Opaque draw: texture-array base offset as a push constant
        let opaque_push = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: 4,
        }];
        let opaque_layout = create_pipeline_layout(
            &device,
            &[
                descriptors.shared_layout,
                descriptors.graphics_layout,
                descriptors.texture_layout,
            ],
            &opaque_push,
        )?;
        let opaque = create_graphics_pipeline(
            &device,
            opaque_layout,
            shader_paths::OPAQUE_VS,
            shader_paths::OPAQUE_PS,
            color_format,
            true,
        )?;

        Ok(Self {
            device,
            cull_layout,
            draw_count_reset,
            draw_cull,
            #[cfg(feature = "occlusion")]
            draw_occ_late,
            #[cfg(feature = "instancing")]
            draw_inst_cmd,
            #[cfg(feature = "instancing")]
            draw_inst_count_reset,
            pyramid_layout,
            #[cfg(feature = "occlusion")]
            depth_pyramid,
            opaque_layout,
            opaque,
        })
    }
}

impl Drop for RuntimePipelines {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.draw_count_reset, None);
            self.device.destroy_pipeline(self.draw_cull, None);
            #[cfg(feature = "occlusion")]
            self.device.destroy_pipeline(self.draw_occ_late, None);
            #[cfg(feature = "instancing")]
            self.device.destroy_pipeline(self.draw_inst_cmd, None);
            #[cfg(feature = "instancing")]
            self.device.destroy_pipeline(self.draw_inst_count_reset, None);
            #[cfg(feature = "occlusion")]
            self.device.destroy_pipeline(self.depth_pyramid, None);
            self.device.destroy_pipeline(self.opaque, None);
            self.device.destroy_pipeline_layout(self.cull_layout, None);
            self.device.destroy_pipeline_layout(self.pyramid_layout, None);
            self.device.destroy_pipeline_layout(self.opaque_layout, None);
        }
    }
}
