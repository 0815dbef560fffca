//! The OpenGL implementation of the engine's `Renderer` trait.

use comet_engine::camera::CameraViewData;
use comet_engine::error::{EngineError, EngineResult};
use comet_engine::limits::WINDOW_BACKGROUND_COLOR;
use comet_engine::renderer::{
    cull_objects, DrawContext, FrameContext, Renderer, WindowHandles,
};
use comet_engine::resource::{
    BlockFormat, LodData, MeshTransform, PrimitiveSurface, TextureAsset,
};
use comet_engine::scene::RenderObject;
use comet_engine::{engine_bail, engine_info, engine_warn};
use gl::types::{GLenum, GLint, GLsizei, GLuint};
use std::ffi::CString;

const VERTEX_SHADER_PATH: &str = "shaders/src/legacy-opaque.vert.glsl";
const FRAGMENT_SHADER_PATH: &str = "shaders/src/legacy-opaque.frag.glsl";

// S3TC/sRGB compressed formats are extension enums the core bindings do not
// carry
const COMPRESSED_RGBA_S3TC_DXT1: GLenum = 0x83F1;
const COMPRESSED_RGBA_S3TC_DXT3: GLenum = 0x83F3;
const COMPRESSED_RGBA_S3TC_DXT5: GLenum = 0x83F5;
const COMPRESSED_SRGB_ALPHA_S3TC_DXT1: GLenum = 0x8C4D;
const COMPRESSED_SRGB_ALPHA_S3TC_DXT3: GLenum = 0x8C4E;
const COMPRESSED_SRGB_ALPHA_S3TC_DXT5: GLenum = 0x8C4F;

fn block_format_to_gl(format: BlockFormat) -> GLenum {
    match format {
        BlockFormat::Bc1 { srgb: false } => COMPRESSED_RGBA_S3TC_DXT1,
        BlockFormat::Bc1 { srgb: true } => COMPRESSED_SRGB_ALPHA_S3TC_DXT1,
        BlockFormat::Bc2 { srgb: false } => COMPRESSED_RGBA_S3TC_DXT3,
        BlockFormat::Bc2 { srgb: true } => COMPRESSED_SRGB_ALPHA_S3TC_DXT3,
        BlockFormat::Bc3 { srgb: false } => COMPRESSED_RGBA_S3TC_DXT5,
        BlockFormat::Bc3 { srgb: true } => COMPRESSED_SRGB_ALPHA_S3TC_DXT5,
        BlockFormat::Bc4 { signed: false } => gl::COMPRESSED_RED_RGTC1,
        BlockFormat::Bc4 { signed: true } => gl::COMPRESSED_SIGNED_RED_RGTC1,
        BlockFormat::Bc5 { signed: false } => gl::COMPRESSED_RG_RGTC2,
        BlockFormat::Bc5 { signed: true } => gl::COMPRESSED_SIGNED_RG_RGTC2,
        BlockFormat::Bc6h { signed: false } => gl::COMPRESSED_RGB_BPTC_UNSIGNED_FLOAT,
        BlockFormat::Bc6h { signed: true } => gl::COMPRESSED_RGB_BPTC_SIGNED_FLOAT,
        BlockFormat::Bc7 { srgb: false } => gl::COMPRESSED_RGBA_BPTC_UNORM,
        BlockFormat::Bc7 { srgb: true } => gl::COMPRESSED_SRGB_ALPHA_BPTC_UNORM,
    }
}

/// CPU-side copy of the scene the immediate path draws from.
struct GlScene {
    surfaces: Vec<PrimitiveSurface>,
    lods: Vec<LodData>,
    objects: Vec<RenderObject>,
    transforms: Vec<MeshTransform>,
    material_albedo: Vec<u32>,
}

pub struct GlRenderer {
    initialized: bool,
    window_width: u32,
    window_height: u32,

    vertex_buffer: GLuint,
    index_buffer: GLuint,
    vao: GLuint,
    program: GLuint,
    textures: Vec<GLuint>,

    scene: Option<GlScene>,
    view_data: CameraViewData,
    final_setup_done: bool,
}

impl GlRenderer {
    pub fn new() -> Self {
        Self {
            initialized: false,
            window_width: 0,
            window_height: 0,
            vertex_buffer: 0,
            index_buffer: 0,
            vao: 0,
            program: 0,
            textures: Vec::new(),
            scene: None,
            view_data: CameraViewData::default(),
            final_setup_done: false,
        }
    }

    fn uniform_location(&self, name: &str) -> GLint {
        let name = CString::new(name).expect("uniform name");
        unsafe { gl::GetUniformLocation(self.program, name.as_ptr()) }
    }
}

impl Default for GlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_shader(kind: GLenum, path: &str) -> EngineResult<GLuint> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| EngineError::ShaderLoad(format!("{}: {}", path, e)))?;
    let source = CString::new(source)
        .map_err(|e| EngineError::ShaderLoad(format!("{}: {}", path, e)))?;
    unsafe {
        let shader = gl::CreateShader(kind);
        gl::ShaderSource(shader, 1, &source.as_ptr(), std::ptr::null());
        gl::CompileShader(shader);

        let mut status: GLint = 0;
        gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
        if status == 0 {
            let mut log = [0u8; 512];
            let mut length: GLsizei = 0;
            gl::GetShaderInfoLog(
                shader,
                log.len() as GLsizei,
                &mut length,
                log.as_mut_ptr() as *mut _,
            );
            gl::DeleteShader(shader);
            let message = String::from_utf8_lossy(&log[..length.max(0) as usize]).to_string();
            engine_bail!(ShaderLoad, "comet::gl", "{}: {}", path, message);
        }
        Ok(shader)
    }
}

fn link_program(vertex: GLuint, fragment: GLuint) -> EngineResult<GLuint> {
    unsafe {
        let program = gl::CreateProgram();
        gl::AttachShader(program, vertex);
        gl::AttachShader(program, fragment);
        gl::LinkProgram(program);

        let mut status: GLint = 0;
        gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);
        // The shaders are owned by the program from here on
        gl::DeleteShader(vertex);
        gl::DeleteShader(fragment);
        if status == 0 {
            let mut log = [0u8; 512];
            let mut length: GLsizei = 0;
            gl::GetProgramInfoLog(
                program,
                log.len() as GLsizei,
                &mut length,
                log.as_mut_ptr() as *mut _,
            );
            gl::DeleteProgram(program);
            let message = String::from_utf8_lossy(&log[..length.max(0) as usize]).to_string();
            engine_bail!(ShaderLoad, "comet::gl", "program link: {}", message);
        }
        Ok(program)
    }
}

impl Renderer for GlRenderer {
    fn init(&mut self, handles: &WindowHandles) -> EngineResult<()> {
        if self.initialized {
            return Ok(());
        }
        gl_loader::init_gl();
        gl::load_with(|symbol| gl_loader::get_proc_address(symbol) as *const _);

        self.window_width = handles.width;
        self.window_height = handles.height;
        unsafe {
            gl::Viewport(0, 0, handles.width as GLsizei, handles.height as GLsizei);
            // Reverse-Z on [0,1] with a GREATER test, like the modern path
            gl::ClipControl(gl::LOWER_LEFT, gl::ZERO_TO_ONE);
            gl::Enable(gl::DEPTH_TEST);
            gl::DepthFunc(gl::GREATER);
            gl::ClearDepth(0.0);

            // Texture slot 0: the same 2x2 pattern of magenta and
            // (0.3, 0, 0.6) the modern backend seeds, so tag 0 always
            // resolves and both backends sample identical defaults
            let default_pixels: [u8; 16] = [
                255, 0, 255, 255, 77, 0, 153, 255, //
                77, 0, 153, 255, 255, 0, 255, 255,
            ];
            let mut texture: GLuint = 0;
            gl::GenTextures(1, &mut texture);
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::NEAREST as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::NEAREST as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::REPEAT as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::REPEAT as GLint);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA8 as GLint,
                2,
                2,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                default_pixels.as_ptr() as *const _,
            );
            self.textures.push(texture);
        }
        self.initialized = true;
        engine_info!("comet::gl", "legacy renderer initialized");
        Ok(())
    }

    fn upload_texture(&mut self, asset: &TextureAsset) -> EngineResult<u32> {
        let tag = self.textures.len() as u32;
        let format = block_format_to_gl(asset.format);
        let block_size = asset.format.block_size();
        unsafe {
            let mut texture: GLuint = 0;
            gl::GenTextures(1, &mut texture);
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexParameteri(
                gl::TEXTURE_2D,
                gl::TEXTURE_MIN_FILTER,
                gl::LINEAR_MIPMAP_LINEAR as GLint,
            );
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::REPEAT as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::REPEAT as GLint);

            let mut offset = 0usize;
            let mut width = asset.width;
            let mut height = asset.height;
            for mip in 0..asset.mip_count {
                let mip_size =
                    ((width + 3) / 4) as usize * ((height + 3) / 4) as usize * block_size as usize;
                gl::CompressedTexImage2D(
                    gl::TEXTURE_2D,
                    mip as GLint,
                    format,
                    width as GLsizei,
                    height as GLsizei,
                    0,
                    mip_size as GLsizei,
                    asset.data[offset..].as_ptr() as *const _,
                );
                offset += mip_size;
                width = (width / 2).max(1);
                height = (height / 2).max(1);
            }
            self.textures.push(texture);
        }
        Ok(tag)
    }

    fn setup_for_rendering(&mut self, ctx: &mut DrawContext) -> EngineResult<()> {
        if self.scene.is_some() {
            return Err(EngineError::InvalidResource(
                "setup_for_rendering called twice".to_string(),
            ));
        }

        unsafe {
            gl::GenVertexArrays(1, &mut self.vao);
            gl::BindVertexArray(self.vao);

            // All vertices live in one SSBO the vertex shader indexes with
            // gl_VertexID
            gl::GenBuffers(1, &mut self.vertex_buffer);
            gl::BindBuffer(gl::SHADER_STORAGE_BUFFER, self.vertex_buffer);
            let vertex_bytes: &[u8] = bytemuck::cast_slice(&ctx.geometry.vertices);
            gl::BufferData(
                gl::SHADER_STORAGE_BUFFER,
                vertex_bytes.len() as isize,
                vertex_bytes.as_ptr() as *const _,
                gl::STATIC_DRAW,
            );
            gl::BindBufferBase(gl::SHADER_STORAGE_BUFFER, 0, self.vertex_buffer);
            gl::BindBuffer(gl::SHADER_STORAGE_BUFFER, 0);

            gl::GenBuffers(1, &mut self.index_buffer);
            gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, self.index_buffer);
            let index_bytes: &[u8] = bytemuck::cast_slice(&ctx.geometry.indices);
            gl::BufferData(
                gl::ELEMENT_ARRAY_BUFFER,
                index_bytes.len() as isize,
                index_bytes.as_ptr() as *const _,
                gl::STATIC_DRAW,
            );
        }

        let vertex = compile_shader(gl::VERTEX_SHADER, VERTEX_SHADER_PATH)?;
        let fragment = compile_shader(gl::FRAGMENT_SHADER, FRAGMENT_SHADER_PATH)?;
        self.program = link_program(vertex, fragment)?;

        ctx.materials.rebase_texture_tags(0);
        let material_albedo = ctx
            .materials
            .as_slice()
            .iter()
            .map(|material| material.albedo_tag)
            .collect();

        self.scene = Some(GlScene {
            surfaces: ctx.geometry.surfaces.clone(),
            lods: ctx.geometry.lods.clone(),
            objects: ctx.renders.opaque.clone(),
            transforms: ctx.renders.transforms().to_vec(),
            material_albedo,
        });
        engine_info!(
            "comet::gl",
            "scene ready: {} objects",
            ctx.renders.opaque.len()
        );
        Ok(())
    }

    fn final_setup(&mut self) -> EngineResult<()> {
        // The immediate path has no deferred state transitions
        if self.final_setup_done {
            return Ok(());
        }
        self.final_setup_done = true;
        Ok(())
    }

    fn draw_while_waiting(&mut self, _delta_time: f32) -> EngineResult<()> {
        unsafe {
            let [r, g, b, a] = WINDOW_BACKGROUND_COLOR;
            gl::ClearColor(r, g, b, a);
            gl::Clear(gl::COLOR_BUFFER_BIT);
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext) -> EngineResult<()> {
        let object_count = self.scene.as_ref().map_or(0, |s| s.objects.len() as u32);
        self.view_data =
            ctx.cameras
                .build_view_data(0.0, 0.0, object_count, ctx.renders.onpc.len() as u32);
        Ok(())
    }

    fn draw_frame(&mut self, _ctx: &mut FrameContext) -> EngineResult<()> {
        let Some(scene) = &self.scene else {
            return Err(EngineError::InvalidResource(
                "draw_frame before setup_for_rendering".to_string(),
            ));
        };

        // The exact culling and LOD math of the compute path, on the host
        let output = cull_objects(
            &scene.objects,
            &scene.transforms,
            &scene.surfaces,
            &scene.lods,
            &self.view_data,
            scene.objects.len().max(1),
        );
        if output.overflowed {
            engine_warn!("comet::gl", "draw list clamped to {}", output.commands.len());
        }

        unsafe {
            let [r, g, b, a] = WINDOW_BACKGROUND_COLOR;
            gl::Viewport(
                0,
                0,
                self.window_width as GLsizei,
                self.window_height as GLsizei,
            );
            gl::ClearColor(r, g, b, a);
            gl::Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT);

            gl::UseProgram(self.program);
            gl::BindVertexArray(self.vao);
            gl::BindBufferBase(gl::SHADER_STORAGE_BUFFER, 0, self.vertex_buffer);
            gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, self.index_buffer);

            let view_projection = self.uniform_location("u_view_projection");
            gl::UniformMatrix4fv(
                view_projection,
                1,
                gl::FALSE,
                self.view_data.view_projection.as_ref().as_ptr(),
            );
            let position_scale = self.uniform_location("u_position_scale");
            let orientation = self.uniform_location("u_orientation");
            let albedo = self.uniform_location("u_albedo");
            gl::ActiveTexture(gl::TEXTURE0);
            gl::Uniform1i(albedo, 0);

            for command in &output.commands {
                let object = &scene.objects[command.object_id as usize];
                let transform = &scene.transforms[object.transform_id as usize];
                let surface = &scene.surfaces[object.surface_id as usize];

                gl::Uniform4f(
                    position_scale,
                    transform.position[0],
                    transform.position[1],
                    transform.position[2],
                    transform.scale,
                );
                gl::Uniform4fv(orientation, 1, transform.orientation.as_ptr());

                let albedo_tag = scene
                    .material_albedo
                    .get(surface.material_id as usize)
                    .copied()
                    .unwrap_or(0);
                let texture = self
                    .textures
                    .get(albedo_tag as usize)
                    .or_else(|| self.textures.first())
                    .copied()
                    .unwrap_or(0);
                gl::BindTexture(gl::TEXTURE_2D, texture);

                gl::DrawElements(
                    gl::TRIANGLES,
                    command.index_count as GLsizei,
                    gl::UNSIGNED_INT,
                    (command.first_index as usize * std::mem::size_of::<u32>()) as *const _,
                );
            }
        }
        Ok(())
    }

    fn update_object_transform(&mut self, transform_id: u32, transform: &MeshTransform) {
        if let Some(scene) = self.scene.as_mut() {
            if let Some(slot) = scene.transforms.get_mut(transform_id as usize) {
                *slot = *transform;
            }
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.window_width = width;
        self.window_height = height;
        if self.initialized {
            unsafe {
                gl::Viewport(0, 0, width as GLsizei, height as GLsizei);
            }
        }
    }

    fn wait_idle(&mut self) {
        if self.initialized {
            unsafe {
                gl::Finish();
            }
        }
    }
}

impl Drop for GlRenderer {
    fn drop(&mut self) {
        if !self.initialized {
            return;
        }
        unsafe {
            if self.program != 0 {
                gl::DeleteProgram(self.program);
            }
            if self.vertex_buffer != 0 {
                gl::DeleteBuffers(1, &self.vertex_buffer);
            }
            if self.index_buffer != 0 {
                gl::DeleteBuffers(1, &self.index_buffer);
            }
            if self.vao != 0 {
                gl::DeleteVertexArrays(1, &self.vao);
            }
            for texture in &self.textures {
                gl::DeleteTextures(1, texture);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bc_formats_map_to_gl_enums() {
        assert_eq!(
            block_format_to_gl(BlockFormat::Bc1 { srgb: false }),
            COMPRESSED_RGBA_S3TC_DXT1
        );
        assert_eq!(
            block_format_to_gl(BlockFormat::Bc7 { srgb: false }),
            gl::COMPRESSED_RGBA_BPTC_UNORM
        );
        assert_eq!(
            block_format_to_gl(BlockFormat::Bc5 { signed: true }),
            gl::COMPRESSED_SIGNED_RG_RGTC2
        );
    }
}
