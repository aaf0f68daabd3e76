//! `GlApi` over a `glow` context (native GL or WebGL).
//!
//! All calls are forwarded as-is. The context must be current on the calling thread, which is
//! the safety contract `glow` asks for on every entry point.

use glow::{HasContext as Gl, PixelUnpackData};

use super::api::{ActiveVariable, GlApi, ShaderStage};

impl GlApi for glow::Context {
    type Shader = glow::Shader;
    type Program = glow::Program;
    type Buffer = glow::Buffer;
    type Texture = glow::Texture;
    type Framebuffer = glow::Framebuffer;
    type Renderbuffer = glow::Renderbuffer;
    type UniformLocation = glow::UniformLocation;

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String> {
        // SAFETY: context is current; the shader handle is created here and not shared.
        unsafe {
            let shader = Gl::create_shader(self, stage.gl_enum())?;
            Gl::shader_source(self, shader, source);
            Gl::compile_shader(self, shader);
            if Gl::get_shader_compile_status(self, shader) {
                Ok(shader)
            } else {
                let log = Gl::get_shader_info_log(self, shader);
                Gl::delete_shader(self, shader);
                Err(log)
            }
        }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { Gl::delete_shader(self, shader) }
    }

    fn link_program(
        &self,
        vertex: Self::Shader,
        fragment: Self::Shader,
    ) -> Result<Self::Program, String> {
        unsafe {
            let program = Gl::create_program(self)?;
            Gl::attach_shader(self, program, vertex);
            Gl::attach_shader(self, program, fragment);
            Gl::link_program(self, program);
            Gl::detach_shader(self, program, vertex);
            Gl::detach_shader(self, program, fragment);
            if Gl::get_program_link_status(self, program) {
                Ok(program)
            } else {
                let log = Gl::get_program_info_log(self, program);
                Gl::delete_program(self, program);
                Err(log)
            }
        }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { Gl::delete_program(self, program) }
    }

    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveVariable> {
        unsafe {
            let count = Gl::get_active_uniforms(self, program);
            (0..count)
                .filter_map(|index| Gl::get_active_uniform(self, program, index))
                .map(|u| ActiveVariable { name: u.name, size: u.size, gl_type: u.utype })
                .collect()
        }
    }

    fn active_attributes(&self, program: Self::Program) -> Vec<ActiveVariable> {
        unsafe {
            let count = Gl::get_active_attributes(self, program);
            (0..count)
                .filter_map(|index| Gl::get_active_attribute(self, program, index))
                .map(|a| ActiveVariable { name: a.name, size: a.size, gl_type: a.atype })
                .collect()
        }
    }

    fn uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { Gl::get_uniform_location(self, program, name) }
    }

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { Gl::get_attrib_location(self, program, name) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { Gl::use_program(self, program) }
    }

    fn create_buffer(&self, target: u32, data: &[u8], usage: u32) -> Result<Self::Buffer, String> {
        unsafe {
            let buffer = Gl::create_buffer(self)?;
            Gl::bind_buffer(self, target, Some(buffer));
            Gl::buffer_data_u8_slice(self, target, data, usage);
            Ok(buffer)
        }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { Gl::delete_buffer(self, buffer) }
    }

    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>) {
        unsafe { Gl::bind_buffer(self, target, buffer) }
    }

    fn enable_vertex_attrib_array(&self, location: u32) {
        unsafe { Gl::enable_vertex_attrib_array(self, location) }
    }

    fn vertex_attrib_pointer(
        &self,
        location: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        unsafe {
            Gl::vertex_attrib_pointer_f32(self, location, size, data_type, normalized, stride, offset)
        }
    }

    fn uniform_1_f32(&self, location: &Self::UniformLocation, value: f32) {
        unsafe { Gl::uniform_1_f32(self, Some(location), value) }
    }

    fn uniform_1_i32(&self, location: &Self::UniformLocation, value: i32) {
        unsafe { Gl::uniform_1_i32(self, Some(location), value) }
    }

    fn uniform_f32_slice(&self, location: &Self::UniformLocation, components: u8, values: &[f32]) {
        let location = Some(location);
        unsafe {
            match components {
                1 => Gl::uniform_1_f32_slice(self, location, values),
                2 => Gl::uniform_2_f32_slice(self, location, values),
                3 => Gl::uniform_3_f32_slice(self, location, values),
                4 => Gl::uniform_4_f32_slice(self, location, values),
                other => log::warn!("uniform_f32_slice: unsupported component count {other}"),
            }
        }
    }

    fn uniform_i32_slice(&self, location: &Self::UniformLocation, components: u8, values: &[i32]) {
        let location = Some(location);
        unsafe {
            match components {
                1 => Gl::uniform_1_i32_slice(self, location, values),
                2 => Gl::uniform_2_i32_slice(self, location, values),
                3 => Gl::uniform_3_i32_slice(self, location, values),
                4 => Gl::uniform_4_i32_slice(self, location, values),
                other => log::warn!("uniform_i32_slice: unsupported component count {other}"),
            }
        }
    }

    fn uniform_matrix_f32_slice(&self, location: &Self::UniformLocation, dim: u8, values: &[f32]) {
        let location = Some(location);
        unsafe {
            match dim {
                2 => Gl::uniform_matrix_2_f32_slice(self, location, false, values),
                3 => Gl::uniform_matrix_3_f32_slice(self, location, false, values),
                4 => Gl::uniform_matrix_4_f32_slice(self, location, false, values),
                other => log::warn!("uniform_matrix_f32_slice: unsupported dimension {other}"),
            }
        }
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        unsafe { Gl::create_texture(self) }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { Gl::delete_texture(self, texture) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { Gl::active_texture(self, glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>) {
        unsafe { Gl::bind_texture(self, target, texture) }
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        unsafe { Gl::tex_parameter_i32(self, target, parameter, value) }
    }

    fn tex_storage_rgba(&self, width: i32, height: i32) {
        unsafe {
            Gl::tex_image_2d(
                self,
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(None),
            )
        }
    }

    fn create_renderbuffer(&self) -> Result<Self::Renderbuffer, String> {
        unsafe { Gl::create_renderbuffer(self) }
    }

    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer) {
        unsafe { Gl::delete_renderbuffer(self, renderbuffer) }
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<Self::Renderbuffer>) {
        unsafe { Gl::bind_renderbuffer(self, glow::RENDERBUFFER, renderbuffer) }
    }

    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32) {
        unsafe { Gl::renderbuffer_storage(self, glow::RENDERBUFFER, internal_format, width, height) }
    }

    fn create_framebuffer(&self) -> Result<Self::Framebuffer, String> {
        unsafe { Gl::create_framebuffer(self) }
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        unsafe { Gl::delete_framebuffer(self, framebuffer) }
    }

    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>) {
        unsafe { Gl::bind_framebuffer(self, glow::FRAMEBUFFER, framebuffer) }
    }

    fn framebuffer_texture_2d(&self, attachment: u32, texture: Option<Self::Texture>) {
        unsafe {
            Gl::framebuffer_texture_2d(
                self,
                glow::FRAMEBUFFER,
                attachment,
                glow::TEXTURE_2D,
                texture,
                0,
            )
        }
    }

    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: Option<Self::Renderbuffer>) {
        unsafe {
            Gl::framebuffer_renderbuffer(
                self,
                glow::FRAMEBUFFER,
                attachment,
                glow::RENDERBUFFER,
                renderbuffer,
            )
        }
    }

    fn check_framebuffer_status(&self) -> u32 {
        unsafe { Gl::check_framebuffer_status(self, glow::FRAMEBUFFER) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { Gl::viewport(self, x, y, width, height) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { Gl::clear_color(self, r, g, b, a) }
    }

    fn clear_depth(&self, depth: f32) {
        unsafe { Gl::clear_depth_f32(self, depth) }
    }

    fn clear(&self, mask: u32) {
        unsafe { Gl::clear(self, mask) }
    }

    fn enable(&self, capability: u32) {
        unsafe { Gl::enable(self, capability) }
    }

    fn disable(&self, capability: u32) {
        unsafe { Gl::disable(self, capability) }
    }

    fn depth_func(&self, func: u32) {
        unsafe { Gl::depth_func(self, func) }
    }

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { Gl::draw_arrays(self, mode, first, count) }
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32) {
        unsafe { Gl::draw_elements(self, mode, count, element_type, offset) }
    }
}
