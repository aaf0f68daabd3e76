use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;

/// Programmable stage a shader object is compiled for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn gl_enum(self) -> u32 {
        match self {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Reflection record for one active uniform or vertex attribute of a linked program.
///
/// `gl_type` is the raw GL type enum (`FLOAT_VEC3`, `SAMPLER_2D`, ...). Array uniforms are
/// reported the way GL reports them: `name` carries a `[0]` suffix and `size` is the length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariable {
    pub name: String,
    pub size: i32,
    pub gl_type: u32,
}

/// The subset of an OpenGL ES 2 / WebGL context the pipeline layer drives.
///
/// Every method maps onto one or a small fixed sequence of GL calls. Object creation returns
/// `Err(message)` when the context refuses to create the object; shader compilation and
/// program linking return the driver's info log as the error.
///
/// Implementations are expected to be used from the thread that owns the context.
pub trait GlApi: 'static {
    type Shader: Copy + Eq + Hash + Debug;
    type Program: Copy + Eq + Hash + Debug;
    type Buffer: Copy + Eq + Hash + Debug;
    type Texture: Copy + Eq + Hash + Debug;
    type Framebuffer: Copy + Eq + Hash + Debug;
    type Renderbuffer: Copy + Eq + Hash + Debug;
    type UniformLocation: Clone + Debug;

    // ── shaders and programs ──────────────────────────────────────────────

    /// Creates and compiles a shader object; on failure the object is deleted and the info
    /// log is returned.
    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;
    fn delete_shader(&self, shader: Self::Shader);
    /// Links a program from two compiled stages; on failure the program object is deleted and
    /// the info log is returned.
    fn link_program(
        &self,
        vertex: Self::Shader,
        fragment: Self::Shader,
    ) -> Result<Self::Program, String>;
    fn delete_program(&self, program: Self::Program);
    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveVariable>;
    fn active_attributes(&self, program: Self::Program) -> Vec<ActiveVariable>;
    fn uniform_location(&self, program: Self::Program, name: &str)
    -> Option<Self::UniformLocation>;
    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn use_program(&self, program: Option<Self::Program>);

    // ── vertex input ──────────────────────────────────────────────────────

    /// Creates a buffer, binds it to `target` and uploads `data` with `usage`.
    fn create_buffer(&self, target: u32, data: &[u8], usage: u32) -> Result<Self::Buffer, String>;
    fn delete_buffer(&self, buffer: Self::Buffer);
    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>);
    fn enable_vertex_attrib_array(&self, location: u32);
    fn vertex_attrib_pointer(
        &self,
        location: u32,
        size: i32,
        data_type: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );

    // ── uniforms ──────────────────────────────────────────────────────────

    fn uniform_1_f32(&self, location: &Self::UniformLocation, value: f32);
    fn uniform_1_i32(&self, location: &Self::UniformLocation, value: i32);
    /// `components` is 1..=4 (`uniform{N}fv`).
    fn uniform_f32_slice(&self, location: &Self::UniformLocation, components: u8, values: &[f32]);
    /// `components` is 1..=4 (`uniform{N}iv`).
    fn uniform_i32_slice(&self, location: &Self::UniformLocation, components: u8, values: &[i32]);
    /// `dim` is 2..=4 (`uniformMatrix{N}fv`, never transposed).
    fn uniform_matrix_f32_slice(&self, location: &Self::UniformLocation, dim: u8, values: &[f32]);

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&self) -> Result<Self::Texture, String>;
    fn delete_texture(&self, texture: Self::Texture);
    /// Selects texture unit `unit` (`TEXTURE0 + unit`).
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>);
    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32);
    /// (Re)specifies RGBA / unsigned-byte storage with no pixel data for the texture bound to
    /// `TEXTURE_2D`.
    fn tex_storage_rgba(&self, width: i32, height: i32);

    // ── renderbuffers and framebuffers ────────────────────────────────────

    fn create_renderbuffer(&self) -> Result<Self::Renderbuffer, String>;
    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer);
    fn bind_renderbuffer(&self, renderbuffer: Option<Self::Renderbuffer>);
    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32);
    fn create_framebuffer(&self) -> Result<Self::Framebuffer, String>;
    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);
    /// Binds `framebuffer`, or the default (visible) framebuffer for `None`.
    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>);
    fn framebuffer_texture_2d(&self, attachment: u32, texture: Option<Self::Texture>);
    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: Option<Self::Renderbuffer>);
    fn check_framebuffer_status(&self) -> u32;

    // ── fixed-function state and drawing ──────────────────────────────────

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear_depth(&self, depth: f32);
    fn clear(&self, mask: u32);
    fn enable(&self, capability: u32);
    fn disable(&self, capability: u32);
    fn depth_func(&self, func: u32);
    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32);
}
