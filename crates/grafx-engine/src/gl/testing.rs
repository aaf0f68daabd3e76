//! Recording `GlApi` used by unit tests.
//!
//! Handles are plain integers. Reflection is derived from the GLSL text: `uniform` and
//! `attribute` declarations are parsed line by line. A source containing `#error` fails to
//! compile; a source containing `#pragma fail_link` compiles but fails to link.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use super::{ActiveVariable, GlApi, ShaderStage};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GlCall {
    CompileShader(ShaderStage),
    LinkProgram(u32),
    DeleteProgram(u32),
    UseProgram(Option<u32>),
    CreateBuffer(u32),
    BindBuffer { target: u32, buffer: Option<u32> },
    EnableAttrib(u32),
    AttribPointer { location: u32, size: i32 },
    Uniform1f { name: String, value: f32 },
    Uniform1i { name: String, value: i32 },
    UniformF32 { name: String, components: u8, values: Vec<f32> },
    UniformI32 { name: String, components: u8, values: Vec<i32> },
    UniformMatrix { name: String, dim: u8, values: Vec<f32> },
    ActiveTexture(u32),
    BindTexture { target: u32, texture: Option<u32> },
    DeleteTexture(u32),
    TexStorage { texture: Option<u32>, width: i32, height: i32 },
    RenderbufferStorage { renderbuffer: Option<u32>, width: i32, height: i32 },
    DeleteRenderbuffer(u32),
    BindFramebuffer(Option<u32>),
    DeleteFramebuffer(u32),
    Viewport(i32, i32, i32, i32),
    Clear(u32),
    Enable(u32),
    Disable(u32),
    DrawArrays { mode: u32, first: i32, count: i32 },
    DrawElements { mode: u32, count: i32, offset: i32 },
}

#[derive(Debug, Default)]
struct ShaderRecord {
    uniforms: Vec<ActiveVariable>,
    attributes: Vec<ActiveVariable>,
    fail_link: bool,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    uniforms: Vec<ActiveVariable>,
    attributes: Vec<ActiveVariable>,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingGl {
    next_handle: Cell<u32>,
    compiles: Cell<usize>,
    calls: RefCell<Vec<GlCall>>,
    shaders: RefCell<HashMap<u32, ShaderRecord>>,
    programs: RefCell<HashMap<u32, ProgramRecord>>,
    bound_texture: Cell<Option<u32>>,
    bound_renderbuffer: Cell<Option<u32>>,
    texture_sizes: RefCell<HashMap<u32, (i32, i32)>>,
    renderbuffer_sizes: RefCell<HashMap<u32, (i32, i32)>>,
}

impl RecordingGl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<GlCall> {
        self.calls.borrow().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Number of shader compilations requested so far.
    pub(crate) fn compile_count(&self) -> usize {
        self.compiles.get()
    }

    pub(crate) fn texture_size(&self, texture: u32) -> Option<(i32, i32)> {
        self.texture_sizes.borrow().get(&texture).copied()
    }

    pub(crate) fn renderbuffer_size(&self, renderbuffer: u32) -> Option<(i32, i32)> {
        self.renderbuffer_sizes.borrow().get(&renderbuffer).copied()
    }

    /// Programs that currently exist (linked and not deleted).
    pub(crate) fn live_programs(&self) -> usize {
        self.programs.borrow().len()
    }

    fn handle(&self) -> u32 {
        let next = self.next_handle.get() + 1;
        self.next_handle.set(next);
        next
    }

    fn record(&self, call: GlCall) {
        self.calls.borrow_mut().push(call);
    }
}

fn glsl_type(name: &str) -> u32 {
    match name {
        "float" => glow::FLOAT,
        "vec2" => glow::FLOAT_VEC2,
        "vec3" => glow::FLOAT_VEC3,
        "vec4" => glow::FLOAT_VEC4,
        "int" => glow::INT,
        "ivec2" => glow::INT_VEC2,
        "ivec3" => glow::INT_VEC3,
        "ivec4" => glow::INT_VEC4,
        "bool" => glow::BOOL,
        "bvec2" => glow::BOOL_VEC2,
        "bvec3" => glow::BOOL_VEC3,
        "bvec4" => glow::BOOL_VEC4,
        "mat2" => glow::FLOAT_MAT2,
        "mat3" => glow::FLOAT_MAT3,
        "mat4" => glow::FLOAT_MAT4,
        "sampler2D" => glow::SAMPLER_2D,
        "samplerCube" => glow::SAMPLER_CUBE,
        "sampler3D" => glow::SAMPLER_3D,
        _ => 0,
    }
}

fn parse_declaration(line: &str) -> Option<(&str, ActiveVariable)> {
    let line = line.trim().trim_end_matches(';');
    let mut tokens = line
        .split_whitespace()
        .filter(|t| !matches!(*t, "lowp" | "mediump" | "highp"));
    let qualifier = tokens.next()?;
    if qualifier != "uniform" && qualifier != "attribute" {
        return None;
    }
    let ty = tokens.next()?;
    let declared = tokens.next()?;
    let (name, size) = match declared.split_once('[') {
        Some((base, rest)) => {
            let len = rest.trim_end_matches(']').parse().ok()?;
            (format!("{base}[0]"), len)
        }
        None => (declared.to_string(), 1),
    };
    Some((qualifier, ActiveVariable { name, size, gl_type: glsl_type(ty) }))
}

fn base_name(name: &str) -> &str {
    name.strip_suffix("[0]").unwrap_or(name)
}

impl GlApi for RecordingGl {
    type Shader = u32;
    type Program = u32;
    type Buffer = u32;
    type Texture = u32;
    type Framebuffer = u32;
    type Renderbuffer = u32;
    type UniformLocation = String;

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<u32, String> {
        self.compiles.set(self.compiles.get() + 1);
        self.record(GlCall::CompileShader(stage));
        if source.contains("#error") {
            return Err(format!("ERROR: 0:1: '#error' : {stage} shader rejected"));
        }
        let mut record = ShaderRecord {
            fail_link: source.contains("#pragma fail_link"),
            ..ShaderRecord::default()
        };
        for (qualifier, variable) in source.lines().filter_map(parse_declaration) {
            match qualifier {
                "uniform" => record.uniforms.push(variable),
                _ => record.attributes.push(variable),
            }
        }
        let handle = self.handle();
        self.shaders.borrow_mut().insert(handle, record);
        Ok(handle)
    }

    fn delete_shader(&self, shader: u32) {
        self.shaders.borrow_mut().remove(&shader);
    }

    fn link_program(&self, vertex: u32, fragment: u32) -> Result<u32, String> {
        let shaders = self.shaders.borrow();
        let (Some(vs), Some(fs)) = (shaders.get(&vertex), shaders.get(&fragment)) else {
            return Err("ERROR: missing shader object".to_string());
        };
        if vs.fail_link || fs.fail_link {
            return Err("ERROR: varying mismatch between stages".to_string());
        }
        let mut uniforms = vs.uniforms.clone();
        for u in &fs.uniforms {
            if !uniforms.iter().any(|existing| existing.name == u.name) {
                uniforms.push(u.clone());
            }
        }
        let record = ProgramRecord { uniforms, attributes: vs.attributes.clone() };
        drop(shaders);

        let handle = self.handle();
        self.programs.borrow_mut().insert(handle, record);
        self.record(GlCall::LinkProgram(handle));
        Ok(handle)
    }

    fn delete_program(&self, program: u32) {
        self.programs.borrow_mut().remove(&program);
        self.record(GlCall::DeleteProgram(program));
    }

    fn active_uniforms(&self, program: u32) -> Vec<ActiveVariable> {
        self.programs.borrow().get(&program).map(|p| p.uniforms.clone()).unwrap_or_default()
    }

    fn active_attributes(&self, program: u32) -> Vec<ActiveVariable> {
        self.programs.borrow().get(&program).map(|p| p.attributes.clone()).unwrap_or_default()
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<String> {
        let programs = self.programs.borrow();
        let wanted = base_name(name);
        programs
            .get(&program)?
            .uniforms
            .iter()
            .any(|u| base_name(&u.name) == wanted)
            .then(|| wanted.to_string())
    }

    fn attrib_location(&self, program: u32, name: &str) -> Option<u32> {
        let programs = self.programs.borrow();
        let index = programs.get(&program)?.attributes.iter().position(|a| a.name == name)?;
        Some(index as u32)
    }

    fn use_program(&self, program: Option<u32>) {
        self.record(GlCall::UseProgram(program));
    }

    fn create_buffer(&self, target: u32, _data: &[u8], _usage: u32) -> Result<u32, String> {
        let handle = self.handle();
        self.record(GlCall::CreateBuffer(handle));
        self.record(GlCall::BindBuffer { target, buffer: Some(handle) });
        Ok(handle)
    }

    fn delete_buffer(&self, _buffer: u32) {}

    fn bind_buffer(&self, target: u32, buffer: Option<u32>) {
        self.record(GlCall::BindBuffer { target, buffer });
    }

    fn enable_vertex_attrib_array(&self, location: u32) {
        self.record(GlCall::EnableAttrib(location));
    }

    fn vertex_attrib_pointer(
        &self,
        location: u32,
        size: i32,
        _data_type: u32,
        _normalized: bool,
        _stride: i32,
        _offset: i32,
    ) {
        self.record(GlCall::AttribPointer { location, size });
    }

    fn uniform_1_f32(&self, location: &String, value: f32) {
        self.record(GlCall::Uniform1f { name: location.clone(), value });
    }

    fn uniform_1_i32(&self, location: &String, value: i32) {
        self.record(GlCall::Uniform1i { name: location.clone(), value });
    }

    fn uniform_f32_slice(&self, location: &String, components: u8, values: &[f32]) {
        self.record(GlCall::UniformF32 {
            name: location.clone(),
            components,
            values: values.to_vec(),
        });
    }

    fn uniform_i32_slice(&self, location: &String, components: u8, values: &[i32]) {
        self.record(GlCall::UniformI32 {
            name: location.clone(),
            components,
            values: values.to_vec(),
        });
    }

    fn uniform_matrix_f32_slice(&self, location: &String, dim: u8, values: &[f32]) {
        self.record(GlCall::UniformMatrix { name: location.clone(), dim, values: values.to_vec() });
    }

    fn create_texture(&self) -> Result<u32, String> {
        Ok(self.handle())
    }

    fn delete_texture(&self, texture: u32) {
        self.texture_sizes.borrow_mut().remove(&texture);
        self.record(GlCall::DeleteTexture(texture));
    }

    fn active_texture(&self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&self, target: u32, texture: Option<u32>) {
        self.bound_texture.set(texture);
        self.record(GlCall::BindTexture { target, texture });
    }

    fn tex_parameter_i32(&self, _target: u32, _parameter: u32, _value: i32) {}

    fn tex_storage_rgba(&self, width: i32, height: i32) {
        let texture = self.bound_texture.get();
        if let Some(t) = texture {
            self.texture_sizes.borrow_mut().insert(t, (width, height));
        }
        self.record(GlCall::TexStorage { texture, width, height });
    }

    fn create_renderbuffer(&self) -> Result<u32, String> {
        Ok(self.handle())
    }

    fn delete_renderbuffer(&self, renderbuffer: u32) {
        self.renderbuffer_sizes.borrow_mut().remove(&renderbuffer);
        self.record(GlCall::DeleteRenderbuffer(renderbuffer));
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<u32>) {
        self.bound_renderbuffer.set(renderbuffer);
    }

    fn renderbuffer_storage(&self, _internal_format: u32, width: i32, height: i32) {
        let renderbuffer = self.bound_renderbuffer.get();
        if let Some(rb) = renderbuffer {
            self.renderbuffer_sizes.borrow_mut().insert(rb, (width, height));
        }
        self.record(GlCall::RenderbufferStorage { renderbuffer, width, height });
    }

    fn create_framebuffer(&self) -> Result<u32, String> {
        Ok(self.handle())
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        self.record(GlCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&self, framebuffer: Option<u32>) {
        self.record(GlCall::BindFramebuffer(framebuffer));
    }

    fn framebuffer_texture_2d(&self, _attachment: u32, _texture: Option<u32>) {}

    fn framebuffer_renderbuffer(&self, _attachment: u32, _renderbuffer: Option<u32>) {}

    fn check_framebuffer_status(&self) -> u32 {
        glow::FRAMEBUFFER_COMPLETE
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport(x, y, width, height));
    }

    fn clear_color(&self, _r: f32, _g: f32, _b: f32, _a: f32) {}

    fn clear_depth(&self, _depth: f32) {}

    fn clear(&self, mask: u32) {
        self.record(GlCall::Clear(mask));
    }

    fn enable(&self, capability: u32) {
        self.record(GlCall::Enable(capability));
    }

    fn disable(&self, capability: u32) {
        self.record(GlCall::Disable(capability));
    }

    fn depth_func(&self, _func: u32) {}

    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        self.record(GlCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&self, mode: u32, count: i32, _element_type: u32, offset: i32) {
        self.record(GlCall::DrawElements { mode, count, offset });
    }
}
