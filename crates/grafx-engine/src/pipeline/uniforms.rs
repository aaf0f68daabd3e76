//! Uniform reflection and type-directed setters.
//!
//! A `UniformBinder` is built once per linked program. Each active uniform is classified from
//! its GL type into a `UniformSetter`; samplers receive texture units from a counter private to
//! the binder, so two programs never share unit bookkeeping.

use std::collections::HashMap;
use std::fmt;

use crate::gl::GlApi;

use super::error::{PipelineError, Result};
use super::variables::UniformValue;

/// Component type of a scalar or vector uniform.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ScalarKind {
    Float,
    Int,
    Bool,
}

/// What a uniform looks like to the setter, independent of array length.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UniformKind {
    /// Scalar (`components == 1`) or vector of `components` elements.
    Vector { scalar: ScalarKind, components: u8 },
    /// Square float matrix.
    Matrix { dim: u8 },
    /// `target` is `TEXTURE_2D` or `TEXTURE_CUBE_MAP`.
    Sampler { target: u32 },
}

impl UniformKind {
    /// Maps a GL uniform type enum, `None` for types the binder does not support.
    pub fn classify(gl_type: u32) -> Option<Self> {
        use ScalarKind::*;
        let vector = |scalar, components| Some(UniformKind::Vector { scalar, components });
        match gl_type {
            glow::FLOAT => vector(Float, 1),
            glow::FLOAT_VEC2 => vector(Float, 2),
            glow::FLOAT_VEC3 => vector(Float, 3),
            glow::FLOAT_VEC4 => vector(Float, 4),
            glow::INT => vector(Int, 1),
            glow::INT_VEC2 => vector(Int, 2),
            glow::INT_VEC3 => vector(Int, 3),
            glow::INT_VEC4 => vector(Int, 4),
            glow::BOOL => vector(Bool, 1),
            glow::BOOL_VEC2 => vector(Bool, 2),
            glow::BOOL_VEC3 => vector(Bool, 3),
            glow::BOOL_VEC4 => vector(Bool, 4),
            glow::FLOAT_MAT2 => Some(UniformKind::Matrix { dim: 2 }),
            glow::FLOAT_MAT3 => Some(UniformKind::Matrix { dim: 3 }),
            glow::FLOAT_MAT4 => Some(UniformKind::Matrix { dim: 4 }),
            glow::SAMPLER_2D => Some(UniformKind::Sampler { target: glow::TEXTURE_2D }),
            glow::SAMPLER_CUBE => Some(UniformKind::Sampler { target: glow::TEXTURE_CUBE_MAP }),
            _ => None,
        }
    }

    /// Number of floats or ints one element occupies.
    fn element_width(self) -> usize {
        match self {
            UniformKind::Vector { components, .. } => components as usize,
            UniformKind::Matrix { dim } => (dim as usize) * (dim as usize),
            UniformKind::Sampler { .. } => 1,
        }
    }
}

/// One prepared setter: location, shape, array length and any texture units it owns.
pub struct UniformSetter<G: GlApi> {
    location: G::UniformLocation,
    kind: UniformKind,
    len: usize,
    units: Vec<u32>,
}

impl<G: GlApi> UniformSetter<G> {
    pub fn kind(&self) -> UniformKind {
        self.kind
    }

    /// Array length, 1 for non-array uniforms.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_array(&self) -> bool {
        self.len > 1
    }

    /// Texture units reserved for this sampler (one per array element); empty otherwise.
    pub fn texture_units(&self) -> &[u32] {
        &self.units
    }

    /// Pushes `value`. A value whose shape does not fit is rejected with a description and
    /// nothing is sent to the context.
    pub fn apply(&self, gl: &G, value: &UniformValue<G>) -> std::result::Result<(), String> {
        let loc = &self.location;
        let width = self.kind.element_width();
        let fits = |n: usize| n > 0 && n % width == 0 && n / width <= self.len;

        match (self.kind, value) {
            (UniformKind::Vector { scalar: ScalarKind::Float, components: 1 }, UniformValue::Float(v))
                if self.len == 1 =>
            {
                gl.uniform_1_f32(loc, *v)
            }
            (UniformKind::Vector { scalar: ScalarKind::Float, components }, UniformValue::Floats(v))
                if fits(v.len()) =>
            {
                gl.uniform_f32_slice(loc, components, v)
            }
            (UniformKind::Vector { scalar: ScalarKind::Int | ScalarKind::Bool, components: 1 }, UniformValue::Int(v))
                if self.len == 1 =>
            {
                gl.uniform_1_i32(loc, *v)
            }
            (UniformKind::Vector { scalar: ScalarKind::Int | ScalarKind::Bool, components: 1 }, UniformValue::Bool(v))
                if self.len == 1 =>
            {
                gl.uniform_1_i32(loc, i32::from(*v))
            }
            (UniformKind::Vector { scalar: ScalarKind::Int | ScalarKind::Bool, components }, UniformValue::Ints(v))
                if fits(v.len()) =>
            {
                gl.uniform_i32_slice(loc, components, v)
            }
            (UniformKind::Matrix { dim }, UniformValue::Floats(v)) if fits(v.len()) => {
                gl.uniform_matrix_f32_slice(loc, dim, v)
            }
            (UniformKind::Sampler { target }, UniformValue::Texture(texture)) if self.len == 1 => {
                let unit = self.units[0];
                gl.active_texture(unit);
                gl.bind_texture(target, Some(*texture));
                gl.uniform_1_i32(loc, unit as i32);
            }
            (UniformKind::Sampler { target }, UniformValue::Textures(textures))
                if fits(textures.len()) =>
            {
                for (texture, unit) in textures.iter().zip(&self.units) {
                    gl.active_texture(*unit);
                    gl.bind_texture(target, Some(*texture));
                }
                let units: Vec<i32> = self.units[..textures.len()].iter().map(|u| *u as i32).collect();
                gl.uniform_i32_slice(loc, 1, &units);
            }
            _ => {
                return Err(format!(
                    "expected {:?} x{}, got {}",
                    self.kind,
                    self.len,
                    value.describe()
                ));
            }
        }
        Ok(())
    }
}

impl<G: GlApi> fmt::Debug for UniformSetter<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformSetter")
            .field("location", &self.location)
            .field("kind", &self.kind)
            .field("len", &self.len)
            .field("units", &self.units)
            .finish()
    }
}

/// All uniform setters of one program, keyed by name without any `[0]` suffix.
pub struct UniformBinder<G: GlApi> {
    setters: HashMap<String, UniformSetter<G>>,
    next_texture_unit: u32,
}

impl<G: GlApi> UniformBinder<G> {
    /// Reflects `program` and prepares one setter per active uniform.
    ///
    /// Fails with `UnsupportedUniformType` on the first uniform whose GL type is not covered.
    pub fn build(gl: &G, program_id: &str, program: G::Program) -> Result<Self> {
        let mut binder = Self { setters: HashMap::new(), next_texture_unit: 0 };

        for active in gl.active_uniforms(program) {
            let Some(kind) = UniformKind::classify(active.gl_type) else {
                return Err(PipelineError::UnsupportedUniformType {
                    id: program_id.to_string(),
                    uniform: active.name,
                    gl_type: active.gl_type,
                });
            };

            let is_array = active.size > 1 && active.name.ends_with("[0]");
            let name = active.name.strip_suffix("[0]").unwrap_or(&active.name).to_string();
            let len = if is_array { active.size as usize } else { 1 };

            let Some(location) = gl.uniform_location(program, &active.name) else {
                log::debug!("program `{program_id}`: uniform `{name}` has no location; skipped");
                continue;
            };

            let units = match kind {
                UniformKind::Sampler { .. } => (0..len).map(|_| binder.allocate_unit()).collect(),
                _ => Vec::new(),
            };

            binder.setters.insert(name, UniformSetter { location, kind, len, units });
        }

        Ok(binder)
    }

    fn allocate_unit(&mut self) -> u32 {
        let unit = self.next_texture_unit;
        self.next_texture_unit += 1;
        unit
    }

    pub fn get(&self, name: &str) -> Option<&UniformSetter<G>> {
        self.setters.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.setters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.setters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setters.is_empty()
    }

    /// Texture units handed out so far.
    pub fn texture_units_used(&self) -> u32 {
        self.next_texture_unit
    }
}

impl<G: GlApi> fmt::Debug for UniformBinder<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformBinder")
            .field("setters", &self.setters)
            .field("next_texture_unit", &self.next_texture_unit)
            .finish()
    }
}
