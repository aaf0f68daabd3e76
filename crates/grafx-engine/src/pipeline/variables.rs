//! Per-draw variable bindings: attribute configs, uniform values, primitive mode.

use std::fmt;

use crate::gl::GlApi;

/// Primitive assembly mode for a draw call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl DrawMode {
    pub fn gl_enum(self) -> u32 {
        match self {
            DrawMode::Points => glow::POINTS,
            DrawMode::Lines => glow::LINES,
            DrawMode::LineStrip => glow::LINE_STRIP,
            DrawMode::LineLoop => glow::LINE_LOOP,
            DrawMode::Triangles => glow::TRIANGLES,
            DrawMode::TriangleStrip => glow::TRIANGLE_STRIP,
            DrawMode::TriangleFan => glow::TRIANGLE_FAN,
        }
    }
}

/// How one vertex attribute pulls data out of a buffer.
pub struct AttributeConfig<G: GlApi> {
    pub buffer: G::Buffer,
    /// Components per vertex (1..=4).
    pub size: i32,
    pub data_type: u32,
    pub normalized: bool,
    pub stride: i32,
    pub offset: i32,
}

impl<G: GlApi> AttributeConfig<G> {
    /// Tightly packed `f32` components starting at the beginning of `buffer`.
    pub fn floats(buffer: G::Buffer, size: i32) -> Self {
        Self { buffer, size, data_type: glow::FLOAT, normalized: false, stride: 0, offset: 0 }
    }

    pub fn with_layout(mut self, stride: i32, offset: i32) -> Self {
        self.stride = stride;
        self.offset = offset;
        self
    }
}

impl<G: GlApi> Clone for AttributeConfig<G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G: GlApi> Copy for AttributeConfig<G> {}

impl<G: GlApi> fmt::Debug for AttributeConfig<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeConfig")
            .field("buffer", &self.buffer)
            .field("size", &self.size)
            .field("data_type", &self.data_type)
            .field("normalized", &self.normalized)
            .field("stride", &self.stride)
            .field("offset", &self.offset)
            .finish()
    }
}

/// A value pushed to one uniform.
///
/// Vectors, matrices (column-major) and float arrays travel as `Floats`; int and bool vectors
/// and arrays as `Ints`. The `From` conversions flatten Rust arrays without touching values.
pub enum UniformValue<G: GlApi> {
    Float(f32),
    Int(i32),
    Bool(bool),
    Floats(Vec<f32>),
    Ints(Vec<i32>),
    Texture(G::Texture),
    Textures(Vec<G::Texture>),
}

impl<G: GlApi> UniformValue<G> {
    /// Short shape name used in mismatch diagnostics.
    pub fn describe(&self) -> String {
        match self {
            UniformValue::Float(_) => "float".to_string(),
            UniformValue::Int(_) => "int".to_string(),
            UniformValue::Bool(_) => "bool".to_string(),
            UniformValue::Floats(v) => format!("{} floats", v.len()),
            UniformValue::Ints(v) => format!("{} ints", v.len()),
            UniformValue::Texture(_) => "texture".to_string(),
            UniformValue::Textures(v) => format!("{} textures", v.len()),
        }
    }
}

impl<G: GlApi> Clone for UniformValue<G> {
    fn clone(&self) -> Self {
        match self {
            UniformValue::Float(v) => UniformValue::Float(*v),
            UniformValue::Int(v) => UniformValue::Int(*v),
            UniformValue::Bool(v) => UniformValue::Bool(*v),
            UniformValue::Floats(v) => UniformValue::Floats(v.clone()),
            UniformValue::Ints(v) => UniformValue::Ints(v.clone()),
            UniformValue::Texture(t) => UniformValue::Texture(*t),
            UniformValue::Textures(t) => UniformValue::Textures(t.clone()),
        }
    }
}

impl<G: GlApi> PartialEq for UniformValue<G> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (UniformValue::Float(a), UniformValue::Float(b)) => a == b,
            (UniformValue::Int(a), UniformValue::Int(b)) => a == b,
            (UniformValue::Bool(a), UniformValue::Bool(b)) => a == b,
            (UniformValue::Floats(a), UniformValue::Floats(b)) => a == b,
            (UniformValue::Ints(a), UniformValue::Ints(b)) => a == b,
            (UniformValue::Texture(a), UniformValue::Texture(b)) => a == b,
            (UniformValue::Textures(a), UniformValue::Textures(b)) => a == b,
            _ => false,
        }
    }
}

impl<G: GlApi> fmt::Debug for UniformValue<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            UniformValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            UniformValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            UniformValue::Floats(v) => f.debug_tuple("Floats").field(v).finish(),
            UniformValue::Ints(v) => f.debug_tuple("Ints").field(v).finish(),
            UniformValue::Texture(t) => f.debug_tuple("Texture").field(t).finish(),
            UniformValue::Textures(t) => f.debug_tuple("Textures").field(t).finish(),
        }
    }
}

impl<G: GlApi> From<f32> for UniformValue<G> {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl<G: GlApi> From<i32> for UniformValue<G> {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl<G: GlApi> From<bool> for UniformValue<G> {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl<G: GlApi, const N: usize> From<[f32; N]> for UniformValue<G> {
    fn from(v: [f32; N]) -> Self {
        UniformValue::Floats(v.to_vec())
    }
}

impl<G: GlApi, const N: usize> From<[i32; N]> for UniformValue<G> {
    fn from(v: [i32; N]) -> Self {
        UniformValue::Ints(v.to_vec())
    }
}

impl<G: GlApi, const N: usize> From<[bool; N]> for UniformValue<G> {
    fn from(v: [bool; N]) -> Self {
        UniformValue::Ints(v.iter().map(|b| i32::from(*b)).collect())
    }
}

/// Column-major matrix, `N` columns of `M` rows.
impl<G: GlApi, const N: usize, const M: usize> From<[[f32; M]; N]> for UniformValue<G> {
    fn from(m: [[f32; M]; N]) -> Self {
        UniformValue::Floats(bytemuck::cast_slice::<[f32; M], f32>(&m).to_vec())
    }
}

impl<G: GlApi> From<&[f32]> for UniformValue<G> {
    fn from(v: &[f32]) -> Self {
        UniformValue::Floats(v.to_vec())
    }
}

impl<G: GlApi> From<Vec<f32>> for UniformValue<G> {
    fn from(v: Vec<f32>) -> Self {
        UniformValue::Floats(v)
    }
}

impl<G: GlApi> From<&[i32]> for UniformValue<G> {
    fn from(v: &[i32]) -> Self {
        UniformValue::Ints(v.to_vec())
    }
}

impl<G: GlApi> From<Vec<i32>> for UniformValue<G> {
    fn from(v: Vec<i32>) -> Self {
        UniformValue::Ints(v)
    }
}

/// Everything one draw call needs besides the program itself.
///
/// Names are matched against the program's reflected attributes and uniforms; entries the
/// program does not declare are skipped.
pub struct ProgramVariables<G: GlApi> {
    pub attributes: Vec<(String, AttributeConfig<G>)>,
    pub uniforms: Vec<(String, UniformValue<G>)>,
    pub mode: DrawMode,
    /// Optional element buffer of unsigned 16-bit indices.
    pub vertex_indices: Option<G::Buffer>,
    pub element_count: i32,
}

impl<G: GlApi> ProgramVariables<G> {
    pub fn new(mode: DrawMode, element_count: i32) -> Self {
        Self {
            attributes: Vec::new(),
            uniforms: Vec::new(),
            mode,
            vertex_indices: None,
            element_count,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, config: AttributeConfig<G>) -> Self {
        self.attributes.push((name.into(), config));
        self
    }

    pub fn uniform(mut self, name: impl Into<String>, value: impl Into<UniformValue<G>>) -> Self {
        self.set_uniform(name, value);
        self
    }

    pub fn indices(mut self, buffer: G::Buffer) -> Self {
        self.vertex_indices = Some(buffer);
        self
    }

    /// Replaces the value of `name`, appending it if absent.
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue<G>>) {
        let name = name.into();
        let value = value.into();
        match self.uniforms.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.uniforms.push((name, value)),
        }
    }

    pub fn uniform_value(&self, name: &str) -> Option<&UniformValue<G>> {
        self.uniforms.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl<G: GlApi> Clone for ProgramVariables<G> {
    fn clone(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            uniforms: self.uniforms.clone(),
            mode: self.mode,
            vertex_indices: self.vertex_indices,
            element_count: self.element_count,
        }
    }
}

impl<G: GlApi> fmt::Debug for ProgramVariables<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramVariables")
            .field("attributes", &self.attributes)
            .field("uniforms", &self.uniforms)
            .field("mode", &self.mode)
            .field("vertex_indices", &self.vertex_indices)
            .field("element_count", &self.element_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::testing::RecordingGl;

    type Value = UniformValue<RecordingGl>;

    #[test]
    fn matrix_flattens_column_major_without_rounding() {
        let m: [[f32; 2]; 2] = [[1.0, 2.0], [3.0, 4.5]];
        assert_eq!(Value::from(m), Value::Floats(vec![1.0, 2.0, 3.0, 4.5]));
    }

    #[test]
    fn bool_vector_becomes_ints() {
        assert_eq!(Value::from([true, false, true]), Value::Ints(vec![1, 0, 1]));
    }

    #[test]
    fn scalars_keep_their_kind() {
        assert_eq!(Value::from(0.1_f32), Value::Float(0.1));
        assert_eq!(Value::from(-3_i32), Value::Int(-3));
        assert_eq!(Value::from(true), Value::Bool(true));
    }

    #[test]
    fn set_uniform_replaces_in_place() {
        let mut vars = ProgramVariables::<RecordingGl>::new(DrawMode::Triangles, 3)
            .uniform("uA", 1.0_f32)
            .uniform("uB", 2_i32);
        vars.set_uniform("uA", 5.0_f32);
        assert_eq!(vars.uniforms.len(), 2);
        assert_eq!(vars.uniforms[0].0, "uA");
        assert_eq!(vars.uniform_value("uA"), Some(&Value::Float(5.0)));
    }

    #[test]
    fn draw_mode_maps_to_gl() {
        assert_eq!(DrawMode::default().gl_enum(), glow::TRIANGLES);
        assert_eq!(DrawMode::LineStrip.gl_enum(), glow::LINE_STRIP);
    }
}
