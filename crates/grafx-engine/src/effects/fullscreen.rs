use crate::gl::{self, GlApi};
use crate::pipeline::{
    AttributeConfig, DrawMode, PassInputs, PassVariables, PipelineError, ProgramVariables, Result,
    UniformValue,
};

/// Vertex attribute every full-screen pass shader declares.
pub const POSITION_ATTRIBUTE: &str = "aVertexPosition";

pub const SQUARE_VERTEX_COUNT: i32 = 6;

/// Two triangles covering the unit square, counter-clockwise.
const SQUARE_POSITIONS: [f32; 12] = [
    0.0, 0.0, 1.0, 0.0, 0.0, 1.0, //
    0.0, 1.0, 1.0, 0.0, 1.0, 1.0,
];

/// Uploads the unit-square quad and describes it as a `vec2` attribute.
///
/// Positions span `0..1`; the vertex shader maps them to clip space and reuses them as
/// texture coordinates.
pub fn create_2d_square_positions<G: GlApi>(gl: &G) -> Result<AttributeConfig<G>> {
    let buffer = gl::create_f32_buffer(gl, &SQUARE_POSITIONS)
        .map_err(|reason| PipelineError::Gl { reason })?;
    Ok(AttributeConfig::floats(buffer, 2))
}

/// Variable provider for a pass that draws one full-screen quad.
///
/// Input textures are bound to the sampler uniforms in order. The quad buffer is created on
/// the first call; later calls only update samplers and the optional size uniform.
pub struct FullscreenPass<G: GlApi> {
    program_id: String,
    samplers: Vec<String>,
    size_uniform: Option<String>,
    uniforms: Vec<(String, UniformValue<G>)>,
    variables: Option<ProgramVariables<G>>,
}

impl<G: GlApi> FullscreenPass<G> {
    pub fn new(program_id: impl Into<String>, samplers: &[&str]) -> Self {
        Self {
            program_id: program_id.into(),
            samplers: samplers.iter().map(|s| s.to_string()).collect(),
            size_uniform: None,
            uniforms: Vec::new(),
            variables: None,
        }
    }

    /// Pushes the viewport size as a `vec2` uniform named `name` on every pass.
    pub fn with_size_uniform(mut self, name: impl Into<String>) -> Self {
        self.size_uniform = Some(name.into());
        self
    }

    /// Constant uniform set once when the binding is built.
    pub fn with_uniform(mut self, name: impl Into<String>, value: impl Into<UniformValue<G>>) -> Self {
        self.uniforms.push((name.into(), value.into()));
        self
    }

    fn build(&self, gl: &G) -> Result<ProgramVariables<G>> {
        let quad = create_2d_square_positions(gl)?;
        let mut variables = ProgramVariables::new(DrawMode::Triangles, SQUARE_VERTEX_COUNT)
            .attribute(POSITION_ATTRIBUTE, quad);
        for (name, value) in &self.uniforms {
            variables.set_uniform(name.clone(), value.clone());
        }
        Ok(variables)
    }
}

impl<G: GlApi> PassVariables<G> for FullscreenPass<G> {
    fn variables(&mut self, gl: &G, inputs: &PassInputs<'_, G>) -> Result<&ProgramVariables<G>> {
        if inputs.textures.len() < self.samplers.len() {
            return Err(PipelineError::InvalidDescriptor {
                id: self.program_id.clone(),
                reason: format!(
                    "pass expects {} input textures, got {}",
                    self.samplers.len(),
                    inputs.textures.len()
                ),
            });
        }

        let variables = match self.variables.take() {
            Some(variables) => variables,
            None => self.build(gl)?,
        };
        let variables = self.variables.insert(variables);

        for (name, texture) in self.samplers.iter().zip(inputs.textures) {
            variables.set_uniform(name.clone(), UniformValue::Texture(*texture));
        }
        if let Some(name) = &self.size_uniform {
            let (width, height) = inputs.viewport;
            variables.set_uniform(name.clone(), [width as f32, height as f32]);
        }
        Ok(variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::testing::{GlCall, RecordingGl};

    type Gl = RecordingGl;

    fn inputs(textures: &[u32]) -> PassInputs<'_, Gl> {
        PassInputs { textures, viewport: (640, 480) }
    }

    #[test]
    fn square_is_two_triangles_of_vec2() {
        let gl = Gl::new();
        let config = create_2d_square_positions(&gl).unwrap();

        assert_eq!(config.size, 2);
        assert_eq!(config.data_type, glow::FLOAT);
        assert_eq!(SQUARE_POSITIONS.len() as i32, SQUARE_VERTEX_COUNT * config.size);
        assert!(gl.calls().iter().any(|c| matches!(c, GlCall::CreateBuffer(_))));
    }

    #[test]
    fn quad_is_created_once() {
        let gl = Gl::new();
        let mut pass = FullscreenPass::<Gl>::new("p", &["uSampler"]);

        pass.variables(&gl, &inputs(&[1])).unwrap();
        pass.variables(&gl, &inputs(&[2])).unwrap();

        let buffers = gl.calls().iter().filter(|c| matches!(c, GlCall::CreateBuffer(_))).count();
        assert_eq!(buffers, 1);
    }

    #[test]
    fn samplers_follow_input_order() {
        let gl = Gl::new();
        let mut pass = FullscreenPass::<Gl>::new("blend", &["uModels", "uBloom"]);

        let vars = pass.variables(&gl, &inputs(&[7, 9])).unwrap();

        assert_eq!(vars.uniform_value("uModels"), Some(&UniformValue::Texture(7)));
        assert_eq!(vars.uniform_value("uBloom"), Some(&UniformValue::Texture(9)));
        assert_eq!(vars.element_count, SQUARE_VERTEX_COUNT);
        assert_eq!(vars.attributes[0].0, POSITION_ATTRIBUTE);
    }

    #[test]
    fn size_and_constant_uniforms() {
        let gl = Gl::new();
        let mut pass = FullscreenPass::<Gl>::new("blur", &["uSampler"])
            .with_size_uniform("uSamplerSize")
            .with_uniform("uStrength", 0.5_f32);

        let vars = pass.variables(&gl, &inputs(&[3])).unwrap();

        assert_eq!(
            vars.uniform_value("uSamplerSize"),
            Some(&UniformValue::Floats(vec![640.0, 480.0]))
        );
        assert_eq!(vars.uniform_value("uStrength"), Some(&UniformValue::Float(0.5)));
    }

    #[test]
    fn missing_inputs_are_rejected() {
        let gl = Gl::new();
        let mut pass = FullscreenPass::<Gl>::new("blend", &["a", "b"]);

        let err = pass.variables(&gl, &inputs(&[1])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDescriptor { ref id, .. } if id == "blend"));
    }
}
