//! Shared fixtures for pipeline tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::gl::testing::{GlCall, RecordingGl};

use super::{
    DrawMode, PassInputs, PassVariables, PipelineRegistry, Program, ProgramDescriptor,
    ProgramFuture, ProgramVariables, RegistryConfig, Result, ShaderSource,
};

pub(crate) const VS: &str = "attribute vec2 aVertexPosition;\nvoid main() {}";
pub(crate) const FS: &str = "precision mediump float;\nuniform vec4 uColor;\nvoid main() {}";
pub(crate) const BROKEN_FS: &str = "#error does not compile\nvoid main() {}";

pub(crate) type Gl = RecordingGl;

pub(crate) fn registry() -> (Rc<Gl>, PipelineRegistry<Gl>) {
    let gl = Rc::new(RecordingGl::new());
    let config = RegistryConfig { dev_checks: false, initial_viewport: (800, 600) };
    (Rc::clone(&gl), PipelineRegistry::new(gl, config))
}

pub(crate) fn model(id: &str, priority: i32) -> ProgramDescriptor<Gl> {
    ProgramDescriptor::leaf(id, ShaderSource::inline(VS), ShaderSource::inline(FS)).priority(priority)
}

pub(crate) fn wait(future: ProgramFuture<Gl>) -> Result<Program<Gl>> {
    pollster::block_on(future)
}

pub(crate) fn link_count(gl: &Gl) -> usize {
    gl.calls().iter().filter(|c| matches!(c, GlCall::LinkProgram(_))).count()
}

/// (pass id, input textures) per `variables` call, in call order.
pub(crate) type PassLog = Rc<RefCell<Vec<(String, Vec<u32>)>>>;

/// Pass provider that records the inputs it is handed.
pub(crate) struct SpyPass {
    id: String,
    log: PassLog,
    variables: ProgramVariables<Gl>,
}

impl PassVariables<Gl> for SpyPass {
    fn variables(&mut self, _gl: &Gl, inputs: &PassInputs<'_, Gl>) -> Result<&ProgramVariables<Gl>> {
        self.log.borrow_mut().push((self.id.clone(), inputs.textures.to_vec()));
        Ok(&self.variables)
    }
}

pub(crate) fn spy_child(id: &str, log: &PassLog, fragment: &'static str) -> ProgramDescriptor<Gl> {
    ProgramDescriptor::leaf(id, ShaderSource::inline(VS), ShaderSource::inline(fragment)).pass_variables(
        SpyPass {
            id: id.to_string(),
            log: Rc::clone(log),
            variables: ProgramVariables::new(DrawMode::Triangles, 6),
        },
    )
}
