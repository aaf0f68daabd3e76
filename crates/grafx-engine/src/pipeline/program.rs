//! Leaf render programs: one vertex + fragment shader pair.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::gl::{GlApi, ShaderStage};

use super::descriptor::{ActivateHook, PassInputs, PassVariables, ShaderSource, StateHook};
use super::error::{PipelineError, Result};
use super::loader::ShaderLoader;
use super::uniforms::UniformBinder;
use super::variables::ProgramVariables;

/// Lifecycle of a program object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProgramStatus {
    Unbuilt,
    Compiling,
    Ready,
    Failed,
    /// Deregistered; the GPU object is gone.
    Released,
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgramStatus::Unbuilt => "unbuilt",
            ProgramStatus::Compiling => "compiling",
            ProgramStatus::Ready => "ready",
            ProgramStatus::Failed => "failed",
            ProgramStatus::Released => "released",
        };
        f.write_str(s)
    }
}

/// Optional callbacks attached to a program at registration.
pub(crate) struct ProgramHooks<G: GlApi> {
    pub on_activate: Option<ActivateHook<G>>,
    pub on_state_bind: Option<StateHook<G>>,
}

struct Linked<G: GlApi> {
    program: G::Program,
    uniforms: UniformBinder<G>,
    attributes: HashMap<String, u32>,
}

enum State<G: GlApi> {
    Unbuilt,
    Compiling,
    Ready(Linked<G>),
    Failed(PipelineError),
    Released,
}

impl<G: GlApi> State<G> {
    fn status(&self) -> ProgramStatus {
        match self {
            State::Unbuilt => ProgramStatus::Unbuilt,
            State::Compiling => ProgramStatus::Compiling,
            State::Ready(_) => ProgramStatus::Ready,
            State::Failed(_) => ProgramStatus::Failed,
            State::Released => ProgramStatus::Released,
        }
    }
}

/// A compiled and linked shader program with its reflected attribute and uniform tables.
///
/// Created by the registry; callers receive it through `Program::Render` or inside draw
/// callbacks.
pub struct RenderProgram<G: GlApi> {
    id: String,
    gl: Rc<G>,
    dev_checks: bool,
    state: RefCell<State<G>>,
    on_activate: RefCell<Option<ActivateHook<G>>>,
    on_state_bind: Option<StateHook<G>>,
    pass_variables: RefCell<Option<Box<dyn PassVariables<G>>>>,
    last_mismatch: RefCell<Option<String>>,
}

impl<G: GlApi> RenderProgram<G> {
    pub(crate) fn new(
        id: String,
        gl: Rc<G>,
        dev_checks: bool,
        hooks: ProgramHooks<G>,
        pass_variables: Option<Box<dyn PassVariables<G>>>,
    ) -> Self {
        Self {
            id,
            gl,
            dev_checks,
            state: RefCell::new(State::Unbuilt),
            on_activate: RefCell::new(hooks.on_activate),
            on_state_bind: hooks.on_state_bind,
            pass_variables: RefCell::new(pass_variables),
            last_mismatch: RefCell::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> ProgramStatus {
        self.state.borrow().status()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ProgramStatus::Ready
    }

    /// The error that made this program fail, if it did.
    pub fn failure(&self) -> Option<PipelineError> {
        match &*self.state.borrow() {
            State::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    pub fn gl_program(&self) -> Option<G::Program> {
        match &*self.state.borrow() {
            State::Ready(linked) => Some(linked.program),
            _ => None,
        }
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        match &*self.state.borrow() {
            State::Ready(linked) => linked.uniforms.get(name).is_some(),
            _ => false,
        }
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        match &*self.state.borrow() {
            State::Ready(linked) => linked.attributes.get(name).copied(),
            _ => None,
        }
    }

    fn not_ready(&self, state: &State<G>) -> PipelineError {
        PipelineError::ProgramNotReady { id: self.id.clone(), state: state.status() }
    }

    // ── loading ───────────────────────────────────────────────────────────

    /// Resolves both sources, compiles, links and reflects. Runs `on_activate` once ready.
    pub(crate) async fn load(
        self: Rc<Self>,
        loader: Rc<dyn ShaderLoader>,
        vertex: ShaderSource,
        fragment: ShaderSource,
    ) -> Result<()> {
        if self.status() == ProgramStatus::Released {
            return Err(self.not_ready(&State::Released));
        }
        *self.state.borrow_mut() = State::Compiling;

        let built = match self.resolve(&*loader, vertex).await {
            Ok(vs) => match self.resolve(&*loader, fragment).await {
                Ok(fs) => self.link(&vs, &fs),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };

        let linked = match built {
            Ok(linked) => linked,
            Err(err) => {
                if self.status() != ProgramStatus::Released {
                    *self.state.borrow_mut() = State::Failed(err.clone());
                }
                return Err(err);
            }
        };

        if self.status() == ProgramStatus::Released {
            self.gl.delete_program(linked.program);
            return Err(self.not_ready(&State::Released));
        }
        *self.state.borrow_mut() = State::Ready(linked);

        let init = self.on_activate.borrow_mut().take();
        if let Some(init) = init {
            init(self.gl.as_ref());
        }
        Ok(())
    }

    async fn resolve(&self, loader: &dyn ShaderLoader, source: ShaderSource) -> Result<String> {
        match source {
            ShaderSource::Inline(text) => Ok(text.into_owned()),
            ShaderSource::Path(path) => loader.load(&path).await.map_err(|e| {
                PipelineError::ShaderLoad { id: self.id.clone(), path, reason: format!("{e:#}") }
            }),
        }
    }

    fn link(&self, vertex_src: &str, fragment_src: &str) -> Result<Linked<G>> {
        let gl = &*self.gl;
        let compile_error = |stage, log| PipelineError::ShaderCompile { id: self.id.clone(), stage, log };

        let vertex = gl
            .compile_shader(ShaderStage::Vertex, vertex_src)
            .map_err(|log| compile_error(ShaderStage::Vertex, log))?;
        let fragment = match gl.compile_shader(ShaderStage::Fragment, fragment_src) {
            Ok(shader) => shader,
            Err(log) => {
                gl.delete_shader(vertex);
                return Err(compile_error(ShaderStage::Fragment, log));
            }
        };

        let linked = gl.link_program(vertex, fragment);
        gl.delete_shader(vertex);
        gl.delete_shader(fragment);
        let program =
            linked.map_err(|log| PipelineError::ProgramLink { id: self.id.clone(), log })?;

        let uniforms = match UniformBinder::build(gl, &self.id, program) {
            Ok(binder) => binder,
            Err(err) => {
                gl.delete_program(program);
                return Err(err);
            }
        };

        let attributes = gl
            .active_attributes(program)
            .into_iter()
            .filter_map(|a| gl.attrib_location(program, &a.name).map(|loc| (a.name, loc)))
            .collect();

        Ok(Linked { program, uniforms, attributes })
    }

    /// Deletes the GPU program; every later bind or draw fails with `ProgramNotReady`.
    pub(crate) fn release(&self) {
        let previous = self.state.replace(State::Released);
        if let State::Ready(linked) = previous {
            self.gl.delete_program(linked.program);
        }
    }

    // ── binding and drawing ───────────────────────────────────────────────

    /// Makes this the current program, enables its attribute arrays and applies its state hook.
    pub fn set_active(&self) -> Result<()> {
        let state = self.state.borrow();
        let State::Ready(linked) = &*state else {
            return Err(self.not_ready(&state));
        };

        let gl: &G = &self.gl;
        gl.use_program(Some(linked.program));
        for location in linked.attributes.values() {
            gl.enable_vertex_attrib_array(*location);
        }
        if let Some(bind) = &self.on_state_bind {
            bind(gl);
        }
        Ok(())
    }

    /// Draws all `element_count` elements of `variables`.
    pub fn draw(&self, variables: &ProgramVariables<G>) -> Result<()> {
        self.draw_range(variables, 0, variables.element_count)
    }

    /// Draws `count` elements starting at element `first`.
    ///
    /// Attributes and uniforms the program does not declare are skipped.
    pub fn draw_range(&self, variables: &ProgramVariables<G>, first: i32, count: i32) -> Result<()> {
        let state = self.state.borrow();
        let State::Ready(linked) = &*state else {
            return Err(self.not_ready(&state));
        };
        let gl: &G = &self.gl;

        for (name, config) in &variables.attributes {
            let Some(location) = linked.attributes.get(name) else {
                continue;
            };
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(config.buffer));
            gl.vertex_attrib_pointer(
                *location,
                config.size,
                config.data_type,
                config.normalized,
                config.stride,
                config.offset,
            );
        }

        for (name, value) in &variables.uniforms {
            let Some(setter) = linked.uniforms.get(name) else {
                continue;
            };
            if let Err(reason) = setter.apply(gl, value) {
                log::warn!("program `{}`: uniform `{name}` skipped: {reason}", self.id);
            }
        }

        if self.dev_checks {
            self.check_coverage(linked, variables);
        }

        let mode = variables.mode.gl_enum();
        match variables.vertex_indices {
            Some(indices) => {
                gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(indices));
                // 16-bit indices: byte offset is twice the element offset.
                gl.draw_elements(mode, count, glow::UNSIGNED_SHORT, first * 2);
            }
            None => gl.draw_arrays(mode, first, count),
        }
        Ok(())
    }

    /// Warns when supplied and declared variables diverge, once per distinct mismatch.
    /// Returns whether a warning was logged.
    fn check_coverage(&self, linked: &Linked<G>, variables: &ProgramVariables<G>) -> bool {
        let mut problems = Vec::new();
        for (name, _) in &variables.attributes {
            if !linked.attributes.contains_key(name) {
                problems.push(format!("unknown attribute `{name}`"));
            }
        }
        for name in linked.attributes.keys() {
            if !variables.attributes.iter().any(|(n, _)| n == name) {
                problems.push(format!("attribute `{name}` not supplied"));
            }
        }
        for (name, _) in &variables.uniforms {
            if linked.uniforms.get(name).is_none() {
                problems.push(format!("unknown uniform `{name}`"));
            }
        }
        for name in linked.uniforms.names() {
            if variables.uniform_value(name).is_none() {
                problems.push(format!("uniform `{name}` not supplied"));
            }
        }

        let mut last = self.last_mismatch.borrow_mut();
        if problems.is_empty() {
            *last = None;
            return false;
        }
        problems.sort();
        let report = problems.join(", ");
        if last.as_deref() == Some(report.as_str()) {
            return false;
        }
        log::warn!("program `{}`: variable mismatch: {report}", self.id);
        *last = Some(report);
        true
    }

    /// Asks the pass provider for this frame's variables, then activates and draws.
    pub fn run_pass(&self, inputs: &PassInputs<'_, G>) -> Result<()> {
        let mut provider = self.pass_variables.borrow_mut();
        let Some(provider) = provider.as_mut() else {
            return Err(PipelineError::InvalidDescriptor {
                id: self.id.clone(),
                reason: "no pass variable provider".to_string(),
            });
        };
        let variables = provider.variables(self.gl.as_ref(), inputs)?;
        self.set_active()?;
        self.draw(variables)
    }
}

impl<G: GlApi> fmt::Debug for RenderProgram<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderProgram")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
