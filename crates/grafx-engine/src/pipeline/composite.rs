//! Multi-pass post-processing programs.
//!
//! A composite owns no shaders of its own. It runs child leaf programs in plan order, each one
//! reading input target textures and writing an output target (or the screen).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures_util::future::try_join_all;

use crate::gl::GlApi;

use super::descriptor::{ActivateHook, ExecutionPlanStep, PassInputs, StateHook, TargetDecl};
use super::error::{PipelineError, Result};
use super::program::{ProgramHooks, ProgramStatus, RenderProgram};
use super::registry::{PipelineRegistry, Program, ProgramFuture, WeakRegistry};

pub struct CompositeProgram<G: GlApi> {
    id: String,
    gl: Rc<G>,
    plan: Vec<ExecutionPlanStep>,
    targets: Vec<TargetDecl>,
    child_ids: Vec<String>,
    children: RefCell<HashMap<String, Rc<RenderProgram<G>>>>,
    status: Cell<ProgramStatus>,
    failure: RefCell<Option<PipelineError>>,
    on_activate: RefCell<Option<ActivateHook<G>>>,
    on_state_bind: Option<StateHook<G>>,
}

impl<G: GlApi> CompositeProgram<G> {
    pub(crate) fn new(
        id: String,
        gl: Rc<G>,
        plan: Vec<ExecutionPlanStep>,
        targets: Vec<TargetDecl>,
        child_ids: Vec<String>,
        hooks: ProgramHooks<G>,
    ) -> Self {
        Self {
            id,
            gl,
            plan,
            targets,
            child_ids,
            children: RefCell::new(HashMap::new()),
            status: Cell::new(ProgramStatus::Unbuilt),
            failure: RefCell::new(None),
            on_activate: RefCell::new(hooks.on_activate),
            on_state_bind: hooks.on_state_bind,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> ProgramStatus {
        self.status.get()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ProgramStatus::Ready
    }

    pub fn failure(&self) -> Option<PipelineError> {
        self.failure.borrow().clone()
    }

    pub fn plan(&self) -> &[ExecutionPlanStep] {
        &self.plan
    }

    pub fn targets(&self) -> &[TargetDecl] {
        &self.targets
    }

    pub fn child_ids(&self) -> &[String] {
        &self.child_ids
    }

    pub fn child(&self, id: &str) -> Option<Rc<RenderProgram<G>>> {
        self.children.borrow().get(id).cloned()
    }

    // ── loading ───────────────────────────────────────────────────────────

    /// Waits for every child, then allocates the owned targets and runs `on_activate`.
    /// The first child failure fails the composite.
    pub(crate) async fn load(
        self: Rc<Self>,
        registry: WeakRegistry<G>,
        children: Vec<ProgramFuture<G>>,
    ) -> Result<()> {
        if self.status() == ProgramStatus::Released {
            return Err(self.not_ready());
        }
        self.status.set(ProgramStatus::Compiling);

        match self.assemble(registry, children).await {
            Ok(programs) => {
                if self.status() == ProgramStatus::Released {
                    return Err(self.not_ready());
                }
                *self.children.borrow_mut() = programs;
                self.status.set(ProgramStatus::Ready);

                let init = self.on_activate.borrow_mut().take();
                if let Some(init) = init {
                    init(self.gl.as_ref());
                }
                Ok(())
            }
            Err(err) => {
                if self.status() != ProgramStatus::Released {
                    self.status.set(ProgramStatus::Failed);
                    *self.failure.borrow_mut() = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    async fn assemble(
        &self,
        registry: WeakRegistry<G>,
        children: Vec<ProgramFuture<G>>,
    ) -> Result<HashMap<String, Rc<RenderProgram<G>>>> {
        let loaded = try_join_all(children).await?;

        let mut programs = HashMap::with_capacity(loaded.len());
        for program in loaded {
            match program {
                Program::Render(p) => {
                    programs.insert(p.id().to_string(), p);
                }
                Program::Composite(c) => {
                    return Err(PipelineError::InvalidDescriptor {
                        id: self.id.clone(),
                        reason: format!("child `{}` is a composite program", c.id()),
                    });
                }
            }
        }

        let registry = registry
            .upgrade()
            .ok_or_else(|| PipelineError::RegistryDropped { id: self.id.clone() })?;
        for target in &self.targets {
            registry.create_target(&target.id, false)?;
        }

        Ok(programs)
    }

    pub(crate) fn release(&self) {
        self.status.set(ProgramStatus::Released);
        self.children.borrow_mut().clear();
    }

    fn not_ready(&self) -> PipelineError {
        PipelineError::ProgramNotReady { id: self.id.clone(), state: self.status() }
    }

    // ── drawing ───────────────────────────────────────────────────────────

    /// Runs the plan once.
    ///
    /// Targets marked `clear_at_start` are cleared first. Each step then binds its output
    /// framebuffer (`None` = screen), resolves its input textures through `registry` and lets
    /// the child draw with the variables its pass provider returns.
    pub fn draw(&self, registry: &PipelineRegistry<G>) -> Result<()> {
        if !self.is_ready() {
            return Err(self.not_ready());
        }
        let gl: &G = &self.gl;
        let children = self.children.borrow();

        if let Some(bind) = &self.on_state_bind {
            bind(gl);
        }

        for target in self.targets.iter().filter(|t| t.clear_at_start) {
            let framebuffer = registry
                .framebuffer(&target.id)
                .ok_or_else(|| PipelineError::UnknownRenderTarget { id: target.id.clone() })?;
            gl.bind_framebuffer(Some(framebuffer));
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }

        let viewport = registry.viewport_size();
        let mut textures = Vec::new();
        for step in &self.plan {
            let output = match &step.output_target_id {
                Some(id) => Some(
                    registry
                        .framebuffer(id)
                        .ok_or_else(|| PipelineError::UnknownRenderTarget { id: id.clone() })?,
                ),
                None => None,
            };

            textures.clear();
            for id in &step.input_target_ids {
                let texture = registry
                    .texture(id)
                    .ok_or_else(|| PipelineError::UnknownRenderTarget { id: id.clone() })?;
                textures.push(texture);
            }

            let child = children
                .get(&step.program_id)
                .ok_or_else(|| PipelineError::UnknownProgram { id: step.program_id.clone() })?;

            gl.bind_framebuffer(output);
            child.run_pass(&PassInputs { textures: &textures, viewport })?;
        }

        Ok(())
    }
}

impl<G: GlApi> fmt::Debug for CompositeProgram<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeProgram")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("plan", &self.plan)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}
