//! Program cache, ordering and draw-callback bookkeeping.
//!
//! The registry is the single owner of every registered program and of the render target
//! pool. It is a cheap `Rc` handle; clones share state. All methods run on the thread that
//! owns the graphics context.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use futures_util::future::{self, FutureExt, LocalBoxFuture, Shared};

use crate::gl::GlApi;

use super::composite::CompositeProgram;
use super::config::RegistryConfig;
use super::descriptor::{
    CompositeLayout, PassInputs, ProgramCategory, ProgramDescriptor, ProgramKind,
};
use super::error::{PipelineError, Result};
use super::loader::{InlineOnly, ShaderLoader};
use super::program::{ProgramHooks, RenderProgram};
use super::targets::{RenderTarget, RenderTargetPool, MODELS_TARGET_ID};

/// A registered program of either kind.
pub enum Program<G: GlApi> {
    Render(Rc<RenderProgram<G>>),
    Composite(Rc<CompositeProgram<G>>),
}

impl<G: GlApi> Program<G> {
    pub fn id(&self) -> &str {
        match self {
            Program::Render(p) => p.id(),
            Program::Composite(c) => c.id(),
        }
    }

    pub fn is_ready(&self) -> bool {
        match self {
            Program::Render(p) => p.is_ready(),
            Program::Composite(c) => c.is_ready(),
        }
    }

    pub fn as_render(&self) -> Option<&Rc<RenderProgram<G>>> {
        match self {
            Program::Render(p) => Some(p),
            Program::Composite(_) => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Rc<CompositeProgram<G>>> {
        match self {
            Program::Composite(c) => Some(c),
            Program::Render(_) => None,
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Program::Render(a), Program::Render(b)) => Rc::ptr_eq(a, b),
            (Program::Composite(a), Program::Composite(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Runs a post-processing program once.
    ///
    /// A composite walks its plan. A leaf post-processor reads the models target and renders
    /// straight to the screen.
    pub fn draw_post_process(&self, registry: &PipelineRegistry<G>) -> Result<()> {
        match self {
            Program::Composite(c) => c.draw(registry),
            Program::Render(p) => {
                let texture = registry.texture(MODELS_TARGET_ID).ok_or_else(|| {
                    PipelineError::UnknownRenderTarget { id: MODELS_TARGET_ID.to_string() }
                })?;
                registry.gl().bind_framebuffer(None);
                p.run_pass(&PassInputs {
                    textures: &[texture],
                    viewport: registry.viewport_size(),
                })
            }
        }
    }
}

impl<G: GlApi> Clone for Program<G> {
    fn clone(&self) -> Self {
        match self {
            Program::Render(p) => Program::Render(Rc::clone(p)),
            Program::Composite(c) => Program::Composite(Rc::clone(c)),
        }
    }
}

impl<G: GlApi> fmt::Debug for Program<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Program::Render(p) => fmt::Debug::fmt(p, f),
            Program::Composite(c) => fmt::Debug::fmt(c, f),
        }
    }
}

/// Resolves once the program is ready (or failed). Cloneable; every clone sees the same
/// outcome. Loading only makes progress while some clone is polled.
pub type ProgramFuture<G> = Shared<LocalBoxFuture<'static, Result<Program<G>>>>;

/// Per-object draw routine bound to a model program.
///
/// Identity is the allocation: clones of one `DrawCallback` are the same callback, two
/// callbacks built from identical closures are not.
pub struct DrawCallback<G: GlApi>(Rc<dyn Fn(&RenderProgram<G>) -> Result<()>>);

impl<G: GlApi> DrawCallback<G> {
    pub fn new(callback: impl Fn(&RenderProgram<G>) -> Result<()> + 'static) -> Self {
        Self(Rc::new(callback))
    }

    pub fn invoke(&self, program: &RenderProgram<G>) -> Result<()> {
        (self.0)(program)
    }
}

impl<G: GlApi> Clone for DrawCallback<G> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<G: GlApi> PartialEq for DrawCallback<G> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl<G: GlApi> Eq for DrawCallback<G> {}

impl<G: GlApi> fmt::Debug for DrawCallback<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DrawCallback({:p})", Rc::as_ptr(&self.0))
    }
}

/// How a cached program takes part in the frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProgramRole {
    Model,
    PostProcessor,
    /// Runs only inside its composite.
    Child,
}

struct CacheEntry<G: GlApi> {
    role: ProgramRole,
    /// Composite that registered this entry as one of its children.
    owner: Option<String>,
    program: Program<G>,
    ready: ProgramFuture<G>,
    callbacks: Vec<DrawCallback<G>>,
}

#[derive(Debug, Clone)]
struct OrderSlot {
    priority: i32,
    sequence: u64,
    id: String,
}

/// Keeps `list` sorted by (priority, registration sequence).
fn insert_ordered(list: &mut Vec<OrderSlot>, slot: OrderSlot) {
    let key = (slot.priority, slot.sequence);
    let at = list.partition_point(|s| (s.priority, s.sequence) <= key);
    list.insert(at, slot);
}

struct RegistryState<G: GlApi> {
    entries: HashMap<String, CacheEntry<G>>,
    models: Vec<OrderSlot>,
    post_processors: Vec<OrderSlot>,
    targets: RenderTargetPool<G>,
    /// Private render target id -> owning composite id.
    target_owners: HashMap<String, String>,
    next_sequence: u64,
}

impl<G: GlApi> RegistryState<G> {
    fn remove_from_order(&mut self, id: &str) {
        self.models.retain(|s| s.id != id);
        self.post_processors.retain(|s| s.id != id);
    }

    /// Child ids and target ids a new composite wants must not be in use elsewhere.
    fn check_claims(&self, layout: &CompositeLayout<G>) -> std::result::Result<(), String> {
        for child in &layout.children {
            if let Some(entry) = self.entries.get(&child.id) {
                return Err(match &entry.owner {
                    Some(owner) => format!("child `{}` already belongs to `{owner}`", child.id),
                    None => format!("child `{}` is already registered as a {:?} program", child.id, entry.role),
                });
            }
        }
        for target in &layout.targets {
            if let Some(owner) = self.target_owners.get(&target.id) {
                return Err(format!("target `{}` is owned by `{owner}`", target.id));
            }
            if self.targets.contains(&target.id) {
                return Err(format!("target `{}` already exists", target.id));
            }
        }
        Ok(())
    }
}

struct Inner<G: GlApi> {
    gl: Rc<G>,
    loader: Rc<dyn ShaderLoader>,
    config: RegistryConfig,
    state: RefCell<RegistryState<G>>,
}

/// Central cache of render programs.
pub struct PipelineRegistry<G: GlApi> {
    inner: Rc<Inner<G>>,
}

impl<G: GlApi> Clone for PipelineRegistry<G> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

/// Non-owning registry handle held by in-flight loads.
pub(crate) struct WeakRegistry<G: GlApi>(Weak<Inner<G>>);

impl<G: GlApi> WeakRegistry<G> {
    pub(crate) fn upgrade(&self) -> Option<PipelineRegistry<G>> {
        self.0.upgrade().map(|inner| PipelineRegistry { inner })
    }
}

fn failed<G: GlApi>(err: PipelineError) -> ProgramFuture<G> {
    future::ready(Err(err)).boxed_local().shared()
}

impl<G: GlApi> PipelineRegistry<G> {
    /// Registry that accepts inline shader sources only.
    pub fn new(gl: Rc<G>, config: RegistryConfig) -> Self {
        Self::with_loader(gl, InlineOnly, config)
    }

    pub fn with_loader(gl: Rc<G>, loader: impl ShaderLoader + 'static, config: RegistryConfig) -> Self {
        let (width, height) = config.initial_viewport;
        let state = RegistryState {
            entries: HashMap::new(),
            models: Vec::new(),
            post_processors: Vec::new(),
            targets: RenderTargetPool::new(width, height),
            target_owners: HashMap::new(),
            next_sequence: 0,
        };
        Self {
            inner: Rc::new(Inner {
                gl,
                loader: Rc::new(loader),
                config,
                state: RefCell::new(state),
            }),
        }
    }

    pub fn gl(&self) -> &G {
        &self.inner.gl
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry<G> {
        WeakRegistry(Rc::downgrade(&self.inner))
    }

    // ── registration ──────────────────────────────────────────────────────

    /// Registers `descriptor` and returns its readiness future.
    ///
    /// Idempotent per id: a known id returns the existing future and the new descriptor is
    /// dropped. Invalid descriptors resolve to `InvalidDescriptor` and are not cached.
    ///
    /// A composite's child ids and target ids are private to it. Claiming an id that is
    /// already registered, or a target another composite owns, is an invalid descriptor.
    pub fn register(&self, descriptor: ProgramDescriptor<G>) -> ProgramFuture<G> {
        let role = match descriptor.category {
            ProgramCategory::Model => ProgramRole::Model,
            ProgramCategory::PostProcessor => ProgramRole::PostProcessor,
        };
        self.register_as(descriptor, role, None)
    }

    fn register_as(
        &self,
        descriptor: ProgramDescriptor<G>,
        role: ProgramRole,
        owner: Option<&str>,
    ) -> ProgramFuture<G> {
        if let Some(entry) = self.inner.state.borrow().entries.get(&descriptor.id) {
            if entry.role == ProgramRole::Child && role != ProgramRole::Child {
                let reason = format!(
                    "id is taken by a child of `{}`",
                    entry.owner.as_deref().unwrap_or_default()
                );
                return failed(PipelineError::InvalidDescriptor { id: descriptor.id, reason });
            }
            return entry.ready.clone();
        }

        let claims = match &descriptor.kind {
            ProgramKind::Composite(layout) => {
                self.inner.state.borrow().check_claims(layout)
            }
            ProgramKind::Leaf { .. } => Ok(()),
        };
        let checked = descriptor.validate().and_then(|()| {
            claims.map_err(|reason| PipelineError::InvalidDescriptor {
                id: descriptor.id.clone(),
                reason,
            })
        });
        if let Err(err) = checked {
            log::error!("program `{}` rejected: {err}", descriptor.id);
            return failed(err);
        }
        if role == ProgramRole::PostProcessor {
            if let Err(err) = self.ensure_models_target() {
                return failed(err);
            }
        }

        let ProgramDescriptor {
            id,
            render_priority,
            kind,
            on_activate,
            on_state_bind,
            pass_variables,
            ..
        } = descriptor;
        let hooks = ProgramHooks { on_activate, on_state_bind };
        let gl = Rc::clone(&self.inner.gl);

        let (program, load): (Program<G>, LocalBoxFuture<'static, Result<()>>) = match kind {
            ProgramKind::Leaf { vertex, fragment } => {
                let program = Rc::new(RenderProgram::new(
                    id.clone(),
                    gl,
                    self.inner.config.dev_checks,
                    hooks,
                    pass_variables,
                ));
                let load = Rc::clone(&program)
                    .load(Rc::clone(&self.inner.loader), vertex, fragment)
                    .boxed_local();
                (Program::Render(program), load)
            }
            ProgramKind::Composite(CompositeLayout { children, plan, targets }) => {
                let child_ids = children.iter().map(|c| c.id.clone()).collect();
                let composite =
                    Rc::new(CompositeProgram::new(id.clone(), gl, plan, targets, child_ids, hooks));
                let pending = children
                    .into_iter()
                    .map(|child| self.register_as(child, ProgramRole::Child, Some(id.as_str())))
                    .collect();
                let load = Rc::clone(&composite).load(self.downgrade(), pending).boxed_local();
                (Program::Composite(composite), load)
            }
        };

        let ready = {
            let registry = self.downgrade();
            let program = program.clone();
            let id = id.clone();
            async move {
                match load.await {
                    Ok(()) => {
                        log::info!("program loaded: {id}");
                        Ok(program)
                    }
                    Err(err) => {
                        log::error!("program `{id}` failed to load: {err}");
                        if let Some(registry) = registry.upgrade() {
                            let mut state = registry.inner.state.borrow_mut();
                            let current = state.entries.get(&id).is_some_and(|e| e.program.ptr_eq(&program));
                            if current {
                                state.remove_from_order(&id);
                            }
                        }
                        Err(err)
                    }
                }
            }
            .boxed_local()
            .shared()
        };

        let mut state = self.inner.state.borrow_mut();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        let slot = OrderSlot { priority: render_priority, sequence, id: id.clone() };
        match role {
            ProgramRole::Model => insert_ordered(&mut state.models, slot),
            ProgramRole::PostProcessor => insert_ordered(&mut state.post_processors, slot),
            ProgramRole::Child => {}
        }
        if let Program::Composite(composite) = &program {
            for target in composite.targets() {
                state.target_owners.insert(target.id.clone(), id.clone());
            }
        }
        state.entries.insert(
            id,
            CacheEntry {
                role,
                owner: owner.map(str::to_string),
                program,
                ready: ready.clone(),
                callbacks: Vec::new(),
            },
        );
        ready
    }

    /// Polls every unfinished load once without blocking.
    ///
    /// Frame loops call this so programs registered without an executor still finish once
    /// their sources are available.
    pub fn poll_pending(&self) {
        let pending: Vec<ProgramFuture<G>> = self
            .inner
            .state
            .borrow()
            .entries
            .values()
            .filter(|e| e.ready.peek().is_none())
            .map(|e| e.ready.clone())
            .collect();
        for ready in pending {
            let _ = ready.now_or_never();
        }
    }

    /// Removes `id` and releases its GPU program. A composite also drops the children and
    /// render targets it registered. Handles still held elsewhere report `ProgramNotReady`.
    pub fn deregister(&self, id: &str) -> bool {
        let entry = {
            let mut state = self.inner.state.borrow_mut();
            let Some(entry) = state.entries.remove(id) else {
                return false;
            };
            state.remove_from_order(id);
            entry
        };

        match &entry.program {
            Program::Render(p) => p.release(),
            Program::Composite(c) => {
                c.release();
                let (children, targets): (Vec<String>, Vec<String>) = {
                    let mut state = self.inner.state.borrow_mut();
                    let children = c
                        .child_ids()
                        .iter()
                        .filter(|child| {
                            state.entries.get(*child).is_some_and(|e| e.owner.as_deref() == Some(id))
                        })
                        .cloned()
                        .collect();
                    let targets = c
                        .targets()
                        .iter()
                        .filter(|t| state.target_owners.get(&t.id).is_some_and(|owner| owner == id))
                        .map(|t| t.id.clone())
                        .collect();
                    for target in &targets {
                        state.target_owners.remove(target);
                    }
                    (children, targets)
                };
                for child in &children {
                    self.deregister(child);
                }
                for target in &targets {
                    self.release_target(target);
                }
            }
        }
        log::info!("program deregistered: {id}");
        true
    }

    // ── lookup ────────────────────────────────────────────────────────────

    pub fn contains(&self, id: &str) -> bool {
        self.inner.state.borrow().entries.contains_key(id)
    }

    pub fn program(&self, id: &str) -> Option<Program<G>> {
        self.inner.state.borrow().entries.get(id).map(|e| e.program.clone())
    }

    pub fn ready(&self, id: &str) -> Option<ProgramFuture<G>> {
        self.inner.state.borrow().entries.get(id).map(|e| e.ready.clone())
    }

    pub fn role(&self, id: &str) -> Option<ProgramRole> {
        self.inner.state.borrow().entries.get(id).map(|e| e.role)
    }

    /// True while at least one post-processing program is registered and has not failed.
    pub fn is_using_post_processing(&self) -> bool {
        !self.inner.state.borrow().post_processors.is_empty()
    }

    /// Model program ids in draw order, ready or not.
    pub fn model_order(&self) -> Vec<String> {
        self.inner.state.borrow().models.iter().map(|s| s.id.clone()).collect()
    }

    /// Post-processing program ids in draw order, ready or not.
    pub fn post_processor_order(&self) -> Vec<String> {
        self.inner.state.borrow().post_processors.iter().map(|s| s.id.clone()).collect()
    }

    // ── draw callbacks ────────────────────────────────────────────────────

    /// Adds `callback` to the set drawn with model program `id`. Binding the same callback
    /// twice is a no-op.
    pub fn bind_draw_callback(&self, id: &str, callback: DrawCallback<G>) -> Result<()> {
        let mut state = self.inner.state.borrow_mut();
        let Some(entry) = state.entries.get_mut(id) else {
            return Err(PipelineError::UnknownProgram { id: id.to_string() });
        };
        let (ProgramRole::Model, Program::Render(program)) = (entry.role, &entry.program) else {
            return Err(PipelineError::NotAModelProgram { id: id.to_string() });
        };
        if !program.is_ready() {
            return Err(PipelineError::ProgramNotReady { id: id.to_string(), state: program.status() });
        }
        if !entry.callbacks.contains(&callback) {
            entry.callbacks.push(callback);
        }
        Ok(())
    }

    /// Removes `callback` from `id`. Unknown ids and absent callbacks are ignored.
    pub fn unbind_draw_callback(&self, id: &str, callback: &DrawCallback<G>) {
        let mut state = self.inner.state.borrow_mut();
        if let Some(entry) = state.entries.get_mut(id) {
            entry.callbacks.retain(|c| c != callback);
        }
    }

    pub fn draw_callback_count(&self, id: &str) -> usize {
        self.inner.state.borrow().entries.get(id).map_or(0, |e| e.callbacks.len())
    }

    // ── traversal ─────────────────────────────────────────────────────────

    /// Visits ready model programs in ascending priority (ties by registration order) with
    /// their callbacks in bind order.
    ///
    /// The visit runs over a snapshot, so `visitor` may register, bind or deregister.
    pub fn for_each_model_program(
        &self,
        mut visitor: impl FnMut(&Rc<RenderProgram<G>>, &[DrawCallback<G>]),
    ) {
        let snapshot: Vec<(Rc<RenderProgram<G>>, Vec<DrawCallback<G>>)> = {
            let state = self.inner.state.borrow();
            state
                .models
                .iter()
                .filter_map(|slot| state.entries.get(&slot.id))
                .filter_map(|entry| match &entry.program {
                    Program::Render(p) if p.is_ready() => Some((Rc::clone(p), entry.callbacks.clone())),
                    _ => None,
                })
                .collect()
        };
        for (program, callbacks) in &snapshot {
            visitor(program, callbacks);
        }
    }

    /// Visits ready post-processing programs in ascending priority.
    pub fn for_each_post_processor(&self, mut visitor: impl FnMut(&Program<G>)) {
        let snapshot: Vec<Program<G>> = {
            let state = self.inner.state.borrow();
            state
                .post_processors
                .iter()
                .filter_map(|slot| state.entries.get(&slot.id))
                .filter(|entry| entry.program.is_ready())
                .map(|entry| entry.program.clone())
                .collect()
        };
        for program in &snapshot {
            visitor(program);
        }
    }

    // ── render targets ────────────────────────────────────────────────────

    pub fn create_target(&self, id: &str, with_depth: bool) -> Result<RenderTarget<G>> {
        let gl: &G = &self.inner.gl;
        self.inner.state.borrow_mut().targets.create(gl, id, with_depth)
    }

    /// Creates the depth-buffered models target if it does not exist yet.
    pub fn ensure_models_target(&self) -> Result<RenderTarget<G>> {
        self.create_target(MODELS_TARGET_ID, true)
    }

    pub fn target(&self, id: &str) -> Option<RenderTarget<G>> {
        self.inner.state.borrow().targets.get(id)
    }

    pub fn texture(&self, id: &str) -> Option<G::Texture> {
        self.inner.state.borrow().targets.texture(id)
    }

    pub fn framebuffer(&self, id: &str) -> Option<G::Framebuffer> {
        self.inner.state.borrow().targets.framebuffer(id)
    }

    pub fn release_target(&self, id: &str) -> bool {
        let gl: &G = &self.inner.gl;
        self.inner.state.borrow_mut().targets.release(gl, id)
    }

    pub fn target_ids(&self) -> Vec<String> {
        self.inner.state.borrow().targets.ids().map(str::to_string).collect()
    }

    /// Resizes every render target (the models target and all composite-owned targets).
    pub fn resize_all_targets(&self, width: u32, height: u32) {
        let gl: &G = &self.inner.gl;
        self.inner.state.borrow_mut().targets.resize(gl, width, height);
    }

    pub fn viewport_size(&self) -> (u32, u32) {
        self.inner.state.borrow().targets.size()
    }
}

impl<G: GlApi> fmt::Debug for PipelineRegistry<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("PipelineRegistry")
            .field("programs", &state.entries.len())
            .field("models", &state.models)
            .field("post_processors", &state.post_processors)
            .field("targets", &state.targets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::pipeline::descriptor::{ExecutionPlanStep, ShaderSource, TargetDecl};
    use crate::pipeline::program::ProgramStatus;
    use crate::pipeline::testing::{
        link_count, model, registry, spy_child, wait, Gl, PassLog, BROKEN_FS, FS, VS,
    };

    fn noop() -> DrawCallback<Gl> {
        DrawCallback::new(|_| Ok(()))
    }

    fn visited_models(registry: &PipelineRegistry<Gl>) -> Vec<String> {
        let mut ids = Vec::new();
        registry.for_each_model_program(|p, _| ids.push(p.id().to_string()));
        ids
    }

    fn post_effect(id: &str, log: &PassLog) -> ProgramDescriptor<Gl> {
        ProgramDescriptor::composite(
            id,
            vec![spy_child(&format!("{id}-pass"), log, FS)],
            vec![ExecutionPlanStep::new(format!("{id}-pass"), &[MODELS_TARGET_ID], None)],
            vec![TargetDecl::new(format!("{id}-target"))],
        )
    }

    // ── registration ──────────────────────────────────────────────────────

    #[test]
    fn concurrent_registrations_share_one_compile() {
        let (gl, registry) = registry();
        let first = registry.register(model("m", 0));
        let second = registry.register(model("m", 0));
        let third = registry.register(model("m", 7));

        let a = wait(first).unwrap();
        let b = wait(second).unwrap();
        let c = wait(third).unwrap();

        assert!(a.ptr_eq(&b) && b.ptr_eq(&c));
        assert_eq!(link_count(&gl), 1);
        assert_eq!(gl.compile_count(), 2);
        assert_eq!(registry.model_order(), vec!["m".to_string()]);
    }

    #[test]
    fn registering_after_ready_returns_cached_program() {
        let (gl, registry) = registry();
        let first = wait(registry.register(model("m", 0))).unwrap();
        let again = wait(registry.register(model("m", 0))).unwrap();
        assert!(first.ptr_eq(&again));
        assert_eq!(link_count(&gl), 1);
    }

    #[test]
    fn models_are_visited_by_priority_then_registration() {
        let (_gl, registry) = registry();
        for (id, priority) in [("a", 5), ("b", 1), ("c", 5), ("d", -2)] {
            wait(registry.register(model(id, priority))).unwrap();
        }
        assert_eq!(visited_models(&registry), vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn visit_order_holds_for_arbitrary_priorities() {
        for seed in 1..=20_u32 {
            let (_gl, registry) = registry();
            let mut state = seed;
            let mut registered = Vec::new();
            for n in 0..24 {
                // xorshift keeps the sequences reproducible.
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let priority = (state % 7) as i32 - 3;
                let id = format!("p{n}");
                let _ = registry.register(model(&id, priority));
                registered.push((priority, n));
            }
            registry.poll_pending();

            let mut expected = registered;
            expected.sort_by_key(|&(priority, _)| priority);
            let expected: Vec<String> = expected.iter().map(|(_, n)| format!("p{n}")).collect();
            assert_eq!(visited_models(&registry), expected, "seed {seed}");
        }
    }

    #[test]
    fn pending_programs_are_not_visited() {
        let (_gl, registry) = registry();
        let _pending = registry.register(model("slow", 0));
        wait(registry.register(model("fast", 1))).unwrap();

        assert_eq!(registry.model_order(), vec!["slow", "fast"]);
        assert_eq!(visited_models(&registry), vec!["fast"]);
    }

    #[test]
    fn poll_pending_finishes_inline_loads() {
        let (_gl, registry) = registry();
        let _ = registry.register(model("m", 0));
        assert!(visited_models(&registry).is_empty());

        registry.poll_pending();
        assert_eq!(visited_models(&registry), vec!["m"]);
    }

    #[test]
    fn failed_program_is_reported_and_skipped() {
        let (_gl, registry) = registry();
        wait(registry.register(model("good", 0))).unwrap();
        let broken =
            ProgramDescriptor::leaf("bad", ShaderSource::inline(VS), ShaderSource::inline(BROKEN_FS));

        let future = registry.register(broken);
        let again = registry.register(model("bad", 0));
        match wait(future) {
            Err(PipelineError::ShaderCompile { id, log, .. }) => {
                assert_eq!(id, "bad");
                assert!(!log.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(wait(again).is_err());

        assert_eq!(registry.model_order(), vec!["good"]);
        assert_eq!(visited_models(&registry), vec!["good"]);
        let program = registry.program("bad").unwrap();
        assert_eq!(program.as_render().unwrap().status(), ProgramStatus::Failed);
    }

    #[test]
    fn invalid_descriptor_is_not_cached() {
        let (_gl, registry) = registry();
        let log = PassLog::default();
        let mut effect = post_effect("fx", &log);
        effect.category = ProgramCategory::Model;

        let result = wait(registry.register(effect));
        assert!(matches!(result, Err(PipelineError::InvalidDescriptor { .. })));
        assert!(!registry.contains("fx"));
        assert!(!registry.contains("fx-pass"));
    }

    // ── draw callbacks ────────────────────────────────────────────────────

    #[test]
    fn binding_twice_is_a_no_op_and_unbinding_removes() {
        let (_gl, registry) = registry();
        wait(registry.register(model("m", 0))).unwrap();
        let callback = noop();

        registry.bind_draw_callback("m", callback.clone()).unwrap();
        registry.bind_draw_callback("m", callback.clone()).unwrap();
        assert_eq!(registry.draw_callback_count("m"), 1);

        registry.unbind_draw_callback("m", &callback);
        assert_eq!(registry.draw_callback_count("m"), 0);
        registry.unbind_draw_callback("m", &callback);
        registry.unbind_draw_callback("nobody", &callback);
    }

    #[test]
    fn distinct_callbacks_keep_bind_order() {
        let (_gl, registry) = registry();
        wait(registry.register(model("m", 0))).unwrap();
        let order = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let order = Rc::clone(&order);
            let cb = DrawCallback::new(move |_| {
                order.borrow_mut().push(n);
                Ok(())
            });
            registry.bind_draw_callback("m", cb).unwrap();
        }

        registry.for_each_model_program(|program, callbacks| {
            for cb in callbacks {
                cb.invoke(program).unwrap();
            }
        });
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn bind_errors() {
        let (_gl, registry) = registry();
        let log = PassLog::default();
        wait(registry.register(post_effect("fx", &log))).unwrap();
        let _pending = registry.register(model("pending", 0));

        assert_eq!(
            registry.bind_draw_callback("ghost", noop()),
            Err(PipelineError::UnknownProgram { id: "ghost".to_string() })
        );
        assert_eq!(
            registry.bind_draw_callback("fx", noop()),
            Err(PipelineError::NotAModelProgram { id: "fx".to_string() })
        );
        assert_eq!(
            registry.bind_draw_callback("fx-pass", noop()),
            Err(PipelineError::NotAModelProgram { id: "fx-pass".to_string() })
        );
        assert_eq!(
            registry.bind_draw_callback("pending", noop()),
            Err(PipelineError::ProgramNotReady {
                id: "pending".to_string(),
                state: ProgramStatus::Unbuilt,
            })
        );
    }

    #[test]
    fn visitor_may_call_back_into_the_registry() {
        let (_gl, registry) = registry();
        wait(registry.register(model("m", 0))).unwrap();
        let inner = registry.clone();
        registry.for_each_model_program(|program, _| {
            inner.bind_draw_callback(program.id(), noop()).unwrap();
        });
        assert_eq!(registry.draw_callback_count("m"), 1);
    }

    // ── post-processing and targets ───────────────────────────────────────

    #[test]
    fn first_post_processor_creates_models_target() {
        let (gl, registry) = registry();
        assert!(!registry.is_using_post_processing());
        assert!(registry.target(MODELS_TARGET_ID).is_none());

        let log = PassLog::default();
        let future = registry.register(post_effect("fx", &log));
        assert!(registry.is_using_post_processing());
        let models = registry.target(MODELS_TARGET_ID).unwrap();
        assert!(models.depth_buffer.is_some());
        assert_eq!(gl.texture_size(models.texture), Some((800, 600)));

        wait(future).unwrap();
        let owned = registry.target("fx-target").unwrap();
        assert!(owned.depth_buffer.is_none());
    }

    #[test]
    fn post_processors_are_visited_in_priority_order() {
        let (_gl, registry) = registry();
        let log = PassLog::default();
        wait(registry.register(post_effect("late", &log).priority(3))).unwrap();
        wait(registry.register(post_effect("early", &log).priority(-1))).unwrap();

        let mut ids = Vec::new();
        registry.for_each_post_processor(|p| ids.push(p.id().to_string()));
        assert_eq!(ids, vec!["early", "late"]);
        assert!(visited_models(&registry).is_empty());
    }

    #[test]
    fn resize_keeps_target_ids_and_handles() {
        let (gl, registry) = registry();
        let log = PassLog::default();
        wait(registry.register(post_effect("fx", &log))).unwrap();

        let mut before = registry.target_ids();
        before.sort();
        let handles: Vec<_> = before.iter().map(|id| registry.texture(id).unwrap()).collect();

        registry.resize_all_targets(800, 600);
        registry.resize_all_targets(400, 300);

        let mut after = registry.target_ids();
        after.sort();
        assert_eq!(before, after);
        for (id, handle) in before.iter().zip(&handles) {
            let target = registry.target(id).unwrap();
            assert_eq!(target.texture, *handle);
            assert_eq!((target.width, target.height), (400, 300));
            assert_eq!(gl.texture_size(target.texture), Some((400, 300)));
        }
        assert_eq!(registry.viewport_size(), (400, 300));
    }

    // ── deregistration ────────────────────────────────────────────────────

    #[test]
    fn deregistered_program_handles_go_stale() {
        let (gl, registry) = registry();
        let program = wait(registry.register(model("m", 0))).unwrap();
        let render = Rc::clone(program.as_render().unwrap());

        assert!(registry.deregister("m"));
        assert!(!registry.deregister("m"));
        assert!(!registry.contains("m"));
        assert!(visited_models(&registry).is_empty());
        assert!(matches!(
            render.set_active(),
            Err(PipelineError::ProgramNotReady { state: ProgramStatus::Released, .. })
        ));

        wait(registry.register(model("m", 0))).unwrap();
        assert_eq!(link_count(&gl), 2);
    }

    #[test]
    fn deregistering_a_composite_drops_children_and_targets() {
        let (_gl, registry) = registry();
        let log = PassLog::default();
        wait(registry.register(post_effect("fx", &log))).unwrap();

        assert!(registry.deregister("fx"));
        assert!(!registry.contains("fx-pass"));
        assert!(registry.target("fx-target").is_none());
        assert!(!registry.is_using_post_processing());
        assert!(registry.target(MODELS_TARGET_ID).is_some());
    }

    // ── ownership ─────────────────────────────────────────────────────────

    /// Writes `private` in its first step, reads it back in the second.
    fn private_effect(id: &str, log: &PassLog) -> ProgramDescriptor<Gl> {
        let pass = format!("{id}-pass");
        ProgramDescriptor::composite(
            id,
            vec![spy_child(&pass, log, FS)],
            vec![
                ExecutionPlanStep::new(pass.clone(), &[MODELS_TARGET_ID], Some("private")),
                ExecutionPlanStep::new(pass, &["private"], None),
            ],
            vec![TargetDecl::new("private")],
        )
    }

    fn is_invalid(result: Result<Program<Gl>>, expected: &str) -> bool {
        matches!(result, Err(PipelineError::InvalidDescriptor { ref id, .. }) if id == expected)
    }

    #[test]
    fn private_targets_cannot_be_claimed_twice() {
        let (_gl, registry) = registry();
        let log = PassLog::default();
        let a = wait(registry.register(private_effect("a", &log))).unwrap();

        assert!(is_invalid(wait(registry.register(private_effect("b", &log))), "b"));
        assert!(!registry.contains("b"));
        assert!(!registry.contains("b-pass"));
        assert!(!registry.deregister("b"));
        assert_eq!(a.draw_post_process(&registry), Ok(()));

        assert!(registry.deregister("a"));
        assert!(registry.target("private").is_none());
        wait(registry.register(private_effect("b", &log))).unwrap();
        assert!(registry.target("private").is_some());
    }

    #[test]
    fn composite_cannot_adopt_a_registered_program() {
        let (_gl, registry) = registry();
        let log = PassLog::default();
        wait(registry.register(model("shared", 0))).unwrap();

        let effect = ProgramDescriptor::composite(
            "fx",
            vec![spy_child("shared", &log, FS)],
            vec![ExecutionPlanStep::new("shared", &[MODELS_TARGET_ID], None)],
            vec![],
        );
        assert!(is_invalid(wait(registry.register(effect)), "fx"));
        assert!(!registry.contains("fx"));
        assert!(!registry.deregister("fx"));
        assert_eq!(registry.role("shared"), Some(ProgramRole::Model));
        assert_eq!(visited_models(&registry), vec!["shared"]);
    }

    #[test]
    fn children_stay_private_to_their_composite() {
        let (_gl, registry) = registry();
        let log = PassLog::default();
        wait(registry.register(post_effect("a", &log))).unwrap();

        let thief = ProgramDescriptor::composite(
            "b",
            vec![spy_child("a-pass", &log, FS)],
            vec![ExecutionPlanStep::new("a-pass", &[MODELS_TARGET_ID], None)],
            vec![],
        );
        assert!(is_invalid(wait(registry.register(thief)), "b"));
        assert!(is_invalid(wait(registry.register(model("a-pass", 0))), "a-pass"));
        assert_eq!(registry.role("a-pass"), Some(ProgramRole::Child));
        assert!(registry.model_order().is_empty());
    }
}
