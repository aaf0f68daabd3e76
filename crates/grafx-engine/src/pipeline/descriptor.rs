//! Caller-supplied program descriptions.
//!
//! A `ProgramDescriptor` is consumed by `PipelineRegistry::register`. Leaf descriptors carry
//! two shader sources; composite descriptors carry child leaves, the render targets they own
//! and the ordered plan that chains them.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use crate::gl::GlApi;

use super::error::{PipelineError, Result};
use super::targets::MODELS_TARGET_ID;
use super::variables::ProgramVariables;

/// Where a shader stage's GLSL text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    Inline(Cow<'static, str>),
    /// Resolved through the registry's `ShaderLoader`.
    Path(String),
}

impl ShaderSource {
    pub fn inline(text: impl Into<Cow<'static, str>>) -> Self {
        ShaderSource::Inline(text.into())
    }

    pub fn path(path: impl Into<String>) -> Self {
        ShaderSource::Path(path.into())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum ProgramCategory {
    /// Draws scene objects through draw callbacks.
    #[default]
    Model,
    /// Runs once per frame after all model programs.
    PostProcessor,
}

/// One step of a composite's execution plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlanStep {
    pub program_id: String,
    pub input_target_ids: Vec<String>,
    /// `None` renders to the visible framebuffer.
    pub output_target_id: Option<String>,
}

impl ExecutionPlanStep {
    pub fn new(program_id: impl Into<String>, inputs: &[&str], output: Option<&str>) -> Self {
        Self {
            program_id: program_id.into(),
            input_target_ids: inputs.iter().map(|s| s.to_string()).collect(),
            output_target_id: output.map(str::to_string),
        }
    }
}

/// A render target owned by a composite program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDecl {
    pub id: String,
    /// Bind and clear this target once at the start of every composite draw.
    pub clear_at_start: bool,
}

impl TargetDecl {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), clear_at_start: false }
    }

    pub fn cleared(mut self) -> Self {
        self.clear_at_start = true;
        self
    }
}

/// Textures and viewport handed to a pass when it is asked for its variables.
pub struct PassInputs<'a, G: GlApi> {
    /// Input target textures, in the order the plan step lists them.
    pub textures: &'a [G::Texture],
    pub viewport: (u32, u32),
}

/// Supplies the complete variable binding for one post-processing pass.
///
/// Implementations usually allocate their vertex data on the first call and keep the binding
/// around, updating only the sampler and viewport uniforms afterwards.
pub trait PassVariables<G: GlApi> {
    fn variables(&mut self, gl: &G, inputs: &PassInputs<'_, G>) -> Result<&ProgramVariables<G>>;
}

pub type ActivateHook<G> = Box<dyn FnOnce(&G)>;
pub type StateHook<G> = Box<dyn Fn(&G)>;

pub struct CompositeLayout<G: GlApi> {
    pub children: Vec<ProgramDescriptor<G>>,
    pub plan: Vec<ExecutionPlanStep>,
    pub targets: Vec<TargetDecl>,
}

pub enum ProgramKind<G: GlApi> {
    Leaf { vertex: ShaderSource, fragment: ShaderSource },
    Composite(CompositeLayout<G>),
}

/// Everything the registry needs to build, order and run one program.
pub struct ProgramDescriptor<G: GlApi> {
    pub id: String,
    pub category: ProgramCategory,
    /// Lower values draw first. Ignored for composite children.
    pub render_priority: i32,
    pub kind: ProgramKind<G>,
    /// One-time GPU initialization once the program is ready.
    pub on_activate: Option<ActivateHook<G>>,
    /// GPU state applied every time the program is activated.
    pub on_state_bind: Option<StateHook<G>>,
    /// Variable provider for composite children and leaf post-processors.
    pub pass_variables: Option<Box<dyn PassVariables<G>>>,
}

impl<G: GlApi> ProgramDescriptor<G> {
    pub fn leaf(id: impl Into<String>, vertex: ShaderSource, fragment: ShaderSource) -> Self {
        Self::with_kind(id.into(), ProgramCategory::Model, ProgramKind::Leaf { vertex, fragment })
    }

    pub fn composite(
        id: impl Into<String>,
        children: Vec<ProgramDescriptor<G>>,
        plan: Vec<ExecutionPlanStep>,
        targets: Vec<TargetDecl>,
    ) -> Self {
        Self::with_kind(
            id.into(),
            ProgramCategory::PostProcessor,
            ProgramKind::Composite(CompositeLayout { children, plan, targets }),
        )
    }

    fn with_kind(id: String, category: ProgramCategory, kind: ProgramKind<G>) -> Self {
        Self {
            id,
            category,
            render_priority: 0,
            kind,
            on_activate: None,
            on_state_bind: None,
            pass_variables: None,
        }
    }

    pub fn post_processor(mut self) -> Self {
        self.category = ProgramCategory::PostProcessor;
        self
    }

    pub fn priority(mut self, render_priority: i32) -> Self {
        self.render_priority = render_priority;
        self
    }

    pub fn on_activate(mut self, hook: impl FnOnce(&G) + 'static) -> Self {
        self.on_activate = Some(Box::new(hook));
        self
    }

    pub fn on_state_bind(mut self, hook: impl Fn(&G) + 'static) -> Self {
        self.on_state_bind = Some(Box::new(hook));
        self
    }

    pub fn pass_variables(mut self, provider: impl PassVariables<G> + 'static) -> Self {
        self.pass_variables = Some(Box::new(provider));
        self
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, ProgramKind::Composite(_))
    }

    /// Structural checks performed before anything is compiled.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| {
            Err(PipelineError::InvalidDescriptor { id: self.id.clone(), reason })
        };

        if self.id.is_empty() {
            return invalid("program id is empty".to_string());
        }

        let layout = match &self.kind {
            ProgramKind::Leaf { .. } => {
                if self.category == ProgramCategory::PostProcessor && self.pass_variables.is_none() {
                    return invalid("post-processing leaf has no pass variable provider".to_string());
                }
                return Ok(());
            }
            ProgramKind::Composite(layout) => layout,
        };

        if self.category == ProgramCategory::Model {
            return invalid("composite programs must be post-processors".to_string());
        }
        if self.pass_variables.is_some() {
            return invalid("composite programs take no pass variable provider".to_string());
        }
        if layout.plan.is_empty() {
            return invalid("execution plan is empty".to_string());
        }

        let mut owned = HashSet::new();
        for target in &layout.targets {
            if target.id == MODELS_TARGET_ID {
                return invalid(format!("target id `{MODELS_TARGET_ID}` is reserved"));
            }
            if !owned.insert(target.id.as_str()) {
                return invalid(format!("target `{}` declared twice", target.id));
            }
        }

        let mut children = HashSet::new();
        for child in &layout.children {
            if child.id == self.id {
                return invalid("child shares the composite's id".to_string());
            }
            if child.is_composite() {
                return invalid(format!("child `{}` is itself a composite", child.id));
            }
            if child.pass_variables.is_none() {
                return invalid(format!("child `{}` has no pass variable provider", child.id));
            }
            if !children.insert(child.id.as_str()) {
                return invalid(format!("child `{}` declared twice", child.id));
            }
        }

        let last = layout.plan.len() - 1;
        for (index, step) in layout.plan.iter().enumerate() {
            if !children.contains(step.program_id.as_str()) {
                return invalid(format!("step {index} runs unknown child `{}`", step.program_id));
            }
            match &step.output_target_id {
                None if index != last => {
                    return invalid(format!("step {index} renders to the screen before the last step"));
                }
                Some(output) if index != last && !owned.contains(output.as_str()) => {
                    return invalid(format!("step {index} writes to foreign target `{output}`"));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl<G: GlApi> fmt::Debug for ProgramDescriptor<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramDescriptor")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("render_priority", &self.render_priority)
            .field("composite", &self.is_composite())
            .finish_non_exhaustive()
    }
}
