//! Render-pipeline management.
//!
//! Programs are registered once by id in a [`PipelineRegistry`], which compiles them, keeps
//! model and post-processing programs in priority order, tracks per-program draw callbacks
//! and owns the off-screen render targets composite programs chain through.

mod composite;
mod config;
mod descriptor;
mod error;
mod loader;
mod program;
mod registry;
mod targets;
mod uniforms;
mod variables;

#[cfg(test)]
pub(crate) mod testing;

pub use composite::CompositeProgram;
pub use config::{RegistryConfig, DEV_CHECKS_ENV};
pub use descriptor::{
    ActivateHook, CompositeLayout, ExecutionPlanStep, PassInputs, PassVariables, ProgramCategory,
    ProgramDescriptor, ProgramKind, ShaderSource, StateHook, TargetDecl,
};
pub use error::{PipelineError, Result};
pub use loader::{FsShaderLoader, InlineOnly, ShaderLoader, StaticShaderLoader};
pub use program::{ProgramStatus, RenderProgram};
pub use registry::{DrawCallback, PipelineRegistry, Program, ProgramFuture, ProgramRole};
pub use targets::{RenderTarget, RenderTargetPool, MODELS_TARGET_ID};
pub use uniforms::{ScalarKind, UniformBinder, UniformKind, UniformSetter};
pub use variables::{AttributeConfig, DrawMode, ProgramVariables, UniformValue};
