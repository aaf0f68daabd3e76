//! Pipeline error types

use thiserror::Error;

use crate::gl::ShaderStage;

use super::program::ProgramStatus;

/// Errors produced while registering, building, binding or drawing programs.
///
/// `Clone` so a shared readiness future can hand the same failure to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A shader stage was rejected by the driver.
    #[error("failed to compile {stage} shader of program `{id}`: {log}")]
    ShaderCompile { id: String, stage: ShaderStage, log: String },

    /// Both stages compiled but the program did not link.
    #[error("failed to link program `{id}`: {log}")]
    ProgramLink { id: String, log: String },

    /// A `ShaderSource::Path` could not be resolved by the shader loader.
    #[error("failed to load shader `{path}` for program `{id}`: {reason}")]
    ShaderLoad { id: String, path: String, reason: String },

    #[error("program `{id}` is not registered")]
    UnknownProgram { id: String },

    /// Draw callbacks may only target top-level model programs.
    #[error("program `{id}` is not a model program")]
    NotAModelProgram { id: String },

    #[error("program `{id}` is not ready ({state})")]
    ProgramNotReady { id: String, state: ProgramStatus },

    #[error("program `{id}` declares uniform `{uniform}` of unsupported type 0x{gl_type:04X}")]
    UnsupportedUniformType { id: String, uniform: String, gl_type: u32 },

    #[error("invalid descriptor for program `{id}`: {reason}")]
    InvalidDescriptor { id: String, reason: String },

    #[error("render target `{id}` does not exist")]
    UnknownRenderTarget { id: String },

    /// The context refused to create a GPU object.
    #[error("graphics context error: {reason}")]
    Gl { reason: String },

    #[error("registry dropped before program `{id}` finished loading")]
    RegistryDropped { id: String },
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
