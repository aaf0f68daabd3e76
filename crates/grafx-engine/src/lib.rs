//! Grafx engine crate.
//!
//! Shader-program management for a GL renderer: programs are compiled once and cached by id,
//! model programs are drawn through per-object callbacks in priority order, and multi-pass
//! post-processing effects chain off-screen render targets.

pub mod gl;
pub mod logging;
pub mod pipeline;
pub mod frame;
pub mod effects;
