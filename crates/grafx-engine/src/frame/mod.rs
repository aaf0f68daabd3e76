//! Per-frame traversal of a pipeline registry.
//!
//! The frame driver is the registry's main consumer: it draws every model program's callbacks
//! into the models target (or the screen when nothing post-processes), then runs the
//! post-processing programs onto the screen.

mod driver;

pub use driver::{FrameDriver, FrameDriverConfig, FrameStats};
